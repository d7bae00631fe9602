//! Damage arbiter and the handler chain it reports to.

use std::time::Instant;

use log::{debug, info};

use npc_sync_shared::{is_weapon_valid_for_taken_damage, BodyPart, DamageReport, NpcControl, NpcControlAction};

use super::NpcComponent;
use crate::entities::{NpcId, PlayerId};
use crate::error::{NpcError, NpcResult};

/// Who dealt a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attacker {
    Player(PlayerId),
    Npc(NpcId),
}

/// Hooks for damage and death events.
///
/// The `give_damage` hooks can veto: the first handler returning `false`
/// stops the chain and the hit is discarded. The rest are informational.
pub trait NpcEventHandler {
    /// A player hit an NPC
    fn on_player_give_damage_npc(
        &mut self,
        _npc: NpcId,
        _from: PlayerId,
        _damage: f32,
        _weapon: u8,
        _body_part: BodyPart,
    ) -> bool {
        true
    }
    
    /// An NPC hit another NPC
    fn on_npc_give_damage_npc(
        &mut self,
        _npc: NpcId,
        _from: NpcId,
        _damage: f32,
        _weapon: u8,
        _body_part: BodyPart,
    ) -> bool {
        true
    }
    
    /// An NPC hit a player
    fn on_player_take_damage_npc(
        &mut self,
        _npc: NpcId,
        _to: PlayerId,
        _damage: f32,
        _weapon: u8,
        _body_part: BodyPart,
    ) {
    }
    
    /// `reason` is the weapon id of the killing blow
    fn on_npc_death(&mut self, _npc: NpcId, _killer: Option<Attacker>, _reason: u8) {}
}

fn check_report(report: &DamageReport) -> NpcResult<BodyPart> {
    if !report.damage.is_finite() || report.damage < 0.0 {
        return Err(NpcError::rejected("negative damage"));
    }
    BodyPart::from_u8(report.body_part).ok_or(NpcError::rejected("invalid body part"))
}

impl NpcComponent {
    /// Handle an inbound control message. Returns whether it was processed.
    pub fn handle_npc_control(&mut self, sender: PlayerId, control: NpcControl, now: Instant) -> bool {
        let npc_id = control.npc_id;
        let result = self.admit_inbound(sender, npc_id, now).and_then(|npc| match control.action {
            NpcControlAction::TakeDamage { report, damager_npc } => {
                self.apply_take_damage(sender, npc, report, damager_npc, now)
            }
            NpcControlAction::GiveDamage(report) => self.apply_give_damage(sender, npc, report),
            _ => Err(NpcError::rejected("server-only control message")),
        });
        
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Ignored control for NPC {} from player {}: {}", npc_id, sender, e);
                false
            }
        }
    }
    
    /// An NPC was hit, by the reporting player or by another NPC
    pub(crate) fn apply_take_damage(
        &mut self,
        sender: PlayerId,
        npc_id: NpcId,
        report: DamageReport,
        damager_npc: Option<u16>,
        now: Instant,
    ) -> NpcResult<()> {
        let npc = self.npcs.get(npc_id).ok_or(NpcError::npc_not_found(npc_id.index()))?;
        if npc.invulnerable {
            return Err(NpcError::rejected("invulnerable"));
        }
        let body_part = check_report(&report)?;
        if !is_weapon_valid_for_taken_damage(report.weapon_id) {
            return Err(NpcError::rejected("weapon cannot deal damage"));
        }
        if npc.is_dead() {
            return Err(NpcError::rejected("already dead"));
        }
        
        let attacker = match damager_npc {
            Some(wire_id) => {
                let damager = self.npcs.resolve(wire_id).ok_or(NpcError::npc_not_found(wire_id))?;
                if !self.is_player_reliable_for_sync(damager, sender, now) {
                    return Err(NpcError::AuthorityDenied);
                }
                let allowed = self.handlers.iter_mut().all(|handler| {
                    handler.on_npc_give_damage_npc(npc_id, damager, report.damage, report.weapon_id, body_part)
                });
                if !allowed {
                    return Err(NpcError::VetoedByHandler);
                }
                Attacker::Npc(damager)
            }
            None => {
                let allowed = self.handlers.iter_mut().all(|handler| {
                    handler.on_player_give_damage_npc(npc_id, sender, report.damage, report.weapon_id, body_part)
                });
                if !allowed {
                    return Err(NpcError::VetoedByHandler);
                }
                Attacker::Player(sender)
            }
        };
        
        let npc = self.npc_mut(npc_id)?;
        npc.health = (npc.health - report.damage).max(0.0);
        npc.pending_broadcast = true;
        
        if npc.is_dead() {
            info!("NPC {} killed by {:?} with weapon {}", npc_id, attacker, report.weapon_id);
            for handler in self.handlers.iter_mut() {
                handler.on_npc_death(npc_id, Some(attacker), report.weapon_id);
            }
        }
        Ok(())
    }
    
    /// An NPC hit the reporting player. Informational only.
    pub(crate) fn apply_give_damage(&mut self, sender: PlayerId, npc_id: NpcId, report: DamageReport) -> NpcResult<()> {
        let body_part = check_report(&report)?;
        let npc = self.npcs.get(npc_id).ok_or(NpcError::npc_not_found(npc_id.index()))?;
        if report.weapon_id != npc.weapon.id {
            return Err(NpcError::InvalidWeapon(report.weapon_id));
        }
        
        for handler in self.handlers.iter_mut() {
            handler.on_player_take_damage_npc(npc_id, sender, report.damage, report.weapon_id, body_part);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Instant;

    use super::super::test_support::*;
    use super::*;

    #[derive(Default)]
    struct Log {
        calls: Vec<&'static str>,
        deaths: Vec<(NpcId, Option<Attacker>, u8)>,
        hits_on_players: usize,
    }

    struct Recorder {
        name: &'static str,
        allow: bool,
        log: Rc<RefCell<Log>>,
    }

    impl NpcEventHandler for Recorder {
        fn on_player_give_damage_npc(&mut self, _: NpcId, _: PlayerId, _: f32, _: u8, _: BodyPart) -> bool {
            self.log.borrow_mut().calls.push(self.name);
            self.allow
        }

        fn on_npc_give_damage_npc(&mut self, _: NpcId, _: NpcId, _: f32, _: u8, _: BodyPart) -> bool {
            self.log.borrow_mut().calls.push(self.name);
            self.allow
        }

        fn on_player_take_damage_npc(&mut self, _: NpcId, _: PlayerId, _: f32, _: u8, _: BodyPart) {
            self.log.borrow_mut().hits_on_players += 1;
        }

        fn on_npc_death(&mut self, npc: NpcId, killer: Option<Attacker>, reason: u8) {
            self.log.borrow_mut().deaths.push((npc, killer, reason));
        }
    }

    fn recorder(name: &'static str, allow: bool, log: &Rc<RefCell<Log>>) -> Box<dyn NpcEventHandler> {
        Box::new(Recorder { name, allow, log: log.clone() })
    }

    fn take(npc: NpcId, damage: f32) -> NpcControl {
        NpcControl {
            npc_id: npc.index(),
            action: NpcControlAction::TakeDamage {
                report: DamageReport { damage, weapon_id: 24, body_part: 3 },
                damager_npc: None,
            },
        }
    }

    #[test]
    fn test_veto_leaves_health_untouched() {
        let mut c = component();
        let now = Instant::now();
        let log = Rc::new(RefCell::new(Log::default()));
        c.add_event_handler(recorder("first", false, &log));
        c.add_event_handler(recorder("second", true, &log));
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        
        assert!(!c.handle_npc_control(p, take(npc, 30.0), now));
        assert_eq!(c.npc(npc).unwrap().health, 100.0);
        // The chain stops at the first veto
        assert_eq!(log.borrow().calls, vec!["first"]);
    }

    #[test]
    fn test_damage_applies_and_death_fires_once() {
        let mut c = component();
        let now = Instant::now();
        let log = Rc::new(RefCell::new(Log::default()));
        c.add_event_handler(recorder("a", true, &log));
        c.add_event_handler(recorder("b", true, &log));
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        
        assert!(c.handle_npc_control(p, take(npc, 30.0), now));
        assert_eq!(c.npc(npc).unwrap().health, 70.0);
        assert!(c.npc(npc).unwrap().pending_broadcast);
        assert_eq!(log.borrow().calls, vec!["a", "b"]);
        
        assert!(c.handle_npc_control(p, take(npc, 500.0), now));
        assert_eq!(c.npc(npc).unwrap().health, 0.0);
        
        // Dead NPCs take no more damage
        assert!(!c.handle_npc_control(p, take(npc, 10.0), now));
        
        let log = log.borrow();
        // One death per handler
        assert_eq!(log.deaths.len(), 2);
        assert_eq!(log.deaths[0], (npc, Some(Attacker::Player(p)), 24));
    }

    #[test]
    fn test_malformed_hits_are_rejected() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        
        let bad = |damage: f32, weapon_id: u8, body_part: u8| NpcControl {
            npc_id: npc.index(),
            action: NpcControlAction::TakeDamage {
                report: DamageReport { damage, weapon_id, body_part },
                damager_npc: None,
            },
        };
        assert!(!c.handle_npc_control(p, bad(-1.0, 24, 3), now));
        assert!(!c.handle_npc_control(p, bad(10.0, 24, 2), now));
        assert!(!c.handle_npc_control(p, bad(10.0, 24, 10), now));
        assert!(!c.handle_npc_control(p, bad(10.0, 47, 3), now));
        assert!(c.handle_npc_control(p, bad(10.0, 54, 9), now));
        
        c.set_invulnerable(npc, true).unwrap();
        assert!(!c.handle_npc_control(p, bad(10.0, 24, 3), now));
        assert_eq!(c.npc(npc).unwrap().health, 90.0);
    }

    #[test]
    fn test_npc_damager_requires_authority() {
        let mut c = component();
        let now = Instant::now();
        let victim = c.create_npc(0, [0.0; 3]).unwrap();
        let shooter = c.create_npc(0, [4.0, 0.0, 0.0]).unwrap();
        let near = join(&mut c, [5.0, 0.0, 0.0], now);
        let far = join(&mut c, [40.0, 0.0, 0.0], now);
        for npc in [victim, shooter] {
            let record = c.npcs.get_mut(npc).unwrap();
            record.verified_senders.insert(near);
            record.verified_senders.insert(far);
        }
        
        let hit = |damager: NpcId| NpcControl {
            npc_id: victim.index(),
            action: NpcControlAction::TakeDamage {
                report: DamageReport { damage: 25.0, weapon_id: 31, body_part: 3 },
                damager_npc: Some(damager.index()),
            },
        };
        
        assert!(!c.handle_npc_control(far, hit(shooter), now));
        assert!(c.handle_npc_control(near, hit(shooter), now));
        assert_eq!(c.npc(victim).unwrap().health, 75.0);
    }

    #[test]
    fn test_npc_kill_reports_npc_attacker() {
        let mut c = component();
        let now = Instant::now();
        let log = Rc::new(RefCell::new(Log::default()));
        c.add_event_handler(recorder("a", true, &log));
        let victim = c.create_npc(0, [0.0; 3]).unwrap();
        let shooter = c.create_npc(0, [1.0, 0.0, 0.0]).unwrap();
        let p = join(&mut c, [2.0, 0.0, 0.0], now);
        c.set_health(victim, 5.0).unwrap();
        
        let control = NpcControl {
            npc_id: victim.index(),
            action: NpcControlAction::TakeDamage {
                report: DamageReport { damage: 25.0, weapon_id: 31, body_part: 4 },
                damager_npc: Some(shooter.index()),
            },
        };
        assert!(c.handle_npc_control(p, control, now));
        assert_eq!(log.borrow().deaths, vec![(victim, Some(Attacker::Npc(shooter)), 31)]);
    }

    #[test]
    fn test_give_damage_checks_equipped_weapon() {
        let mut c = component();
        let now = Instant::now();
        let log = Rc::new(RefCell::new(Log::default()));
        c.add_event_handler(recorder("a", false, &log));
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.set_weapon(npc, 30).unwrap();
        
        let give = |weapon_id: u8| NpcControl {
            npc_id: npc.index(),
            action: NpcControlAction::GiveDamage(DamageReport { damage: 9.0, weapon_id, body_part: 3 }),
        };
        assert!(!c.handle_npc_control(p, give(31), now));
        // Informational events cannot be vetoed
        assert!(c.handle_npc_control(p, give(30), now));
        assert_eq!(log.borrow().hits_on_players, 1);
    }

    #[test]
    fn test_server_only_actions_are_ignored() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        
        let control = NpcControl { npc_id: npc.index(), action: NpcControlAction::StreamOut };
        assert!(!c.handle_npc_control(p, control, now));
    }
}
