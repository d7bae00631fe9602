//! Authority arbiter: which observer may currently report an NPC's state.

use std::time::Instant;

use npc_sync_shared::{distance, Vec3, SPECTATOR_DISTANCE_PENALTY};

use super::{effective_position, NpcComponent};
use crate::entities::{NpcId, PlayerId, ServerNpc, ServerPlayer};

fn effective_distance(player: &ServerPlayer, npc_position: Vec3) -> f32 {
    let penalty = if player.is_spectating() { SPECTATOR_DISTANCE_PENALTY } else { 0.0 };
    distance(player.position, npc_position) + penalty
}

impl NpcComponent {
    /// Whether `player` is the trusted source for `npc_id` right now.
    ///
    /// A sole observer is always trusted. A followed player takes priority
    /// while it is streamed, verified and not AFK; otherwise the closest
    /// eligible observer wins.
    pub fn is_player_reliable_for_sync(&self, npc_id: NpcId, player: PlayerId, now: Instant) -> bool {
        let Some(npc) = self.npcs.get(npc_id) else {
            return false;
        };
        if !npc.is_streamed_for(player) {
            return false;
        }
        if npc.streamed_for.len() == 1 {
            return true;
        }
        
        if let Some(prioritized) = self.prioritized_source(npc, now) {
            return prioritized == player;
        }
        
        let Some(sender) = self.players.get(player) else {
            return false;
        };
        let npc_position = effective_position(&self.vehicles, npc);
        let own_distance = effective_distance(sender, npc_position);
        
        !npc.streamed_for
            .iter()
            .filter(|other| **other != player && self.is_eligible_source(npc, **other, now))
            .filter_map(|other| self.players.get(*other))
            .any(|other| effective_distance(other, npc_position) < own_distance)
    }
    
    /// Followed player, if it currently qualifies for priority
    fn prioritized_source(&self, npc: &ServerNpc, now: Instant) -> Option<PlayerId> {
        npc.task
            .followed_player()
            .filter(|target| npc.is_streamed_for(*target) && self.is_eligible_source(npc, *target, now))
    }
    
    fn is_eligible_source(&self, npc: &ServerNpc, player: PlayerId, now: Instant) -> bool {
        npc.verified_senders.contains(&player) && !self.is_player_afk(player, now)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use npc_sync_shared::{NpcSyncReport, ObserverState};

    use super::super::test_support::*;
    use super::*;

    fn verify_all(c: &mut NpcComponent, npc: NpcId, players: &[PlayerId]) {
        let record = c.npcs.get_mut(npc).unwrap();
        for p in players {
            record.verified_senders.insert(*p);
        }
    }

    #[test]
    fn test_sole_observer_is_reliable() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [150.0, 0.0, 0.0], now);
        assert!(c.is_player_reliable_for_sync(npc, p, now));
    }

    #[test]
    fn test_unstreamed_player_is_never_reliable() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let far = join(&mut c, [500.0, 0.0, 0.0], now);
        assert!(!c.is_player_reliable_for_sync(npc, far, now));
    }

    #[test]
    fn test_closest_verified_player_wins() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let near = join(&mut c, [2.0, 0.0, 0.0], now);
        let mid = join(&mut c, [10.0, 0.0, 0.0], now);
        let far = join(&mut c, [50.0, 0.0, 0.0], now);
        verify_all(&mut c, npc, &[near, mid, far]);
        
        let reliable: Vec<_> = [near, mid, far]
            .into_iter()
            .filter(|p| c.is_player_reliable_for_sync(npc, *p, now))
            .collect();
        assert_eq!(reliable, vec![near]);
    }

    #[test]
    fn test_unverified_and_afk_players_do_not_compete() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let near = join(&mut c, [2.0, 0.0, 0.0], now);
        let far = join(&mut c, [50.0, 0.0, 0.0], now);
        
        // `near` never had a report accepted
        verify_all(&mut c, npc, &[far]);
        assert!(c.is_player_reliable_for_sync(npc, far, now));
        
        // `near` verified but AFK
        verify_all(&mut c, npc, &[near]);
        let later = now + Duration::from_millis(2000);
        c.update_player(far, [50.0, 0.0, 0.0], 0, ObserverState::OnFoot, later);
        assert!(c.is_player_reliable_for_sync(npc, far, later));
    }

    #[test]
    fn test_spectators_are_penalised() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let spectator = c.connect_player().unwrap();
        c.update_player(spectator, [2.0, 0.0, 0.0], 0, ObserverState::Spectating, now);
        let walker = join(&mut c, [5.0, 0.0, 0.0], now);
        verify_all(&mut c, npc, &[spectator, walker]);
        
        assert!(c.is_player_reliable_for_sync(npc, walker, now));
        assert!(!c.is_player_reliable_for_sync(npc, spectator, now));
    }

    #[test]
    fn test_follow_target_is_prioritised() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let near = join(&mut c, [2.0, 0.0, 0.0], now);
        let followed = join(&mut c, [30.0, 0.0, 0.0], now);
        c.follow_player(npc, followed).unwrap();
        
        // Not yet verified: proximity decides
        verify_all(&mut c, npc, &[near]);
        assert!(c.is_player_reliable_for_sync(npc, near, now));
        
        verify_all(&mut c, npc, &[followed]);
        assert!(c.is_player_reliable_for_sync(npc, followed, now));
        assert!(!c.is_player_reliable_for_sync(npc, near, now));
        
        // An AFK follow target loses priority
        let later = now + Duration::from_millis(2000);
        c.update_player(near, [2.0, 0.0, 0.0], 0, ObserverState::OnFoot, later);
        assert!(c.is_player_reliable_for_sync(npc, near, later));
    }

    #[test]
    fn test_only_one_concurrent_report_commits() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let players: Vec<_> = [3.0, 8.0, 20.0]
            .into_iter()
            .map(|x| join(&mut c, [x, 0.0, 0.0], now))
            .collect();
        verify_all(&mut c, npc, &players);
        
        let accepted = players
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                let report = NpcSyncReport { npc_id: npc.index(), position: [0.1 * (*i as f32 + 1.0), 0.0, 0.0], heading: 0.0 };
                c.handle_sync_report(**p, report, now)
            })
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(c.npc(npc).unwrap().position, [0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_non_finite_observer_position_cannot_share_authority() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let near = join(&mut c, [1.0, 0.0, 0.0], now);
        let other = join(&mut c, [5.0, 0.0, 0.0], now);
        verify_all(&mut c, npc, &[near, other]);
        
        let soon = now + Duration::from_millis(10);
        assert!(!c.update_player(other, [f32::NAN, 0.0, 0.0], 0, ObserverState::OnFoot, soon));
        assert_eq!(c.player(other).unwrap().position, [5.0, 0.0, 0.0]);
        
        assert!(c.is_player_reliable_for_sync(npc, near, soon));
        assert!(!c.is_player_reliable_for_sync(npc, other, soon));
        
        let report = NpcSyncReport { npc_id: npc.index(), position: [0.5, 0.0, 0.0], heading: 0.0 };
        assert!(!c.handle_sync_report(other, report, soon));
        assert!(c.handle_sync_report(near, report, soon));
        assert_eq!(c.npc(npc).unwrap().position, [0.5, 0.0, 0.0]);
    }
}
