//! Sync validator.
//!
//! Position reports from clients are checked against a few teleport
//! heuristics before they are committed. A rejected report leaves the NPC
//! untouched and triggers an immediate sync broadcast so the client snaps
//! back to the server's version.

use std::time::Instant;

use log::debug;

use npc_sync_shared::{clamp_position, distance_2d_sqr, distance_sqr, NpcSyncReport, Vec3};

use super::{effective_position, NpcComponent};
use crate::entities::{NpcId, PlayerId};
use crate::error::{NpcError, NpcResult};

/// Below this squared distance a report is routine motion
const ROUTINE_MOTION_SQR: f32 = 3.0 * 3.0;

/// The server considers an NPC under the map below this height
const BELOW_MAP_Z: f32 = -60.0;

/// A report this low means the client still sees the NPC falling
const STILL_FALLING_Z: f32 = -70.0;

/// A report above this height means the game put the NPC back on the map
const MAP_RETURN_Z: f32 = -20.0;

/// Largest horizontal jump accepted when the game returns an NPC to the map
const MAP_RETURN_MAX_SQR: f32 = 80.0 * 80.0;

/// Largest plausible horizontal step between two reports
const MAX_STEP_SQR: f32 = 1.8 * 1.8;

/// Outcome of a report that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerdict {
    /// Commit the reported state
    Accept,
    /// Valid but nothing to commit (still falling through the world)
    Ignore,
}

/// Check a report moving an NPC from `previous` to `target`
pub fn validate_report(previous: Vec3, target: Vec3, heading: f32) -> NpcResult<SyncVerdict> {
    if !(0.0..=360.0).contains(&heading) {
        return Err(NpcError::rejected("heading out of range"));
    }
    
    if distance_sqr(previous, target) <= ROUTINE_MOTION_SQR {
        return Ok(SyncVerdict::Accept);
    }
    
    let horizontal_sqr = distance_2d_sqr(previous, target);
    if previous[2] < BELOW_MAP_Z && target[2] < STILL_FALLING_Z && horizontal_sqr <= ROUTINE_MOTION_SQR {
        Ok(SyncVerdict::Ignore)
    } else if previous[2] < BELOW_MAP_Z && target[2] > MAP_RETURN_Z {
        if horizontal_sqr > MAP_RETURN_MAX_SQR {
            Err(NpcError::rejected("map return too far"))
        } else {
            Ok(SyncVerdict::Accept)
        }
    } else if horizontal_sqr > MAX_STEP_SQR {
        Err(NpcError::rejected("moved too far"))
    } else {
        Ok(SyncVerdict::Accept)
    }
}

impl NpcComponent {
    /// Handle an inbound sync report. Returns whether it was processed.
    pub fn handle_sync_report(&mut self, sender: PlayerId, report: NpcSyncReport, now: Instant) -> bool {
        match self.apply_sync_report(sender, report, now) {
            Ok(_) => true,
            Err(e) => {
                debug!("Ignored sync for NPC {} from player {}: {}", report.npc_id, sender, e);
                false
            }
        }
    }
    
    pub(crate) fn apply_sync_report(
        &mut self,
        sender: PlayerId,
        report: NpcSyncReport,
        now: Instant,
    ) -> NpcResult<SyncVerdict> {
        let npc_id = self.admit_inbound(sender, report.npc_id, now)?;
        
        let verdict = clamp_position(report.position)
            .ok_or(NpcError::rejected("non-finite position"))
            .and_then(|position| {
                self.validate_for(npc_id, position, report.heading).map(|verdict| (position, verdict))
            });
        let (position, verdict) = match verdict {
            Ok(checked) => checked,
            Err(e) => {
                self.broadcast_sync(npc_id);
                return Err(e);
            }
        };
        
        // Verified before arbitration: two unverified observers may both
        // commit during the tick in which each is first verified.
        self.npc_mut(npc_id)?.verified_senders.insert(sender);
        
        if !self.is_player_reliable_for_sync(npc_id, sender, now) {
            return Err(NpcError::AuthorityDenied);
        }
        
        if verdict == SyncVerdict::Accept {
            let npc = self.npc_mut(npc_id)?;
            if npc.vehicle.is_none() {
                npc.position = position;
            }
            npc.heading = report.heading;
            npc.pending_broadcast = true;
        }
        Ok(verdict)
    }
    
    fn validate_for(&self, npc_id: NpcId, reported: Vec3, heading: f32) -> NpcResult<SyncVerdict> {
        let npc = self.npcs.get(npc_id).ok_or(NpcError::npc_not_found(npc_id.index()))?;
        let previous = effective_position(&self.vehicles, npc);
        // A seated NPC moves with its vehicle whatever the client claims
        let target = if npc.vehicle.is_some() { previous } else { reported };
        validate_report(previous, target, heading)
    }
    
    /// Common gate for inbound NPC traffic
    pub(crate) fn admit_inbound(&self, sender: PlayerId, wire_id: u16, now: Instant) -> NpcResult<NpcId> {
        let player = self.players
            .get(sender)
            .ok_or(NpcError::player_not_found(sender.index()))?;
        if !player.state.is_present() || player.is_afk(now, self.config.afk_timeout()) {
            return Err(NpcError::AuthorityDenied);
        }
        
        let npc_id = self.npcs.resolve(wire_id).ok_or(NpcError::npc_not_found(wire_id))?;
        match self.npcs.get(npc_id) {
            Some(npc) if npc.is_streamed_for(sender) => Ok(npc_id),
            _ => Err(NpcError::AuthorityDenied),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use npc_sync_shared::ObserverState;

    use super::super::test_support::*;
    use super::*;

    fn report(npc: NpcId, position: Vec3) -> NpcSyncReport {
        NpcSyncReport { npc_id: npc.index(), position, heading: 90.0 }
    }

    #[test]
    fn test_heading_bounds() {
        assert!(validate_report([0.0; 3], [0.0; 3], 0.0).is_ok());
        assert!(validate_report([0.0; 3], [0.0; 3], 360.0).is_ok());
        assert!(validate_report([0.0; 3], [0.0; 3], -0.1).is_err());
        assert!(validate_report([0.0; 3], [0.0; 3], 360.5).is_err());
        assert!(validate_report([0.0; 3], [0.0; 3], f32::NAN).is_err());
    }

    #[test]
    fn test_routine_motion_is_accepted() {
        assert_eq!(validate_report([0.0; 3], [2.0, 2.0, 0.0], 10.0), Ok(SyncVerdict::Accept));
        // A vertical drop is not a horizontal teleport
        assert_eq!(validate_report([0.0; 3], [1.0, 0.0, -10.0], 10.0), Ok(SyncVerdict::Accept));
    }

    #[test]
    fn test_heuristic_cases() {
        assert!(validate_report([0.0; 3], [5.0, 0.0, 0.0], 0.0).is_err());
        assert_eq!(validate_report([0.0, 0.0, -65.0], [0.0, 0.0, -75.0], 0.0), Ok(SyncVerdict::Ignore));
        assert!(validate_report([0.0, 0.0, -65.0], [100.0, 0.0, -10.0], 0.0).is_err());
        assert_eq!(validate_report([0.0, 0.0, -65.0], [50.0, 0.0, -10.0], 0.0), Ok(SyncVerdict::Accept));
    }

    #[test]
    fn test_teleport_is_rejected_and_corrected() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0, 0.0, 0.0]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.take_outgoing();
        
        assert!(!c.handle_sync_report(p, report(npc, [5.0, 0.0, 0.0]), now));
        assert_eq!(c.npc(npc).unwrap().position, [0.0, 0.0, 0.0]);
        assert!(!c.npc(npc).unwrap().pending_broadcast);
        assert_eq!(syncs(&c.take_outgoing(), p, npc), 1);
    }

    #[test]
    fn test_below_map_report_is_ignored_quietly() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0, 0.0, -65.0]).unwrap();
        let p = join(&mut c, [0.0, 0.0, -60.0], now);
        c.take_outgoing();
        
        assert_eq!(c.apply_sync_report(p, report(npc, [0.0, 0.0, -75.0]), now), Ok(SyncVerdict::Ignore));
        assert_eq!(c.npc(npc).unwrap().position, [0.0, 0.0, -65.0]);
        assert!(c.take_outgoing().is_empty());
        assert!(c.npc(npc).unwrap().verified_senders.contains(&p));
    }

    #[test]
    fn test_map_return_gate() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0, 0.0, -65.0]).unwrap();
        let p = join(&mut c, [0.0, 0.0, 0.0], now);
        c.take_outgoing();
        
        assert!(!c.handle_sync_report(p, report(npc, [100.0, 0.0, -10.0]), now));
        assert_eq!(c.npc(npc).unwrap().position, [0.0, 0.0, -65.0]);
        assert_eq!(syncs(&c.take_outgoing(), p, npc), 1);
        
        assert!(c.handle_sync_report(p, report(npc, [50.0, 0.0, -10.0]), now));
        assert_eq!(c.npc(npc).unwrap().position, [50.0, 0.0, -10.0]);
        assert_eq!(c.npc(npc).unwrap().heading, 90.0);
        assert!(c.npc(npc).unwrap().pending_broadcast);
    }

    #[test]
    fn test_inbound_gating() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let near = join(&mut c, [1.0, 0.0, 0.0], now);
        let far = join(&mut c, [900.0, 0.0, 0.0], now);
        
        // Not streamed to this player
        assert_eq!(c.apply_sync_report(far, report(npc, [0.5, 0.0, 0.0]), now), Err(NpcError::AuthorityDenied));
        // Unknown NPC
        assert!(matches!(
            c.apply_sync_report(near, NpcSyncReport { npc_id: 77, position: [0.0; 3], heading: 0.0 }, now),
            Err(NpcError::NotFound { .. })
        ));
        // AFK sender
        let later = now + Duration::from_millis(1801);
        assert_eq!(c.apply_sync_report(near, report(npc, [0.5, 0.0, 0.0]), later), Err(NpcError::AuthorityDenied));
        // Left the world
        c.update_player(near, [1.0, 0.0, 0.0], 0, ObserverState::None, now);
        assert_eq!(c.apply_sync_report(near, report(npc, [0.5, 0.0, 0.0]), now), Err(NpcError::AuthorityDenied));
        assert_eq!(c.npc(npc).unwrap().position, [0.0; 3]);
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        c.take_outgoing();
        
        assert!(!c.handle_sync_report(p, report(npc, [f32::NAN, 0.0, 0.0]), now));
        assert_eq!(syncs(&c.take_outgoing(), p, npc), 1);
    }

    #[test]
    fn test_seated_npc_keeps_vehicle_position() {
        let mut c = component();
        let now = Instant::now();
        let npc = c.create_npc(0, [0.0; 3]).unwrap();
        c.upsert_vehicle(4, crate::entities::Vehicle { position: [1.0, 1.0, 0.0], virtual_world: 0, passenger_seats: 1 });
        c.put_in_vehicle(npc, 4, 0).unwrap();
        let p = join(&mut c, [1.0, 0.0, 0.0], now);
        
        assert!(c.handle_sync_report(p, report(npc, [150.0, 0.0, 0.0]), now));
        assert_eq!(c.npc_position(npc), Some([1.0, 1.0, 0.0]));
        assert_eq!(c.npc(npc).unwrap().heading, 90.0);
    }
}
