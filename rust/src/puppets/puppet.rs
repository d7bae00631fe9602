//! A single NPC simulated by the local game.
//!
//! The puppet remembers which targets it was told to engage so that tasks
//! whose target is not yet present locally can be applied on a later frame.

use std::time::{Duration, Instant};

use log::debug;

use npc_sync_shared::{
    clamp_position, distance, distance_2d, normalize_heading, AnimationData, MoveMode, NpcSyncReport,
    NpcSyncState, StreamInData, Vec3, WeaponSkill, INVALID_NPC_ID,
};

use super::host::{EntityHandle, GameHost, LocalBehavior, PuppetFlags, FALLBACK_PUPPET_MODEL};

/// Snap distance while the body is moving on its own
const MOVING_SNAP_DISTANCE: f32 = 3.25;

/// Snap distance while the body stands still
const STILL_SNAP_DISTANCE: f32 = 2.7;

/// Speed above which the body counts as moving (walking is ~0.031)
const MOVING_SPEED: f32 = 0.03;

/// Vertical speed below which the body counts as falling
const FALLING_SPEED: f32 = -0.03;

/// A falling body may lag behind vertically but not horizontally
const FALLING_HORIZONTAL_TOLERANCE: f32 = 0.08;

const FALLING_VERTICAL_FACTOR: f32 = 10.0;

/// Report interval once the body has practically stopped
const STILL_REPORT_INTERVAL: Duration = Duration::from_millis(120);

pub struct Puppet {
    id: u16,
    entity: EntityHandle,
    stun_enabled: bool,
    aggressive: bool,
    /// Targets still wanted, engaged or not
    player_attack: Option<u16>,
    npc_attack: Option<u16>,
    player_follow: Option<u16>,
    last_report_check: Instant,
    last_report_position: Vec3,
    reported_once: bool,
}

impl Puppet {
    /// Spawn a body and apply the static part of a stream-in
    pub fn spawn<H: GameHost>(
        host: &mut H,
        id: u16,
        data: &StreamInData,
        now: Instant,
        initial_delay: Duration,
    ) -> Option<Self> {
        let model = if host.is_character_model(data.model) {
            data.model
        } else {
            debug!("NPC {} uses non-character model {}, falling back", id, data.model);
            FALLBACK_PUPPET_MODEL
        };

        let entity = host.spawn_entity(model, data.position)?;
        host.apply_flags(entity, PuppetFlags::AI_ACTOR);
        host.set_behavior(entity, LocalBehavior::Idle);

        let mut puppet = Self {
            id,
            entity,
            stun_enabled: data.stun_enabled,
            aggressive: false,
            player_attack: None,
            npc_attack: None,
            player_follow: None,
            last_report_check: now + initial_delay,
            last_report_position: data.position,
            reported_once: false,
        };

        puppet.set_heading(host, data.heading);
        puppet.set_health(host, data.health);
        if data.weapon_id != 0 {
            host.set_weapon(entity, data.weapon_id);
        }
        let skill = WeaponSkill::from_u8(data.skill.min(2)).unwrap_or_default();
        host.set_weapon_handling(entity, data.accuracy.min(100), data.rate.min(100), skill);

        Some(puppet)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    pub fn is_stun_enabled(&self) -> bool {
        self.stun_enabled
    }

    pub fn is_aggressive(&self) -> bool {
        self.aggressive
    }

    pub fn player_attack_target(&self) -> Option<u16> {
        self.player_attack
    }

    pub fn npc_attack_target(&self) -> Option<u16> {
        self.npc_attack
    }

    pub fn follow_target(&self) -> Option<u16> {
        self.player_follow
    }

    pub fn is_valid<H: GameHost>(&self, host: &H) -> bool {
        host.is_entity_valid(self.entity)
    }

    pub fn is_dead<H: GameHost>(&self, host: &H) -> bool {
        self.is_valid(host)
            && (host.health(self.entity) <= 0.0 || host.active_behavior(self.entity) == LocalBehavior::Die)
    }

    pub fn is_seated<H: GameHost>(&self, host: &H) -> bool {
        host.vehicle_of(self.entity).is_some()
    }

    pub fn destroy<H: GameHost>(self, host: &mut H) {
        if self.is_valid(host) {
            host.destroy_entity(self.entity);
        }
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn set_heading<H: GameHost>(&mut self, host: &mut H, heading: f32) {
        if self.is_valid(host) {
            host.set_heading(self.entity, normalize_heading(heading));
        }
    }

    /// Apply health, entering or leaving the death behaviour on a zero crossing
    pub fn set_health<H: GameHost>(&mut self, host: &mut H, health: f32) {
        if !self.is_valid(host) {
            return;
        }

        host.set_health(self.entity, health);

        let dying = host.active_behavior(self.entity) == LocalBehavior::Die;
        if health <= 0.0 && !dying {
            self.clear_targets();
            host.set_behavior(self.entity, LocalBehavior::Die);
        } else if health > 0.0 && dying {
            self.stand_still(host);
        }
    }

    /// Keep a body with no health in the death behaviour
    pub fn enforce_death<H: GameHost>(&mut self, host: &mut H) {
        if self.is_dead(host) && host.active_behavior(self.entity) != LocalBehavior::Die {
            self.clear_targets();
            host.set_behavior(self.entity, LocalBehavior::Die);
        }
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    fn clear_targets(&mut self) {
        self.player_attack = None;
        self.npc_attack = None;
        self.player_follow = None;
        self.aggressive = false;
    }

    fn clear<H: GameHost>(&mut self, host: &mut H) {
        self.clear_targets();
        host.set_behavior(self.entity, LocalBehavior::Idle);
    }

    fn engage_behavior<H: GameHost>(&self, host: &H, target: EntityHandle) -> LocalBehavior {
        if self.is_seated(host) {
            LocalBehavior::DriveBy { target }
        } else {
            LocalBehavior::KillOnFoot { target, aggressive: self.aggressive }
        }
    }

    /// Forget every target without touching the running behaviour
    pub fn forget_targets(&mut self) {
        self.clear_targets();
    }

    pub fn stand_still<H: GameHost>(&mut self, host: &mut H) {
        if !self.is_valid(host) {
            return;
        }
        self.clear_targets();
        host.set_behavior(self.entity, LocalBehavior::StandStill);
    }

    /// Attack a player now, or remember the target until it can be engaged
    pub fn attack_player<H: GameHost>(&mut self, host: &mut H, target: u16, aggressive: bool) {
        if !self.is_valid(host) || self.is_dead(host) || host.player_health(target) <= 0.0 {
            self.player_attack = Some(target);
            self.aggressive = aggressive;
            return;
        }

        self.clear(host);
        self.player_attack = Some(target);
        self.aggressive = aggressive;

        if let Some(target_entity) = host.player_entity(target) {
            let behavior = self.engage_behavior(host, target_entity);
            host.set_behavior(self.entity, behavior);
        }
    }

    /// Attack another puppet. `target_entity` is its body if it is alive.
    pub fn attack_npc<H: GameHost>(
        &mut self,
        host: &mut H,
        target: u16,
        target_entity: Option<EntityHandle>,
        aggressive: bool,
    ) {
        let target_entity = match target_entity {
            Some(entity) if self.is_valid(host) && !self.is_dead(host) => entity,
            _ => {
                self.npc_attack = Some(target);
                self.aggressive = aggressive;
                return;
            }
        };

        self.clear(host);
        self.npc_attack = Some(target);
        self.aggressive = aggressive;

        let behavior = self.engage_behavior(host, target_entity);
        host.set_behavior(self.entity, behavior);
    }

    pub fn follow_player<H: GameHost>(&mut self, host: &mut H, target: u16) {
        if !self.is_valid(host) || self.is_dead(host) || host.player_health(target) <= 0.0 {
            self.player_follow = Some(target);
            return;
        }

        self.clear(host);
        self.player_follow = Some(target);

        if let Some(target_entity) = host.player_entity(target) {
            host.set_behavior(self.entity, LocalBehavior::FollowFootsteps { target: target_entity });
        }
    }

    pub fn go_to_point<H: GameHost>(&mut self, host: &mut H, destination: Vec3, mode: MoveMode) {
        if !self.is_valid(host) || self.is_dead(host) {
            return;
        }
        self.clear(host);
        host.set_behavior(self.entity, LocalBehavior::GoToPoint { destination, mode });
    }

    /// Play a named animation. False if the request cannot be honoured.
    pub fn play_animation<H: GameHost>(&mut self, host: &mut H, data: &AnimationData) -> bool {
        if !self.is_valid(host) || self.is_dead(host) || !data.is_well_formed() {
            return false;
        }
        if !host.load_animation_library(&data.library) {
            debug!("Animation library {} could not be loaded", data.library);
            return false;
        }
        self.clear(host);
        host.set_behavior(self.entity, LocalBehavior::PlayAnimation(data.clone()));
        true
    }

    // =========================================================================
    // Deferred targets
    // =========================================================================

    fn is_engaging(&self, host: &impl GameHost, target: Option<EntityHandle>) -> bool {
        target.is_some() && host.active_behavior(self.entity).target() == target
    }

    /// A remembered player attack that is not running but could
    pub fn wants_player_attack<H: GameHost>(&self, host: &H) -> Option<u16> {
        let target = self.player_attack?;
        if self.is_dead(host) || host.player_health(target) <= 0.0 {
            return None;
        }
        let engaging = match host.active_behavior(self.entity) {
            LocalBehavior::KillOnFoot { .. } | LocalBehavior::DriveBy { .. } => {
                self.is_engaging(host, host.player_entity(target))
            }
            _ => false,
        };
        (!engaging).then_some(target)
    }

    /// A remembered NPC attack that is not running; `target_entity` is the live target body
    pub fn wants_npc_attack<H: GameHost>(&self, host: &H, target_entity: Option<EntityHandle>) -> Option<u16> {
        let target = self.npc_attack?;
        if self.is_dead(host) || target_entity.is_none() {
            return None;
        }
        (!self.is_engaging(host, target_entity)).then_some(target)
    }

    pub fn wants_follow<H: GameHost>(&self, host: &H) -> Option<u16> {
        let target = self.player_follow?;
        if self.is_dead(host) || host.player_health(target) <= 0.0 {
            return None;
        }
        let following = matches!(host.active_behavior(self.entity), LocalBehavior::FollowFootsteps { .. })
            && self.is_engaging(host, host.player_entity(target));
        (!following).then_some(target)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Reconcile the local body with the server's state
    pub fn apply_sync<H: GameHost>(&mut self, host: &mut H, state: &NpcSyncState) {
        if !self.is_valid(host) {
            return;
        }

        let current = host.position(self.entity);
        let velocity = host.velocity(self.entity);

        match state.vehicle() {
            Some((vehicle, seat)) => {
                let seated_in = host.vehicle_of(self.entity);
                if seated_in != Some(vehicle) {
                    if seated_in.is_some() {
                        host.warp_out_of_vehicle(self.entity, [current[0], current[1], current[2] + 1.0]);
                    }
                    if !host.warp_into_vehicle(self.entity, vehicle, seat) {
                        debug!("NPC {} could not take seat {} of vehicle {}", self.id, seat, vehicle);
                    }
                }
            }
            None => {
                if self.is_seated(host) {
                    host.warp_out_of_vehicle(self.entity, [current[0], current[1], current[2] + 1.0]);
                }
                if should_snap(current, state.position, velocity) {
                    host.set_position(self.entity, state.position);
                }
            }
        }

        self.set_health(host, state.health);
    }

    /// How long to wait between reports, given how far the body moved since the last one
    pub fn report_interval<H: GameHost>(&self, host: &H, base: Duration, population: usize) -> Duration {
        if !self.is_valid(host) {
            return Duration::from_secs(1);
        }

        let moved = distance(self.last_report_position, host.position(self.entity));
        let interval = if moved <= 0.02 {
            STILL_REPORT_INTERVAL
        } else if moved <= 0.07 {
            base * 3
        } else if moved <= 0.12 {
            base * 4
        } else {
            base * 5
        };

        interval + Duration::from_millis(population as u64)
    }

    /// Produce a report if one is due. The first report is always sent;
    /// later ones only while `is_closest` says this client is nearest.
    pub fn report_if_due<H: GameHost>(
        &mut self,
        host: &H,
        now: Instant,
        base: Duration,
        population: usize,
        is_closest: impl FnOnce(Vec3) -> bool,
    ) -> Option<NpcSyncReport> {
        if !self.is_valid(host) || self.id == 0 || self.id == INVALID_NPC_ID {
            return None;
        }

        let interval = self.report_interval(host, base, population);
        if now.saturating_duration_since(self.last_report_check) <= interval {
            return None;
        }
        self.last_report_check = now;

        let position = host.position(self.entity);
        if self.reported_once && !is_closest(position) {
            return None;
        }

        let position = clamp_position(position)?;
        self.last_report_position = position;
        self.reported_once = true;

        Some(NpcSyncReport {
            npc_id: self.id,
            position,
            heading: normalize_heading(host.heading(self.entity)),
        })
    }
}

/// Whether a server position is far enough from the local one to teleport the body
fn should_snap(current: Vec3, target: Vec3, velocity: Vec3) -> bool {
    let speed = (velocity[0] * velocity[0] + velocity[1] * velocity[1] + velocity[2] * velocity[2]).sqrt();
    let tolerance = if speed >= MOVING_SPEED {
        MOVING_SNAP_DISTANCE
    } else {
        STILL_SNAP_DISTANCE
    };

    if distance(current, target) <= tolerance {
        return false;
    }

    let falling = velocity[2] < FALLING_SPEED;
    let vertical_gap = (current[2] - target[2]).abs();
    let falling_in_place = falling
        && distance_2d(current, target) <= FALLING_HORIZONTAL_TOLERANCE
        && vertical_gap <= velocity[2].abs() * FALLING_VERTICAL_FACTOR;

    !falling_in_place
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_body_tolerance() {
        assert!(!should_snap([0.0, 0.0, 0.0], [2.5, 0.0, 0.0], [0.0; 3]));
        assert!(should_snap([0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0; 3]));
    }

    #[test]
    fn test_moving_body_tolerance() {
        let running = [0.08, 0.0, 0.0];
        assert!(!should_snap([0.0, 0.0, 0.0], [3.0, 0.0, 0.0], running));
        assert!(should_snap([0.0, 0.0, 0.0], [3.5, 0.0, 0.0], running));
    }

    #[test]
    fn test_falling_body_is_left_alone() {
        let falling = [0.0, 0.0, -0.5];
        // Straight below, within what the fall speed explains
        assert!(!should_snap([0.0, 0.0, 10.0], [0.0, 0.0, 6.0], falling));
        // Too far below for the current speed
        assert!(should_snap([0.0, 0.0, 10.0], [0.0, 0.0, 0.0], falling));
        // Drifted sideways
        assert!(should_snap([0.0, 0.0, 10.0], [1.0, 0.0, 6.0], falling));
    }
}
