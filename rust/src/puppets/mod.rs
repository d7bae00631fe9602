//! Locally simulated NPCs.
//!
//! [`PuppetController`] mirrors every NPC the server streamed to this client
//! into a game body, maps server tasks onto local behaviours and reports the
//! bodies' transforms back while this client is the best placed observer.
//! Frame-rate hooks (damage, hit, climb, melee) are answered here as well.

mod host;
mod puppet;

pub use host::{
    EntityHandle, GameHost, LocalBehavior, MeleeCommand, PuppetFlags, RemotePlayer, FALLBACK_PUPPET_MODEL,
};
pub use puppet::Puppet;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use npc_sync_shared::{
    distance, is_animation_library_valid, ClientMessage, DamageReport, MoveMode, NpcControl, NpcControlAction,
    NpcSyncState, NpcTask, ServerMessage, StreamInData, Vec3, SPECTATOR_DISTANCE_PENALTY,
};

/// Extra climb reach given to puppets (a jumping body reaches about 0.87)
pub const PUPPET_CLIMB_HEIGHT_BONUS: f32 = 0.66;

/// Every n-th unpaused frame refreshes the "last active" timestamp
const ACTIVE_FRAME_STRIDE: u32 = 5;

/// Timing of outgoing position reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterConfig {
    /// On-foot sync interval of the session, scaled by displacement
    pub base_interval: Duration,
    /// Reports stop once the last unpaused frame is older than this
    pub pause_window: Duration,
    /// Delay before a freshly streamed puppet reports
    pub initial_delay: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(40),
            pause_window: Duration::from_millis(1800),
            initial_delay: Duration::from_millis(250),
        }
    }
}

pub struct PuppetController<H: GameHost> {
    host: H,
    puppets: BTreeMap<u16, Puppet>,
    config: ReporterConfig,
    validate_animations: bool,
    use_all_animations: bool,
    unpaused_frames: u32,
    last_active_frame: Option<Instant>,
    outgoing: Vec<ClientMessage>,
}

impl<H: GameHost> PuppetController<H> {
    pub fn new(host: H, config: ReporterConfig) -> Self {
        Self {
            host,
            puppets: BTreeMap::new(),
            config,
            validate_animations: true,
            use_all_animations: false,
            unpaused_frames: 0,
            last_active_frame: None,
            outgoing: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn set_animation_validation(&mut self, validate: bool, use_all: bool) {
        self.validate_animations = validate;
        self.use_all_animations = use_all;
    }

    pub fn puppet(&self, npc_id: u16) -> Option<&Puppet> {
        self.puppets.get(&npc_id)
    }

    pub fn puppet_count(&self) -> usize {
        self.puppets.len()
    }

    /// NPC id owning a game body
    pub fn find_by_entity(&self, entity: EntityHandle) -> Option<u16> {
        self.puppets
            .values()
            .find(|puppet| puppet.entity() == entity && puppet.is_valid(&self.host))
            .map(Puppet::id)
    }

    /// Messages produced since the last call
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Drop every puppet, e.g. when the session restarts
    pub fn reset(&mut self) {
        let puppets = std::mem::take(&mut self.puppets);
        info!("Dropping {} NPC puppets", puppets.len());
        for puppet in puppets.into_values() {
            puppet.destroy(&mut self.host);
        }
        self.outgoing.clear();
    }

    // =========================================================================
    // Server messages
    // =========================================================================

    pub fn handle_message(&mut self, message: &ServerMessage, now: Instant) {
        match message {
            ServerMessage::NpcControl(control) => self.handle_control(control, now),
            ServerMessage::NpcSync(state) => self.handle_sync(state),
            ServerMessage::Connected { .. } | ServerMessage::ConnectFailed { .. } => {}
        }
    }

    pub fn handle_control(&mut self, control: &NpcControl, now: Instant) {
        match &control.action {
            NpcControlAction::StreamIn(data) => self.stream_in(control.npc_id, data, now),
            NpcControlAction::StreamOut => self.stream_out(control.npc_id),
            NpcControlAction::SetActiveTask(task) => {
                self.apply_task(control.npc_id, task);
            }
            NpcControlAction::GiveDamage(_) | NpcControlAction::TakeDamage { .. } => {
                debug!("Ignoring client-only control message for NPC {}", control.npc_id);
            }
        }
    }

    pub fn stream_in(&mut self, npc_id: u16, data: &StreamInData, now: Instant) {
        if let Some(previous) = self.puppets.remove(&npc_id) {
            previous.destroy(&mut self.host);
        }

        match Puppet::spawn(&mut self.host, npc_id, data, now, self.config.initial_delay) {
            Some(puppet) => {
                debug!("NPC {} streamed in", npc_id);
                self.puppets.insert(npc_id, puppet);
                self.apply_task(npc_id, &data.task);
            }
            None => warn!("Game refused to spawn a body for NPC {}", npc_id),
        }
    }

    pub fn stream_out(&mut self, npc_id: u16) {
        if let Some(puppet) = self.puppets.remove(&npc_id) {
            debug!("NPC {} streamed out", npc_id);
            puppet.destroy(&mut self.host);
        }
    }

    /// Map a server task onto local behaviour. False if it was refused.
    pub fn apply_task(&mut self, npc_id: u16, task: &NpcTask) -> bool {
        if let NpcTask::PlayAnimation { data } = task {
            if self.validate_animations && !is_animation_library_valid(&data.library, self.use_all_animations) {
                warn!("NPC {}: animation library {} is not allowed", npc_id, data.library);
                return false;
            }
        }

        let npc_target = match task {
            NpcTask::AttackNpc { target, .. } => self.live_puppet_entity(*target),
            _ => None,
        };

        let Some(puppet) = self.puppets.get_mut(&npc_id) else {
            return false;
        };
        puppet.forget_targets();

        let host = &mut self.host;
        match task {
            NpcTask::StandStill => puppet.stand_still(host),
            NpcTask::AttackPlayer { target, aggressive } => puppet.attack_player(host, *target, *aggressive),
            NpcTask::GoToPoint { destination, mode } => puppet.go_to_point(host, *destination, *mode),
            NpcTask::FollowPlayer { target } => puppet.follow_player(host, *target),
            NpcTask::PlayAnimation { data } => return puppet.play_animation(host, data),
            NpcTask::AttackNpc { target, aggressive } => puppet.attack_npc(host, *target, npc_target, *aggressive),
        }
        true
    }

    pub fn handle_sync(&mut self, state: &NpcSyncState) {
        if let Some(puppet) = self.puppets.get_mut(&state.npc_id) {
            puppet.apply_sync(&mut self.host, state);
        }
    }

    fn live_puppet_entity(&self, npc_id: u16) -> Option<EntityHandle> {
        self.puppets
            .get(&npc_id)
            .filter(|puppet| puppet.is_valid(&self.host) && self.host.health(puppet.entity()) > 0.0)
            .map(Puppet::entity)
    }

    // =========================================================================
    // Frame update
    // =========================================================================

    /// Run once per game frame
    pub fn update(&mut self, now: Instant) {
        let paused = self.host.is_pause_menu_active();
        if !paused {
            self.unpaused_frames += 1;
            if self.unpaused_frames % ACTIVE_FRAME_STRIDE == 0 {
                self.last_active_frame = Some(now);
                self.unpaused_frames = 0;
            }
        }

        // Stale samples from a paused game must not reach the server
        let should_report = !paused
            && self
                .last_active_frame
                .is_some_and(|active| now.saturating_duration_since(active) < self.config.pause_window);

        let ids: Vec<u16> = self.puppets.keys().copied().collect();
        for id in ids {
            self.refresh_puppet(id);
            if should_report {
                self.report_puppet(id, now);
            }
        }
    }

    /// Engage deferred targets and keep dead bodies dead
    fn refresh_puppet(&mut self, npc_id: u16) {
        let npc_target = self
            .puppets
            .get(&npc_id)
            .and_then(Puppet::npc_attack_target)
            .and_then(|target| self.live_puppet_entity(target));

        let Some(puppet) = self.puppets.get_mut(&npc_id) else {
            return;
        };
        let host = &mut self.host;
        if !puppet.is_valid(host) {
            return;
        }

        if let Some(target) = puppet.wants_player_attack(host) {
            let aggressive = puppet.is_aggressive();
            puppet.attack_player(host, target, aggressive);
        } else if let Some(target) = puppet.wants_npc_attack(host, npc_target) {
            let aggressive = puppet.is_aggressive();
            puppet.attack_npc(host, target, npc_target, aggressive);
        } else if let Some(target) = puppet.wants_follow(host) {
            puppet.follow_player(host, target);
        }

        puppet.enforce_death(host);
    }

    fn report_puppet(&mut self, npc_id: u16, now: Instant) {
        let population = self.puppets.len();
        let base = self.config.base_interval;
        let Some(puppet) = self.puppets.get_mut(&npc_id) else {
            return;
        };

        let host = &self.host;
        let report = puppet.report_if_due(host, now, base, population, |position| is_local_closest(host, position));
        if let Some(report) = report {
            self.outgoing.push(ClientMessage::NpcSync(report));
        }
    }

    // =========================================================================
    // Game hooks
    // =========================================================================

    /// A body was damaged. Returns true when the local game must not apply the
    /// damage itself because the server owns the outcome.
    pub fn handle_damage(
        &mut self,
        damager: EntityHandle,
        receiver: EntityHandle,
        amount: f32,
        body_part: u8,
        weapon_id: u8,
    ) -> bool {
        if !self.host.is_playing() || amount <= 0.0 {
            return false;
        }

        let local = self.host.local_player_entity();
        let report = DamageReport { damage: amount, weapon_id, body_part };

        if local == Some(receiver) {
            if let Some(npc_id) = self.find_by_entity(damager) {
                self.send_control(npc_id, NpcControlAction::GiveDamage(report));
            }
            // The game resolves damage to the local player itself
            return false;
        }

        let Some(npc_id) = self.find_by_entity(receiver) else {
            return false;
        };

        if local == Some(damager) {
            self.send_control(npc_id, NpcControlAction::TakeDamage { report, damager_npc: None });
        } else if let Some(damager_npc) = self.find_by_entity(damager) {
            self.send_control(npc_id, NpcControlAction::TakeDamage { report, damager_npc: Some(damager_npc) });
        }

        // NPC health only ever changes through the server
        true
    }

    fn send_control(&mut self, npc_id: u16, action: NpcControlAction) {
        self.outgoing.push(ClientMessage::NpcControl(NpcControl { npc_id, action }));
    }

    /// A shot hit something. True when a puppet fired it at the local player
    /// or their vehicle, so the hit must go through local damage handling.
    pub fn handle_hit(&self, damager: EntityHandle, receiver: EntityHandle) -> bool {
        if !self.host.is_playing() {
            return false;
        }
        let Some(local) = self.host.local_player_entity() else {
            return false;
        };
        if receiver != local && self.host.local_vehicle_entity() != Some(receiver) {
            return false;
        }
        self.find_by_entity(damager).is_some()
    }

    /// Whether a body plays the stagger animation when hit
    pub fn should_apply_damage_anim(&self, entity: EntityHandle) -> bool {
        if self.host.local_player_entity() == Some(entity) {
            return true;
        }
        self.find_by_entity(entity)
            .and_then(|npc_id| self.puppets.get(&npc_id))
            .map_or(true, Puppet::is_stun_enabled)
    }

    /// Vehicles never kill puppets locally
    pub fn can_be_killed_by_vehicle(&self, entity: EntityHandle) -> bool {
        self.find_by_entity(entity).is_none()
    }

    /// Melee reaction for a body under attack; anti-stun puppets hit back
    pub fn melee_command(&self, entity: EntityHandle) -> MeleeCommand {
        let anti_stun = self
            .find_by_entity(entity)
            .and_then(|npc_id| self.puppets.get(&npc_id))
            .is_some_and(|puppet| !puppet.is_stun_enabled());
        if anti_stun {
            MeleeCommand::Attack
        } else {
            MeleeCommand::Block
        }
    }

    /// Extra height a body may climb
    pub fn climb_height_bonus(&self, entity: EntityHandle) -> f32 {
        if self.host.local_player_entity() == Some(entity) {
            return 0.0;
        }
        if self.find_by_entity(entity).is_some() {
            PUPPET_CLIMB_HEIGHT_BONUS
        } else {
            0.0
        }
    }

    /// Move mode forced on a body seeking its melee target
    pub fn seek_move_mode(&self, entity: EntityHandle) -> Option<MoveMode> {
        let npc_id = self.find_by_entity(entity)?;
        let puppet = self.puppets.get(&npc_id)?;
        puppet.is_aggressive().then_some(MoveMode::Sprint)
    }
}

fn ranked_distance(from: Vec3, to: Vec3, spectating: bool) -> f32 {
    let penalty = if spectating { SPECTATOR_DISTANCE_PENALTY } else { 0.0 };
    distance(from, to) + penalty
}

/// True unless another non-AFK player stands strictly closer to `position`,
/// spectators ranked the same way the server ranks them
fn is_local_closest<H: GameHost>(host: &H, position: Vec3) -> bool {
    let Some(local) = host.local_player_entity() else {
        return false;
    };
    let my_distance = ranked_distance(host.position(local), position, host.is_spectating());
    let local_id = host.local_player_id();

    !host
        .remote_players()
        .iter()
        .filter(|player| Some(player.id) != local_id && !player.afk)
        .any(|player| ranked_distance(player.position, position, player.spectating) < my_distance)
}
