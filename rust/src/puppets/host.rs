//! The game process as seen by the puppet controller.

use npc_sync_shared::{AnimationData, MoveMode, Vec3, WeaponSkill};

/// Opaque handle of an entity living in the game process
pub type EntityHandle = u32;

/// Model used when the server asks for something that is not a character
pub const FALLBACK_PUPPET_MODEL: u32 = 7;

/// Game-side flags applied to every puppet body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuppetFlags {
    pub drops_weapons_on_death: bool,
    pub can_be_revived: bool,
    pub takes_critical_hits: bool,
    pub drowns_in_water: bool,
    pub can_be_dragged_out_of_vehicle: bool,
}

impl PuppetFlags {
    /// Everything an AI-driven body should not do
    pub const AI_ACTOR: Self = Self {
        drops_weapons_on_death: false,
        can_be_revived: false,
        takes_critical_hits: false,
        drowns_in_water: false,
        can_be_dragged_out_of_vehicle: false,
    };
}

/// What a puppet body is doing locally
#[derive(Debug, Clone, PartialEq)]
pub enum LocalBehavior {
    /// Nothing assigned, the engine idles the body
    Idle,
    StandStill,
    /// Chase the target on foot and fight it
    KillOnFoot {
        target: EntityHandle,
        aggressive: bool,
    },
    /// Shoot at the target from the current vehicle seat
    DriveBy {
        target: EntityHandle,
    },
    GoToPoint {
        destination: Vec3,
        mode: MoveMode,
    },
    FollowFootsteps {
        target: EntityHandle,
    },
    PlayAnimation(AnimationData),
    Die,
}

impl LocalBehavior {
    /// Entity this behaviour engages, if any
    pub fn target(&self) -> Option<EntityHandle> {
        match self {
            Self::KillOnFoot { target, .. } | Self::DriveBy { target } | Self::FollowFootsteps { target } => {
                Some(*target)
            }
            _ => None,
        }
    }
}

/// Another connected player, as the local game sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePlayer {
    pub id: u16,
    pub position: Vec3,
    pub afk: bool,
    pub spectating: bool,
}

/// Melee reaction chosen for a body that is being attacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeleeCommand {
    Block,
    Attack,
}

/// Everything the controller needs from the running game
pub trait GameHost {
    // =========================================================================
    // Puppet bodies
    // =========================================================================

    fn is_character_model(&self, model: u32) -> bool;

    /// Create a body. `None` if the game refused.
    fn spawn_entity(&mut self, model: u32, position: Vec3) -> Option<EntityHandle>;

    fn destroy_entity(&mut self, entity: EntityHandle);

    fn is_entity_valid(&self, entity: EntityHandle) -> bool;

    fn apply_flags(&mut self, entity: EntityHandle, flags: PuppetFlags);

    fn position(&self, entity: EntityHandle) -> Vec3;

    fn set_position(&mut self, entity: EntityHandle, position: Vec3);

    /// Current move speed in world units per frame
    fn velocity(&self, entity: EntityHandle) -> Vec3;

    /// Heading in degrees
    fn heading(&self, entity: EntityHandle) -> f32;

    fn set_heading(&mut self, entity: EntityHandle, heading: f32);

    fn health(&self, entity: EntityHandle) -> f32;

    fn set_health(&mut self, entity: EntityHandle, health: f32);

    /// Replace the equipped weapon; 0 leaves the body unarmed
    fn set_weapon(&mut self, entity: EntityHandle, weapon_id: u8);

    fn set_weapon_handling(&mut self, entity: EntityHandle, accuracy: u8, rate: u8, skill: WeaponSkill);

    /// Behaviour the engine is currently running for the body
    fn active_behavior(&self, entity: EntityHandle) -> LocalBehavior;

    /// Abort whatever runs and start `behavior`
    fn set_behavior(&mut self, entity: EntityHandle, behavior: LocalBehavior);

    /// Vehicle id (server numbering) the body sits in
    fn vehicle_of(&self, entity: EntityHandle) -> Option<u16>;

    /// Warp into a seat (0 = driver). False if the seat is unavailable.
    fn warp_into_vehicle(&mut self, entity: EntityHandle, vehicle: u16, seat: u8) -> bool;

    fn warp_out_of_vehicle(&mut self, entity: EntityHandle, position: Vec3);

    /// Make sure an animation library is resident. False if it cannot be loaded.
    fn load_animation_library(&mut self, library: &str) -> bool;

    // =========================================================================
    // Local session
    // =========================================================================

    /// Whether the client is in game (not connecting or in a menu)
    fn is_playing(&self) -> bool;

    fn is_pause_menu_active(&self) -> bool;

    /// Whether the local player is spectating instead of playing
    fn is_spectating(&self) -> bool;

    fn local_player_id(&self) -> Option<u16>;

    fn local_player_entity(&self) -> Option<EntityHandle>;

    /// Entity of the vehicle the local player sits in
    fn local_vehicle_entity(&self) -> Option<EntityHandle>;

    fn player_entity(&self, player: u16) -> Option<EntityHandle>;

    fn player_health(&self, player: u16) -> f32;

    /// Every other streamed-in player
    fn remote_players(&self) -> Vec<RemotePlayer>;
}
