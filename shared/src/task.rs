//! Wire form of an NPC task.
//!
//! A task travels as a one byte tag followed by a tag specific payload. The
//! tag values are fixed by the protocol; anything unknown (or a payload that
//! does not decode) is read back as [`NpcTask::StandStill`].

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Task tags on the wire
pub mod tags {
    pub const STAND_STILL: u8 = 0;
    pub const ATTACK_PLAYER: u8 = 1;
    pub const GO_TO_POINT: u8 = 2;
    pub const FOLLOW_PLAYER: u8 = 3;
    pub const PLAY_ANIMATION: u8 = 4;
    pub const ATTACK_NPC: u8 = 5;
}

/// Longest accepted animation library name
pub const MAX_ANIMATION_LIBRARY_LEN: usize = 15;

/// Longest accepted animation name
pub const MAX_ANIMATION_NAME_LEN: usize = 24;

/// Locomotion gait for go-to-point tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum MoveMode {
    Walk = 0,
    #[default]
    Run = 1,
    Sprint = 2,
}

impl MoveMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Walk),
            1 => Some(Self::Run),
            2 => Some(Self::Sprint),
            _ => None,
        }
    }
    
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Named animation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationData {
    pub library: String,
    pub name: String,
    pub delta: f32,
    pub looping: bool,
    pub lock_x: bool,
    pub lock_y: bool,
    pub freeze: bool,
    /// Play time in milliseconds, 0 = until finished
    pub time_ms: u32,
}

impl AnimationData {
    pub fn new(library: &str, name: &str) -> Self {
        Self {
            library: library.to_string(),
            name: name.to_string(),
            delta: 4.1,
            looping: false,
            lock_x: false,
            lock_y: false,
            freeze: false,
            time_ms: 0,
        }
    }
    
    /// Both names present and within the engine's length limits
    pub fn is_well_formed(&self) -> bool {
        !self.library.is_empty()
            && !self.name.is_empty()
            && self.library.len() <= MAX_ANIMATION_LIBRARY_LEN
            && self.name.len() <= MAX_ANIMATION_NAME_LEN
    }
}

/// Animation libraries every client ships with
const STANDARD_ANIMATION_LIBRARIES: &[&str] = &[
    "AIRPORT", "ATTRACTORS", "BAR", "BASEBALL", "BD_FIRE", "BEACH", "BENCHPRESS", "BF_INJECTION",
    "BIKED", "BIKEH", "BIKELEAP", "BIKES", "BIKEV", "BIKE_DBZ", "BMX", "BOMBER", "BOX", "BSKTBALL",
    "BUDDY", "BUS", "CAMERA", "CAR", "CARRY", "CAR_CHAT", "CASINO", "CHAINSAW", "CHOPPA", "CLOTHES",
    "COACH", "COLT45", "COP_AMBIENT", "COP_DVBYZ", "CRACK", "CRIB", "DAM_JUMP", "DANCING", "DEALER",
    "DILDO", "DODGE", "DOZER", "DRIVEBYS", "FAT", "FIGHT_B", "FIGHT_C", "FIGHT_D", "FIGHT_E",
    "FINALE", "FINALE2", "FLAME", "FLOWERS", "FOOD", "FREEWEIGHTS", "GANGS", "GHANDS", "GHETTO_DB",
    "GOGGLES", "GRAFFITI", "GRAVEYARD", "GRENADE", "GYMNASIUM", "HAIRCUTS", "HEIST9", "INT_HOUSE",
    "INT_OFFICE", "INT_SHOP", "JST_BUISNESS", "KART", "KISSING", "KNIFE", "LAPDAN1", "LAPDAN2",
    "LAPDAN3", "LOWRIDER", "MD_CHASE", "MD_END", "MEDIC", "MISC", "MTB", "MUSCULAR", "NEVADA",
    "ON_LOOKERS", "OTB", "PARACHUTE", "PARK", "PAULNMAC", "PED", "PLAYER_DVBYS", "PLAYIDLES",
    "POLICE", "POOL", "POOR", "PYTHON", "QUAD", "QUAD_DBZ", "RAPPING", "RIFLE", "RIOT", "ROB_BANK",
    "ROCKET", "RUSTLER", "RYDER", "SCRATCHING", "SHAMAL", "SHOP", "SHOTGUN", "SILENCED", "SKATE",
    "SMOKING", "SNIPER", "SPRAYCAN", "STRIP", "SUNBATHE", "SWAT", "SWEET", "SWIM", "SWORD", "TANK",
    "TATTOOS", "TEC", "TRAIN", "TRUCK", "UZI", "VAN", "VENDING", "VORTEX", "WAYFARER", "WEAPONS",
    "WUZI",
];

/// Libraries only accepted when every animation library is allowed
const EXTENDED_ANIMATION_LIBRARIES: &[&str] = &[
    "BLOWJOBZ", "SEX", "SNM", "WOP", "GFUNK", "RUNNINGMAN", "SAMP", "CUSTOM",
];

/// Whether a library name is in the allowed set (case-insensitive)
pub fn is_animation_library_valid(library: &str, use_all_libraries: bool) -> bool {
    let matches = |set: &[&str]| set.iter().any(|l| l.eq_ignore_ascii_case(library));
    matches(STANDARD_ANIMATION_LIBRARIES) || (use_all_libraries && matches(EXTENDED_ANIMATION_LIBRARIES))
}

/// Current behaviour of an NPC as seen on the wire.
///
/// Targets are raw pool ids; the server resolves them through its registry
/// before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "RawTask", into = "RawTask")]
pub enum NpcTask {
    #[default]
    StandStill,
    AttackPlayer {
        target: u16,
        aggressive: bool,
    },
    GoToPoint {
        destination: Vec3,
        mode: MoveMode,
    },
    FollowPlayer {
        target: u16,
    },
    PlayAnimation {
        data: AnimationData,
    },
    AttackNpc {
        target: u16,
        aggressive: bool,
    },
}

impl NpcTask {
    /// Wire tag for this task
    pub fn tag(&self) -> u8 {
        match self {
            Self::StandStill => tags::STAND_STILL,
            Self::AttackPlayer { .. } => tags::ATTACK_PLAYER,
            Self::GoToPoint { .. } => tags::GO_TO_POINT,
            Self::FollowPlayer { .. } => tags::FOLLOW_PLAYER,
            Self::PlayAnimation { .. } => tags::PLAY_ANIMATION,
            Self::AttackNpc { .. } => tags::ATTACK_NPC,
        }
    }
}

/// Tag plus opaque payload, the actual on-wire shape of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTask {
    tag: u8,
    payload: Vec<u8>,
}

impl From<NpcTask> for RawTask {
    fn from(task: NpcTask) -> Self {
        let tag = task.tag();
        let payload = match &task {
            NpcTask::StandStill => Ok(Vec::new()),
            NpcTask::AttackPlayer { target, aggressive } | NpcTask::AttackNpc { target, aggressive } => {
                bincode::serialize(&(*target, *aggressive))
            }
            NpcTask::GoToPoint { destination, mode } => bincode::serialize(&(*destination, mode.as_u8())),
            NpcTask::FollowPlayer { target } => bincode::serialize(target),
            NpcTask::PlayAnimation { data } => bincode::serialize(data),
        };
        
        // An empty payload decodes back to StandStill for every non-trivial tag
        Self { tag, payload: payload.unwrap_or_default() }
    }
}

impl From<RawTask> for NpcTask {
    fn from(raw: RawTask) -> Self {
        let bytes = raw.payload.as_slice();
        let decoded = match raw.tag {
            tags::ATTACK_PLAYER => bincode::deserialize::<(u16, bool)>(bytes)
                .ok()
                .map(|(target, aggressive)| NpcTask::AttackPlayer { target, aggressive }),
            tags::ATTACK_NPC => bincode::deserialize::<(u16, bool)>(bytes)
                .ok()
                .map(|(target, aggressive)| NpcTask::AttackNpc { target, aggressive }),
            tags::GO_TO_POINT => bincode::deserialize::<(Vec3, u8)>(bytes)
                .ok()
                .and_then(|(destination, mode)| {
                    MoveMode::from_u8(mode).map(|mode| NpcTask::GoToPoint { destination, mode })
                }),
            tags::FOLLOW_PLAYER => bincode::deserialize::<u16>(bytes)
                .ok()
                .map(|target| NpcTask::FollowPlayer { target }),
            tags::PLAY_ANIMATION => bincode::deserialize::<AnimationData>(bytes)
                .ok()
                .map(|data| NpcTask::PlayAnimation { data }),
            _ => None,
        };
        decoded.unwrap_or(NpcTask::StandStill)
    }
}
