//! Weapon, skill and body part tables shared by both sides.

use serde::{Deserialize, Serialize};

/// Unarmed
pub const WEAPON_FIST: u8 = 0;
/// Satchel charge, never handed to an NPC
pub const WEAPON_SATCHEL: u8 = 39;
/// Detonator, never handed to an NPC
pub const WEAPON_BOMB: u8 = 40;
/// Damage reason: run over by a vehicle
pub const WEAPON_VEHICLE: u8 = 49;
/// Damage reason: helicopter blades
pub const WEAPON_HELI_BLADES: u8 = 50;
/// Damage reason: explosion
pub const WEAPON_EXPLOSION: u8 = 51;
/// Damage reason: drowning
pub const WEAPON_DROWN: u8 = 53;
/// Damage reason: fall / collision
pub const WEAPON_COLLISION: u8 = 54;

/// Inventory slot a weapon occupies, `None` for ids that are not real weapons
pub fn weapon_slot(weapon_id: u8) -> Option<u8> {
    match weapon_id {
        0 | 1 => Some(0),
        2..=9 => Some(1),
        10..=15 => Some(10),
        16..=18 | 39 => Some(8),
        22..=24 => Some(2),
        25..=27 => Some(3),
        28 | 29 | 32 => Some(4),
        30 | 31 => Some(5),
        33 | 34 => Some(6),
        35..=38 => Some(7),
        40 => Some(12),
        41..=43 => Some(9),
        44..=46 => Some(11),
        _ => None,
    }
}

/// Whether an NPC may be armed with this weapon
pub fn is_weapon_equippable(weapon_id: u8) -> bool {
    weapon_slot(weapon_id).is_some() && weapon_id != WEAPON_SATCHEL && weapon_id != WEAPON_BOMB
}

/// Allow-list of damage reasons accepted in a take-damage report
pub fn is_weapon_valid_for_taken_damage(weapon_id: u8) -> bool {
    weapon_slot(weapon_id).is_some()
        || matches!(
            weapon_id,
            WEAPON_VEHICLE | WEAPON_HELI_BLADES | WEAPON_EXPLOSION | WEAPON_DROWN | WEAPON_COLLISION
        )
}

/// NPC weapon skill level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum WeaponSkill {
    Poor = 0,
    #[default]
    Std = 1,
    Pro = 2,
}

impl WeaponSkill {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Poor),
            1 => Some(Self::Std),
            2 => Some(Self::Pro),
            _ => None,
        }
    }
    
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Body part hit by a damage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BodyPart {
    Torso = 3,
    Groin = 4,
    LeftArm = 5,
    RightArm = 6,
    LeftLeg = 7,
    RightLeg = 8,
    Head = 9,
}

impl BodyPart {
    /// Decode a raw body part, only torso..=head is valid
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            3 => Some(Self::Torso),
            4 => Some(Self::Groin),
            5 => Some(Self::LeftArm),
            6 => Some(Self::RightArm),
            7 => Some(Self::LeftLeg),
            8 => Some(Self::RightLeg),
            9 => Some(Self::Head),
            _ => None,
        }
    }
    
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explosives_are_not_equippable() {
        assert!(is_weapon_equippable(24));
        assert!(is_weapon_equippable(WEAPON_FIST));
        assert!(!is_weapon_equippable(WEAPON_SATCHEL));
        assert!(!is_weapon_equippable(WEAPON_BOMB));
        // 19..=21 have no inventory slot
        assert!(!is_weapon_equippable(20));
    }

    #[test]
    fn test_damage_reasons() {
        assert!(is_weapon_valid_for_taken_damage(WEAPON_EXPLOSION));
        assert!(is_weapon_valid_for_taken_damage(31));
        assert!(!is_weapon_valid_for_taken_damage(21));
        assert!(!is_weapon_valid_for_taken_damage(52));
        assert!(!is_weapon_valid_for_taken_damage(200));
    }

    #[test]
    fn test_body_part_range() {
        assert_eq!(BodyPart::from_u8(2), None);
        assert_eq!(BodyPart::from_u8(3), Some(BodyPart::Torso));
        assert_eq!(BodyPart::from_u8(9), Some(BodyPart::Head));
        assert_eq!(BodyPart::from_u8(10), None);
    }
}
