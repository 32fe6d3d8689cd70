//! Parcel status bitset
//!
//! The layout matches the flag word written by the trajectory model so the
//! launch-table flags can be carried through untouched. Bits are only ever
//! set: there is deliberately no `remove`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a parcel left the trajectory set or the valid data domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ExitCode {
    /// Pressure above the high cut (descended below the bottom of the run)
    Bottom = 1,
    /// Pressure below the low cut (ascended above the top of the run)
    Top = 2,
    /// Western edge of the domain box
    West = 3,
    /// Northern edge of the domain box
    North = 4,
    /// Eastern edge of the domain box
    East = 5,
    /// Southern edge of the domain box
    South = 6,
    /// None of the edge or pressure tests matched
    Unknown = 7,
    /// Hybrid level below the valid reanalysis data
    Ground = 8,
}

impl ExitCode {
    /// Decode a raw code field value
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Bottom),
            2 => Some(Self::Top),
            3 => Some(Self::West),
            4 => Some(Self::North),
            5 => Some(Self::East),
            6 => Some(Self::South),
            7 => Some(Self::Unknown),
            8 => Some(Self::Ground),
            _ => None,
        }
    }
}

/// Monotonic parcel status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ParcelFlags(u32);

impl ParcelFlags {
    /// Parcel is terminated; no handler mutates it afterwards
    pub const DEAD: Self = Self(0x0020_0000);
    /// First survival threshold crossed
    pub const HIT: Self = Self(0x0040_0000);
    /// Terminated by the age limit
    pub const OLD: Self = Self(0x0080_0000);
    /// Released but never observed in any snapshot
    pub const DEADBORNE: Self = Self(0x0100_0000);
    /// Left the trajectory set or the valid data domain
    pub const CROSSED: Self = Self(0x0200_0000);
    /// Parcels carrying any of these bits are skipped by the age sweep
    pub const STOP: Self = Self(Self::DEAD.0 | Self::HIT.0);

    const EXIT_SHIFT: u32 = 13;
    const EXIT_MASK: u32 = 0xF << Self::EXIT_SHIFT;

    /// Wrap a raw flag word (e.g. from the launch table)
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag word
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the bits of `other`
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Terminated parcels are frozen
    #[inline]
    pub const fn is_dead(self) -> bool {
        self.contains(Self::DEAD)
    }

    /// ALIVE is the absence of DEAD
    #[inline]
    pub const fn is_alive(self) -> bool {
        !self.is_dead()
    }

    /// OR an exit code into the code field
    #[inline]
    pub fn insert_exit(&mut self, code: ExitCode) {
        self.0 |= (code as u32) << Self::EXIT_SHIFT;
    }

    /// Exit code recorded in the code field, if any
    pub fn exit_code(self) -> Option<ExitCode> {
        ExitCode::from_raw((self.0 & Self::EXIT_MASK) >> Self::EXIT_SHIFT)
    }

    /// True when `self` is a bitwise subset of `later`
    #[inline]
    pub const fn is_subset_of(self, later: Self) -> bool {
        self.0 & !later.0 == 0
    }
}

impl std::ops::BitOr for ParcelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ParcelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
