//! Fixed-layout container header parsing.
//!
//! Every replay file starts with a 1226-byte little-endian header
//! record. A handful of fields carry session metadata (ids, limits,
//! blob sizes and offsets); the rest are fixed-width null-padded
//! strings and opaque runs that are preserved verbatim so the record
//! can be reserialized byte-identically.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x000 | 4 | `magic` (`E5 AC 00 10`) |
//! | 0x004 | 4 | `version` (i32) |
//! | 0x008 | 128 | `level` |
//! | 0x088 | 260 | `level_settings` |
//! | 0x18C | 128 | `battle_type` |
//! | 0x20C | 128 | `environment` |
//! | 0x28C | 32 | `visibility` |
//! | 0x2AC | 4 | `results_blk_offset` (i32, 0 = absent) |
//! | 0x2B0 | 1 | `difficulty` |
//! | 0x2B1 | 35 | opaque |
//! | 0x2D4 | 4 | `session_type` (u32) |
//! | 0x2D8 | 4 | opaque |
//! | 0x2DC | 8 | `session_id` (u64) |
//! | 0x2E4 | 1 | `replay_part_number` |
//! | 0x2E5 | 3 | opaque |
//! | 0x2E8 | 4 | `mset_size` (u32) |
//! | 0x2EC | 2 | `settings_blk_size` (u16, 0 = absent) |
//! | 0x2EE | 30 | opaque |
//! | 0x30C | 128 | `loc_name` |
//! | 0x38C | 4 | `start_time` (u32, epoch seconds) |
//! | 0x390 | 4 | `time_limit` (u32) |
//! | 0x394 | 4 | `score_limit` (u32) |
//! | 0x398 | 48 | opaque |
//! | 0x3C8 | 128 | `battle_class` |
//! | 0x448 | 128 | `battle_kill_streak` |
//! | 0x4C8 | 2 | opaque |
//!
//! The SHA-256 digest over the serialized record is the stable replay
//! identity used to deduplicate replays across decodes.

use sha2::{Digest, Sha256};

use crate::binary::{fixed_str, to_hex, ByteCursor};
use crate::error::{ReplayError, Result};

/// The size of a replay header record in bytes.
pub const HEADER_SIZE: usize = 1226;

/// The magic bytes at the start of every replay file.
pub const REPLAY_MAGIC: [u8; 4] = [0xE5, 0xAC, 0x00, 0x10];

/// Byte offset of the `results_blk_offset` field inside the record.
///
/// The writer patches this field in place after the packet stream has
/// been serialized.
pub const RESULTS_OFFSET_FIELD: usize = 0x2AC;

/// Parsed replay container header.
///
/// Fixed-width string fields are kept as raw byte arrays; use the
/// accessor methods ([`ReplayHeader::level`] and friends) for the
/// null-stripped string views. Opaque runs are retained untouched so
/// [`ReplayHeader::to_bytes`] reproduces the input record exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayHeader {
    /// Magic bytes, always `E5 AC 00 10`.
    pub magic: [u8; 4],
    /// Container format version.
    pub version: i32,
    /// Level (map) path, null-padded.
    pub level: [u8; 128],
    /// Level settings blob path, null-padded.
    pub level_settings: [u8; 260],
    /// Battle type identifier, null-padded.
    pub battle_type: [u8; 128],
    /// Environment (time of day) identifier, null-padded.
    pub environment: [u8; 128],
    /// Visibility setting, null-padded.
    pub visibility: [u8; 32],
    /// Absolute byte offset of the results blob; 0 when absent.
    pub results_blk_offset: i32,
    /// Difficulty byte.
    pub difficulty: u8,
    /// Opaque run at 0x2B1.
    pub unknown0: [u8; 35],
    /// Session type discriminator.
    pub session_type: u32,
    /// Opaque run at 0x2D8.
    pub unknown1: [u8; 4],
    /// Session identifier shared by all fragments of one match.
    pub session_id: u64,
    /// Fragment index; even parts are client-side, odd are server-side.
    pub replay_part_number: u8,
    /// Opaque run at 0x2E5.
    pub unknown2: [u8; 3],
    /// Mission-set size field.
    pub mset_size: u32,
    /// Size of the settings blob directly after the header; 0 when absent.
    pub settings_blk_size: u16,
    /// Opaque run at 0x2EE.
    pub unknown3: [u8; 30],
    /// Localized mission name key, null-padded.
    pub loc_name: [u8; 128],
    /// Match start time in epoch seconds.
    pub start_time: u32,
    /// Match time limit.
    pub time_limit: u32,
    /// Match score limit.
    pub score_limit: u32,
    /// Opaque run at 0x398.
    pub unknown4: [u8; 48],
    /// Battle class identifier, null-padded.
    pub battle_class: [u8; 128],
    /// Battle kill-streak identifier, null-padded.
    pub battle_kill_streak: [u8; 128],
    /// Opaque trailing run at 0x4C8.
    pub unknown5: [u8; 2],
}

impl ReplayHeader {
    /// Parses a header record from the start of `data`.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::Truncated`] if `data` is shorter than
    ///   [`HEADER_SIZE`]
    /// - [`ReplayError::BadMagic`] if the magic bytes do not match
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ReplayError::truncated(HEADER_SIZE, data.len()));
        }
        if data[..4] != REPLAY_MAGIC {
            return Err(ReplayError::bad_magic(&REPLAY_MAGIC, &data[..4]));
        }

        let mut cur = ByteCursor::new(&data[..HEADER_SIZE]);
        let header = ReplayHeader {
            magic: cur.take_array()?,
            version: cur.read_i32_le()?,
            level: cur.take_array()?,
            level_settings: cur.take_array()?,
            battle_type: cur.take_array()?,
            environment: cur.take_array()?,
            visibility: cur.take_array()?,
            results_blk_offset: cur.read_i32_le()?,
            difficulty: cur.read_u8()?,
            unknown0: cur.take_array()?,
            session_type: cur.read_u32_le()?,
            unknown1: cur.take_array()?,
            session_id: cur.read_u64_le()?,
            replay_part_number: cur.read_u8()?,
            unknown2: cur.take_array()?,
            mset_size: cur.read_u32_le()?,
            settings_blk_size: cur.read_u16_le()?,
            unknown3: cur.take_array()?,
            loc_name: cur.take_array()?,
            start_time: cur.read_u32_le()?,
            time_limit: cur.read_u32_le()?,
            score_limit: cur.read_u32_le()?,
            unknown4: cur.take_array()?,
            battle_class: cur.take_array()?,
            battle_kill_streak: cur.take_array()?,
            unknown5: cur.take_array()?,
        };
        debug_assert!(cur.is_empty());
        Ok(header)
    }

    /// Serializes the header back into its 1226-byte record.
    ///
    /// Parsing and reserializing an untouched header reproduces the
    /// input bytes exactly.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&self.magic);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.level);
        out.extend_from_slice(&self.level_settings);
        out.extend_from_slice(&self.battle_type);
        out.extend_from_slice(&self.environment);
        out.extend_from_slice(&self.visibility);
        out.extend_from_slice(&self.results_blk_offset.to_le_bytes());
        out.push(self.difficulty);
        out.extend_from_slice(&self.unknown0);
        out.extend_from_slice(&self.session_type.to_le_bytes());
        out.extend_from_slice(&self.unknown1);
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.push(self.replay_part_number);
        out.extend_from_slice(&self.unknown2);
        out.extend_from_slice(&self.mset_size.to_le_bytes());
        out.extend_from_slice(&self.settings_blk_size.to_le_bytes());
        out.extend_from_slice(&self.unknown3);
        out.extend_from_slice(&self.loc_name);
        out.extend_from_slice(&self.start_time.to_le_bytes());
        out.extend_from_slice(&self.time_limit.to_le_bytes());
        out.extend_from_slice(&self.score_limit.to_le_bytes());
        out.extend_from_slice(&self.unknown4);
        out.extend_from_slice(&self.battle_class);
        out.extend_from_slice(&self.battle_kill_streak);
        out.extend_from_slice(&self.unknown5);
        debug_assert_eq!(out.len(), HEADER_SIZE);
        out
    }

    /// Returns the SHA-256 hex digest of the serialized header record.
    ///
    /// This is the stable identity of a replay: two decodes of the same
    /// file always produce the same digest.
    #[must_use]
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.to_bytes());
        to_hex(digest.as_slice())
    }

    /// Returns `true` for server-side fragments.
    ///
    /// Part 0 is the initial server fragment; subsequent server parts
    /// carry odd numbers, client parts even ones.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.replay_part_number == 0 || self.replay_part_number % 2 == 1
    }

    /// Level (map) path with null padding stripped.
    #[must_use]
    pub fn level(&self) -> String {
        fixed_str(&self.level)
    }

    /// Level settings blob path with null padding stripped.
    #[must_use]
    pub fn level_settings(&self) -> String {
        fixed_str(&self.level_settings)
    }

    /// Battle type with null padding stripped.
    #[must_use]
    pub fn battle_type(&self) -> String {
        fixed_str(&self.battle_type)
    }

    /// Environment with null padding stripped.
    #[must_use]
    pub fn environment(&self) -> String {
        fixed_str(&self.environment)
    }

    /// Visibility with null padding stripped.
    #[must_use]
    pub fn visibility(&self) -> String {
        fixed_str(&self.visibility)
    }

    /// Localized mission name key with null padding stripped.
    #[must_use]
    pub fn loc_name(&self) -> String {
        fixed_str(&self.loc_name)
    }

    /// Battle class with null padding stripped.
    #[must_use]
    pub fn battle_class(&self) -> String {
        fixed_str(&self.battle_class)
    }

    /// Battle kill-streak with null padding stripped.
    #[must_use]
    pub fn battle_kill_streak(&self) -> String {
        fixed_str(&self.battle_kill_streak)
    }
}
