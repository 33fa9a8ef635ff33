//! Multiplayer-interaction packet decoding (packet type 4).
//!
//! MPI packets are sub-dispatched by their leading 4-byte signature:
//!
//! | Signature | Variant |
//! |-----------|---------|
//! | `00 00 58 22` | [`CompressedBlobPacket`] |
//! | `00 02 58 58` | [`KillPacket`] |
//! | `00 02 58 78` | [`AwardPacket`] |
//! | `00 02 58 2D`, `00 02 58 AA` | [`SlotMessagePacket`] |
//! | `FF 0F …` (structural guard) | [`super::MovementPacket`] |
//! | anything else | [`ParsedPayload::Unknown`] |
//!
//! Fixed byte runs inside the recognized layouts (`00 3E`,
//! `00 FE 3F`, …) are consumed and retained but never validated; real
//! traffic occasionally deviates and rejecting it would lose the rest
//! of the packet. Trailing bytes after each layout are preserved
//! verbatim.

use crate::binary::ByteCursor;
use crate::error::{ReplayError, Result};
use crate::players::PlayerTable;

use super::{movement, ParsedPayload};

/// Signature of the opaque zstd blob family.
pub const SIG_COMPRESSED_BLOB: [u8; 4] = [0x00, 0x00, 0x58, 0x22];

/// Signature of the kill event family.
pub const SIG_KILL: [u8; 4] = [0x00, 0x02, 0x58, 0x58];

/// Signature of the award family.
pub const SIG_AWARD: [u8; 4] = [0x00, 0x02, 0x58, 0x78];

/// Primary signature of the slot-message family.
pub const SIG_SLOT_MESSAGE: [u8; 4] = [0x00, 0x02, 0x58, 0x2D];

/// Alternate signature of the slot-message family (newer builds).
pub const SIG_SLOT_MESSAGE_ALT: [u8; 4] = [0x00, 0x02, 0x58, 0xAA];

/// An award grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardPacket {
    /// Award type discriminator.
    pub award_type: u8,
    /// Fixed run after the type, nominally `00 3E`.
    pub marker: [u8; 2],
    /// Slot of the awarded player.
    pub player: u8,
    /// Fixed run after the slot, nominally `00 00 00`.
    pub padding: [u8; 3],
    /// Award name.
    pub award_name: String,
    /// Trailing bytes, kept verbatim.
    pub rem: Vec<u8>,
}

/// A kill event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillPacket {
    /// Control byte; the high nibble encodes the damage type.
    pub control: u8,
    /// Fixed run after the control byte, nominally `00 FE 3F`.
    pub marker: [u8; 3],
    /// Slot of the killer.
    pub killer: u8,
    /// Fixed run after the slot, nominally `00 00 00`.
    pub padding: [u8; 3],
    /// Killer's vehicle identifier.
    pub killer_vehicle: String,
    /// Trailing bytes, kept verbatim.
    pub rem: Vec<u8>,
}

impl KillPacket {
    /// The damage type: the control byte's high nibble, kept in place.
    #[must_use]
    pub fn damage_type(&self) -> u8 {
        self.control & 0xF0
    }
}

/// An opaque zstd-compressed blob.
///
/// Only the container layer is decoded; the inflated bytes are
/// retained for collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlobPacket {
    /// Two opaque bytes after the signature.
    pub prelude: [u8; 2],
    /// Whether the `0x01` marker byte appeared twice.
    pub marker_doubled: bool,
    /// Four opaque bytes before the compressed stream.
    pub trailer: [u8; 4],
    /// The inflated blob.
    pub blob: Vec<u8>,
}

/// One slot-addressed record inside a slot-message batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRecord {
    /// The addressed player slot.
    pub slot: u8,
    /// The record body, kept verbatim.
    pub data: Vec<u8>,
}

/// A batch of slot-addressed sub-messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMessagePacket {
    /// Nonzero when the record section was zstd-compressed.
    pub data_compressed: u8,
    /// Control byte of the compressed form (0 in the inline form).
    pub control: u8,
    /// The decoded records.
    pub messages: Vec<SlotRecord>,
}

/// Dispatches an MPI payload by signature.
///
/// # Errors
///
/// Returns a truncation or decompression error when a recognized
/// layout cannot be satisfied; the caller demotes it to the packet's
/// `parse_error`.
pub fn parse(
    current_time: u32,
    payload: &[u8],
    players: &mut PlayerTable,
) -> Result<ParsedPayload> {
    let mut cur = ByteCursor::new(payload);
    let signature: [u8; 4] = cur.take_array().map_err(|_| {
        ReplayError::malformed(format!("mpi payload of {} bytes has no signature", payload.len()))
    })?;

    match signature {
        SIG_COMPRESSED_BLOB => parse_compressed_blob(&mut cur),
        SIG_KILL => parse_kill(&mut cur),
        SIG_AWARD => parse_award(&mut cur),
        SIG_SLOT_MESSAGE | SIG_SLOT_MESSAGE_ALT => parse_slot_message(&mut cur, players),
        _ if movement::matches(payload) => movement::parse(current_time, payload),
        _ => Ok(ParsedPayload::Unknown),
    }
}

fn parse_award(cur: &mut ByteCursor<'_>) -> Result<ParsedPayload> {
    let award_type = cur.read_u8()?;
    let marker = cur.take_array()?;
    let player = cur.read_u8()?;
    let padding = cur.take_array()?;
    let award_name = cur.read_len_str()?;
    let rem = cur.rest().to_vec();
    Ok(ParsedPayload::Award(AwardPacket {
        award_type,
        marker,
        player,
        padding,
        award_name,
        rem,
    }))
}

fn parse_kill(cur: &mut ByteCursor<'_>) -> Result<ParsedPayload> {
    let control = cur.read_u8()?;
    let marker = cur.take_array()?;
    let killer = cur.read_u8()?;
    let padding = cur.take_array()?;
    let killer_vehicle = cur.read_len_str()?;
    let rem = cur.rest().to_vec();
    Ok(ParsedPayload::Kill(KillPacket {
        control,
        marker,
        killer,
        padding,
        killer_vehicle,
        rem,
    }))
}

fn parse_compressed_blob(cur: &mut ByteCursor<'_>) -> Result<ParsedPayload> {
    let prelude = cur.take_array()?;
    cur.read_u8()?; // the 0x01 marker
    // an optional second 0x01; presence detected by peeking
    let marker_doubled = cur.peek_u8() == Some(0x01);
    if marker_doubled {
        cur.read_u8()?;
    }
    let trailer = cur.take_array()?;
    let blob = zstd::decode_all(cur.rest())
        .map_err(|e| ReplayError::decompression(format!("mpi blob zstd: {e}")))?;
    Ok(ParsedPayload::CompressedBlob(CompressedBlobPacket {
        prelude,
        marker_doubled,
        trailer,
        blob,
    }))
}

fn parse_slot_message(
    cur: &mut ByteCursor<'_>,
    players: &mut PlayerTable,
) -> Result<ParsedPayload> {
    let data_compressed = cur.read_u8()?;
    let mut control = 0u8;

    let inflated;
    let records: &[u8] = if data_compressed > 0 {
        cur.read_u8()?;
        control = cur.read_u8()?;
        cur.skip(2)?;
        if control & 0xF0 > 0 {
            cur.read_u8()?;
        }
        inflated = zstd::decode_all(cur.rest())
            .map_err(|e| ReplayError::decompression(format!("slot message zstd: {e}")))?;
        &inflated
    } else {
        cur.rest()
    };

    let mut rec = ByteCursor::new(records);
    let message_count = rec.read_u16_le()?;
    let mut messages = Vec::with_capacity(usize::from(message_count));
    for _ in 0..message_count {
        let len = rec.read_u16_le()?;
        if len == 0 {
            return Err(ReplayError::malformed("zero-length slot record"));
        }
        let slot = rec.read_u8()?;
        let data = rec.take(usize::from(len) - 1)?.to_vec();
        crate::players::apply_slot_message(players, slot, &data);
        messages.push(SlotRecord { slot, data });
    }

    Ok(ParsedPayload::SlotMessage(SlotMessagePacket {
        data_compressed,
        control,
        messages,
    }))
}
