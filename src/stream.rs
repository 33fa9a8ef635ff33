//! Framed packet-stream codec.
//!
//! The packet section of a replay (after zlib inflation) is a sequence
//! of framed packets:
//!
//! 1. a variable-length size prefix ([`crate::varint`]); a size of 0 is
//!    skipped silently
//! 2. `size` bytes of packet body
//! 3. the body's first byte is the tag: if bit `0x10` is set the packet
//!    reuses the previous packet's timestamp and the payload starts at
//!    byte 1; otherwise the tag is the packet type, bytes 1-4 are a
//!    little-endian u32 timestamp and the payload starts at byte 5
//! 4. packet type 0 terminates the stream
//!
//! Timestamps are cumulative: the wire omits them whenever they are
//! unchanged, so `current_time` is non-decreasing across a well-formed
//! stream. The writer mirrors the reader exactly and round-trips its
//! own output byte-for-byte.

use crate::error::{ReplayError, Result};
use crate::packets::ParsedPayload;
use crate::varint;

/// Tag bit marking a packet that reuses the previous timestamp.
pub const TIME_REUSE_FLAG: u8 = 0x10;

/// The single-byte packet type tag.
///
/// Values 0 through 8 are known; everything else decodes to
/// [`PacketType::Unknown`] and is preserved losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Stream terminator.
    EndMarker,
    /// Stream start marker.
    StartMarker,
    /// Small aircraft state update.
    AircraftSmall,
    /// Chat message.
    Chat,
    /// Multiplayer-interaction packet, sub-dispatched by signature.
    Mpi,
    /// Next-segment marker.
    NextSegment,
    /// Entity/component wire message.
    Ecs,
    /// World snapshot.
    Snapshot,
    /// Replay header info.
    ReplayHeaderInfo,
    /// Any tag outside the known range.
    Unknown(u8),
}

impl PacketType {
    /// Maps a raw tag byte to its packet type.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PacketType::EndMarker,
            1 => PacketType::StartMarker,
            2 => PacketType::AircraftSmall,
            3 => PacketType::Chat,
            4 => PacketType::Mpi,
            5 => PacketType::NextSegment,
            6 => PacketType::Ecs,
            7 => PacketType::Snapshot,
            8 => PacketType::ReplayHeaderInfo,
            other => PacketType::Unknown(other),
        }
    }

    /// Returns the raw tag byte; the exact inverse of
    /// [`PacketType::from_u8`].
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::EndMarker => 0,
            PacketType::StartMarker => 1,
            PacketType::AircraftSmall => 2,
            PacketType::Chat => 3,
            PacketType::Mpi => 4,
            PacketType::NextSegment => 5,
            PacketType::Ecs => 6,
            PacketType::Snapshot => 7,
            PacketType::ReplayHeaderInfo => 8,
            PacketType::Unknown(v) => v,
        }
    }

    /// Short display name for listings.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PacketType::EndMarker => "end",
            PacketType::StartMarker => "start",
            PacketType::AircraftSmall => "aircraft-small",
            PacketType::Chat => "chat",
            PacketType::Mpi => "mpi",
            PacketType::NextSegment => "next-segment",
            PacketType::Ecs => "ecs",
            PacketType::Snapshot => "snapshot",
            PacketType::ReplayHeaderInfo => "replay-header-info",
            PacketType::Unknown(_) => "unknown",
        }
    }
}

/// One framed packet from the stream.
///
/// The payload is kept verbatim regardless of whether semantic parsing
/// succeeded; `parsed` and `parse_error` are filled by the semantic
/// pass after framing.
#[derive(Debug)]
pub struct RawPacket {
    /// Cumulative timestamp in source units.
    pub current_time: u32,
    /// The packet type tag.
    pub packet_type: PacketType,
    /// The raw payload (everything after tag and optional timestamp).
    pub payload: Vec<u8>,
    /// The decoded payload, when the semantic parser recognized it.
    pub parsed: Option<ParsedPayload>,
    /// The semantic parse failure, if any; never fatal to the stream.
    pub parse_error: Option<ReplayError>,
}

impl RawPacket {
    /// Creates an unparsed packet.
    #[must_use]
    pub fn new(current_time: u32, packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self {
            current_time,
            packet_type,
            payload,
            parsed: None,
            parse_error: None,
        }
    }
}

/// Reads a full packet stream from an inflated packet region.
///
/// Returns all packets before the terminator. A clean end of input at
/// a size-prefix boundary also ends the stream (multi-part replays
/// split mid-session without a terminator).
///
/// # Errors
///
/// - [`ReplayError::BadSizePrefix`] for a reserved prefix pattern
/// - [`ReplayError::Truncated`] when a declared packet body (or the
///   explicit timestamp inside it) is cut short
pub fn read_packet_stream(data: &[u8]) -> Result<Vec<RawPacket>> {
    let mut packets = Vec::new();
    let mut pos = 0usize;
    let mut current_time = 0u32;

    while pos < data.len() {
        let (size, consumed) = varint::read_size(&data[pos..]).map_err(|e| match e {
            // re-anchor truncation to absolute stream offsets
            ReplayError::Truncated { expected, available } => {
                ReplayError::truncated(pos + expected, pos + available)
            }
            other => other,
        })?;
        pos += consumed;
        let size = size as usize;
        if size == 0 {
            continue;
        }
        if pos + size > data.len() {
            return Err(ReplayError::truncated(pos + size, data.len()));
        }
        let body = &data[pos..pos + size];
        pos += size;

        let first = body[0];
        let (raw_type, payload) = if first & TIME_REUSE_FLAG != 0 {
            (first ^ TIME_REUSE_FLAG, &body[1..])
        } else {
            if body.len() < 5 {
                return Err(ReplayError::truncated(pos - size + 5, pos));
            }
            current_time = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
            (first, &body[5..])
        };
        if raw_type == 0 {
            break;
        }
        packets.push(RawPacket::new(
            current_time,
            PacketType::from_u8(raw_type),
            payload.to_vec(),
        ));
    }
    Ok(packets)
}

/// Serializes packets back into stream bytes, terminator included.
///
/// The timestamp-reuse flag is set exactly when a packet's timestamp
/// equals the previously written one; the first packet always carries
/// an explicit timestamp. Feeding the output back through
/// [`read_packet_stream`] and writing again yields identical bytes.
#[must_use]
pub fn write_packet_stream(packets: &[RawPacket]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev_time: Option<u32> = None;

    for packet in packets {
        let tag = packet.packet_type.as_u8();
        if prev_time == Some(packet.current_time) {
            varint::write_size(&mut out, (1 + packet.payload.len()) as u32);
            out.push(tag | TIME_REUSE_FLAG);
        } else {
            varint::write_size(&mut out, (5 + packet.payload.len()) as u32);
            out.push(tag);
            out.extend_from_slice(&packet.current_time.to_le_bytes());
            prev_time = Some(packet.current_time);
        }
        out.extend_from_slice(&packet.payload);
    }

    // terminator: shortest valid type-0 packet
    varint::write_size(&mut out, 1);
    out.push(TIME_REUSE_FLAG);
    out
}
