//! Semantic packet parsing.
//!
//! After framing, every raw packet runs through a tag dispatch:
//!
//! | Packet type | Parser |
//! |-------------|--------|
//! | 3 (chat) | [`chat`] |
//! | 4 (MPI) | [`mpi`] — sub-dispatched by a 4-byte signature |
//! | 6 (ECS) | [`ecs`] |
//! | everything else | [`ParsedPayload::Unknown`], no error |
//!
//! Parsed payloads form a closed tagged union with one accessor per
//! variant; collaborators (inspectors, exporters) render through the
//! accessors rather than any runtime type introspection. Semantic
//! failures never abort the stream: they are demoted to the packet's
//! `parse_error` and decoding moves on.

pub mod chat;
pub mod ecs;
pub mod movement;
pub mod mpi;

pub use chat::ChatPacket;
pub use ecs::{EcsComponent, EcsFramePacket, EcsMessage, EcsRegistry, EcsTemplate};
pub use movement::MovementPacket;
pub use mpi::{AwardPacket, CompressedBlobPacket, KillPacket, SlotMessagePacket, SlotRecord};

use crate::players::PlayerTable;
use crate::stream::{PacketType, RawPacket};

/// The decoded payload of a recognized packet.
///
/// Unknown packet types and unknown MPI signatures map to
/// [`ParsedPayload::Unknown`]; the raw payload bytes always survive on
/// the owning [`RawPacket`], so nothing is lost for unrecognized
/// traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    /// An in-game chat message.
    Chat(ChatPacket),
    /// A batch of slot-addressed sub-messages.
    SlotMessage(SlotMessagePacket),
    /// A kill event.
    Kill(KillPacket),
    /// An award grant.
    Award(AwardPacket),
    /// An opaque zstd-compressed blob.
    CompressedBlob(CompressedBlobPacket),
    /// An entity/component construction frame.
    EcsFrame(EcsFramePacket),
    /// An entity movement update.
    Movement(MovementPacket),
    /// Recognized as a packet, but not a decoded family.
    Unknown,
}

impl ParsedPayload {
    /// Short name of the variant for listings and filters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedPayload::Chat(_) => "chat",
            ParsedPayload::SlotMessage(_) => "slot-message",
            ParsedPayload::Kill(_) => "kill",
            ParsedPayload::Award(_) => "award",
            ParsedPayload::CompressedBlob(_) => "compressed-blob",
            ParsedPayload::EcsFrame(_) => "ecs-frame",
            ParsedPayload::Movement(_) => "movement",
            ParsedPayload::Unknown => "unknown",
        }
    }

    /// Returns the chat payload, if this is one.
    #[must_use]
    pub fn as_chat(&self) -> Option<&ChatPacket> {
        match self {
            ParsedPayload::Chat(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the slot-message payload, if this is one.
    #[must_use]
    pub fn as_slot_message(&self) -> Option<&SlotMessagePacket> {
        match self {
            ParsedPayload::SlotMessage(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the kill payload, if this is one.
    #[must_use]
    pub fn as_kill(&self) -> Option<&KillPacket> {
        match self {
            ParsedPayload::Kill(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the award payload, if this is one.
    #[must_use]
    pub fn as_award(&self) -> Option<&AwardPacket> {
        match self {
            ParsedPayload::Award(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the compressed-blob payload, if this is one.
    #[must_use]
    pub fn as_compressed_blob(&self) -> Option<&CompressedBlobPacket> {
        match self {
            ParsedPayload::CompressedBlob(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the ECS frame payload, if this is one.
    #[must_use]
    pub fn as_ecs_frame(&self) -> Option<&EcsFramePacket> {
        match self {
            ParsedPayload::EcsFrame(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the movement payload, if this is one.
    #[must_use]
    pub fn as_movement(&self) -> Option<&MovementPacket> {
        match self {
            ParsedPayload::Movement(p) => Some(p),
            _ => None,
        }
    }

    /// Returns `true` for the unknown placeholder.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, ParsedPayload::Unknown)
    }
}

/// Runs the semantic pass over a framed packet sequence.
///
/// The registry and player table are mutated as a side effect of
/// specific packet families (ECS construction, slot messages); both
/// must live exactly as long as one replay.
pub(crate) fn parse_all(
    packets: &mut [RawPacket],
    registry: &mut EcsRegistry,
    players: &mut PlayerTable,
) {
    for packet in packets.iter_mut() {
        let result = match packet.packet_type {
            PacketType::Chat => chat::parse(&packet.payload),
            PacketType::Mpi => mpi::parse(packet.current_time, &packet.payload, players),
            PacketType::Ecs => ecs::parse_frame(registry, &packet.payload),
            _ => Ok(ParsedPayload::Unknown),
        };
        match result {
            Ok(parsed) => {
                packet.parsed = Some(parsed);
                packet.parse_error = None;
            }
            Err(err) => {
                packet.parsed = None;
                packet.parse_error = Some(err);
            }
        }
    }
}
