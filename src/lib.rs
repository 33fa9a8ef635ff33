//! # wrpl-parser
//!
//! A War Thunder replay (.wrpl) parser library.
//!
//! A replay file captures one multiplayer match: a fixed-layout
//! header, a binary settings tree, a zlib-compressed stream of
//! time-stamped network packets, and a trailing results tree. Long
//! sessions exist as an ordered set of fragment files that this
//! library stitches into one logical replay.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wrpl_parser::{read_replay, DecodeSections};
//!
//! fn inspect(data: &[u8]) -> wrpl_parser::error::Result<()> {
//!     let replay = read_replay(data, DecodeSections::all())?;
//!
//!     println!("identity: {}", replay.identity());
//!     println!("level:    {}", replay.header.level());
//!     println!("packets:  {}", replay.packets.len());
//!
//!     for chat in replay.chat_messages() {
//!         println!("[{}] {}", chat.sender, chat.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`error`] - Error types and result alias
//! - [`binary`] - Byte-level cursor and string helpers
//! - [`bits`] - MSB-first bit reader for the entity protocol
//! - [`varint`] - The packet stream's 1-5 byte size prefix codec
//! - [`header`] - The fixed 1226-byte container header
//! - [`blk`] - Tagged tree-blob ("BLK") decoding for settings/results
//! - [`stream`] - Framed packet-stream reader and writer
//! - [`container`] - Whole-file decode and lossless rewrite
//! - [`parted`] - Multi-part fragment stitching
//! - [`packets`] - Semantic packet parsing (chat, MPI, ECS, movement)
//! - [`players`] - Slot-indexed player roster
//! - [`replay`] - The decoded aggregate
//!
//! ## Format Notes
//!
//! All multi-byte integers are little-endian; the entity protocol
//! ([`bits`], [`packets::ecs`]) is MSB-first bit-packed. Decoding is
//! single-threaded per replay and the resulting [`Replay`] is
//! logically immutable, so different replays can be decoded on
//! different threads and read concurrently.
//!
//! Semantic packet parsing is deliberately tolerant: unknown packet
//! types and unknown MPI signatures decode to an `Unknown` payload
//! with the raw bytes retained, and malformed payloads attach an
//! error to the single affected packet without stopping the stream.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binary;
pub mod bits;
pub mod blk;
pub mod container;
pub mod error;
pub mod header;
pub mod packets;
pub mod parted;
pub mod players;
pub mod replay;
pub mod stream;
pub mod varint;

// Re-export commonly used types at the crate root
pub use blk::{parse_blk, BlkBlock, BlkValue};
pub use container::{read_replay, write_replay, DecodeSections};
pub use error::{ReplayError, Result};
pub use header::{ReplayHeader, HEADER_SIZE, REPLAY_MAGIC};
pub use packets::{
    AwardPacket, ChatPacket, CompressedBlobPacket, EcsFramePacket, EcsRegistry, KillPacket,
    MovementPacket, ParsedPayload, SlotMessagePacket,
};
pub use parted::read_parted_replay;
pub use players::{Player, PlayerTable};
pub use replay::Replay;
pub use stream::{read_packet_stream, write_packet_stream, PacketType, RawPacket};
