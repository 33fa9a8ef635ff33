//! The decoded replay aggregate.
//!
//! A [`Replay`] owns everything produced by a decode: the header, the
//! parsed settings/results trees alongside their raw bytes (retained
//! for lossless rewrite), the ordered packet sequence, the ECS
//! registry, and the player roster. After construction it is logically
//! immutable and safe to read from multiple threads.

use crate::error::ReplayError;
use crate::header::ReplayHeader;
use crate::packets::{self, ChatPacket, EcsRegistry, MovementPacket, ParsedPayload};
use crate::players::{Player, PlayerTable};
use crate::blk::BlkBlock;
use crate::stream::{PacketType, RawPacket};

/// A fully decoded replay.
#[derive(Debug)]
pub struct Replay {
    /// The container header.
    pub header: ReplayHeader,
    /// Parsed settings tree; `None` when absent, skipped, or carried in
    /// an unsupported tree variant.
    pub settings: Option<BlkBlock>,
    /// Raw settings blob bytes, kept for lossless rewrite.
    pub settings_raw: Vec<u8>,
    /// Parsed results tree; `None` when absent, skipped, or carried in
    /// an unsupported tree variant.
    pub results: Option<BlkBlock>,
    /// Raw results blob bytes, kept for lossless rewrite.
    pub results_raw: Vec<u8>,
    /// The ordered packet sequence.
    pub packets: Vec<RawPacket>,
    /// Template and component catalog built while decoding ECS frames.
    pub registry: EcsRegistry,
    /// Player roster built from slot messages.
    pub players: PlayerTable,
}

impl Replay {
    /// Creates an empty replay around a header.
    #[must_use]
    pub fn new(header: ReplayHeader) -> Self {
        Self {
            header,
            settings: None,
            settings_raw: Vec::new(),
            results: None,
            results_raw: Vec::new(),
            packets: Vec::new(),
            registry: EcsRegistry::default(),
            players: PlayerTable::new(),
        }
    }

    /// The replay identity: SHA-256 hex digest of the header record.
    #[must_use]
    pub fn identity(&self) -> String {
        self.header.hash()
    }

    /// Iterates all raw packets in stream order.
    pub fn packets(&self) -> impl Iterator<Item = &RawPacket> {
        self.packets.iter()
    }

    /// Iterates packets of one type.
    pub fn packets_of_type(&self, packet_type: PacketType) -> impl Iterator<Item = &RawPacket> {
        self.packets
            .iter()
            .filter(move |p| p.packet_type == packet_type)
    }

    /// Returns the player in `slot`, if any.
    #[must_use]
    pub fn player(&self, slot: u8) -> Option<&Player> {
        self.players.get(slot)
    }

    /// Iterates `(slot, player)` over occupied roster slots.
    pub fn players(&self) -> impl Iterator<Item = (u8, &Player)> {
        self.players.iter()
    }

    /// Collects all decoded chat messages in stream order.
    #[must_use]
    pub fn chat_messages(&self) -> Vec<&ChatPacket> {
        self.packets
            .iter()
            .filter_map(|p| p.parsed.as_ref().and_then(ParsedPayload::as_chat))
            .collect()
    }

    /// Collects all decoded entity positions in stream order.
    #[must_use]
    pub fn entity_positions(&self) -> Vec<&MovementPacket> {
        self.packets
            .iter()
            .filter_map(|p| p.parsed.as_ref().and_then(ParsedPayload::as_movement))
            .collect()
    }

    /// Iterates packets that failed semantic parsing.
    pub fn parse_errors(&self) -> impl Iterator<Item = (&RawPacket, &ReplayError)> {
        self.packets
            .iter()
            .filter_map(|p| p.parse_error.as_ref().map(|e| (p, e)))
    }

    /// Number of packets with a semantic parse failure.
    #[must_use]
    pub fn parse_error_count(&self) -> usize {
        self.packets.iter().filter(|p| p.parse_error.is_some()).count()
    }

    /// Runs the semantic pass over the packet sequence, rebuilding the
    /// registry and roster from scratch.
    pub(crate) fn parse_packets(&mut self) {
        self.registry = EcsRegistry::default();
        self.players = PlayerTable::new();
        packets::parse_all(&mut self.packets, &mut self.registry, &mut self.players);
    }
}
