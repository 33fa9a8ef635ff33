//! Player table and slot-message enrichment.
//!
//! Specific slot-addressed sub-messages carry player roster data:
//! initialization records with user id, name, clan tag and title, and
//! later title updates. This module maintains the 256-slot player
//! table those messages populate.
//!
//! Enrichment is best-effort by design: the message shapes are matched
//! with heuristic byte masks that have changed across game builds, so
//! anything malformed or unrecognized is silently skipped and never
//! fails the enclosing replay decode.

use crate::binary::{fixed_str, ByteCursor};

/// Width of the fixed player-name field in a roster init message.
///
/// Some game builds pad the field to a different width; treat this as
/// a format parameter when cross-checking against fresh data.
pub const PLAYER_NAME_LEN: usize = 64;

/// One player in the session roster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Player {
    /// Account user id.
    pub user_id: u32,
    /// Display name.
    pub name: String,
    /// Clan tag, empty when the player has none.
    pub clan_tag: String,
    /// Title, empty when the player has none.
    pub title: String,
}

/// The slot-indexed player roster of one session.
///
/// Identity is the byte slot index; unoccupied slots are legal and
/// stay `None`.
#[derive(Debug, Clone)]
pub struct PlayerTable {
    slots: Vec<Option<Player>>,
}

impl Default for PlayerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerTable {
    /// Creates an empty table with all 256 slots vacant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; 256],
        }
    }

    /// Returns the player in `slot`, if any.
    #[must_use]
    pub fn get(&self, slot: u8) -> Option<&Player> {
        self.slots[usize::from(slot)].as_ref()
    }

    /// Places a player into `slot`, replacing any previous occupant.
    pub fn set(&mut self, slot: u8, player: Player) {
        self.slots[usize::from(slot)] = Some(player);
    }

    /// Iterates `(slot, player)` over occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Player)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i as u8, p)))
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|p| p.is_some()).count()
    }

    fn get_mut(&mut self, slot: u8) -> Option<&mut Player> {
        self.slots[usize::from(slot)].as_mut()
    }
}

/// Inspects one slot-addressed record and applies roster side effects.
///
/// Records shorter than 5 bytes, or whose 5-byte header doesn't match
/// a known shape, are ignored.
pub(crate) fn apply_slot_message(table: &mut PlayerTable, slot: u8, msg: &[u8]) {
    if msg.len() < 5 {
        return;
    }
    let header = &msg[..5];
    if header[0] != 0x70 || header[4] != 0x60 || !(header[3] == 0x08 || header[3] == 0x30) {
        return;
    }
    let body = &msg[5..];
    if header[2] == 0x01 || header[2] == 0x02 {
        apply_player_init(table, slot, body);
    } else if header[1] == 0x06 && u16::from_le_bytes([header[1], header[2]]) < 150 {
        apply_set_title(table, slot, body);
    }
}

/// Roster init: user id, padded name, optional clan tag and title.
fn apply_player_init(table: &mut PlayerTable, slot: u8, body: &[u8]) {
    let mut cur = ByteCursor::new(body);
    let mut player = Player::default();

    let parsed = (|| {
        player.user_id = cur.read_u32_le()?;
        cur.skip(4)?;
        player.name = fixed_str(cur.take(PLAYER_NAME_LEN)?);
        cur.skip(20)?;
        let clan_tag = cur.read_len_str()?;
        if !clan_tag.is_empty() {
            player.clan_tag = clan_tag;
        }
        let title = cur.read_len_str()?;
        if !title.is_empty() {
            player.title = title;
        }
        crate::error::Result::Ok(())
    })();

    match parsed {
        Ok(()) => table.set(slot, player),
        Err(err) => {
            tracing::debug!(slot, %err, "skipping malformed player init record");
        }
    }
}

/// Title update: only applies to an already-known player.
fn apply_set_title(table: &mut PlayerTable, slot: u8, body: &[u8]) {
    let mut cur = ByteCursor::new(body);
    match cur.read_len_str() {
        Ok(title) => {
            if let Some(player) = table.get_mut(slot) {
                player.title = title;
            }
        }
        Err(err) => {
            tracing::debug!(slot, %err, "skipping malformed title record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a player-init record body (everything after the 5-byte
    /// header).
    fn init_body(user_id: u32, name: &str, clan: &str, title: &str) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&user_id.to_le_bytes());
        b.extend_from_slice(&[0u8; 4]);
        let mut padded = name.as_bytes().to_vec();
        padded.resize(PLAYER_NAME_LEN, 0);
        b.extend_from_slice(&padded);
        b.extend_from_slice(&[0u8; 20]);
        b.push(clan.len() as u8);
        b.extend_from_slice(clan.as_bytes());
        b.push(title.len() as u8);
        b.extend_from_slice(title.as_bytes());
        b
    }

    fn init_record(user_id: u32, name: &str, clan: &str, title: &str) -> Vec<u8> {
        let mut msg = vec![0x70, 0x00, 0x01, 0x30, 0x60];
        msg.extend_from_slice(&init_body(user_id, name, clan, title));
        msg
    }

    fn title_record(title: &str) -> Vec<u8> {
        let mut msg = vec![0x70, 0x06, 0x00, 0x08, 0x60];
        msg.push(title.len() as u8);
        msg.extend_from_slice(title.as_bytes());
        msg
    }

    #[test]
    fn test_table_starts_empty() {
        let table = PlayerTable::new();
        assert_eq!(table.occupied_count(), 0);
        assert!(table.get(0).is_none());
        assert!(table.get(255).is_none());
    }

    #[test]
    fn test_player_init_populates_slot() {
        let mut table = PlayerTable::new();
        apply_slot_message(&mut table, 7, &init_record(42, "Pilot", "ACES", "Baron"));

        let player = table.get(7).unwrap();
        assert_eq!(player.user_id, 42);
        assert_eq!(player.name, "Pilot");
        assert_eq!(player.clan_tag, "ACES");
        assert_eq!(player.title, "Baron");
        assert_eq!(table.occupied_count(), 1);
    }

    #[test]
    fn test_player_init_empty_clan_and_title_stay_empty() {
        let mut table = PlayerTable::new();
        apply_slot_message(&mut table, 0, &init_record(1, "Solo", "", ""));

        let player = table.get(0).unwrap();
        assert_eq!(player.clan_tag, "");
        assert_eq!(player.title, "");
    }

    #[test]
    fn test_player_init_alt_shape_byte() {
        // header[2] == 0x02 and header[3] == 0x08 also match
        let mut msg = vec![0x70, 0x00, 0x02, 0x08, 0x60];
        msg.extend_from_slice(&init_body(9, "Nine", "", ""));

        let mut table = PlayerTable::new();
        apply_slot_message(&mut table, 1, &msg);
        assert_eq!(table.get(1).unwrap().user_id, 9);
    }

    #[test]
    fn test_set_title_replaces_existing() {
        let mut table = PlayerTable::new();
        apply_slot_message(&mut table, 3, &init_record(5, "P", "", "Old"));
        apply_slot_message(&mut table, 3, &title_record("New"));
        assert_eq!(table.get(3).unwrap().title, "New");
    }

    #[test]
    fn test_set_title_ignored_for_vacant_slot() {
        let mut table = PlayerTable::new();
        apply_slot_message(&mut table, 3, &title_record("Ghost"));
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_unrecognized_headers_ignored() {
        let mut table = PlayerTable::new();
        // wrong lead byte
        apply_slot_message(&mut table, 0, &[0x71, 0x00, 0x01, 0x30, 0x60, 0x00]);
        // wrong trailer byte
        apply_slot_message(&mut table, 0, &[0x70, 0x00, 0x01, 0x30, 0x61, 0x00]);
        // wrong shape byte
        apply_slot_message(&mut table, 0, &[0x70, 0x00, 0x01, 0x31, 0x60, 0x00]);
        // too short
        apply_slot_message(&mut table, 0, &[0x70, 0x00]);
        assert_eq!(table.occupied_count(), 0);
    }

    #[test]
    fn test_truncated_init_ignored() {
        let mut table = PlayerTable::new();
        let mut msg = init_record(1, "X", "", "");
        msg.truncate(20);
        apply_slot_message(&mut table, 0, &msg);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_iter_in_slot_order() {
        let mut table = PlayerTable::new();
        table.set(9, Player { name: "b".into(), ..Player::default() });
        table.set(2, Player { name: "a".into(), ..Player::default() });
        let names: Vec<_> = table.iter().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
