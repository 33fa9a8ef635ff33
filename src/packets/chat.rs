//! Chat packet decoding (packet type 3).

use crate::binary::ByteCursor;
use crate::error::Result;

use super::ParsedPayload;

/// An in-game chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPacket {
    /// Sender's display name.
    pub sender: String,
    /// Message text.
    pub content: String,
    /// Channel discriminator (all/team/squad).
    pub channel: u8,
    /// Nonzero when the sender is on the enemy team.
    pub is_enemy: u8,
}

/// Decodes a chat payload: one lead byte, length-prefixed sender,
/// length-prefixed content, channel byte, is-enemy byte.
///
/// # Errors
///
/// Returns a truncation error when the payload is shorter than its
/// schema; the caller demotes it to the packet's `parse_error`.
pub fn parse(payload: &[u8]) -> Result<ParsedPayload> {
    let mut cur = ByteCursor::new(payload);
    cur.read_u8()?;
    let sender = cur.read_len_str()?;
    let content = cur.read_len_str()?;
    let channel = cur.read_u8()?;
    let is_enemy = cur.read_u8()?;
    Ok(ParsedPayload::Chat(ChatPacket {
        sender,
        content,
        channel,
        is_enemy,
    }))
}
