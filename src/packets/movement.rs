//! Entity movement packet decoding.
//!
//! Movement updates are MPI packets without a dedicated signature;
//! they are recognized by a structural guard over the whole payload: a
//! minimum length of 40 bytes and a fixed byte mask
//! `FF 0F ?? ?? ?? A3 F0 ?? ?? ?? 00 00 ?? 14`.
//!
//! The entity id is bit-packed starting at payload offset 2 with the
//! stream wrapping around to the payload head (the continuation bytes
//! of the wide id forms come from the mask region). The position is
//! three little-endian f64 at offsets 14, 22 and 30.

use crate::bits::BitReader;
use crate::error::Result;

use super::{ecs, ParsedPayload};

/// Minimum payload length of a movement packet.
pub const MIN_LEN: usize = 40;

/// An entity position update.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementPacket {
    /// The moving entity's id.
    pub eid: u64,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Timestamp copied from the carrying packet.
    pub time: u32,
}

/// Returns `true` when `payload` passes the movement structural guard.
#[must_use]
pub fn matches(payload: &[u8]) -> bool {
    payload.len() >= MIN_LEN
        && payload[0] == 0xFF
        && payload[1] == 0x0F
        && payload[5] == 0xA3
        && payload[6] == 0xF0
        && payload[10] == 0x00
        && payload[11] == 0x00
        && payload[13] == 0x14
}

/// Decodes a movement payload; the caller has already checked
/// [`matches`].
///
/// # Errors
///
/// Returns an error when the entity id cannot be read (only possible
/// on payloads shorter than the guard admits).
pub fn parse(current_time: u32, payload: &[u8]) -> Result<ParsedPayload> {
    // the id stream starts at offset 2 and continues over the payload
    // head, so the continuation bytes of the longer id forms are the
    // leading mask bytes
    let mut scratch = Vec::with_capacity(payload.len() + 2);
    scratch.extend_from_slice(&payload[2..4]);
    scratch.extend_from_slice(payload);
    let eid = ecs::read_eid(&mut BitReader::new(&scratch))?;

    let f64_at = |off: usize| {
        f64::from_le_bytes([
            payload[off],
            payload[off + 1],
            payload[off + 2],
            payload[off + 3],
            payload[off + 4],
            payload[off + 5],
            payload[off + 6],
            payload[off + 7],
        ])
    };

    Ok(ParsedPayload::Movement(MovementPacket {
        eid,
        x: f64_at(14),
        y: f64_at(22),
        z: f64_at(30),
        time: current_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement_payload(eid_low: u16, x: f64, y: f64, z: f64) -> Vec<u8> {
        let mut p = vec![0u8; MIN_LEN];
        p[0] = 0xFF;
        p[1] = 0x0F;
        p[2..4].copy_from_slice(&eid_low.to_le_bytes());
        p[5] = 0xA3;
        p[6] = 0xF0;
        p[13] = 0x14;
        p[14..22].copy_from_slice(&x.to_le_bytes());
        p[22..30].copy_from_slice(&y.to_le_bytes());
        p[30..38].copy_from_slice(&z.to_le_bytes());
        p
    }

    #[test]
    fn test_guard_accepts_valid_mask() {
        assert!(matches(&movement_payload(0x0005, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_guard_rejects_short_payload() {
        let mut p = movement_payload(0x0005, 0.0, 0.0, 0.0);
        p.truncate(39);
        assert!(!matches(&p));
    }

    #[test]
    fn test_guard_rejects_wrong_mask() {
        let mut p = movement_payload(0x0005, 0.0, 0.0, 0.0);
        p[5] = 0x00;
        assert!(!matches(&p));
    }

    #[test]
    fn test_parse_position_and_eid() {
        // eid word 0x0005: low bit set -> eid 1
        let p = movement_payload(0x0005, 1281.5, -16.25, 4096.0);
        let parsed = parse(777, &p).unwrap();
        let mv = parsed.as_movement().unwrap();
        assert_eq!(mv.eid, 1);
        assert!((mv.x - 1281.5).abs() < f64::EPSILON);
        assert!((mv.y + 16.25).abs() < f64::EPSILON);
        assert!((mv.z - 4096.0).abs() < f64::EPSILON);
        assert_eq!(mv.time, 777);
    }

    #[test]
    fn test_parse_wide_eid_uses_wrapped_stream() {
        // eid word with both low bits clear: the second u16 comes from
        // the wrapped stream (payload bytes 0-1 = FF 0F)
        let p = movement_payload(0x0004, 0.0, 0.0, 0.0);
        let parsed = parse(0, &p).unwrap();
        let mv = parsed.as_movement().unwrap();
        // v = 0x0FFF0004; low 24 bits >> 2, generation = v >> 24
        let v: u64 = 0x0FFF_0004;
        let expected = ((v & 0x00FF_FFFF) >> 2) | ((v >> 24) << 22);
        assert_eq!(mv.eid, expected);
    }
}
