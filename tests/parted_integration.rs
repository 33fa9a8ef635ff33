//! Integration tests for multi-part stitching: ordering, filtering,
//! validation, and state rebuilt over the combined stream.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use wrpl_parser::{read_parted_replay, ReplayError, HEADER_SIZE, REPLAY_MAGIC};

const SESSION: u64 = 0xDEAD_BEEF_0102_0304;

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(3));
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Builds a fragment whose packet stream is the given framed bytes.
fn fragment_with_stream(session: u64, part: u8, stream: &[u8]) -> Vec<u8> {
    let mut file = vec![0u8; HEADER_SIZE];
    file[..4].copy_from_slice(&REPLAY_MAGIC);
    file[0x2DC..0x2E4].copy_from_slice(&session.to_le_bytes());
    file[0x2E4] = part;
    let mut full = stream.to_vec();
    full.extend_from_slice(&[0x81, 0x10]);
    file.extend_from_slice(&deflate(&full));
    file
}

/// A fragment holding one snapshot packet with `marker` as timestamp.
fn fragment(session: u64, part: u8, marker: u32) -> Vec<u8> {
    let mut stream = vec![0x87, 0x07];
    stream.extend_from_slice(&marker.to_le_bytes());
    stream.extend_from_slice(&[0x00, 0x00]);
    fragment_with_stream(session, part, &stream)
}

#[test]
fn test_two_fragments_concatenate_in_part_order() {
    let parts = vec![fragment(SESSION, 0, 1), fragment(SESSION, 1, 2)];
    let replay = read_parted_replay(&parts).unwrap();
    let times: Vec<u32> = replay.packets.iter().map(|p| p.current_time).collect();
    assert_eq!(times, [1, 2]);
}

#[test]
fn test_any_input_permutation_accepted() {
    let mk = |order: &[u8]| -> Vec<Vec<u8>> {
        order
            .iter()
            .map(|&p| fragment(SESSION, p, u32::from(p) * 10 + 1))
            .collect()
    };
    for order in [&[0u8, 1, 3][..], &[3, 1, 0], &[1, 0, 3], &[3, 0, 1]] {
        let replay = read_parted_replay(&mk(order)).unwrap();
        let times: Vec<u32> = replay.packets.iter().map(|p| p.current_time).collect();
        assert_eq!(times, [1, 11, 31], "input order {order:?}");
    }
}

#[test]
fn test_even_client_parts_dropped_before_ordering() {
    let parts = vec![
        fragment(SESSION, 0, 1),
        fragment(SESSION, 2, 99),
        fragment(SESSION, 1, 2),
        fragment(SESSION, 4, 98),
        fragment(SESSION, 3, 3),
    ];
    let replay = read_parted_replay(&parts).unwrap();
    let times: Vec<u32> = replay.packets.iter().map(|p| p.current_time).collect();
    assert_eq!(times, [1, 2, 3]);
}

#[test]
fn test_session_mismatch_rejects_whole_set() {
    let parts = vec![
        fragment(SESSION, 0, 1),
        fragment(SESSION, 1, 2),
        fragment(SESSION ^ 1, 3, 3),
    ];
    match read_parted_replay(&parts) {
        Err(ReplayError::SessionMismatch { first, second }) => {
            assert_eq!(first, SESSION);
            assert_eq!(second, SESSION ^ 1);
        }
        other => panic!("expected SessionMismatch, got {other:?}"),
    }
}

#[test]
fn test_missing_part_zero_rejected() {
    let parts = vec![fragment(SESSION, 1, 1)];
    assert!(matches!(
        read_parted_replay(&parts),
        Err(ReplayError::MissingPartZero)
    ));
}

#[test]
fn test_part_gap_rejected() {
    let parts = vec![fragment(SESSION, 0, 1), fragment(SESSION, 3, 2)];
    assert!(matches!(
        read_parted_replay(&parts),
        Err(ReplayError::FragmentGap { previous: -1, found: 3 })
    ));
}

#[test]
fn test_header_and_settings_come_from_part_zero() {
    // give part 0 a settings blob; part 1 has none
    let blk = vec![0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
    let mut part0 = vec![0u8; HEADER_SIZE];
    part0[..4].copy_from_slice(&REPLAY_MAGIC);
    part0[0x2DC..0x2E4].copy_from_slice(&SESSION.to_le_bytes());
    part0[0x2E4] = 0;
    part0[0x2EC..0x2EE].copy_from_slice(&(blk.len() as u16).to_le_bytes());
    part0.extend_from_slice(&blk);
    part0.extend_from_slice(&deflate(&[0x81, 0x10]));

    let parts = vec![part0, fragment(SESSION, 1, 5)];
    let replay = read_parted_replay(&parts).unwrap();
    assert_eq!(replay.header.replay_part_number, 0);
    assert!(replay.settings.is_some());
    assert_eq!(replay.settings_raw, blk);
    assert_eq!(replay.packets.len(), 1);
}

#[test]
fn test_registry_rebuilt_over_combined_stream() {
    // part 0 declares an ECS template, part 1 references it by bare id;
    // the reference only resolves because stitching replays the
    // semantic pass over the combined sequence
    let declare = {
        let mut payload = vec![0x24, 0x00, 0x05, 0x00]; // construct, 1 msg, eid 1
        let block = [0x06u8, 0x01, b't', 0x00, 0x00]; // tid 6, name "t", 0 comps
        payload.push(block.len() as u8);
        payload.extend_from_slice(&block);
        let mut stream = Vec::new();
        stream.push(0x80 | (5 + payload.len()) as u8);
        stream.push(6);
        stream.extend_from_slice(&0u32.to_le_bytes());
        stream.extend_from_slice(&payload);
        stream
    };
    let reference = {
        let mut payload = vec![0x24, 0x00, 0x09, 0x00]; // construct, 1 msg, eid 2
        let block = [0x06u8, 0xAB]; // bare tid 6 + opaque state
        payload.push(block.len() as u8);
        payload.extend_from_slice(&block);
        let mut stream = Vec::new();
        stream.push(0x80 | (5 + payload.len()) as u8);
        stream.push(6);
        stream.extend_from_slice(&1u32.to_le_bytes());
        stream.extend_from_slice(&payload);
        stream
    };

    let parts = vec![
        fragment_with_stream(SESSION, 0, &declare),
        fragment_with_stream(SESSION, 1, &reference),
    ];
    let replay = read_parted_replay(&parts).unwrap();
    assert_eq!(replay.parse_error_count(), 0);
    assert_eq!(replay.registry.template_count(), 1);
    assert_eq!(replay.registry.template(6).unwrap().name, "t");

    let frame = replay.packets[1]
        .parsed
        .as_ref()
        .unwrap()
        .as_ecs_frame()
        .unwrap();
    assert_eq!(frame.messages[0].template, 6);
    assert_eq!(frame.messages[0].data, vec![0xAB]);
}
