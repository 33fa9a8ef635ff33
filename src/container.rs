//! Container decoding and lossless rewrite.
//!
//! A replay file is laid out as:
//!
//! 1. the fixed 1226-byte header ([`crate::header`])
//! 2. an optional settings tree blob of `settings_blk_size` bytes
//! 3. a zlib stream holding the framed packet sequence
//!    ([`crate::stream`]); the stream is self-terminating
//! 4. an optional results tree blob from `results_blk_offset` to the
//!    end of the file
//!
//! Callers can skip any of sections 2-4 via [`DecodeSections`]; the
//! header is always decoded. The writer reverses the layout from the
//! retained raw blobs and reproduces the input byte-identically when
//! the packet sequence is unmodified.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::blk::parse_blk;
use crate::error::{ReplayError, Result};
use crate::header::{ReplayHeader, HEADER_SIZE, RESULTS_OFFSET_FIELD};
use crate::replay::Replay;
use crate::stream::{read_packet_stream, write_packet_stream};

/// Compression level of the rewritten packet zlib stream.
///
/// Matches the level game clients use, so an unmodified rewrite stays
/// byte-identical.
const PACKETS_ZLIB_LEVEL: u32 = 3;

/// Selects which container sections to decode.
///
/// The header is always decoded; each flag enables one of the three
/// optional sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSections {
    /// Decode the settings tree blob.
    pub settings: bool,
    /// Inflate and frame the packet stream.
    pub packets: bool,
    /// Decode the results tree blob.
    pub results: bool,
}

impl Default for DecodeSections {
    fn default() -> Self {
        Self::all()
    }
}

impl DecodeSections {
    /// Decode everything.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            settings: true,
            packets: true,
            results: true,
        }
    }

    /// Decode only the header.
    #[must_use]
    pub const fn header_only() -> Self {
        Self {
            settings: false,
            packets: false,
            results: false,
        }
    }
}

/// Decodes a replay file.
///
/// Sections disabled in `sections` are skipped entirely (the settings
/// blob is still stepped over to find the packet stream). A settings
/// or results blob that fails tree decoding — unsupported variant or
/// structural damage — keeps its raw bytes and leaves the parsed tree
/// `None`; only the blob being shorter than its declared size is
/// fatal.
///
/// # Errors
///
/// - [`ReplayError::BadMagic`] / [`ReplayError::Truncated`] for a
///   broken container
/// - [`ReplayError::Decompression`] when the packet zlib stream fails
/// - [`ReplayError::BadSizePrefix`] / [`ReplayError::Truncated`] from
///   packet framing
pub fn read_replay(data: &[u8], sections: DecodeSections) -> Result<Replay> {
    let header = ReplayHeader::parse(data)?;
    let mut replay = Replay::new(header);
    let mut pos = HEADER_SIZE;

    let settings_size = usize::from(replay.header.settings_blk_size);
    if settings_size > 0 {
        let Some(raw) = data.get(pos..pos + settings_size) else {
            return Err(ReplayError::truncated(pos + settings_size, data.len()));
        };
        if sections.settings {
            replay.settings_raw = raw.to_vec();
            replay.settings = parse_tree_lenient(raw, "settings");
        }
        pos += settings_size;
    }

    if sections.packets {
        let tail = data
            .get(pos..)
            .ok_or_else(|| ReplayError::truncated(pos, data.len()))?;
        let mut inflated = Vec::new();
        ZlibDecoder::new(tail)
            .read_to_end(&mut inflated)
            .map_err(|e| ReplayError::decompression(format!("packet zlib stream: {e}")))?;
        replay.packets = read_packet_stream(&inflated)?;
    }

    let results_offset = replay.header.results_blk_offset;
    if results_offset > 0 && sections.results {
        let offset = results_offset as usize;
        if offset > data.len() {
            return Err(ReplayError::truncated(offset, data.len()));
        }
        let raw = &data[offset..];
        replay.results_raw = raw.to_vec();
        replay.results = parse_tree_lenient(raw, "results");
    }

    if !replay.packets.is_empty() {
        replay.parse_packets();
    }
    Ok(replay)
}

/// Parses a tree blob, demoting every failure to `None`.
///
/// The raw bytes stay retained on the replay either way, so a blob
/// this build cannot decode is preserved rather than fatal.
fn parse_tree_lenient(raw: &[u8], what: &str) -> Option<crate::blk::BlkBlock> {
    match parse_blk(raw) {
        Ok(tree) => Some(tree),
        Err(ReplayError::Unsupported { variant }) => {
            tracing::debug!(what, variant, "tree variant not decodable standalone, keeping raw bytes");
            None
        }
        Err(err) => {
            tracing::warn!(what, %err, "tree blob failed to decode, keeping raw bytes");
            None
        }
    }
}

/// Serializes a decoded replay back into file bytes.
///
/// The header is written first (its `results_blk_offset` patched to
/// the actual results position when results are present), followed by
/// the retained raw settings blob, the re-deflated packet stream, and
/// the retained raw results blob. The output is byte-identical to the
/// decoded input when the packet sequence was not modified and no
/// unsupported tree variant was involved.
///
/// # Errors
///
/// - [`ReplayError::InvalidReplay`] when the header declares a
///   settings blob whose raw bytes are missing or of a different size
/// - [`ReplayError::Io`] if deflation fails
pub fn write_replay(replay: &Replay) -> Result<Vec<u8>> {
    let mut out = replay.header.to_bytes();

    let declared = usize::from(replay.header.settings_blk_size);
    if declared > 0 {
        if replay.settings_raw.len() != declared {
            return Err(ReplayError::InvalidReplay {
                reason: format!(
                    "header declares a {declared}-byte settings blob, {} bytes retained",
                    replay.settings_raw.len()
                ),
            });
        }
        out.extend_from_slice(&replay.settings_raw);
    }

    let stream = write_packet_stream(&replay.packets);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(PACKETS_ZLIB_LEVEL));
    encoder.write_all(&stream)?;
    let compressed = encoder.finish()?;
    out.extend_from_slice(&compressed);

    if !replay.results_raw.is_empty() {
        let results_offset = i32::try_from(out.len()).map_err(|_| ReplayError::InvalidReplay {
            reason: "rewritten replay exceeds the addressable results offset".to_string(),
        })?;
        out[RESULTS_OFFSET_FIELD..RESULTS_OFFSET_FIELD + 4]
            .copy_from_slice(&results_offset.to_le_bytes());
        out.extend_from_slice(&replay.results_raw);
    }

    Ok(out)
}
