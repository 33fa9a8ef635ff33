//! Entity/component wire message decoding (packet type 6).
//!
//! ECS frames construct entities from templates. Templates and the
//! components they reference are declared inline the first time their
//! id appears on the wire and referenced by bare id afterwards — the
//! stream relies on a registry that is built up *during* decode and
//! lives exactly as long as one replay.
//!
//! A frame's control byte is either `0x24` (inline construct block) or
//! `0x25` (the same block, LZ4-block-compressed). The block holds one
//! or more messages of `{eid, block_size, block}` where the inner
//! block starts with a template declaration and ends with the entity's
//! opaque initial-state payload.
//!
//! # Entity ids
//!
//! Entity ids use a 24-bit variable-length encoding over the bit
//! stream; see [`read_eid`].

use indexmap::IndexMap;

use crate::bits::BitReader;
use crate::error::{ReplayError, Result};

use super::ParsedPayload;

/// Control byte of an uncompressed entity construction frame.
pub const CONTROL_CONSTRUCT: u8 = 0x24;

/// Control byte of an LZ4-compressed entity construction frame.
pub const CONTROL_CONSTRUCT_LZ4: u8 = 0x25;

/// An entity template: a named list of component ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsTemplate {
    /// Wire id of the template.
    pub id: u16,
    /// Template name as declared on first registration.
    pub name: String,
    /// Ids of the template's components, in declaration order.
    pub components: Vec<u16>,
}

/// A component definition: a pair of name and type hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcsComponent {
    /// Hash of the component name.
    pub name_hash: u32,
    /// Hash of the component type.
    pub type_hash: u32,
}

/// The per-replay template and component catalog.
///
/// Registrations are monotone: once an id is known, later declarations
/// with the same id return the existing entry and never amend it (the
/// wire format depends on this for its size savings).
#[derive(Debug, Clone, Default)]
pub struct EcsRegistry {
    templates: IndexMap<u16, EcsTemplate>,
    components: IndexMap<u16, EcsComponent>,
}

impl EcsRegistry {
    /// Looks up a template by id.
    #[must_use]
    pub fn template(&self, id: u16) -> Option<&EcsTemplate> {
        self.templates.get(&id)
    }

    /// Looks up a component by id.
    #[must_use]
    pub fn component(&self, id: u16) -> Option<&EcsComponent> {
        self.components.get(&id)
    }

    /// Iterates templates in first-seen order.
    pub fn templates(&self) -> impl Iterator<Item = &EcsTemplate> {
        self.templates.values()
    }

    /// Iterates `(id, component)` pairs in first-seen order.
    pub fn components(&self) -> impl Iterator<Item = (u16, &EcsComponent)> {
        self.components.iter().map(|(id, c)| (*id, c))
    }

    /// Number of registered templates.
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Number of registered components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

/// One entity construction message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsMessage {
    /// The entity id.
    pub eid: u64,
    /// The template the entity was constructed from.
    pub template: u16,
    /// Opaque initial-state payload, kept verbatim.
    pub data: Vec<u8>,
}

/// A decoded entity construction frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsFramePacket {
    /// The frame control byte as seen on the wire.
    pub control: u8,
    /// Whether the frame body was LZ4-compressed.
    pub was_compressed: bool,
    /// Decompressed body size (equals payload size - 1 when inline).
    pub decompressed_size: usize,
    /// The construction messages.
    pub messages: Vec<EcsMessage>,
}

/// Decodes an ECS packet payload.
///
/// Control bytes other than `0x24`/`0x25` are valid traffic this
/// decoder does not cover; they map to [`ParsedPayload::Unknown`].
///
/// # Errors
///
/// - [`ReplayError::Decompression`] when the LZ4 body fails to inflate
/// - [`ReplayError::Eof`] when the bit stream ends mid-message
pub fn parse_frame(registry: &mut EcsRegistry, payload: &[u8]) -> Result<ParsedPayload> {
    let Some(&control) = payload.first() else {
        return Err(ReplayError::malformed("empty ecs payload"));
    };

    match control {
        CONTROL_CONSTRUCT_LZ4 => {
            // worst case expansion seen in practice is well under 8x
            let scratch_cap = (payload.len() - 1) * 8;
            let body = lz4_flex::block::decompress(&payload[1..], scratch_cap)
                .map_err(|e| ReplayError::decompression(format!("ecs lz4 block: {e}")))?;
            let messages = parse_construct(registry, &body)?;
            Ok(ParsedPayload::EcsFrame(EcsFramePacket {
                control,
                was_compressed: true,
                decompressed_size: body.len(),
                messages,
            }))
        }
        CONTROL_CONSTRUCT => {
            let body = &payload[1..];
            let messages = parse_construct(registry, body)?;
            Ok(ParsedPayload::EcsFrame(EcsFramePacket {
                control,
                was_compressed: false,
                decompressed_size: body.len(),
                messages,
            }))
        }
        _ => Ok(ParsedPayload::Unknown),
    }
}

/// Parses the body of a construct frame: a count byte followed by that
/// many + 1 messages.
fn parse_construct(registry: &mut EcsRegistry, body: &[u8]) -> Result<Vec<EcsMessage>> {
    let mut r = BitReader::new(body);
    let count = u16::from(r.read_u8()?) + 1;
    let mut messages = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let eid = read_eid(&mut r)?;
        let block_size = r.read_compressed()?;
        let block = r.read_bytes(usize::try_from(block_size).map_err(|_| {
            ReplayError::malformed(format!("ecs block size {block_size} out of range"))
        })?)?;
        let mut sub = BitReader::new(&block);
        let template = parse_template(registry, &mut sub)?;
        let data = sub.read_remaining();
        messages.push(EcsMessage { eid, template, data });
    }
    Ok(messages)
}

/// Parses a template declaration from the head of a construct block.
///
/// A known template id consumes nothing beyond the id itself. A new id
/// declares its name, component count, and each component id —
/// followed by the component's name/type hashes when that component id
/// is itself new.
fn parse_template(registry: &mut EcsRegistry, r: &mut BitReader<'_>) -> Result<u16> {
    let id = r.read_compressed()? as u16;
    if registry.templates.contains_key(&id) {
        return Ok(id);
    }
    let name = r.read_len_str()?;
    let component_count = r.read_u16_le()?;
    let mut components = Vec::with_capacity(usize::from(component_count));
    for _ in 0..component_count {
        let component_id = r.read_compressed()? as u16;
        if !registry.components.contains_key(&component_id) {
            let name_hash = r.read_u32_le()?;
            let type_hash = r.read_u32_le()?;
            registry
                .components
                .insert(component_id, EcsComponent { name_hash, type_hash });
        }
        components.push(component_id);
    }
    registry.templates.insert(id, EcsTemplate { id, name, components });
    Ok(id)
}

/// Reads a variable-length 24-bit entity id from the bit stream.
///
/// The low two bits of the first u16 select the form:
///
/// - bit 0 set: the id is complete; generation comes from bit 1
/// - bit 1 set: one extra generation byte follows
/// - neither: a second u16 follows and the top byte carries the
///   generation
///
/// # Errors
///
/// Returns [`ReplayError::Eof`] when the stream ends mid-id.
pub fn read_eid(r: &mut BitReader<'_>) -> Result<u64> {
    let first = r.read_u16_le()?;
    if first & 1 == 1 {
        Ok(u64::from(first >> 2) | (u64::from((first >> 1) & 1) << 22))
    } else if first & 2 != 0 {
        let generation = r.read_u8()?;
        Ok(u64::from(first >> 2) | (u64::from(generation) << 22))
    } else {
        let second = r.read_u16_le()?;
        let v = (u64::from(second) << 16) | u64::from(first);
        Ok(((v & 0x00FF_FFFF) >> 2) | ((v >> 24) << 22))
    }
}
