//! FAT tree layout parsing.
//!
//! The FAT variant stores a tree as four flat sections followed by
//! block descriptors (all counts ULEB128-encoded):
//!
//! 1. `names_count`, `names_size`, then `names_size` bytes of
//!    NUL-separated strings (the shared name table)
//! 2. `total_blocks`
//! 3. `params_count`, `params_data_size`, then the param heap
//! 4. `params_count * 8` bytes of param descriptors
//! 5. one descriptor per block: `name_id`, `field_count`,
//!    `child_count`, and `first_child_id` only when `child_count > 0`
//!
//! Each param descriptor is 8 bytes: a 3-byte little-endian name id, a
//! type id byte, and a 4-byte data word holding either the value
//! inline or an offset into the param heap. Blocks consume their
//! `field_count` params sequentially from a single shared cursor, in
//! file order; children are linked by `first_child_id` ranges and the
//! root is block 0.

use super::{BlkBlock, BlkValue};
use crate::error::{ReplayError, Result};

/// Param type id: string (inline offset, name table or param heap).
const TYPE_STRING: u8 = 0x01;
/// Param type id: inline i32.
const TYPE_INT: u8 = 0x02;
/// Param type id: inline f32.
const TYPE_FLOAT: u8 = 0x03;
/// Param type id: two f32 in the heap.
const TYPE_FLOAT2: u8 = 0x04;
/// Param type id: three f32 in the heap.
const TYPE_FLOAT3: u8 = 0x05;
/// Param type id: four f32 in the heap.
const TYPE_FLOAT4: u8 = 0x06;
/// Param type id: two i32 in the heap.
const TYPE_INT2: u8 = 0x07;
/// Param type id: three i32 in the heap.
const TYPE_INT3: u8 = 0x08;
/// Param type id: inline bool.
const TYPE_BOOL: u8 = 0x09;
/// Param type id: inline 4x u8 color.
const TYPE_COLOR: u8 = 0x0A;
/// Param type id: twelve f32 in the heap (3x4 matrix).
const TYPE_FLOAT12: u8 = 0x0B;
/// Param type id: i64 in the heap.
const TYPE_LONG: u8 = 0x0C;
/// Param type id: four i32 in the heap.
const TYPE_INT4: u8 = 0x0D;

/// One flattened block descriptor plus its resolved fields.
struct FlatBlock {
    name: String,
    fields: Vec<(String, BlkValue)>,
    child_count: usize,
    first_child: usize,
}

/// Parses the FAT layout (everything after the variant tag byte).
///
/// # Errors
///
/// Returns [`ReplayError::BadTreeHeader`] on any structural violation:
/// truncated sections, out-of-range name or heap references, unknown
/// param types, or non-forward child links.
pub fn parse_fat(buf: &[u8]) -> Result<BlkBlock> {
    let mut pos = 0;

    let names_count = read_uleb(buf, &mut pos, "names_count")?;
    let names_size = read_uleb(buf, &mut pos, "names_size")? as usize;
    let names_raw = section(buf, &mut pos, names_size, "name table")?;
    let names = split_names(names_raw);
    if names.len() < names_count as usize {
        // tolerated: the count is advisory, the table is authoritative
        tracing::debug!(
            declared = names_count,
            actual = names.len(),
            "name table shorter than declared"
        );
    }

    let total_blocks = read_uleb(buf, &mut pos, "total_blocks")? as usize;

    let params_count = read_uleb(buf, &mut pos, "params_count")? as usize;
    let params_data_size = read_uleb(buf, &mut pos, "params_data_size")? as usize;
    let heap = section(buf, &mut pos, params_data_size, "param heap")?;
    let descriptors = section(buf, &mut pos, params_count * 8, "param descriptors")?;

    // Block descriptors occupy the remainder.
    let mut descs = Vec::with_capacity(total_blocks);
    for i in 0..total_blocks {
        let name_id = read_uleb(buf, &mut pos, "block name_id")?;
        let field_count = read_uleb(buf, &mut pos, "block field_count")? as usize;
        let child_count = read_uleb(buf, &mut pos, "block child_count")? as usize;
        let first_child = if child_count > 0 {
            read_uleb(buf, &mut pos, "block first_child")? as usize
        } else {
            0
        };
        let name = if name_id == 0 {
            "root".to_string()
        } else {
            let idx = name_id as usize - 1;
            names
                .get(idx)
                .ok_or_else(|| {
                    ReplayError::bad_tree(format!("block {i}: name index {idx} out of range"))
                })?
                .clone()
        };
        descs.push((name, field_count, child_count, first_child));
    }

    // Resolve fields: every block consumes its params from one shared cursor.
    let mut param_cursor = 0usize;
    let mut flat = Vec::with_capacity(total_blocks);
    for (name, field_count, child_count, first_child) in descs {
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(read_param(descriptors, heap, &names, param_cursor)?);
            param_cursor += 1;
        }
        flat.push(FlatBlock {
            name,
            fields,
            child_count,
            first_child,
        });
    }

    if flat.is_empty() {
        return Err(ReplayError::bad_tree("no blocks"));
    }
    build_block(&flat, 0)
}

/// Recursively assembles block `idx` and its children.
fn build_block(flat: &[FlatBlock], idx: usize) -> Result<BlkBlock> {
    let fb = &flat[idx];
    let mut block = BlkBlock::new(fb.name.clone());
    for (name, value) in &fb.fields {
        block.insert(name.clone(), value.clone());
    }
    for child in fb.first_child..fb.first_child + fb.child_count {
        // children always come after their parent in file order; anything
        // else would cycle
        if child <= idx || child >= flat.len() {
            return Err(ReplayError::bad_tree(format!(
                "block {idx}: child index {child} out of order"
            )));
        }
        let built = build_block(flat, child)?;
        let child_name = built.name.clone();
        block.insert(child_name, BlkValue::Block(built));
    }
    Ok(block)
}

/// Decodes the param at `index` from the descriptor table.
fn read_param(
    descriptors: &[u8],
    heap: &[u8],
    names: &[String],
    index: usize,
) -> Result<(String, BlkValue)> {
    let start = index * 8;
    let Some(chunk) = descriptors.get(start..start + 8) else {
        return Err(ReplayError::bad_tree(format!(
            "param {index}: descriptor out of bounds"
        )));
    };
    let name_id =
        usize::from(chunk[0]) | (usize::from(chunk[1]) << 8) | (usize::from(chunk[2]) << 16);
    let type_id = chunk[3];
    let data: [u8; 4] = [chunk[4], chunk[5], chunk[6], chunk[7]];
    let word = u32::from_le_bytes(data);

    let name = names
        .get(name_id)
        .ok_or_else(|| {
            ReplayError::bad_tree(format!(
                "param {index}: name id {name_id} out of range {}",
                names.len()
            ))
        })?
        .clone();

    let heap_at = |off: usize, len: usize| -> Result<&[u8]> {
        heap.get(off..off + len).ok_or_else(|| {
            ReplayError::bad_tree(format!("param {index}: heap offset {off}+{len} out of bounds"))
        })
    };
    let f32_at = |b: &[u8], off: usize| f32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]]);
    let i32_at = |b: &[u8], off: usize| i32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]]);

    let value = match type_id {
        TYPE_STRING => {
            let in_name_table = word >> 31 == 1;
            let off = (word & 0x7FFF_FFFF) as usize;
            if in_name_table {
                let s = names.get(off).ok_or_else(|| {
                    ReplayError::bad_tree(format!(
                        "param {index}: string name offset {off} out of range"
                    ))
                })?;
                BlkValue::Str(s.clone())
            } else {
                let rest = heap.get(off..).ok_or_else(|| {
                    ReplayError::bad_tree(format!(
                        "param {index}: string heap offset {off} out of bounds"
                    ))
                })?;
                let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
                    ReplayError::bad_tree(format!("param {index}: unterminated string"))
                })?;
                BlkValue::Str(String::from_utf8_lossy(&rest[..end]).into_owned())
            }
        }
        TYPE_INT => BlkValue::Int(i32::from_le_bytes(data)),
        TYPE_FLOAT => BlkValue::Float(f32::from_le_bytes(data)),
        TYPE_FLOAT2 => {
            let b = heap_at(word as usize, 8)?;
            BlkValue::Float2([f32_at(b, 0), f32_at(b, 4)])
        }
        TYPE_FLOAT3 => {
            let b = heap_at(word as usize, 12)?;
            BlkValue::Float3([f32_at(b, 0), f32_at(b, 4), f32_at(b, 8)])
        }
        TYPE_FLOAT4 => {
            let b = heap_at(word as usize, 16)?;
            BlkValue::Float4([f32_at(b, 0), f32_at(b, 4), f32_at(b, 8), f32_at(b, 12)])
        }
        TYPE_INT2 => {
            let b = heap_at(word as usize, 8)?;
            BlkValue::Int2([i32_at(b, 0), i32_at(b, 4)])
        }
        TYPE_INT3 => {
            let b = heap_at(word as usize, 12)?;
            BlkValue::Int3([i32_at(b, 0), i32_at(b, 4), i32_at(b, 8)])
        }
        TYPE_BOOL => BlkValue::Bool(word != 0),
        TYPE_COLOR => BlkValue::Color(data),
        TYPE_FLOAT12 => {
            let b = heap_at(word as usize, 48)?;
            let mut rows = [[0f32; 3]; 4];
            for (r, row) in rows.iter_mut().enumerate() {
                let base = r * 12;
                *row = [f32_at(b, base), f32_at(b, base + 4), f32_at(b, base + 8)];
            }
            BlkValue::Float12(rows)
        }
        TYPE_LONG => {
            let b = heap_at(word as usize, 8)?;
            BlkValue::Long(i64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        }
        TYPE_INT4 => {
            let b = heap_at(word as usize, 16)?;
            BlkValue::Int4([i32_at(b, 0), i32_at(b, 4), i32_at(b, 8), i32_at(b, 12)])
        }
        other => {
            return Err(ReplayError::bad_tree(format!(
                "param {index}: unknown type id 0x{other:02x}"
            )))
        }
    };
    Ok((name, value))
}

/// Reads a ULEB128 value at `pos`, advancing it.
fn read_uleb(buf: &[u8], pos: &mut usize, what: &str) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let Some(&byte) = buf.get(*pos) else {
            return Err(ReplayError::bad_tree(format!("{what}: buffer too small")));
        };
        *pos += 1;
        if shift > 63 {
            return Err(ReplayError::bad_tree(format!("{what}: varint overflow")));
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Takes a length-checked section at `pos`, advancing it.
fn section<'a>(buf: &'a [u8], pos: &mut usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let Some(slice) = buf.get(*pos..*pos + len) else {
        return Err(ReplayError::bad_tree(format!("{what} truncated")));
    };
    *pos += len;
    Ok(slice)
}

/// Splits the NUL-separated name table; a trailing unterminated run is
/// ignored.
fn split_names(raw: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut start = 0;
    for (i, &b) in raw.iter().enumerate() {
        if b == 0 {
            names.push(String::from_utf8_lossy(&raw[start..i]).into_owned());
            start = i + 1;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A small builder for FAT fixtures: names, param heap, param
    /// descriptors and block descriptors are assembled independently
    /// and concatenated.
    #[derive(Default)]
    struct FatBuilder {
        names: Vec<String>,
        heap: Vec<u8>,
        descriptors: Vec<u8>,
        param_count: usize,
        blocks: Vec<u8>,
        block_count: usize,
    }

    impl FatBuilder {
        fn name_id(&mut self, name: &str) -> usize {
            if let Some(i) = self.names.iter().position(|n| n == name) {
                i
            } else {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        }

        fn param(&mut self, name: &str, type_id: u8, data: [u8; 4]) -> &mut Self {
            let id = self.name_id(name);
            self.descriptors.push(id as u8);
            self.descriptors.push((id >> 8) as u8);
            self.descriptors.push((id >> 16) as u8);
            self.descriptors.push(type_id);
            self.descriptors.extend_from_slice(&data);
            self.param_count += 1;
            self
        }

        fn heap_param(&mut self, name: &str, type_id: u8, payload: &[u8]) -> &mut Self {
            let off = self.heap.len() as u32;
            self.heap.extend_from_slice(payload);
            self.param(name, type_id, off.to_le_bytes())
        }

        /// Appends a block descriptor. `name_id` is the wire value
        /// (0 = root, otherwise name index + 1).
        fn block(&mut self, name_id: usize, fields: usize, children: usize, first: usize) -> &mut Self {
            self.blocks.push(name_id as u8);
            self.blocks.push(fields as u8);
            self.blocks.push(children as u8);
            if children > 0 {
                self.blocks.push(first as u8);
            }
            self.block_count += 1;
            self
        }

        fn build(&self) -> Vec<u8> {
            let mut names_raw = Vec::new();
            for n in &self.names {
                names_raw.extend_from_slice(n.as_bytes());
                names_raw.push(0);
            }
            let mut out = Vec::new();
            push_uleb(&mut out, self.names.len() as u64);
            push_uleb(&mut out, names_raw.len() as u64);
            out.extend_from_slice(&names_raw);
            push_uleb(&mut out, self.block_count as u64);
            push_uleb(&mut out, self.param_count as u64);
            push_uleb(&mut out, self.heap.len() as u64);
            out.extend_from_slice(&self.heap);
            out.extend_from_slice(&self.descriptors);
            out.extend_from_slice(&self.blocks);
            out
        }
    }

    fn push_uleb(out: &mut Vec<u8>, mut v: u64) {
        loop {
            let b = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                out.push(b);
                break;
            }
            out.push(b | 0x80);
        }
    }

    #[test]
    fn test_minimal_root_only() {
        let mut b = FatBuilder::default();
        b.block(0, 0, 0, 0);
        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.name, "root");
        assert!(root.is_empty());
    }

    #[test]
    fn test_inline_scalar_params() {
        let mut b = FatBuilder::default();
        b.param("count", TYPE_INT, (-7i32).to_le_bytes());
        b.param("speed", TYPE_FLOAT, 1.5f32.to_le_bytes());
        b.param("on", TYPE_BOOL, 1u32.to_le_bytes());
        b.param("tint", TYPE_COLOR, [10, 20, 30, 40]);
        b.block(0, 4, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.get("count"), Some(&BlkValue::Int(-7)));
        assert_eq!(root.get("speed"), Some(&BlkValue::Float(1.5)));
        assert_eq!(root.get("on"), Some(&BlkValue::Bool(true)));
        assert_eq!(root.get("tint"), Some(&BlkValue::Color([10, 20, 30, 40])));
    }

    #[test]
    fn test_string_in_name_table() {
        let mut b = FatBuilder::default();
        let idx = b.name_id("the_value") as u32;
        b.param("key", TYPE_STRING, (idx | 0x8000_0000).to_le_bytes());
        b.block(0, 1, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.get("key"), Some(&BlkValue::Str("the_value".into())));
    }

    #[test]
    fn test_string_in_heap() {
        let mut b = FatBuilder::default();
        b.heap_param("key", TYPE_STRING, b"inline\x00");
        b.block(0, 1, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.get("key"), Some(&BlkValue::Str("inline".into())));
    }

    #[test]
    fn test_heap_vectors() {
        let mut b = FatBuilder::default();
        let mut f3 = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            f3.extend_from_slice(&v.to_le_bytes());
        }
        b.heap_param("pos", TYPE_FLOAT3, &f3);

        let mut i4 = Vec::new();
        for v in [1i32, -2, 3, -4] {
            i4.extend_from_slice(&v.to_le_bytes());
        }
        b.heap_param("quad", TYPE_INT4, &i4);

        b.heap_param("big", TYPE_LONG, &(-5_000_000_000i64).to_le_bytes());
        b.block(0, 3, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.get("pos"), Some(&BlkValue::Float3([1.0, 2.0, 3.0])));
        assert_eq!(root.get("quad"), Some(&BlkValue::Int4([1, -2, 3, -4])));
        assert_eq!(root.get("big"), Some(&BlkValue::Long(-5_000_000_000)));
    }

    #[test]
    fn test_float12_rows() {
        let mut b = FatBuilder::default();
        let mut m = Vec::new();
        for v in 0..12 {
            m.extend_from_slice(&(v as f32).to_le_bytes());
        }
        b.heap_param("matrix", TYPE_FLOAT12, &m);
        b.block(0, 1, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        let BlkValue::Float12(rows) = root.get("matrix").unwrap() else {
            panic!("expected Float12");
        };
        assert_eq!(rows[0], [0.0, 1.0, 2.0]);
        assert_eq!(rows[3], [9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_duplicate_keys_promote() {
        let mut b = FatBuilder::default();
        b.param("dup", TYPE_INT, 1i32.to_le_bytes());
        b.param("dup", TYPE_INT, 2i32.to_le_bytes());
        b.block(0, 2, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        let list = root.get("dup").and_then(BlkValue::as_list).unwrap();
        assert_eq!(list, &[BlkValue::Int(1), BlkValue::Int(2)]);
    }

    #[test]
    fn test_triple_duplicate_keys() {
        let mut b = FatBuilder::default();
        b.param("dup", TYPE_INT, 1i32.to_le_bytes());
        b.param("dup", TYPE_INT, 2i32.to_le_bytes());
        b.param("dup", TYPE_INT, 3i32.to_le_bytes());
        b.block(0, 3, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        let list = root.get("dup").and_then(BlkValue::as_list).unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_nested_blocks_consume_shared_param_cursor() {
        let mut b = FatBuilder::default();
        b.param("a", TYPE_INT, 1i32.to_le_bytes());
        b.param("b", TYPE_INT, 2i32.to_le_bytes());
        let child_name = b.name_id("child") + 1;
        // root: 1 field, 1 child (block 1); child: 1 field
        b.block(0, 1, 1, 1);
        b.block(child_name, 1, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        assert_eq!(root.get("a"), Some(&BlkValue::Int(1)));
        let child = root.get("child").and_then(BlkValue::as_block).unwrap();
        assert_eq!(child.name, "child");
        assert_eq!(child.get("b"), Some(&BlkValue::Int(2)));
    }

    #[test]
    fn test_grandchildren() {
        let mut b = FatBuilder::default();
        b.param("leaf", TYPE_INT, 9i32.to_le_bytes());
        let mid = b.name_id("mid") + 1;
        let deep = b.name_id("deep") + 1;
        b.block(0, 0, 1, 1);
        b.block(mid, 0, 1, 2);
        b.block(deep, 1, 0, 0);

        let root = parse_fat(&b.build()).unwrap();
        let mid = root.get("mid").and_then(BlkValue::as_block).unwrap();
        let deep = mid.get("deep").and_then(BlkValue::as_block).unwrap();
        assert_eq!(deep.get("leaf"), Some(&BlkValue::Int(9)));
    }

    #[test]
    fn test_backward_child_link_rejected() {
        let mut b = FatBuilder::default();
        let child = b.name_id("c") + 1;
        b.block(0, 0, 1, 1);
        b.block(child, 0, 1, 0); // points back at root

        assert!(matches!(
            parse_fat(&b.build()),
            Err(ReplayError::BadTreeHeader { .. })
        ));
    }

    #[test]
    fn test_heap_offset_out_of_bounds() {
        let mut b = FatBuilder::default();
        b.param("bad", TYPE_FLOAT3, 100u32.to_le_bytes()); // empty heap
        b.block(0, 1, 0, 0);

        assert!(matches!(
            parse_fat(&b.build()),
            Err(ReplayError::BadTreeHeader { .. })
        ));
    }

    #[test]
    fn test_unknown_param_type() {
        let mut b = FatBuilder::default();
        b.param("odd", 0x3F, [0; 4]);
        b.block(0, 1, 0, 0);

        assert!(matches!(
            parse_fat(&b.build()),
            Err(ReplayError::BadTreeHeader { .. })
        ));
    }

    #[test]
    fn test_truncated_sections() {
        // names_size claims more than available
        let bad = [0x00, 0x10];
        assert!(matches!(
            parse_fat(&bad),
            Err(ReplayError::BadTreeHeader { .. })
        ));
        // empty buffer
        assert!(matches!(
            parse_fat(&[]),
            Err(ReplayError::BadTreeHeader { .. })
        ));
    }
}
