//! Tree-blob ("BLK") decoding.
//!
//! Settings and results sections of a replay are serialized as tagged
//! binary trees: a recursive mapping from names to typed values or to
//! nested blocks. The first byte of a blob selects the serialization
//! variant:
//!
//! | Tag | Variant | Support |
//! |-----|---------|---------|
//! | `0x00` | BBF (legacy) | unsupported |
//! | `0x01` | FAT | decoded inline |
//! | `0x02` | FAT_ZSTD | zstd-inflated, then decoded as FAT |
//! | `0x03` | SLIM | unsupported (needs external name map) |
//! | `0x04` | SLIM_ZSTD | unsupported (needs external name map) |
//! | `0x05` | SLIM_ZSTD_DICT | unsupported (needs name map + dictionary) |
//!
//! The FAT layout itself is decoded by [`fat`]. Duplicate keys within a
//! block are legal on the wire and are preserved as an ordered
//! [`BlkValue::List`].

pub mod fat;

use indexmap::IndexMap;

use crate::error::{ReplayError, Result};

/// Variant tag for an inline FAT tree.
pub const TAG_FAT: u8 = 0x01;

/// Variant tag for a zstd-compressed FAT tree.
pub const TAG_FAT_ZSTD: u8 = 0x02;

/// A typed leaf or nested block inside a tree blob.
#[derive(Debug, Clone, PartialEq)]
pub enum BlkValue {
    /// UTF-8 string.
    Str(String),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// Two-component float vector.
    Float2([f32; 2]),
    /// Three-component float vector.
    Float3([f32; 3]),
    /// Four-component float vector.
    Float4([f32; 4]),
    /// 3x4 float matrix, presented as four rows of three.
    Float12([[f32; 3]; 4]),
    /// Two-component integer vector.
    Int2([i32; 2]),
    /// Three-component integer vector.
    Int3([i32; 3]),
    /// Four-component integer vector.
    Int4([i32; 4]),
    /// Boolean.
    Bool(bool),
    /// RGBA color, one byte per channel.
    Color([u8; 4]),
    /// A nested block.
    Block(BlkBlock),
    /// Ordered collection produced by duplicate keys.
    List(Vec<BlkValue>),
}

impl BlkValue {
    /// Returns the nested block if this value is one.
    #[must_use]
    pub fn as_block(&self) -> Option<&BlkBlock> {
        match self {
            BlkValue::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the string if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BlkValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the i32 if this value is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            BlkValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the list if this value is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[BlkValue]> {
        match self {
            BlkValue::List(v) => Some(v),
            _ => None,
        }
    }
}

/// A named block: an insertion-ordered mapping from field names to
/// values and child blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlkBlock {
    /// The block's own name; the root block is named `root`.
    pub name: String,
    entries: IndexMap<String, BlkValue>,
}

impl BlkBlock {
    /// Creates an empty block with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: IndexMap::new(),
        }
    }

    /// Inserts a value under `key`.
    ///
    /// When the key is already present the existing value transitions
    /// to an ordered [`BlkValue::List`] and the new value is appended;
    /// further duplicates keep appending.
    pub fn insert(&mut self, key: impl Into<String>, value: BlkValue) {
        let key = key.into();
        match self.entries.get_mut(&key) {
            Some(BlkValue::List(list)) => list.push(value),
            Some(existing) => {
                let prev = std::mem::replace(existing, BlkValue::List(Vec::new()));
                if let BlkValue::List(list) = existing {
                    list.push(prev);
                    list.push(value);
                }
            }
            None => {
                self.entries.insert(key, value);
            }
        }
    }

    /// Looks up a value by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BlkValue> {
        self.entries.get(key)
    }

    /// Returns an iterator over `(name, value)` entries in insertion
    /// order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BlkValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of distinct keys in this block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the block has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decodes a tree blob, dispatching on its variant tag.
///
/// # Errors
///
/// - [`ReplayError::BadTreeHeader`] for an empty buffer, an unknown
///   tag, a failed zstd inflate, or structural FAT errors
/// - [`ReplayError::Unsupported`] for the SLIM and legacy variants,
///   which need external data this decoder does not carry
pub fn parse_blk(input: &[u8]) -> Result<BlkBlock> {
    let Some(&tag) = input.first() else {
        return Err(ReplayError::bad_tree("empty blob"));
    };
    match tag {
        TAG_FAT => fat::parse_fat(&input[1..]),
        TAG_FAT_ZSTD => {
            if input.len() < 4 {
                return Err(ReplayError::bad_tree("zstd variant: truncated length"));
            }
            let len = (usize::from(input[1]) << 16) | (usize::from(input[2]) << 8) | usize::from(input[3]);
            let Some(compressed) = input.get(4..4 + len) else {
                return Err(ReplayError::bad_tree(format!(
                    "zstd variant: payload truncated, need {} have {}",
                    4 + len,
                    input.len()
                )));
            };
            let inflated = zstd::decode_all(compressed)
                .map_err(|e| ReplayError::bad_tree(format!("zstd inflate: {e}")))?;
            if inflated.first() != Some(&TAG_FAT) {
                return Err(ReplayError::bad_tree("zstd variant: inflated payload is not a FAT tree"));
            }
            fat::parse_fat(&inflated[1..])
        }
        0x03 => Err(ReplayError::Unsupported { variant: "SLIM" }),
        0x04 => Err(ReplayError::Unsupported { variant: "SLIM_ZSTD" }),
        0x05 => Err(ReplayError::Unsupported { variant: "SLIM_ZSTD_DICT" }),
        0x00 => Err(ReplayError::Unsupported { variant: "BBF" }),
        other => Err(ReplayError::bad_tree(format!("unknown variant tag 0x{other:02x}"))),
    }
}
