//! The binary layout of a serialized bag.
//!
//! ```text
//! [file_id: i64][root_page_index: i64][root_page_offset: i32][legacy_size: i32]
//! [change_count: i32][change_count x ([rid: i16 + i64][tag: u8][value: i32])]
//! ```
//!
//! All integers are big-endian. A `file_id` of `-1` encodes a bag which has no tree yet.
//! `legacy_size` is kept for compatibility with old readers and is ignored when decoding.

use alloc::vec::Vec;
use core::fmt;

use crate::{
    change::{Change, CHANGE_SIZE},
    pointer::{BucketPointer, CollectionPointer},
    rid::{Rid, RID_SIZE},
};

/// The number of bytes taken by the pointer, the legacy size and the change count.
pub const HEADER_SIZE: usize = 8 + 8 + 4 + 4 + 4;

/// The number of bytes taken by `n` inline changes, excluding the count itself.
pub const fn changes_size(n: usize) -> usize {
    n * (RID_SIZE + CHANGE_SIZE)
}

/// An error encountered while decoding a serialized bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended before the named field could be read.
    UnexpectedEof { field: &'static str },
    /// A change carried a tag which is neither relative nor absolute.
    UnknownChangeTag(u8),
    /// The change count was negative.
    NegativeChangeCount(i32),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { field } => {
                write!(f, "unexpected end of input while reading {field}")
            }
            DecodeError::UnknownChangeTag(tag) => write!(f, "unknown change tag {tag}"),
            DecodeError::NegativeChangeCount(n) => write!(f, "negative change count {n}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// A bag as read back from its serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBag {
    /// `None` when the bag had no tree.
    pub pointer: Option<CollectionPointer>,
    /// Inline changes in the order they were written.
    pub changes: Vec<(Rid, Change)>,
}

/// Append a serialized bag to `buf`.
///
/// Returns the number of bytes written.
pub fn encode(
    pointer: Option<&CollectionPointer>,
    legacy_size: i32,
    changes: impl IntoIterator<Item = (Rid, Change)>,
    buf: &mut Vec<u8>,
) -> usize {
    let start = buf.len();
    let pointer = pointer.copied().unwrap_or(CollectionPointer::INVALID);

    buf.extend_from_slice(&pointer.file_id.to_be_bytes());
    buf.extend_from_slice(&pointer.root.page_index.to_be_bytes());
    buf.extend_from_slice(&pointer.root.page_offset.to_be_bytes());
    buf.extend_from_slice(&legacy_size.to_be_bytes());

    // the count is patched in once the changes have been written.
    let count_at = buf.len();
    buf.extend_from_slice(&0i32.to_be_bytes());

    let mut count: i32 = 0;
    for (rid, change) in changes {
        rid.encode_into(buf);
        buf.push(change.tag());
        buf.extend_from_slice(&change.value().to_be_bytes());
        count += 1;
    }
    buf[count_at..count_at + 4].copy_from_slice(&count.to_be_bytes());

    buf.len() - start
}

/// Decode a serialized bag from the front of `bytes`.
///
/// Returns the bag and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(DecodedBag, usize), DecodeError> {
    let mut reader = Reader { bytes, offset: 0 };

    let file_id = i64::from_be_bytes(reader.read_array("file id")?);
    let page_index = i64::from_be_bytes(reader.read_array("root page index")?);
    let page_offset = i32::from_be_bytes(reader.read_array("root page offset")?);
    let _legacy_size = i32::from_be_bytes(reader.read_array("legacy size")?);

    let pointer = if file_id == CollectionPointer::INVALID.file_id {
        None
    } else {
        Some(CollectionPointer::new(
            file_id,
            BucketPointer::new(page_index, page_offset),
        ))
    };

    let count = i32::from_be_bytes(reader.read_array("change count")?);
    if count < 0 {
        return Err(DecodeError::NegativeChangeCount(count));
    }

    // the count is untrusted. never reserve more than the remaining input can hold.
    let fits = reader.remaining() / changes_size(1);
    let mut changes = Vec::with_capacity(fits.min(count as usize));
    for _ in 0..count {
        let rid = Rid::decode(&reader.read_array("change key")?);
        let [tag] = reader.read_array::<1>("change tag")?;
        let value = i32::from_be_bytes(reader.read_array("change value")?);
        let change = Change::from_tag(tag, value).ok_or(DecodeError::UnknownChangeTag(tag))?;
        changes.push((rid, change));
    }

    Ok((DecodedBag { pointer, changes }, reader.offset))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let end = self.offset + N;
        let Some(slice) = self.bytes.get(self.offset..end) else {
            return Err(DecodeError::UnexpectedEof { field });
        };
        let mut out = [0; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Ok(out)
    }
}
