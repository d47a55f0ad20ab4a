//! Pointers to the bonsai trees backing large bags.

use core::fmt;

/// The location of a bucket within a tree file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct BucketPointer {
    pub page_index: i64,
    pub page_offset: i32,
}

impl BucketPointer {
    pub const NULL: BucketPointer = BucketPointer {
        page_index: -1,
        page_offset: -1,
    };

    pub const fn new(page_index: i64, page_offset: i32) -> Self {
        BucketPointer {
            page_index,
            page_offset,
        }
    }
}

/// Addresses one bonsai tree: the file it is stored in and the bucket holding its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct CollectionPointer {
    pub file_id: i64,
    pub root: BucketPointer,
}

impl CollectionPointer {
    /// Written in place of a pointer when the bag has no tree yet.
    pub const INVALID: CollectionPointer = CollectionPointer {
        file_id: -1,
        root: BucketPointer::NULL,
    };

    pub const fn new(file_id: i64, root: BucketPointer) -> Self {
        CollectionPointer { file_id, root }
    }

    pub fn is_valid(&self) -> bool {
        self.file_id >= 0
    }
}

impl fmt::Display for CollectionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file {} root {}:{}",
            self.file_id, self.root.page_index, self.root.page_offset
        )
    }
}
