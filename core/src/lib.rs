//! Core types of the RidBag multiset.
//!
//! This crate defines the record identifiers stored in a bag, the pending multiplicity changes
//! kept in memory on top of the backing tree, the pointer addressing that tree, and the binary
//! layout a bag is written in, independent of any storage backend.
//!
//! The types and the codec do not require the standard library, but do require Rust's alloc
//! crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod change;
pub mod pointer;
pub mod rid;
pub mod wire;

pub use change::Change;
pub use pointer::{BucketPointer, CollectionPointer};
pub use rid::Rid;
