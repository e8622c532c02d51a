//! # Persistence Formats
//!
//! Encodings of group data at rest. Pure transformations, no I/O.

pub mod blob;

pub use blob::{BlobElements, decode_blob, encode_blob, normalize_values};
