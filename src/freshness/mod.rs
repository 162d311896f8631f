//! Freshness detection: blake3 content hashes and modification times.
//!
//! Content hashes back freeze validity and the watcher's input filter;
//! both hashes and mtimes feed the preview render hash.

mod hash;
pub mod mtime;

pub use hash::{ContentHash, hash_bytes, hash_file, hash_text_lf};
pub use mtime::{get_mtime, mtime_millis};
