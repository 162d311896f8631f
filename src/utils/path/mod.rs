//! Path utilities.
//!
//! - [`fs`]: the single canonical-path helper (`normalize_path`) plus
//!   relative-path and containment helpers
//! - [`copy`]: directory relocation and minimal copying

pub mod copy;
pub mod fs;

pub use fs::{
    forward_slashes, normalize_path, remove_if_empty_dir, remove_if_exists, safe_remove_if_exists,
};
