//! Shared utilities: process execution, paths, MIME types and HTML escaping.

pub mod exec;
pub mod html;
pub mod mime;
pub mod path;
