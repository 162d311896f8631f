//! Core process state shared across render and preview.

mod session;
mod state;

pub use session::{BuildSession, ProfileObserver};
pub use state::{is_shutdown, register_server, request_shutdown, setup_shutdown_handler};
