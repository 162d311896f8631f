//! `[serve]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 4848                 # HTTP port number
//! watch-inputs = true         # Re-render inputs when they are saved
//! browse = true               # Open a browser once serving
//! timeout = 0                 # Stop this many seconds after the last client leaves
//! ```

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Preview server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServeConfig {
    /// Network interface to bind.
    pub interface: IpAddr,

    pub port: u16,

    /// Re-render input files on change (otherwise only reload clients).
    pub watch_inputs: bool,

    pub browse: bool,

    /// Seconds without connected clients before the server stops (0 = never).
    pub timeout: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 4848,
            watch_inputs: true,
            browse: true,
            timeout: 0,
        }
    }
}
