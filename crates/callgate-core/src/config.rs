//! Centralized configuration for callgate.
//!
//! Constants shared by the router, the wire transport and the status
//! translator. Runtime options (bind address, node identity, codec) live next
//! to the code that consumes them.

use std::time::Duration;

/// Wire transport configuration.
pub struct WireConfig;

impl WireConfig {
    /// Port every derived endpoint (`{service}-{version}:5000`) listens on.
    pub const ENDPOINT_PORT: u16 = 5000;
    pub const DEFAULT_BIND_HOST: &'static str = "0.0.0.0";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const MAX_HEAD_SIZE: usize = 64 * 1024;
    /// Failure details are cut to this many bytes when a reply head would
    /// otherwise exceed `MAX_HEAD_SIZE`.
    pub const MAX_FAILURE_DETAILS: usize = 4 * 1024;
    pub const MAX_CONNECTIONS: usize = 1024;
}

/// Status translation configuration.
pub struct StatusConfig;

impl StatusConfig {
    /// Codes at or below this value are treated as wire status codes already
    /// assigned by application code; anything above is an application code
    /// (typically HTTP-like) that goes through the translation table.
    pub const RESERVED_CODE_CEILING: i32 = 20;
}
