/// Application name
pub const APP_NAME: &str = "Courier";

/// Record id size in bytes (rendered as 24 hex chars)
pub const RECORD_ID_LEN: usize = 12;

/// Maximum message content size in bytes (64 KiB)
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// History page size when the caller does not supply one
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Per-connection outbound queue capacity
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// WebSocket keep-alive ping interval in seconds
pub const DEFAULT_WS_PING_INTERVAL_SECS: u64 = 30;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Avatar assigned to new users and groups that do not supply one
pub const DEFAULT_AVATAR: &str = "/static/avatar-default.png";
