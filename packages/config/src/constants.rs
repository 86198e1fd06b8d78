// ABOUTME: Environment variable name constants and their defaults
// ABOUTME: Centralized definitions of all process-level settings read by Dockyard

// Database
pub const DOCKYARD_DATABASE_URL: &str = "DOCKYARD_DATABASE_URL";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://dockyard.db?mode=rwc";

// HTTP server
pub const DOCKYARD_BIND_ADDR: &str = "DOCKYARD_BIND_ADDR";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4100";

// Expiry sweeper
pub const DOCKYARD_SWEEP_INTERVAL_SECS: &str = "DOCKYARD_SWEEP_INTERVAL_SECS";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

// Per-owner cooldown shared by create, remove and renew
pub const DOCKYARD_RATE_LIMIT_SECS: &str = "DOCKYARD_RATE_LIMIT_SECS";
pub const DEFAULT_RATE_LIMIT_SECS: u64 = 60;

// Port allocation
pub const DOCKYARD_PORT_RANGE: &str = "DOCKYARD_PORT_RANGE";
pub const DEFAULT_PORT_RANGE_START: u16 = 10000;
pub const DEFAULT_PORT_RANGE_END: u16 = 50000;
pub const DOCKYARD_PORT_MAX_ATTEMPTS: &str = "DOCKYARD_PORT_MAX_ATTEMPTS";
pub const DEFAULT_PORT_MAX_ATTEMPTS: usize = 256;
pub const DOCKYARD_PORT_PROBE_TIMEOUT_MS: &str = "DOCKYARD_PORT_PROBE_TIMEOUT_MS";
pub const DEFAULT_PORT_PROBE_TIMEOUT_MS: u64 = 500;

// Container runtime transport
pub const DOCKYARD_DOCKER_TIMEOUT_SECS: &str = "DOCKYARD_DOCKER_TIMEOUT_SECS";
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;
