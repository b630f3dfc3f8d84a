// # Gateway configuration
//
// Operational knobs for the resolver's group-walk bound, the predicate
// builder's extension namespaces, and the audit sink's buffering, mirroring
// the `Config`/`AuditLoggerConfig` pattern used throughout the reference
// catalog.

use std::time::Duration;

/// Canonical extension URI the predicate builder registers comparison
/// functions under.
pub const COMPARISON_EXTENSION_URI: &str = "https://lakeguard.dev/extensions/functions_comparison.yaml";

/// Canonical extension URI boolean combinators (`and:bool?`) live under
///.
pub const BOOLEAN_EXTENSION_URI: &str = "https://lakeguard.dev/extensions/functions_boolean.yaml";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum BFS depth when walking the group-membership graph.
    /// Bounds resolution cost against pathological group configurations.
    pub max_group_depth: usize,

    /// Number of audit entries buffered before a forced flush.
    pub audit_buffer_size: usize,

    /// Interval between background audit flushes.
    pub audit_flush_interval: Duration,

    /// Number of best-effort retries for a single audit write before the
    /// entry is dropped and logged.
    pub audit_write_retries: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_group_depth: 64,
            audit_buffer_size: 256,
            audit_flush_interval: Duration::from_secs(2),
            audit_write_retries: 3,
        }
    }
}
