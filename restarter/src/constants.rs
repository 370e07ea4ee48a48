//! Central repository for timeouts, retry budgets and naming conventions
//!
//! Constants are grouped by the component that owns them so that the
//! rolling-restart rules live in one place.

use std::time::Duration;

/// Health gate retry budgets and backoff shape
pub mod health {
    use super::Duration;

    /// Retry budget while the cluster reports YELLOW
    pub const YELLOW_MAX_ATTEMPTS: u32 = 30;
    pub const YELLOW_BASE_DELAY: Duration = Duration::from_secs(10);

    /// Retry budget while the cluster reports RED
    pub const RED_MAX_ATTEMPTS: u32 = 30;
    pub const RED_BASE_DELAY: Duration = Duration::from_secs(15);

    /// Retry budget while the cluster health cannot be determined
    pub const UNKNOWN_MAX_ATTEMPTS: u32 = 20;
    pub const UNKNOWN_BASE_DELAY: Duration = Duration::from_secs(5);

    /// Retry budget while the cluster cannot be reached at all
    pub const UNREACHABLE_MAX_ATTEMPTS: u32 = 30;
    pub const UNREACHABLE_BASE_DELAY: Duration = Duration::from_secs(10);

    /// Upper bound on a single backoff step before jitter is added
    pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

    /// Exponent cap applied to the attempt counter
    pub const MAX_EXPONENT: u32 = 10;

    /// Jitter factor is `JITTER_BASE + (attempt % JITTER_CYCLE) * JITTER_STEP`
    pub const JITTER_BASE: f64 = 0.10;
    pub const JITTER_STEP: f64 = 0.02;
    pub const JITTER_CYCLE: u32 = 10;

    /// Hard cap on polls for a single gate, across status changes
    pub const MAX_TOTAL_POLLS: u32 = 120;

    /// Query returning the most severe table health, no rows means GREEN
    pub const HEALTH_QUERY: &str = "SELECT health FROM sys.health ORDER BY severity DESC LIMIT 1";
}

/// Decommission timeouts and administrative statements
pub mod decommission {
    use super::Duration;

    /// Hook timeout assumed when the hook does not declare one (seconds)
    pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 720;

    /// Upper bound for a manual decommission (seconds)
    pub const MANUAL_TIMEOUT_SECS: u64 = 1200;

    /// Added to the hook timeout to form the deletion grace period
    pub const MANAGED_GRACE_BUFFER_SECS: u64 = 60;

    /// Deletion grace period after a manual decommission
    pub const MANUAL_GRACE_PERIOD_SECS: u64 = 30;

    /// Interval between checks for the database process exit
    pub const PROCESS_EXIT_POLL: Duration = Duration::from_secs(5);

    /// Number of routing reset attempts before giving up
    pub const ROUTING_RESET_ATTEMPTS: u32 = 5;

    /// Waits between routing reset attempts (seconds)
    pub const ROUTING_RESET_BACKOFF_SECS: [u64; 4] = [15, 30, 45, 60];

    /// Node-name prefix used in `ALTER CLUSTER DECOMMISSION`
    pub const NODE_NAME_PREFIX: &str = "data-hot";

    /// Name of the database container inside every pod
    pub const DATABASE_CONTAINER: &str = "crate";

    /// Substrings that identify a platform-managed decommission hook
    pub const HOOK_MARKERS: [&str; 5] = ["dc_util", "dc-util", "dcutil", "decommission", "decomm"];

    pub const RESET_ROUTING_STATEMENT: &str =
        r#"set global transient "cluster.routing.allocation.enable" = "all""#;
}

/// Replacement pod readiness
pub mod pod {
    use super::Duration;

    /// Extra readiness budget added on top of the deletion grace period (seconds)
    pub const READY_TIMEOUT_SECS: u64 = 300;

    pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(10);

    /// A pod must stay Ready for this long before it counts
    pub const READY_STABILITY: Duration = Duration::from_secs(20);
}

/// Maintenance window evaluation
pub mod maintenance {
    use super::Duration;

    /// Re-evaluation interval while waiting for a window
    pub const RECHECK_INTERVAL: Duration = Duration::from_secs(300);

    /// How far ahead the next-window search looks (days)
    pub const SEARCH_HORIZON_DAYS: i64 = 35;

    pub const DEFAULT_MIN_WINDOW_MINUTES: u32 = 30;

    pub const DEFAULT_TIMEZONE: &str = "UTC";
}

/// Run orchestration
pub mod orchestrator {
    use super::Duration;

    /// Pause between consecutive pod restarts
    pub const STABILIZATION_DELAY: Duration = Duration::from_secs(5);

    /// Longest a paused run waits for a resume before failing
    pub const MAX_PAUSE: Duration = Duration::from_secs(24 * 60 * 60);

    pub const DEFAULT_MAX_CONCURRENT_CLUSTERS: usize = 1;
}

/// Custom resource coordinates of the managed database clusters
pub mod crd {
    pub const GROUP: &str = "cloud.crate.io";
    pub const VERSION: &str = "v1";
    pub const KIND: &str = "CrateDB";
    pub const PLURAL: &str = "cratedbs";
}
