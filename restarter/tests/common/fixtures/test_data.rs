//! Common test data and constants

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 instant for testing
pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// Common test cluster identity
pub mod clusters {
    pub const NAME: &str = "prod";
    pub const NAMESPACE: &str = "db";
    pub const CRD: &str = "prod";
    pub const STATEFULSET: &str = "crate-data-hot-prod";
}

/// Common test pod names
pub mod pods {
    pub const POD_1: &str = "pod-1";
    pub const POD_2: &str = "pod-2";
    pub const POD_3: &str = "pod-3";

    pub const ALL: [&str; 3] = [POD_1, POD_2, POD_3];
}

/// Pre-stop commands
pub mod hooks {
    pub const MANAGED_SCRIPT: &str = "dc_util-linux-amd64 -min-availability PRIMARIES -timeout 720s";

    pub fn managed() -> Vec<String> {
        shell(MANAGED_SCRIPT)
    }

    pub fn plain_sleep() -> Vec<String> {
        shell("sleep 30")
    }

    pub fn shell(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }
}

/// Node suspension signals
pub mod suspension {
    pub const SUSPEND_ANNOTATION: &str = "node.kubernetes.io/suspend";
    pub const SPOT_TAINT: &str = "aws.amazon.com/spot-instance-terminating";
}
