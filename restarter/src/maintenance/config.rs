//! Loading of per-cluster maintenance window configuration

use super::window::{parse_timezone, parse_weekday, MaintenanceWindow, OrdinalDay};
use crate::constants::maintenance;
use crate::errors::ConfigError;
use crate::types::MinAvailability;
use chrono::{Duration, FixedOffset};
use glob::glob;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Everything known about one cluster's maintenance schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMaintenanceConfig {
    pub cluster_name: String,
    pub timezone: FixedOffset,
    pub min_window_duration: Duration,
    pub windows: Vec<MaintenanceWindow>,
    pub decommission_timeout_override: Option<u64>,
    pub min_availability_override: Option<MinAvailability>,
}

/// Maintenance configuration for all clusters, read-only once loaded
#[derive(Debug, Clone, Default)]
pub struct MaintenanceSchedule {
    clusters: HashMap<String, ClusterMaintenanceConfig>,
}

#[derive(Debug, Deserialize)]
struct ClusterMaintenanceFile {
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_min_window_duration")]
    min_window_duration: u32,
    dc_util_timeout: Option<u64>,
    min_availability: Option<String>,
    #[serde(default)]
    windows: Vec<WindowFile>,
}

#[derive(Debug, Deserialize)]
struct WindowFile {
    time: String,
    weekdays: Option<OneOrMany>,
    ordinal_days: Option<OneOrMany>,
    description: Option<String>,
}

/// Lists may also be written as a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn items(&self) -> Vec<String> {
        match self {
            OneOrMany::One(joined) => joined
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            OneOrMany::Many(items) => items.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

fn default_timezone() -> String {
    maintenance::DEFAULT_TIMEZONE.to_string()
}

fn default_min_window_duration() -> u32 {
    maintenance::DEFAULT_MIN_WINDOW_MINUTES
}

impl MaintenanceSchedule {
    /// Loads a single TOML file, or every `*.toml` file in a directory
    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).await.map_err(|e| ConfigError::LoadFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut schedule = Self::default();

        if metadata.is_dir() {
            let pattern = format!("{}/*.toml", path.trim_end_matches('/'));
            let entries = glob(&pattern).map_err(|e| ConfigError::LoadFailed {
                path: pattern.clone(),
                reason: e.to_string(),
            })?;

            for entry in entries {
                let file = entry.map_err(|e| ConfigError::LoadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
                debug!("Loading maintenance config: {}", file.display());
                schedule.merge(Self::load_file(&file).await?);
            }
        } else {
            schedule.merge(Self::load_file(Path::new(path)).await?);
        }

        info!(
            "Loaded maintenance windows for {} cluster(s) from {}",
            schedule.clusters.len(),
            path
        );
        Ok(schedule)
    }

    async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, ClusterMaintenanceFile> =
            toml::from_str(content).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?;

        let mut clusters = HashMap::new();
        for (cluster_name, file) in raw {
            let config = Self::build_cluster(&cluster_name, file)?;
            clusters.insert(cluster_name, config);
        }

        Ok(Self { clusters })
    }

    fn build_cluster(
        cluster_name: &str,
        file: ClusterMaintenanceFile,
    ) -> Result<ClusterMaintenanceConfig, ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::InvalidValue {
            field: format!("{}.{}", cluster_name, field),
            reason,
        };

        let timezone = parse_timezone(&file.timezone).map_err(|e| invalid("timezone", e))?;

        let min_availability_override = file
            .min_availability
            .as_deref()
            .map(str::parse::<MinAvailability>)
            .transpose()
            .map_err(|e| invalid("min_availability", e))?;

        if file.dc_util_timeout == Some(0) {
            return Err(invalid(
                "dc_util_timeout",
                "must be greater than zero".to_string(),
            ));
        }

        let mut windows = Vec::with_capacity(file.windows.len());
        for (idx, window) in file.windows.into_iter().enumerate() {
            let field = format!("windows[{}]", idx);
            let (start, end) =
                MaintenanceWindow::parse_range(&window.time).map_err(|e| invalid(&field, e))?;

            let weekdays = window
                .weekdays
                .map(|w| w.items())
                .unwrap_or_default()
                .iter()
                .map(|day| parse_weekday(day))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(&field, e))?;

            let ordinal_days = window
                .ordinal_days
                .map(|o| o.items())
                .unwrap_or_default()
                .iter()
                .map(|day| day.parse::<OrdinalDay>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(&field, e))?;

            windows.push(MaintenanceWindow {
                start,
                end,
                weekdays,
                ordinal_days,
                description: window.description,
            });
        }

        Ok(ClusterMaintenanceConfig {
            cluster_name: cluster_name.to_string(),
            timezone,
            min_window_duration: Duration::minutes(i64::from(file.min_window_duration)),
            windows,
            decommission_timeout_override: file.dc_util_timeout,
            min_availability_override,
        })
    }

    fn merge(&mut self, other: MaintenanceSchedule) {
        self.clusters.extend(other.clusters);
    }

    pub fn for_cluster(&self, cluster_name: &str) -> Option<&ClusterMaintenanceConfig> {
        self.clusters.get(cluster_name)
    }

    pub fn cluster_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clusters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Commented starting point for a maintenance file covering `cluster_names`
    pub fn sample_toml(cluster_names: &[&str]) -> String {
        let mut out = String::from(
            "# Maintenance windows per cluster. Clusters without an entry may restart at any time.\n\
             # timezone: \"UTC\", \"Z\", \"+02:00\" or \"UTC-05:30\"\n\
             # min_window_duration: minutes that must remain in a window before a restart starts\n",
        );

        for name in cluster_names {
            out.push_str(&format!(
                "\n[{name}]\n\
                 timezone = \"UTC\"\n\
                 min_window_duration = {min}\n\
                 # dc_util_timeout = 900\n\
                 # min_availability = \"PRIMARIES\"\n\
                 \n\
                 [[{name}.windows]]\n\
                 time = \"02:00-04:00\"\n\
                 weekdays = [\"sat\", \"sun\"]\n\
                 description = \"Weekend early morning\"\n\
                 \n\
                 [[{name}.windows]]\n\
                 time = \"23:00-01:00\"\n\
                 ordinal_days = [\"last fri\"]\n\
                 description = \"End of month\"\n",
                name = toml_key(name),
                min = maintenance::DEFAULT_MIN_WINDOW_MINUTES,
            ));
        }
        out
    }
}

/// Bare keys only allow ASCII letters, digits, `-` and `_`
fn toml_key(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    const SAMPLE: &str = r#"
[production-cluster]
timezone = "+02:00"
min_window_duration = 60
dc_util_timeout = 900
min_availability = "full"

[[production-cluster.windows]]
time = "02:00-04:00"
weekdays = "sat, sun"
description = "Weekend early morning maintenance"

[[production-cluster.windows]]
time = "23:00-01:00"
ordinal_days = ["last fri"]

[staging]
[[staging.windows]]
time = "18:00-24:00"
weekdays = ["mon"]
"#;

    #[test]
    fn test_parses_sample_schedule() {
        let schedule = MaintenanceSchedule::from_toml_str(SAMPLE).unwrap();
        assert_eq!(schedule.cluster_names(), vec!["production-cluster", "staging"]);

        let prod = schedule.for_cluster("production-cluster").unwrap();
        assert_eq!(prod.timezone.local_minus_utc(), 7200);
        assert_eq!(prod.min_window_duration, Duration::minutes(60));
        assert_eq!(prod.decommission_timeout_override, Some(900));
        assert_eq!(prod.min_availability_override, Some(MinAvailability::Full));
        assert_eq!(prod.windows[0].weekdays, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(prod.windows[1].ordinal_days.len(), 1);

        let staging = schedule.for_cluster("staging").unwrap();
        assert_eq!(staging.timezone.local_minus_utc(), 0);
        assert_eq!(staging.min_window_duration, Duration::minutes(30));
        assert_eq!(staging.decommission_timeout_override, None);
    }

    #[test]
    fn test_rejects_bad_time_range() {
        let err = MaintenanceSchedule::from_toml_str(
            "[c]\n[[c.windows]]\ntime = \"25:00-26:00\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "c.windows[0]"));
    }

    #[test]
    fn test_rejects_region_timezone() {
        let err = MaintenanceSchedule::from_toml_str("[c]\ntimezone = \"Europe/Berlin\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "c.timezone"));
    }

    #[test]
    fn test_generated_sample_parses() {
        let sample = MaintenanceSchedule::sample_toml(&["prod", "team.analytics"]);
        let schedule = MaintenanceSchedule::from_toml_str(&sample).unwrap();

        assert_eq!(schedule.cluster_names(), vec!["prod", "team.analytics"]);
        let prod = schedule.for_cluster("prod").unwrap();
        assert_eq!(prod.windows.len(), 2);
        assert_eq!(prod.min_window_duration, Duration::minutes(30));
        assert_eq!(prod.decommission_timeout_override, None);
    }
}
