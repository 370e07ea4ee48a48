//! Decides whether a cluster may be restarted right now

use super::config::{ClusterMaintenanceConfig, MaintenanceSchedule};
use crate::constants::maintenance;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceDecision {
    Proceed {
        reason: String,
    },
    Wait {
        next_window_start: Option<DateTime<Utc>>,
        reason: String,
    },
}

impl MaintenanceDecision {
    pub fn should_proceed(&self) -> bool {
        matches!(self, MaintenanceDecision::Proceed { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            MaintenanceDecision::Proceed { reason } | MaintenanceDecision::Wait { reason, .. } => {
                reason
            }
        }
    }
}

enum ScheduleSource {
    NotConfigured,
    Loaded(MaintenanceSchedule),
    Unavailable(String),
}

/// Gate consulted before a run touches any pod
pub struct MaintenanceWindowChecker {
    source: ScheduleSource,
}

impl MaintenanceWindowChecker {
    /// Loads the schedule at `path`. Load failures are logged and fail open.
    pub async fn load(path: Option<&str>) -> Self {
        let source = match path {
            None => ScheduleSource::NotConfigured,
            Some(path) => match MaintenanceSchedule::load(path).await {
                Ok(schedule) => ScheduleSource::Loaded(schedule),
                Err(e) => {
                    warn!("Maintenance configuration unavailable, restarts are not restricted: {}", e);
                    ScheduleSource::Unavailable(e.to_string())
                }
            },
        };
        Self { source }
    }

    pub fn from_schedule(schedule: MaintenanceSchedule) -> Self {
        Self {
            source: ScheduleSource::Loaded(schedule),
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            source: ScheduleSource::NotConfigured,
        }
    }

    pub fn cluster_config(&self, cluster_name: &str) -> Option<&ClusterMaintenanceConfig> {
        match &self.source {
            ScheduleSource::Loaded(schedule) => schedule.for_cluster(cluster_name),
            _ => None,
        }
    }

    pub fn check(&self, cluster_name: &str, now: DateTime<Utc>) -> MaintenanceDecision {
        match &self.source {
            ScheduleSource::NotConfigured => MaintenanceDecision::Proceed {
                reason: "No maintenance configuration provided".to_string(),
            },
            ScheduleSource::Unavailable(error) => MaintenanceDecision::Proceed {
                reason: format!("Maintenance configuration could not be loaded ({})", error),
            },
            ScheduleSource::Loaded(schedule) => match schedule.for_cluster(cluster_name) {
                Some(config) => evaluate(config, &now),
                None => MaintenanceDecision::Proceed {
                    reason: format!("No maintenance windows configured for cluster '{}'", cluster_name),
                },
            },
        }
    }
}

/// Evaluates one cluster's windows at `now`
pub fn evaluate<Tz: TimeZone>(config: &ClusterMaintenanceConfig, now: &DateTime<Tz>) -> MaintenanceDecision {
    if config.windows.is_empty() {
        return MaintenanceDecision::Proceed {
            reason: format!("No maintenance windows defined for cluster '{}'", config.cluster_name),
        };
    }

    let local = now.with_timezone(&config.timezone);
    let mut too_short: Option<(String, Duration)> = None;

    if let Some((label, end)) = current_window(config, &local) {
        let remaining = end - local;
        if remaining >= config.min_window_duration {
            return MaintenanceDecision::Proceed {
                reason: format!(
                    "Inside maintenance {} with {} minutes remaining",
                    label,
                    remaining.num_minutes()
                ),
            };
        }
        debug!(
            "Maintenance {} for {} ends in {} minutes, below the required {}",
            label,
            config.cluster_name,
            remaining.num_minutes(),
            config.min_window_duration.num_minutes()
        );
        too_short = Some((label, remaining));
    }

    match next_window_start(config, &local) {
        Some((start, label)) => {
            let reason = match too_short {
                Some((current, remaining)) => format!(
                    "Only {} minutes left in maintenance {} (need {}); next is {} at {}",
                    remaining.num_minutes(),
                    current,
                    config.min_window_duration.num_minutes(),
                    label,
                    start.to_rfc3339()
                ),
                None => format!(
                    "Outside maintenance windows; next is {} at {}",
                    label,
                    start.to_rfc3339()
                ),
            };
            MaintenanceDecision::Wait {
                next_window_start: Some(start.with_timezone(&Utc)),
                reason,
            }
        }
        None => MaintenanceDecision::Wait {
            next_window_start: None,
            reason: format!(
                "No maintenance window for cluster '{}' within the next {} days",
                config.cluster_name,
                maintenance::SEARCH_HORIZON_DAYS
            ),
        },
    }
}

/// Parses an instant that must carry an explicit offset
pub fn parse_instant(raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
        format!(
            "'{}' is not an RFC 3339 instant with an explicit offset: {}",
            raw, e
        )
    })
}

/// The open window with the most time left, with its end instant
pub fn current_window(
    config: &ClusterMaintenanceConfig,
    local: &DateTime<FixedOffset>,
) -> Option<(String, DateTime<FixedOffset>)> {
    let today = local.date_naive();
    let mut best: Option<(String, DateTime<FixedOffset>)> = None;

    for window in &config.windows {
        // Windows that cross midnight are anchored on the day they start
        for day in [today.pred_opt(), Some(today)].into_iter().flatten() {
            let Some((start, end)) = window.occurrence_on(day, &config.timezone) else {
                continue;
            };
            if start <= *local && *local < end && best.as_ref().map_or(true, |(_, b)| end > *b) {
                best = Some((window.label(), end));
            }
        }
    }

    best
}

/// Earliest usable window start strictly after `local`
pub fn next_window_start(
    config: &ClusterMaintenanceConfig,
    local: &DateTime<FixedOffset>,
) -> Option<(DateTime<FixedOffset>, String)> {
    let horizon = *local + Duration::days(maintenance::SEARCH_HORIZON_DAYS);
    let today = local.date_naive();
    let mut best: Option<(DateTime<FixedOffset>, String)> = None;

    for window in &config.windows {
        if window.duration() < config.min_window_duration {
            info!(
                "Maintenance {} for {} is shorter than the required {} minutes and is never usable",
                window.label(),
                config.cluster_name,
                config.min_window_duration.num_minutes()
            );
            continue;
        }

        let found = (0..=maintenance::SEARCH_HORIZON_DAYS)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter_map(|day| window.occurrence_on(day, &config.timezone))
            .map(|(start, _)| start)
            .find(|start| start > local && *start <= horizon);

        if let Some(start) = found {
            if best.as_ref().map_or(true, |(earliest, _)| start < *earliest) {
                best = Some((start, window.label()));
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::window::MaintenanceWindow;
    use chrono::Weekday;

    fn config(windows: Vec<MaintenanceWindow>, min_minutes: i64) -> ClusterMaintenanceConfig {
        ClusterMaintenanceConfig {
            cluster_name: "test".to_string(),
            timezone: FixedOffset::east_opt(0).unwrap(),
            min_window_duration: Duration::minutes(min_minutes),
            windows,
            decommission_timeout_override: None,
            min_availability_override: None,
        }
    }

    fn window(range: &str, weekdays: Vec<Weekday>) -> MaintenanceWindow {
        let (start, end) = MaintenanceWindow::parse_range(range).unwrap();
        MaintenanceWindow {
            start,
            end,
            weekdays,
            ordinal_days: vec![],
            description: None,
        }
    }

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        parse_instant(rfc3339).unwrap()
    }

    #[test]
    fn test_naive_instants_are_rejected() {
        assert!(parse_instant("2024-01-15T19:30:00").is_err());
        assert!(parse_instant("2024-01-15T19:30:00+01:00").is_ok());
    }

    #[test]
    fn test_empty_window_list_proceeds() {
        let decision = evaluate(&config(vec![], 30), &at("2024-01-15T12:00:00Z"));
        assert!(decision.should_proceed());
    }

    #[test]
    fn test_wait_reports_next_start() {
        let cfg = config(vec![window("18:00-24:00", vec![Weekday::Mon])], 30);
        let decision = evaluate(&cfg, &at("2024-01-16T10:00:00Z"));

        match decision {
            MaintenanceDecision::Wait { next_window_start, .. } => {
                assert_eq!(
                    next_window_start.unwrap().to_rfc3339(),
                    "2024-01-22T18:00:00+00:00"
                );
            }
            other => panic!("expected wait, got {:?}", other),
        }
    }

    #[test]
    fn test_windows_shorter_than_minimum_are_never_scheduled() {
        let cfg = config(vec![window("10:00-10:20", vec![])], 30);
        let decision = evaluate(&cfg, &at("2024-01-15T09:00:00Z"));
        assert_eq!(
            decision,
            MaintenanceDecision::Wait {
                next_window_start: None,
                reason: "No maintenance window for cluster 'test' within the next 35 days".to_string(),
            }
        );
    }

    #[test]
    fn test_offset_timezone_shifts_window() {
        let mut cfg = config(vec![window("02:00-04:00", vec![])], 30);
        cfg.timezone = FixedOffset::east_opt(2 * 3600).unwrap();

        // 01:00Z is 03:00 local, one hour left
        assert!(evaluate(&cfg, &at("2024-01-15T01:00:00Z")).should_proceed());
        // 03:00Z is 05:00 local, outside
        assert!(!evaluate(&cfg, &at("2024-01-15T03:00:00Z")).should_proceed());
    }
}
