mod run_info;
mod validation;

pub use run_info::RunInfo;
pub use validation::{validate, Backend, DownloadType, Mission, ProductFilters, Properties};

use crate::error::ConfigError;
use crate::geometry::GeoJson;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed wait between two readiness checks of an order.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"***")
            .finish()
    }
}

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollBudget {
    /// Total time the budget allows for, `interval * max_attempts`.
    pub fn total(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Everything one acquisition needs, fixed for the rest of the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub work_dir: PathBuf,
    pub mission: Mission,
    pub credentials: Credentials,
    pub window: TimeWindow,
    pub aoi: GeoJson,
    pub download_type: DownloadType,
    pub filters: ProductFilters,
    pub destination: PathBuf,
    pub unzip: bool,
    pub poll: PollBudget,
}

impl RunConfig {
    pub fn new(info: &RunInfo, properties: Properties, aoi: GeoJson) -> Result<Self, ConfigError> {
        let (start, end) = info.window_utc()?;
        Ok(Self {
            work_dir: info.work_dir.clone(),
            mission: properties.mission,
            credentials: Credentials {
                user: properties.user,
                secret: properties.secret,
            },
            window: TimeWindow { start, end },
            aoi,
            download_type: properties.download_type,
            filters: properties.filters,
            destination: PathBuf::from(properties.destination),
            unzip: properties.unzip,
            // A zero timeout still gets one look at the order
            poll: PollBudget {
                interval: POLL_INTERVAL,
                max_attempts: properties.max_attempts.max(1),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_from_run_info() {
        let info = RunInfo::parse(run_info::tests::RUN_INFO).unwrap();
        let properties = validate(&info.properties).unwrap();
        let aoi: GeoJson =
            serde_json::from_str(r#"{"type": "Point", "coordinates": [1, 2]}"#).unwrap();
        let config = RunConfig::new(&info, properties, aoi).unwrap();

        assert_eq!(config.mission, Mission::Rcm);
        assert_eq!(config.destination, PathBuf::from("/data/rcm"));
        assert_eq!(config.poll.max_attempts, 3);
        assert_eq!(config.poll.total(), Duration::from_secs(180));
        assert!(config.window.start < config.window.end);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = Credentials {
            user: "someone".to_string(),
            secret: "hunter2".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("someone"));
        assert!(!printed.contains("hunter2"));
    }
}
