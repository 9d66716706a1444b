use crate::error::ConfigError;
use crate::run_log::Severity;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use roxmltree::Node;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Contents of a FEWS PI run description, before any property is interpreted.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub work_dir: PathBuf,
    pub time_zone: String,
    pub log_level: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub properties: HashMap<String, String>,
}

impl RunInfo {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::RunInfoRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let doc = roxmltree::Document::parse(content)?;
        let root = doc.root_element();

        let work_dir = child_text(root, "workDir").ok_or(ConfigError::MissingElement("workDir"))?;
        let time_zone = child_text(root, "timeZone").unwrap_or_else(|| "0.0".to_string());
        let log_level = child_text(root, "logLevel").unwrap_or_else(|| "info".to_string());
        let start = date_time(root, "startDateTime")?;
        let end = date_time(root, "endDateTime")?;

        let properties = root
            .children()
            .find(|n| n.has_tag_name("properties"))
            .ok_or(ConfigError::MissingElement("properties"))?
            .children()
            .filter(|n| n.is_element())
            .filter_map(|n| Some((n.attribute("key")?.to_string(), n.attribute("value")?.to_string())))
            .collect();

        Ok(Self {
            work_dir: PathBuf::from(work_dir),
            time_zone,
            log_level,
            start,
            end,
            properties,
        })
    }

    /// Level below which log lines are dropped. `None` when `logLevel` is not recognised.
    pub fn log_threshold(&self) -> Option<Severity> {
        Severity::from_name(&self.log_level)
    }

    /// Start and end shifted from the run's time zone into UTC.
    pub fn window_utc(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ConfigError> {
        let hours: f64 = self
            .time_zone
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimeZone(self.time_zone.clone()))?;
        let offset = FixedOffset::east_opt((hours * 3600.0).round() as i32)
            .ok_or_else(|| ConfigError::InvalidTimeZone(self.time_zone.clone()))?;

        let to_utc = |local: &NaiveDateTime| {
            offset
                .from_local_datetime(local)
                .single()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| ConfigError::InvalidTimeZone(self.time_zone.clone()))
        };
        let (start, end) = (to_utc(&self.start)?, to_utc(&self.end)?);
        if start >= end {
            return Err(ConfigError::InvalidTimeWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok((start, end))
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text(node: Node, name: &str) -> Option<String> {
    let text = child(node, name)?.text()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn date_time(root: Node, name: &'static str) -> Result<NaiveDateTime, ConfigError> {
    let node = child(root, name).ok_or(ConfigError::MissingElement(name))?;
    let value = format!(
        "{} {}",
        node.attribute("date").unwrap_or_default(),
        node.attribute("time").unwrap_or_default()
    );
    NaiveDateTime::parse_from_str(&value, DATE_TIME_FORMAT)
        .map_err(|_| ConfigError::InvalidDateTime { field: name, value })
}
