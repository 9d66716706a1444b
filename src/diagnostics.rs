//! Converts a run log into a FEWS PI diag document.
use crate::run_log::Severity;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

pub const DIAG_FILE_NAME: &str = "diag.xml";

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<Diag xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \n\
xmlns=\"http://www.wldelft.nl/fews/PI\" xsi:schemaLocation=\"http://www.wldelft.nl/fews/PI \
http://fews.wldelft.nl/schemas/version1.0/pi-schemas/pi_diag.xsd\" version=\"1.2\">\n";

#[derive(Debug, PartialEq, Eq)]
pub struct DiagnosticLine {
    pub date: String,
    pub time: String,
    pub level: u8,
    pub description: String,
}

impl DiagnosticLine {
    /// Parses `2024-05-01 10:00:00,123 - log - ERROR - disk full`. Returns `None` for anything else.
    pub fn parse(line: &str, timestamp: &Regex) -> Option<Self> {
        let parts: Vec<String> = line
            .trim()
            .splitn(4, " - ")
            .map(sanitize)
            .collect();
        if parts.len() < 4 {
            return None;
        }

        let captures = timestamp.captures(&parts[0])?;
        let level = Severity::from_name(&parts[2])?.code();

        Some(Self {
            date: captures["date"].to_string(),
            time: captures["time"].to_string(),
            level,
            description: parts[3].clone(),
        })
    }

    fn to_xml(&self) -> String {
        format!(
            "<line date=\"{}\" time=\"{}\" level=\"{}\" description=\"{}\"/>\n",
            self.date,
            self.time,
            self.level,
            escape(&self.description)
        )
    }
}

fn timestamp_pattern() -> Regex {
    Regex::new(r"^(?<date>\d{4}-\d{2}-\d{2}) (?<time>\d{2}:\d{2}:\d{2})(?:[,.:]\d+)?$")
        .expect("Regex pattern should always compile")
}

/// Removes characters that break the attribute they are embedded in.
fn sanitize(part: &str) -> String {
    part.replace(['\u{2013}', '"'], "")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders every parseable line. Malformed lines are skipped.
pub fn render<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let timestamp = timestamp_pattern();
    let mut document = String::from(HEADER);
    lines
        .into_iter()
        .filter_map(|line| DiagnosticLine::parse(line, &timestamp))
        .for_each(|line| document.push_str(&line.to_xml()));
    document.push_str("</Diag>");
    document
}

/// Reads `log_file` (a missing file yields an empty document) and writes the diag to `diag_file`.
pub fn write<P: AsRef<Path>, Q: AsRef<Path>>(log_file: P, diag_file: Q) -> io::Result<()> {
    let content = match fs::read_to_string(log_file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    fs::write(diag_file, render(content.lines()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_line() {
        let line = DiagnosticLine::parse(
            "2024-05-01 10:00:00,123 - log - ERROR - disk full",
            &timestamp_pattern(),
        )
        .unwrap();
        assert_eq!(
            line,
            DiagnosticLine {
                date: "2024-05-01".to_string(),
                time: "10:00:00".to_string(),
                level: 1,
                description: "disk full".to_string(),
            }
        );
    }

    #[test]
    fn test_level_codes() {
        let pattern = timestamp_pattern();
        let level = |name: &str| {
            DiagnosticLine::parse(&format!("2024-05-01 10:00:00,001 - log - {name} - x"), &pattern)
                .map(|l| l.level)
        };
        assert_eq!(level("ERROR"), Some(1));
        assert_eq!(level("WARNING"), Some(2));
        assert_eq!(level("INFO"), Some(3));
        assert_eq!(level("DEBUG"), Some(4));
        assert_eq!(level("CRITICAL"), None);
    }

    #[test]
    fn test_message_keeps_inner_separator_and_strips_quotes() {
        let line = DiagnosticLine::parse(
            "2024-05-01 10:00:00,123 - log - INFO - range 1 - 2 \"quoted\" \u{2013} done",
            &timestamp_pattern(),
        )
        .unwrap();
        assert_eq!(line.description, "range 1 - 2 quoted  done");
    }

    #[test]
    fn test_render_skips_malformed_lines() {
        let log = "2024-05-01 10:00:00,123 - log - INFO - start logging\n\
                   Traceback (most recent call last):\n\
                   not a date - log - INFO - nope\n\
                   2024-05-01 10:00:05,000 - log - WARNING - a < b & c\n";
        let document = render(log.lines());

        assert!(document.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(document.contains("xmlns=\"http://www.wldelft.nl/fews/PI\""));
        assert!(document.contains("pi_diag.xsd\" version=\"1.2\""));
        assert!(document.ends_with("</Diag>"));
        assert_eq!(document.matches("<line ").count(), 2);
        assert!(document.contains(
            "<line date=\"2024-05-01\" time=\"10:00:05\" level=\"2\" description=\"a &lt; b &amp; c\"/>"
        ));

        roxmltree::Document::parse(&document).unwrap();
    }

    #[test]
    fn test_write_without_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let diag = dir.path().join(DIAG_FILE_NAME);
        write(dir.path().join("missing.txt"), &diag).unwrap();
        let document = fs::read_to_string(diag).unwrap();
        assert_eq!(document.matches("<line ").count(), 0);
        assert!(document.ends_with("</Diag>"));
    }
}
