use chrono::{DateTime, Utc};

use kubelogs_types::Record;

/// Parser turning raw log lines into [`Record`]s
pub struct RecordParser;

impl RecordParser {
    /// Parse one raw line.
    ///
    /// Lines with at least three tab separated fields are read as
    /// `timestamp \t level \t source \t message...`; anything else as
    /// `timestamp message`. A line whose timestamp does not parse comes back
    /// with `timestamp: None`.
    pub fn parse(raw: &[u8]) -> Record {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 3 {
            return Record {
                timestamp: Self::parse_timestamp(parts[0]),
                level: non_empty(parts[1]),
                source: non_empty(parts[2]),
                message: parts[3..].join(" ").trim().to_string(),
            };
        }

        let (timestamp, message) = line.split_once(' ').unwrap_or((line, ""));
        Record {
            timestamp: Self::parse_timestamp(timestamp),
            level: None,
            source: None,
            message: message.trim().to_string(),
        }
    }

    /// Only the text before the first space counts as the timestamp
    fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
        let field = field.trim_start();
        let ts = field.split(' ').next().unwrap_or(field);
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

fn non_empty(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_string())
}
