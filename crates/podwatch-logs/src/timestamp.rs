use chrono::{DateTime, Utc};

/// A log line with its Kubernetes timestamp prefix separated out.
///
/// Lines read with `timestamps=true` look like
/// `2024-01-15T10:30:00.123456789Z message`: an RFC 3339 instant, one space,
/// then the container's own output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLine<'a> {
    pub timestamp: Option<DateTime<Utc>>,
    pub content: &'a str,
}

impl<'a> LogLine<'a> {
    /// Parse `raw`; a line without a valid prefix is all content
    pub fn parse(raw: &'a str) -> Self {
        let (prefix, rest) = raw.split_once(' ').unwrap_or((raw, ""));

        match DateTime::parse_from_rfc3339(prefix) {
            Ok(ts) => Self {
                timestamp: Some(ts.with_timezone(&Utc)),
                content: rest.trim_start(),
            },
            Err(_) => Self {
                timestamp: None,
                content: raw,
            },
        }
    }
}
