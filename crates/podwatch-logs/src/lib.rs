//! Log scanning for podwatch
//!
//! This crate finds error signatures in pod logs and folds the results into
//! a notification report.

mod extractor;
mod report;
mod timestamp;

pub use extractor::{ERROR_KEYWORDS, ErrorExtractor, WINDOW_SEPARATOR};
pub use report::ReportAggregator;
pub use timestamp::LogLine;

// Re-export types used in our public API
pub use podwatch_types::{ErrorWindow, NotificationPayload, PodReport, PodScan, ReportStatus};
