//! Forwarding of unexpected errors to a remote collector.
//!
//! Reporting is best effort: failures to deliver are logged and swallowed so
//! they never change the outcome of the operation being reported.

use std::time::Duration;

use serde::Serialize;

use crate::config::ErrorReportingConfig;

/// What gets sent for one unexpected error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub operation_id: Option<i64>,
    /// Operation type string, e.g. `check:dbstatus`.
    pub operation_type: String,
    pub message: String,
    pub backtrace: String,
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn report(&self, _report: &ErrorReport) {}
}

/// POSTs reports as JSON to a configured endpoint.
pub struct HttpErrorReporter {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpErrorReporter {
    pub fn new(config: &ErrorReportingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl ErrorReporter for HttpErrorReporter {
    fn report(&self, report: &ErrorReport) {
        let mut request = self.client.post(&self.url).json(report);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send() {
            Ok(resp) => {
                if let Err(e) = resp.error_for_status() {
                    tracing::warn!("Error collector rejected report: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to send error report: {}", e);
            }
        }
    }
}

/// Builds the reporter described by `config`, falling back to
/// [`NoopReporter`] when none is configured or the client cannot be built.
pub fn reporter_from_config(config: Option<&ErrorReportingConfig>) -> Box<dyn ErrorReporter> {
    match config {
        Some(cfg) => match HttpErrorReporter::new(cfg) {
            Ok(reporter) => Box::new(reporter),
            Err(e) => {
                tracing::warn!("Error reporting disabled: {}", e);
                Box::new(NoopReporter)
            }
        },
        None => Box::new(NoopReporter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes() {
        let report = ErrorReport {
            operation_id: Some(7),
            operation_type: "check:dbstatus".to_string(),
            message: "boom".to_string(),
            backtrace: "boom\ncaused by: io".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation_id"], 7);
        assert_eq!(json["operation_type"], "check:dbstatus");
    }

    #[test]
    fn test_noop_when_unconfigured() {
        let reporter = reporter_from_config(None);
        reporter.report(&ErrorReport {
            operation_id: None,
            operation_type: "backup".to_string(),
            message: String::new(),
            backtrace: String::new(),
        });
    }
}
