//! JSON output for scripted callers
//!
//! When the --json flag is enabled, per-image failures and the final
//! summary are emitted as JSON lines to stdout, suppressing styled output.

use serde::{Deserialize, Serialize};

use crate::labeling::RunSummary;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonMessage {
    /// Image excluded due to a decode or detector error
    Failed { filename: String, error: String },
    /// Run summary
    Summary {
        discovered: usize,
        accepted: usize,
        skipped_not_selfie: usize,
        skipped_no_spot: usize,
        failed: usize,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit a failure message
    pub fn failed(filename: &str, error: &str) {
        Self::Failed {
            filename: filename.to_string(),
            error: error.to_string(),
        }
        .emit();
    }

    /// Create and emit the summary message
    pub fn summary(summary: &RunSummary, duration_secs: f64) {
        Self::Summary {
            discovered: summary.total(),
            accepted: summary.accepted,
            skipped_not_selfie: summary.skipped_not_selfie,
            skipped_no_spot: summary.skipped_no_spot,
            failed: summary.failed,
            duration_secs,
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serialization_shape() {
        let message = JsonMessage::Summary {
            discovered: 5,
            accepted: 2,
            skipped_not_selfie: 1,
            skipped_no_spot: 1,
            failed: 1,
            duration_secs: 0.5,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"summary\""));
        assert!(json.contains("\"accepted\":2"));
        assert!(json.contains("\"skipped_no_spot\":1"));
    }
}
