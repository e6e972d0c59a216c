//! Structured record logging utilities.
//!
//! Provides consistent, structured logging for stage processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

/// Logs the lifecycle of one record inside one stage.
#[derive(Debug, Clone)]
pub struct RecordLogger {
    record_id: String,
    stage: &'static str,
}

impl RecordLogger {
    pub fn new(record_id: impl Into<String>, stage: &'static str) -> Self {
        Self {
            record_id: record_id.into(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            record_id = %self.record_id,
            stage = %self.stage,
            "Record started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            record_id = %self.record_id,
            stage = %self.stage,
            "Record progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            record_id = %self.record_id,
            stage = %self.stage,
            "Record warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            record_id = %self.record_id,
            stage = %self.stage,
            "Record error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            record_id = %self.record_id,
            stage = %self.stage,
            "Record completed: {}", message
        );
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Span covering all work on this record.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "record",
            record_id = %self.record_id,
            stage = %self.stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_logger() {
        let logger = RecordLogger::new("video-123", "assemble");
        assert_eq!(logger.record_id(), "video-123");
        assert_eq!(logger.stage(), "assemble");
    }
}
