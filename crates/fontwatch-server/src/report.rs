//! Report filing.
//!
//! Reports go to the structured log; they are observability only.

use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{Report, Reporter, Result};
use fontwatch_process::{CommitHook, Outcome};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Files reports as `info` events carrying the JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn file(&self, report: Report) -> Result<()> {
        let elapsed_ms = report
            .finished
            .map(|finished| (finished - report.started).num_milliseconds());
        info!(
            report_type = %report.report_type,
            id = %report.id,
            method = %report.method,
            elapsed_ms,
            data = %report.data,
            "report filed"
        );
        Ok(())
    }
}

/// Files one report per process state change.
pub struct ReportCommitHook {
    reporter: Arc<dyn Reporter>,
    task: String,
}

impl ReportCommitHook {
    pub fn new(task: impl Into<String>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            task: task.into(),
        }
    }

    fn report(&self, process_id: &str, outcome: &Outcome, state: &Value) -> Report {
        Report::start(format!("process:{}", self.task), process_id, &outcome.method).finish(json!({
            "outcome": outcome,
            "status": state["history"].as_array().and_then(|h| h.last()).cloned(),
        }))
    }
}

#[async_trait]
impl CommitHook for ReportCommitHook {
    async fn commit(&self, process_id: &str, outcome: &Outcome, state: &Value) {
        let report = self.report(process_id, outcome, state);
        if let Err(e) = self.reporter.file(report).await {
            warn!(process = process_id, error = %e, "can't file process report");
        }
    }
}

impl std::fmt::Debug for ReportCommitHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportCommitHook").field("task", &self.task).finish()
    }
}
