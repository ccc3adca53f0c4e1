//! Operational reports filed by sources.
//!
//! Reports are observability only; losing one never affects a pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One filed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "type")]
    pub report_type: String,
    pub id: String,
    pub method: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Report {
    /// Starts a report clock.
    pub fn start(
        report_type: impl Into<String>,
        id: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            report_type: report_type.into(),
            id: id.into(),
            method: method.into(),
            started: Utc::now(),
            finished: None,
            data: serde_json::Value::Null,
        }
    }

    /// Stops the clock and attaches the payload.
    pub fn finish(mut self, data: serde_json::Value) -> Self {
        self.finished = Some(Utc::now());
        self.data = data;
        self
    }
}

/// Destination for reports.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn file(&self, report: Report) -> Result<()>;
}

/// A captioned table of string cells, the payload shape of source reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTable {
    pub caption: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new<I, S>(caption: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            caption: caption.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
