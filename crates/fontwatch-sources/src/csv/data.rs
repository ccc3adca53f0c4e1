//! The catalog sheet: column mapping, row classification and derived
//! remote coordinates.

use std::collections::HashMap;

use fontwatch_core::ReportTable;
use serde::Serialize;

use crate::error::CsvError;

/// Header, field and whether the column must be present.
const COLUMNS: [(&str, &str, bool); 9] = [
    ("Status", "status", true),
    ("family", "name", true),
    ("feature branch key", "keySuffix", false),
    ("family name is confirmed as good?", "nameConfirmed", true),
    ("upstream", "upstream", true),
    ("branch", "branch", false),
    ("fontfiles prefix", "fontfilesPrefix", true),
    ("genre", "genre", true),
    ("designer", "designer", false),
];

const ACCEPTED_STATUSES: [&str; 2] = ["OK", "NOTE"];

const KNOWN_SKIPPED_STATUSES: [&str; 13] = [
    "ZIP",
    "TTF",
    "?",
    "RENAMED",
    "TTX",
    "UFO",
    "GH-PAGES",
    "OTF",
    "SOURCE-ONLY",
    "",
    "404-ERROR",
    "NOT-ON-GFONTS",
    "NOT-ON-GH",
];

/// Report columns shared by the import and update tables.
pub const REPORT_COLUMNS: [&str; 3] = ["Family Name", "Status", "Message"];

/// How a status cell is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Accepted,
    /// A status the catalog uses for rows that are not watched.
    KnownSkip,
    Unrecognized,
}

impl RowStatus {
    pub fn classify(raw: &str) -> Self {
        let status = raw.to_uppercase();
        if ACCEPTED_STATUSES.contains(&status.as_str()) {
            Self::Accepted
        } else if KNOWN_SKIPPED_STATUSES.contains(&status.as_str()) {
            Self::KnownSkip
        } else {
            Self::Unrecognized
        }
    }
}

/// Where an upstream is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamType {
    Github,
    Git,
}

/// One accepted catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvFamily {
    pub status: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_suffix: Option<String>,
    pub name_confirmed: String,
    pub upstream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub fontfiles_prefix: String,
    pub genre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designer: Option<String>,
    /// 1-based record number in the sheet (the header is 1).
    #[serde(skip)]
    pub row: usize,
    /// Row numbers of later rows with the same key.
    #[serde(skip)]
    pub duplicates: Vec<usize>,
}

impl CsvFamily {
    /// Lookup key: the family name, suffixed for feature-branch rows.
    pub fn key(&self) -> String {
        match &self.key_suffix {
            Some(suffix) => format!("{}:{}", self.name, suffix),
            None => self.name.clone(),
        }
    }

    pub fn upstream_type(&self) -> Option<UpstreamType> {
        if self.upstream.contains("://github.com") {
            Some(UpstreamType::Github)
        } else if self.upstream.ends_with(".git") {
            Some(UpstreamType::Git)
        } else {
            None
        }
    }

    pub fn is_git(&self) -> bool {
        self.upstream_type().is_some()
    }

    /// Normalized clone url; GitHub urls lose trailing slashes and gain `.git`
    /// so one upstream always maps to one mirror.
    pub fn remote_url(&self) -> String {
        match self.upstream_type() {
            Some(UpstreamType::Github) => {
                let url = self.upstream.trim_end_matches('/');
                if url.ends_with(".git") {
                    url.to_string()
                } else {
                    format!("{url}.git")
                }
            },
            _ => self.upstream.clone(),
        }
    }

    pub fn remote_name(&self) -> String {
        format!("upstream/{}", self.name.replace(' ', "_"))
    }

    pub fn reference_name(&self) -> &str {
        self.branch.as_deref().unwrap_or("main")
    }

    /// Splits `fontfiles prefix` into the directory and the file name prefix.
    ///
    /// Empty segments are dropped, so `/fonts//ttf/Test-` reads as
    /// `("fonts/ttf", "Test-")`.
    pub fn font_files_location(&self) -> (String, String) {
        let mut parts: Vec<&str> = self.fontfiles_prefix.split('/').filter(|p| !p.is_empty()).collect();
        let prefix = parts.pop().unwrap_or("").to_string();
        (parts.join("/"), prefix)
    }

    pub fn is_name_confirmed(&self) -> bool {
        self.name_confirmed == "Passed"
    }

    /// The row as reported by `source_details`.
    pub fn details(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A parsed catalog sheet.
#[derive(Debug, Clone)]
pub struct CsvData {
    families: Vec<CsvFamily>,
    index: HashMap<String, usize>,
    report: ReportTable,
}

impl CsvData {
    /// Parses the sheet text.
    ///
    /// Fails only on structural problems (missing or clashing columns, broken
    /// CSV). Row problems land in [`report`](Self::report) and the row is
    /// skipped.
    pub fn parse(text: &str) -> Result<Self, CsvError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut records = reader.records();

        let header = records.next().ok_or(CsvError::Empty)??;
        let columns = ColumnMap::from_header(&header)?;

        let mut data = Self {
            families: Vec::new(),
            index: HashMap::new(),
            report: ReportTable::new("CSV Data Import", REPORT_COLUMNS),
        };
        for (offset, record) in records.enumerate() {
            data.add_row(&columns, &record?, offset + 2);
        }
        Ok(data)
    }

    fn add_row(&mut self, columns: &ColumnMap, record: &csv::StringRecord, row: usize) {
        let raw_status = columns.get(record, "status");
        let name = columns.get(record, "name");

        match RowStatus::classify(&raw_status) {
            RowStatus::Accepted => {},
            RowStatus::KnownSkip => {
                self.note(&name, "skipped", format!("row # {row} ignored status: {raw_status}"));
                return;
            },
            RowStatus::Unrecognized => {
                self.note(&name, "warning", format!("row # {row} unrecognized status (skipped): {raw_status}"));
                return;
            },
        }

        let status = raw_status.to_uppercase();
        if status != raw_status {
            self.note(&name, "warning", format!("row # {row} bad status style: {raw_status} should be: {status}"));
        }

        let family = CsvFamily {
            status,
            name,
            key_suffix: columns.optional(record, "keySuffix"),
            name_confirmed: columns.get(record, "nameConfirmed"),
            upstream: columns.get(record, "upstream"),
            branch: columns.optional(record, "branch"),
            fontfiles_prefix: columns.get(record, "fontfilesPrefix"),
            genre: columns.get(record, "genre"),
            designer: columns.optional(record, "designer"),
            row,
            duplicates: Vec::new(),
        };

        let key = family.key();
        match self.index.get(&key) {
            Some(&existing) => {
                self.families[existing].duplicates.push(row);
                self.note(&family.name, "warning", format!("row # {row} skipped duplicate family: {key}"));
            },
            None => {
                self.index.insert(key, self.families.len());
                self.families.push(family);
            },
        }
    }

    fn note(&mut self, family: &str, status: &str, message: String) {
        self.report.push_row([family, status, message.as_str()]);
    }

    /// Accepted families in sheet order.
    pub fn families(&self) -> &[CsvFamily] {
        &self.families
    }

    pub fn get(&self, key: &str) -> Option<&CsvFamily> {
        self.index.get(key).map(|&i| &self.families[i])
    }

    /// Sorted family keys.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Import findings: skipped statuses, style warnings, duplicates.
    pub fn report(&self) -> &ReportTable {
        &self.report
    }
}

/// Field name to column index.
struct ColumnMap {
    positions: HashMap<&'static str, usize>,
}

impl ColumnMap {
    fn from_header(header: &csv::StringRecord) -> Result<Self, CsvError> {
        let mut positions = HashMap::new();
        for (index, cell) in header.iter().enumerate() {
            let Some((_, field, _)) = COLUMNS.iter().find(|(h, _, _)| *h == cell) else {
                continue;
            };
            if positions.insert(*field, index).is_some() {
                return Err(CsvError::DuplicateColumn {
                    field,
                    header: cell.to_string(),
                    index,
                });
            }
        }

        for (header, field, required) in COLUMNS {
            if required && !positions.contains_key(field) {
                return Err(CsvError::MissingColumn(header));
            }
        }
        Ok(Self { positions })
    }

    fn get(&self, record: &csv::StringRecord, field: &str) -> String {
        self.positions
            .get(field)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
            .to_string()
    }

    fn optional(&self, record: &csv::StringRecord, field: &str) -> Option<String> {
        Some(self.get(record, field)).filter(|value| !value.is_empty())
    }
}
