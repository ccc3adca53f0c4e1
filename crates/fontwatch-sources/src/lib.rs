//! # fontwatch sources
//!
//! Catalog-driven [`Source`](fontwatch_core::Source)s built on top of the
//! git engine:
//!
//! - [`CsvSource`]: a spreadsheet of upstream repositories, each fetched
//!   into its own mirror and read against the reference catalog
//! - [`ApiSource`]: the web fonts API document plus its font downloads
//!
//! Both share the [`Downloader`] for `http(s)://` and `file://` urls and
//! report per-pass tables through an optional
//! [`Reporter`](fontwatch_core::Reporter).

pub mod api;
pub mod csv;
pub mod download;
pub mod error;
pub mod metadata;

pub use api::{ApiSource, ApiSourceConfig};
pub use self::csv::{CsvData, CsvFamily, CsvSource, CsvSourceConfig};
pub use download::Downloader;
pub use error::{ApiError, CsvError, DownloadError};
pub use metadata::{MetadataGenerator, MetadataOverrides, MetadataTool};
