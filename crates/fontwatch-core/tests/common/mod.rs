#![allow(dead_code)]
use chrono::{TimeZone, Utc};
use fontwatch_core::{FamilyDescriptor, FamilyFile, FamilyMetadata, LicenseDir};

/// Metadata pinned to a fixed commit and date.
pub fn metadata(commit: &str) -> FamilyMetadata {
    FamilyMetadata::new(
        commit,
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        "https://github.com/acme/testsans.git",
        "main",
    )
}

/// A small family bundle with one binary and one license file.
pub fn family(name: &str) -> FamilyDescriptor {
    let stem = name.replace(' ', "");
    FamilyDescriptor::new(
        name,
        vec![
            FamilyFile::new(format!("{stem}-Regular.ttf"), format!("{stem} glyphs").into_bytes()),
            FamilyFile::new("OFL.txt", b"Copyright".to_vec()),
        ],
        LicenseDir::Ofl,
        metadata("c0ffee"),
    )
}
