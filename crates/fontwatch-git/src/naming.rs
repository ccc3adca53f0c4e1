//! Family name resolution.
//!
//! The name embedded in `METADATA.pb` wins. Without one, the name is derived
//! from the first font binary's filename, which is lossy: the heuristic only
//! knows the `<Family>-<Style>.ttf` convention and camel-case boundaries.

use std::sync::OnceLock;

use fontwatch_core::FamilyFile;
use regex::Regex;

pub const METADATA_FILE: &str = "METADATA.pb";

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([^/-]+)-(\w+)\.ttf$").expect("family filename pattern should compile")
    })
}

fn camel_case_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES
        .get_or_init(|| {
            vec![
                // SomethingUpper => Something Upper
                (
                    Regex::new(r"(.)([A-Z][a-z]+)").expect("word boundary pattern should compile"),
                    "$1 $2",
                ),
                // Font3 => Font 3
                (
                    Regex::new(r"([a-z])([0-9]+)").expect("digit boundary pattern should compile"),
                    "$1 $2",
                ),
                // lookHere => look Here
                (
                    Regex::new(r"([a-z0-9])([A-Z])").expect("case boundary pattern should compile"),
                    "$1 $2",
                ),
            ]
        })
        .as_slice()
}

/// Splits a PostScript-ish font name into words: `HPSimplifiedSans` →
/// `HP Simplified Sans`.
pub fn expand_camel_case(fontname: &str) -> String {
    camel_case_rules()
        .iter()
        .fold(fontname.to_string(), |name, (pattern, replacement)| {
            pattern.replace_all(&name, *replacement).into_owned()
        })
}

/// `LibreBarcode39ExtendedText-Regular.ttf` → `Libre Barcode 39 Extended Text`.
pub fn family_name_from_filename(filename: &str) -> Option<String> {
    let captures = filename_pattern().captures(filename)?;
    Some(expand_camel_case(&captures[1]))
}

/// Reads the top-level `name: "..."` field of a `METADATA.pb` text proto.
///
/// Indented lines belong to nested `fonts { ... }` messages and are ignored.
pub fn family_name_from_metadata(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .find_map(|line| {
            let value = line.strip_prefix("name:")?.trim();
            let value = value.strip_prefix('"')?.strip_suffix('"')?;
            (!value.is_empty()).then(|| value.to_string())
        })
}

/// Resolves the family name of a file set.
pub fn resolve_family_name(files: &[FamilyFile]) -> Option<String> {
    let from_metadata = files
        .iter()
        .find(|f| f.name == METADATA_FILE)
        .and_then(|f| family_name_from_metadata(&String::from_utf8_lossy(&f.data)));
    if from_metadata.is_some() {
        return from_metadata;
    }

    let mut binaries: Vec<&str> = files
        .iter()
        .filter(|f| f.name.ends_with(".ttf"))
        .map(|f| f.name.as_str())
        .collect();
    binaries.sort_unstable();
    binaries.into_iter().find_map(family_name_from_filename)
}

/// Directory name a family gets in the catalog: `Test Sans` → `testsans`.
pub fn family_dir_name(family_name: &str) -> String {
    family_name.to_lowercase().replace(' ', "")
}
