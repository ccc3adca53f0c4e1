//! Web fonts API document.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// API variant to file style name.
const STYLES: [(&str, &str); 18] = [
    ("100", "Thin"),
    ("100italic", "ThinItalic"),
    ("200", "ExtraLight"),
    ("200italic", "ExtraLightItalic"),
    ("300", "Light"),
    ("300italic", "LightItalic"),
    ("regular", "Regular"),
    ("italic", "Italic"),
    ("500", "Medium"),
    ("500italic", "MediumItalic"),
    ("600", "SemiBold"),
    ("600italic", "SemiBoldItalic"),
    ("700", "Bold"),
    ("700italic", "BoldItalic"),
    ("800", "ExtraBold"),
    ("800italic", "ExtraBoldItalic"),
    ("900", "Black"),
    ("900italic", "BlackItalic"),
];

pub fn style_name(variant: &str) -> Option<&'static str> {
    STYLES.iter().find(|(v, _)| *v == variant).map(|(_, style)| *style)
}

/// `("Test Sans", "700italic")` → `TestSans-BoldItalic.ttf`.
pub fn font_file_name(family: &str, variant: &str) -> Option<String> {
    style_name(variant).map(|style| format!("{}-{}.ttf", family.replace(' ', ""), style))
}

/// One `items[]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFamily {
    pub family: String,
    pub version: String,
    pub last_modified: NaiveDate,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub variants: Vec<String>,
    /// Variant to download url.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl ApiFamily {
    /// Whether this entry differs from what the previous pass saw.
    pub fn changed_since(&self, previous: &ApiFamily) -> bool {
        self.last_modified != previous.last_modified
            || self.version != previous.version
            || self.variants.len() != previous.variants.len()
            || self
                .files
                .iter()
                .any(|(variant, url)| previous.files.get(variant) != Some(url))
    }

    /// True for families new or changed relative to `previous`, and for
    /// every family when there is no previous pass.
    pub fn needs_update(&self, previous: Option<&ApiData>) -> bool {
        match previous.and_then(|previous| previous.get(&self.family)) {
            Some(old) => self.changed_since(old),
            None => true,
        }
    }

    /// Pseudo commit identifying this revision of the family.
    pub fn revision(&self) -> String {
        format!("{}:{}", self.version, self.last_modified)
    }

    /// Resolves every file to its catalog name and url.
    pub fn file_urls(&self) -> Result<Vec<(String, String)>, ApiError> {
        self.files
            .iter()
            .map(|(variant, url)| {
                font_file_name(&self.family, variant)
                    .map(|name| (name, url.clone()))
                    .ok_or_else(|| ApiError::UnknownVariant {
                        family: self.family.clone(),
                        variant: variant.clone(),
                    })
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    items: Vec<ApiFamily>,
}

/// The parsed API response, keyed by family name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiData {
    families: BTreeMap<String, ApiFamily>,
}

impl ApiData {
    /// Parses `{ "items": [...] }`; a family listed twice is an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, ApiError> {
        let document: Document = serde_json::from_slice(bytes)?;
        let mut families = BTreeMap::new();
        for item in document.items {
            if families.contains_key(&item.family) {
                return Err(ApiError::DuplicateFamily(item.family));
            }
            families.insert(item.family.clone(), item);
        }
        Ok(Self { families })
    }

    pub fn get(&self, family: &str) -> Option<&ApiFamily> {
        self.families.get(family)
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families.contains_key(family)
    }

    pub fn families(&self) -> impl Iterator<Item = &ApiFamily> {
        self.families.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.families.keys().cloned().collect()
    }
}
