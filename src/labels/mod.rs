use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

include!(concat!(env!("OUT_DIR"), "/embedded_label_tables.rs"));

const DEFAULT_LABELS_TOML: &str = include_str!("default.toml");

/// Label keys in display order.
pub const LABEL_KEYS: &[&str] = &[
    "govtTitle",
    "deptTitle",
    "certificateTitle",
    "legalText1",
    "name",
    "dateOfBirth",
    "motherName",
    "birthAddress",
    "regNumber",
    "issueDate",
    "sex",
    "male",
    "female",
    "birthPlace",
    "fatherName",
    "permAddress",
    "regDate",
    "digitallySigned",
    "date",
    "scanQR",
    "validity",
    "issuingAuthority",
    "registrar",
];

pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("tamil", "Tamil"),
    ("hindi", "Hindi"),
    ("telugu", "Telugu"),
    ("kannada", "Kannada"),
    ("malayalam", "Malayalam"),
    ("bengali", "Bengali"),
    ("marathi", "Marathi"),
    ("gujarati", "Gujarati"),
    ("punjabi", "Punjabi"),
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Label {
    pub english: String,
    pub regional: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelTable {
    labels: BTreeMap<String, Label>,
}

impl LabelTable {
    pub fn get(&self, key: &str) -> Option<&Label> {
        self.labels.get(key)
    }

    pub fn english<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map(|label| label.english.as_str()).unwrap_or(key)
    }

    pub fn regional(&self, key: &str) -> &str {
        self.get(key)
            .map(|label| label.regional.as_str())
            .unwrap_or_default()
    }

    /// `"English / regional"`, or just the English text when no regional
    /// text exists.
    pub fn bilingual(&self, key: &str) -> String {
        let english = self.english(key);
        let regional = self.regional(key);
        if regional.is_empty() {
            english.to_string()
        } else {
            format!("{} / {}", english, regional)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Label)> + '_ {
        LABEL_KEYS
            .iter()
            .filter_map(|key| self.labels.get(*key).map(|label| (*key, label)))
    }
}

/// The English text of every label together with the default regional
/// (Tamil) text, read from `default.toml`.
pub fn default_labels() -> Result<LabelTable> {
    let labels: BTreeMap<String, Label> = toml::from_str(DEFAULT_LABELS_TOML)
        .with_context(|| "failed to parse default label table")?;
    if let Some(missing) = LABEL_KEYS.iter().find(|key| !labels.contains_key(**key)) {
        return Err(anyhow!("default label table is missing '{}'", missing));
    }
    Ok(LabelTable { labels })
}

/// Labels with the regional text replaced by the table for `code`.
///
/// Unknown codes fall back to the default table with a warning; keys the
/// language table lacks keep their default regional text.
pub fn labels_for(code: &str) -> Result<LabelTable> {
    let mut table = default_labels()?;
    let code = normalize_code(code);
    let Some(raw) = embedded_label_table(&code) else {
        warn!("No translation available for {}", code);
        return Ok(table);
    };
    let translation: HashMap<String, String> = toml::from_str(raw)
        .with_context(|| format!("failed to parse label table: {}", code))?;
    for (key, label) in table.labels.iter_mut() {
        if let Some(regional) = translation.get(key)
            && !regional.trim().is_empty()
        {
            label.regional = regional.clone();
        }
    }
    debug!("applied {} label table", code);
    Ok(table)
}

pub fn available_codes() -> &'static [&'static str] {
    EMBEDDED_LABEL_CODES
}

pub fn language_name(code: &str) -> Option<&'static str> {
    let code = normalize_code(code);
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
}

fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_every_key() {
        let table = default_labels().unwrap();
        assert_eq!(table.iter().count(), LABEL_KEYS.len());
        assert_eq!(table.english("certificateTitle"), "Birth Certificate");
        assert_eq!(table.regional("certificateTitle"), "பிறப்பு சான்றிதழ்");
    }

    #[test]
    fn known_language_replaces_regional_text_only() {
        let table = labels_for("Hindi").unwrap();
        let label = table.get("name").unwrap();
        assert_eq!(label.english, "Name");
        assert_eq!(label.regional, "नाम");
        assert_eq!(table.bilingual("male"), "MALE / पुरुष");
    }

    #[test]
    fn unknown_language_falls_back_to_defaults() {
        let fallback = labels_for("klingon").unwrap();
        assert_eq!(fallback, default_labels().unwrap());
    }

    #[test]
    fn every_supported_language_has_a_complete_table() {
        for (code, _) in SUPPORTED_LANGUAGES {
            assert!(available_codes().contains(code), "missing table for {}", code);
            let raw = embedded_label_table(code).unwrap();
            let parsed: HashMap<String, String> = toml::from_str(raw).unwrap();
            for key in LABEL_KEYS {
                assert!(parsed.contains_key(*key), "{} lacks {}", code, key);
            }
        }
    }

    #[test]
    fn language_names_resolve() {
        assert_eq!(language_name(" TAMIL "), Some("Tamil"));
        assert_eq!(language_name("xx"), None);
    }
}
