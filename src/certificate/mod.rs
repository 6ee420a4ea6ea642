use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tera::{Context as TeraContext, Tera};
use tracing::warn;

use crate::backend::BackendClient;
use crate::labels::{self, LabelTable};

const CERTIFICATE_TEMPLATE: &str = include_str!("templates/certificate.txt.tera");
const DEFAULT_CERTIFICATE: &str = "Birth Certificate";
const DEFAULT_VALIDITY: &str = "LIFETIME";
const MONTHS: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

/// Extracted certificate fields. Missing, null and empty values collapse to
/// the defaults below.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CertificateData {
    pub address: Option<String>,
    pub certificate: String,
    pub date_of_birth: String,
    pub date_of_death: Option<String>,
    pub date_of_issue: String,
    pub date_of_registration: String,
    pub father_name: String,
    pub mother_name: String,
    pub name: String,
    pub office_seal_present: bool,
    pub place_of_birth: String,
    pub registration_number: String,
    pub sex: String,
    pub permanent_address: Option<String>,
    pub validity: Option<String>,
}

impl CertificateData {
    pub fn from_extracted(fields: &Map<String, Value>) -> Self {
        Self {
            address: text(fields, "address"),
            certificate: text(fields, "certificate")
                .unwrap_or_else(|| DEFAULT_CERTIFICATE.to_string()),
            date_of_birth: text(fields, "date_of_birth").unwrap_or_default(),
            date_of_death: text(fields, "date_of_death"),
            date_of_issue: text(fields, "date_of_issue").unwrap_or_default(),
            date_of_registration: text(fields, "date_of_registration").unwrap_or_default(),
            father_name: text(fields, "father_name").unwrap_or_default(),
            mother_name: text(fields, "mother_name").unwrap_or_default(),
            name: text(fields, "name").unwrap_or_default(),
            office_seal_present: fields
                .get("office_seal_present")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            place_of_birth: text(fields, "place_of_birth").unwrap_or_default(),
            registration_number: text(fields, "registration_number").unwrap_or_default(),
            sex: text(fields, "sex").unwrap_or_default(),
            permanent_address: text(fields, "permanent_address"),
            validity: text(fields, "validity"),
        }
    }

    /// The field map sent to the translation backend.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match fields.get(key)? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

/// `23/05/2005` becomes `23-MAY-2005`. Input that is not a `dd/mm/yyyy`
/// date is returned unchanged.
pub fn format_date_in_words(date: &str) -> String {
    let parts = date.trim().split('/').collect::<Vec<_>>();
    let [day, month, year] = parts.as_slice() else {
        return date.to_string();
    };
    let month_name = month
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|value| (1..=12).contains(value))
        .map(|value| MONTHS[value - 1]);
    let valid_day = day
        .trim()
        .parse::<u8>()
        .is_ok_and(|value| (1..=31).contains(&value));
    let valid_year = !year.trim().is_empty() && year.trim().chars().all(|c| c.is_ascii_digit());
    match month_name {
        Some(month_name) if valid_day && valid_year => {
            format!("{}-{}-{}", day.trim(), month_name, year.trim())
        }
        _ => date.to_string(),
    }
}

pub fn verification_url(base: &str, registration_number: &str) -> String {
    let reg = registration_number.trim();
    let reg = if reg.is_empty() { "unknown" } else { reg };
    format!("{}/{}", base.trim_end_matches('/'), reg)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Certificate {
    pub language: String,
    pub labels: LabelTable,
    pub data: CertificateData,
    pub translated: bool,
}

impl Certificate {
    pub fn new(data: CertificateData, language: &str) -> Result<Self> {
        Ok(Self {
            language: language.trim().to_string(),
            labels: labels::labels_for(language)?,
            data,
            translated: false,
        })
    }

    pub fn sex_display(&self) -> String {
        match self.data.sex.as_str() {
            "Male" => self.labels.bilingual("male"),
            "Female" => self.labels.bilingual("female"),
            other => other.to_string(),
        }
    }

    pub fn permanent_address(&self) -> &str {
        self.data
            .permanent_address
            .as_deref()
            .or(self.data.address.as_deref())
            .unwrap_or_default()
    }

    /// Label/value pairs, left column first.
    pub fn rows(&self) -> Vec<CertificateRow> {
        let data = &self.data;
        let date_of_birth = if data.date_of_birth.is_empty() {
            String::new()
        } else {
            format!(
                "{} ({})",
                data.date_of_birth,
                format_date_in_words(&data.date_of_birth)
            )
        };
        [
            ("name", data.name.clone()),
            ("dateOfBirth", date_of_birth),
            ("motherName", data.mother_name.clone()),
            ("birthAddress", data.address.clone().unwrap_or_default()),
            ("regNumber", data.registration_number.clone()),
            ("issueDate", data.date_of_issue.clone()),
            ("sex", self.sex_display()),
            ("birthPlace", data.place_of_birth.clone()),
            ("fatherName", data.father_name.clone()),
            ("permAddress", self.permanent_address().to_string()),
            ("regDate", data.date_of_registration.clone()),
        ]
        .into_iter()
        .map(|(key, value)| CertificateRow {
            label: self.labels.bilingual(key),
            value,
        })
        .collect()
    }

    pub fn render_text(&self, verify_base_url: &str) -> Result<String> {
        let labels = &self.labels;
        let mut context = TeraContext::new();
        context.insert("govt_title", &labels.bilingual("govtTitle"));
        context.insert("dept_title", &labels.bilingual("deptTitle"));
        context.insert("certificate_title", &labels.bilingual("certificateTitle"));
        context.insert("legal_regional", labels.regional("legalText1"));
        context.insert("legal_english", labels.english("legalText1"));
        context.insert("rows", &self.rows());
        context.insert("signed_label", labels.english("digitallySigned"));
        context.insert("date_label", labels.english("date"));
        context.insert("scan_label", labels.english("scanQR"));
        context.insert(
            "verify_url",
            &verification_url(verify_base_url, &self.data.registration_number),
        );
        context.insert("validity_label", labels.english("validity"));
        context.insert(
            "validity",
            self.data.validity.as_deref().unwrap_or(DEFAULT_VALIDITY),
        );
        context.insert("authority_label", labels.english("issuingAuthority"));
        context.insert("registrar", labels.english("registrar"));
        context.insert("office_seal_present", &self.data.office_seal_present);
        Tera::one_off(CERTIFICATE_TEMPLATE, &context, false)
            .with_context(|| "failed to render certificate template")
    }
}

/// Fetches the stored extraction for `id`, asks the backend to translate it
/// into `language` and pairs it with that language's labels. A failed
/// translation keeps the untranslated values.
pub async fn load_certificate(
    client: &BackendClient,
    id: &str,
    language: &str,
) -> Result<Certificate> {
    let extracted = client
        .fetch_extracted(id)
        .await
        .with_context(|| format!("failed to load stored document {}", id))?;
    let data = CertificateData::from_extracted(&extracted);
    let mut certificate = Certificate::new(data, language)?;

    match client
        .translate_fields(&certificate.data.to_fields(), language)
        .await
    {
        Ok(translated) => {
            let mut merged = certificate.data.to_fields();
            merged.extend(translated);
            certificate.data = CertificateData::from_extracted(&merged);
            certificate.translated = true;
        }
        Err(err) => warn!("Translation error: {:#}", err),
    }
    Ok(certificate)
}
