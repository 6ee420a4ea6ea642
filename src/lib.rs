use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;

pub mod backend;
pub mod certificate;
pub mod data;
pub mod identity;
pub mod labels;
pub mod logging;
pub mod session;
pub mod settings;

pub use backend::{BackendClient, DocumentSummary, UploadReceipt, Uploader};
pub use certificate::{Certificate, CertificateData};
pub use identity::IdentityContext;
pub use session::{SessionManager, SessionSnapshot, SessionStatus, SubmitOutcome};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub document_name: Option<String>,
    pub multi_page: Option<bool>,
    pub lang: Option<String>,
    pub fetch: Option<String>,
    pub documents: bool,
    pub citizen_id: Option<String>,
    pub search: Option<String>,
    pub show_languages: bool,
    pub show_labels: bool,
    pub settings_path: Option<String>,
}

/// Runs one non-interactive command and returns what should be printed.
/// With no listing flag set, `files` are uploaded as one document.
pub async fn run(config: Config, files: Vec<String>) -> Result<String> {
    if config.show_languages {
        return Ok(format_languages());
    }
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let lang = config
        .lang
        .clone()
        .unwrap_or_else(|| settings.certificate_language.clone());

    if config.show_labels {
        return format_labels(&lang);
    }

    let client = BackendClient::new(&settings.backend)?;

    if let Some(id) = config.fetch.as_deref() {
        let certificate = certificate::load_certificate(&client, id, &lang).await?;
        return certificate.render_text(&settings.verify_base_url);
    }

    if config.documents {
        let identity = IdentityContext::with_citizen_id(config.citizen_id.unwrap_or_default());
        let documents = client.list_documents(&identity).await?;
        let term = config.search.as_deref().unwrap_or_default();
        return Ok(format_documents(&backend::filter_documents(&documents, term)));
    }

    if files.is_empty() {
        return Err(anyhow!("no image files given"));
    }
    let inputs = files
        .iter()
        .map(|file| data::load_image(Path::new(file)))
        .collect::<Result<Vec<_>>>()?;

    let manager = SessionManager::new(Arc::new(client), settings.auto_reset_delay);
    manager.add_pages(inputs);
    if let Some(name) = config.document_name {
        manager.set_document_name(name);
    }
    if let Some(flag) = config.multi_page {
        manager.set_multi_page(flag);
    }

    match manager.submit().await {
        SubmitOutcome::Completed { receipt, .. } => {
            Ok(format_receipt(&manager.document_id(), &receipt))
        }
        SubmitOutcome::Failed { message } => Err(anyhow!(message)),
        SubmitOutcome::Skipped => Err(anyhow!("no pages to upload")),
        SubmitOutcome::InFlight | SubmitOutcome::Discarded => {
            Err(anyhow!("upload did not finish"))
        }
    }
}

pub fn format_languages() -> String {
    labels::available_codes()
        .iter()
        .map(|&code| format!("{}\t{}", code, labels::language_name(code).unwrap_or(code)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_labels(lang: &str) -> Result<String> {
    let table = labels::labels_for(lang)
        .with_context(|| format!("failed to load labels for {}", lang))?;
    let heading = match labels::language_name(lang) {
        Some(name) => format!("language: {}", name),
        None => format!("language: {} (default labels)", lang.trim()),
    };
    let mut lines = vec![heading];
    lines.extend(
        table
            .iter()
            .map(|(key, label)| format!("{}\t{}\t{}", key, label.english, label.regional)),
    );
    Ok(lines.join("\n"))
}

pub fn format_documents(documents: &[&DocumentSummary]) -> String {
    if documents.is_empty() {
        return "no documents".to_string();
    }
    documents
        .iter()
        .map(|doc| {
            format!(
                "{}\t{}\t{}\t{}\t{}",
                doc.id, doc.name, doc.kind, doc.date, doc.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_receipt(document_id: &str, receipt: &UploadReceipt) -> String {
    let mut lines = vec![format!(
        "uploaded {} ({} page(s))",
        receipt.document_id.as_deref().unwrap_or(document_id),
        receipt.page_count.unwrap_or(receipt.pages.len())
    )];
    for page in &receipt.pages {
        lines.push(format!("  {}\t{}\t{}", page.page_number, page.id, page.filename));
    }
    lines.join("\n")
}

pub fn format_snapshot(snapshot: &SessionSnapshot) -> String {
    let name = if snapshot.document_name.trim().is_empty() {
        "(default)"
    } else {
        snapshot.document_name.as_str()
    };
    let mut lines = vec![
        format!("document: {}", snapshot.document_id),
        format!("name: {}", name),
        format!("multi-page: {}", snapshot.is_multi_page),
        format!("status: {}", snapshot.status.as_str()),
        format!("pages: {}", snapshot.pages.len()),
    ];
    if snapshot.dirty {
        lines.push("unsaved changes".to_string());
    }
    if let Some(error) = snapshot.last_error.as_deref() {
        lines.push(format!("error: {}", error));
    }
    lines.join("\n")
}

pub fn format_pages(snapshot: &SessionSnapshot) -> String {
    if snapshot.pages.is_empty() {
        return "no pages".to_string();
    }
    snapshot
        .pages
        .iter()
        .map(|page| {
            format!(
                "{}\t{}\t{}\t{} bytes\t{}",
                page.page_number,
                page.name.as_deref().unwrap_or("-"),
                page.mime,
                page.size,
                page.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str) -> DocumentSummary {
        DocumentSummary {
            id: "d-1".to_string(),
            name: name.to_string(),
            kind: "Certificate".to_string(),
            date: "2025-03-01".to_string(),
            status: "Completed".to_string(),
        }
    }

    #[test]
    fn languages_list_every_table() {
        let output = format_languages();
        assert_eq!(output.lines().count(), labels::SUPPORTED_LANGUAGES.len());
        assert!(output.starts_with("bengali\tBengali"));
        assert!(output.contains("tamil\tTamil"));
    }

    #[test]
    fn labels_name_their_language() {
        let hindi = format_labels("hindi").unwrap();
        assert!(hindi.starts_with("language: Hindi\n"));
        assert!(hindi.contains("name\tName\tनाम"));

        let unknown = format_labels("klingon").unwrap();
        assert!(unknown.starts_with("language: klingon (default labels)"));
        assert_eq!(unknown.lines().count(), labels::LABEL_KEYS.len() + 1);
    }

    #[test]
    fn documents_format_one_row_each() {
        let doc = summary("Birth Certificate");
        assert_eq!(
            format_documents(&[&doc]),
            "d-1\tBirth Certificate\tCertificate\t2025-03-01\tCompleted"
        );
        assert_eq!(format_documents(&[]), "no documents");
    }

    #[test]
    fn receipt_prefers_backend_values() {
        let receipt: UploadReceipt = serde_json::from_str(
            r#"{"success": true, "documentId": "srv-1", "pageCount": 1,
                "pages": [{"id": "p1", "pageNumber": 1, "filename": "page-1.jpg"}]}"#,
        )
        .unwrap();
        let output = format_receipt("local", &receipt);
        assert!(output.starts_with("uploaded srv-1 (1 page(s))"));
        assert!(output.contains("page-1.jpg"));
    }

    #[tokio::test]
    async fn show_languages_needs_no_backend() {
        let config = Config {
            show_languages: true,
            ..Config::default()
        };
        let output = run(config, Vec::new()).await.unwrap();
        assert!(output.contains("punjabi\tPunjabi"));
    }

    #[tokio::test]
    async fn upload_without_files_is_an_error() {
        let err = run(Config::default(), Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "no image files given");
    }
}
