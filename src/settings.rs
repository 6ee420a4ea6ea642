use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub auto_reset_delay: Duration,
    pub certificate_language: String,
    pub verify_base_url: String,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub upload_path: String,
    pub translate_path: String,
    pub storage_path: String,
    pub documents_path: String,
    /// Per-request timeout; zero disables it.
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            upload_path: "/api/upload-document".to_string(),
            translate_path: "/api/translate".to_string(),
            storage_path: "/storage".to_string(),
            documents_path: "/documents".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            auto_reset_delay: Duration::from_millis(2000),
            certificate_language: "tamil".to_string(),
            verify_base_url: "https://host/docs".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    backend: Option<BackendSection>,
    session: Option<SessionSection>,
    certificate: Option<CertificateSection>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSection {
    base_url: Option<String>,
    upload_path: Option<String>,
    translate_path: Option<String>,
    storage_path: Option<String>,
    documents_path: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionSection {
    auto_reset_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CertificateSection {
    language: Option<String>,
    verify_base_url: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Builds settings from the compiled-in defaults and then every existing
/// file in `paths`, later files overriding earlier ones.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);

    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(backend) = incoming.backend {
            merge_string(&mut self.backend.base_url, backend.base_url);
            merge_string(&mut self.backend.upload_path, backend.upload_path);
            merge_string(&mut self.backend.translate_path, backend.translate_path);
            merge_string(&mut self.backend.storage_path, backend.storage_path);
            merge_string(&mut self.backend.documents_path, backend.documents_path);
            if let Some(secs) = backend.timeout_secs
                && secs > 0
            {
                self.backend.timeout = Duration::from_secs(secs);
            }
        }
        if let Some(session) = incoming.session
            && let Some(ms) = session.auto_reset_ms
            && ms > 0
        {
            self.auto_reset_delay = Duration::from_millis(ms);
        }
        if let Some(certificate) = incoming.certificate {
            merge_string(&mut self.certificate_language, certificate.language);
            merge_string(&mut self.verify_base_url, certificate.verify_base_url);
        }
    }
}

fn merge_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        if !value.is_empty() {
            *target = value.to_string();
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".doc-digitizer"))
        }
    })
}
