use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub const JPEG_MIME: &str = "image/jpeg";

/// One raw image handed to a capture session, either picked from disk or
/// produced by a capture device.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Reads an image file, rejecting anything that is not an image.
pub fn load_image(path: &Path) -> Result<ImageInput> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    load_image_from_bytes(bytes, name.as_deref())
        .with_context(|| format!("rejected input: {}", path.display()))
}

pub fn load_image_from_bytes(bytes: Vec<u8>, name: Option<&str>) -> Result<ImageInput> {
    if bytes.is_empty() {
        return Err(anyhow!("image data is empty"));
    }
    let mime = detect_image_mime(&bytes, name).ok_or_else(|| {
        anyhow!(
            "only image files can be added as pages (got {})",
            infer::get(&bytes)
                .map(|kind| kind.mime_type())
                .unwrap_or("unknown data")
        )
    })?;
    Ok(ImageInput {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    })
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

fn detect_image_mime(bytes: &[u8], name: Option<&str>) -> Option<String> {
    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        return is_image_mime(detected).then(|| detected.to_string());
    }
    // Formats infer does not sniff fall back to the file extension.
    let ext = name
        .and_then(|value| Path::new(value).extension())
        .and_then(|value| value.to_str())?
        .to_ascii_lowercase();
    mime_from_extension(&ext).map(|value| value.to_string())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}
