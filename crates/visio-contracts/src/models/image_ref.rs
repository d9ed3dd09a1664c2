use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub base64: String,
    pub mime_type: String,
}

impl UploadedImage {
    pub fn new(base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(BASE64.encode(bytes), mime_type)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let Some(mime) = mime_for_path(path) else {
            bail!("{} is not a supported image file", path.display());
        };
        let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Self::from_bytes(&bytes, mime))
    }

    pub fn to_ref(&self) -> ImageRef {
        ImageRef::from_payload(&self.mime_type, &self.base64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_payload(mime_type: &str, base64: &str) -> Self {
        Self(format!("data:{mime_type};base64,{base64}"))
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self::from_payload(mime_type, &BASE64.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> Option<(&str, &str)> {
        let (header, payload) = self.0.split_once(',')?;
        if header.is_empty() || payload.is_empty() {
            return None;
        }
        Some((header, payload))
    }

    pub fn mime_type(&self) -> Option<&str> {
        let (header, _) = self.split()?;
        let (_, after_colon) = header.split_once(':')?;
        let (mime, _) = after_colon.split_once(';')?;
        Some(mime).filter(|value| !value.is_empty())
    }

    pub fn to_uploaded_image(&self) -> Option<UploadedImage> {
        let (_, payload) = self.split()?;
        let mime = self.mime_type().unwrap_or(FALLBACK_MIME);
        Some(UploadedImage::new(payload, mime))
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        let Some((_, payload)) = self.split() else {
            bail!("malformed image reference");
        };
        BASE64
            .decode(payload.as_bytes())
            .context("image reference base64 decode failed")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    if lowered.contains("png") {
        return "png";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "jpeg"
}
