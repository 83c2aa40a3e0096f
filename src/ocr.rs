//! OCR of image attachments
//!
//! Two engines: the `tesseract` command line tool and Gemini vision.
//! Callers treat failures as non-fatal and keep collecting.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{OcrBackendKind, OcrSettings};
use crate::error::{Error, Result};
use crate::integrations::GeminiClient;

#[derive(Debug, Clone)]
pub enum OcrEngine {
    Tesseract { bin: String, languages: String },
    Gemini(GeminiClient),
}

impl OcrEngine {
    /// Build the configured engine, or `None` when OCR is disabled.
    pub fn from_settings(settings: &OcrSettings) -> Result<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }

        let engine = match settings.backend {
            OcrBackendKind::Tesseract => OcrEngine::Tesseract {
                bin: settings.tesseract_bin.clone(),
                languages: settings.languages.clone(),
            },
            OcrBackendKind::Gemini => {
                OcrEngine::Gemini(GeminiClient::from_env(&settings.gemini_model)?)
            }
        };
        Ok(Some(engine))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OcrEngine::Tesseract { .. } => "tesseract",
            OcrEngine::Gemini(_) => "gemini",
        }
    }

    /// Recognise text in an image file.
    pub async fn recognize_file(&self, path: &Path) -> Result<String> {
        let raw = match self {
            OcrEngine::Tesseract { bin, languages } => {
                run_tesseract(bin, languages, path).await?
            }
            OcrEngine::Gemini(client) => {
                let data = tokio::fs::read(path).await?;
                client.transcribe(&data, mime_for(path)).await?
            }
        };
        Ok(normalize_ocr_text(&raw))
    }

    /// Recognise text in in-memory image bytes.
    pub async fn recognize_bytes(&self, data: &[u8], mime_type: &str) -> Result<String> {
        match self {
            OcrEngine::Gemini(client) => {
                let raw = client.transcribe(data, mime_type).await?;
                Ok(normalize_ocr_text(&raw))
            }
            OcrEngine::Tesseract { .. } => {
                let dir = tempfile::tempdir()?;
                let path = dir.path().join(format!("image.{}", extension_for(mime_type)));
                tokio::fs::write(&path, data).await?;
                self.recognize_file(&path).await
            }
        }
    }

    /// Like [`OcrEngine::recognize_bytes`] but logs and swallows failures.
    pub async fn try_recognize(&self, data: &[u8], mime_type: &str) -> Option<String> {
        match self.recognize_bytes(data, mime_type).await {
            Ok(text) if text.is_empty() => None,
            Ok(text) => Some(text),
            Err(err) => {
                warn!(engine = self.name(), "OCR failed: {}", err);
                None
            }
        }
    }
}

async fn run_tesseract(bin: &str, languages: &str, path: &Path) -> Result<String> {
    debug!(bin, languages, path = %path.display(), "Running tesseract");
    let output = Command::new(bin)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .output()
        .await
        .map_err(|e| Error::OcrError(format!("failed to run {}: {}", bin, e)))?;

    if !output.status.success() {
        return Err(Error::OcrError(format!(
            "{} exited with {}: {}",
            bin,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

/// Trim lines, drop trailing whitespace and collapse runs of blank lines.
pub fn normalize_ocr_text(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank = false;

    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            blank = !out.is_empty();
            continue;
        }
        if blank {
            out.push("");
            blank = false;
        }
        out.push(line);
    }

    out.join("\n")
}
