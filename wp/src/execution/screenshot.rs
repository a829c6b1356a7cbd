//! Screenshots reported by the execution agent
//!
//! Agents report images either as `data:image/...;base64,...` URIs or as bare
//! base64. The decoded bytes are kept in memory for the current attempt and
//! may be exported to disk on a best-effort basis.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("Data URI is missing the ',' separator")]
    MalformedUri,

    #[error("Data URI is not base64 encoded")]
    NotBase64,

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Image data is empty")]
    Empty,
}

/// Image container formats recognised by their magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Unknown,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes {
            [0x89, b'P', b'N', b'G', ..] => Self::Png,
            [0xFF, 0xD8, 0xFF, ..] => Self::Jpeg,
            [b'G', b'I', b'F', b'8', ..] => Self::Gif,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Self::Webp,
            _ => Self::Unknown,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Unknown => "bin",
        }
    }
}

/// One decoded screenshot
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screenshot")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Screenshot {
    /// Wrap raw image bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ScreenshotError> {
        if bytes.is_empty() {
            return Err(ScreenshotError::Empty);
        }
        let format = ImageFormat::sniff(&bytes);
        Ok(Self { bytes, format })
    }

    /// Decode a `data:` URI, or bare base64 when there is no `data:` prefix
    pub fn decode(encoded: &str) -> Result<Self, ScreenshotError> {
        let encoded = encoded.trim();
        let payload = match encoded.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or(ScreenshotError::MalformedUri)?;
                if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
                    return Err(ScreenshotError::NotBase64);
                }
                payload
            }
            None => encoded,
        };

        let bytes = STANDARD.decode(payload.trim())?;
        debug!(len = bytes.len(), "Screenshot::decode: decoded");
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// File name used when exporting the screenshot of `step`
    pub fn file_name(&self, step: u32) -> String {
        format!("step-{:03}.{}", step, self.format.extension())
    }

    /// Write the screenshot into `dir`, creating it if needed
    pub fn export(&self, dir: &Path, step: u32) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name(step));
        std::fs::write(&path, &self.bytes)?;
        debug!(?path, "Screenshot::export: written");
        Ok(path)
    }
}
