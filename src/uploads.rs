use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::error::AppError;

const WINDOWS_DEVICE_FILES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduces a client-supplied file name to `[A-Za-z0-9_.-]`, with path
/// separators and whitespace folded into `_`. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_FILES.contains(&stem.to_ascii_uppercase().as_str()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// A file part from a multipart form.
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// The sanitized name, or `None` when nothing usable was submitted.
    pub fn sanitized_name(&self) -> Option<String> {
        Some(secure_filename(&self.file_name)).filter(|name| !name.is_empty())
    }
}

pub struct StoredImage {
    pub path: PathBuf,
    pub image: RgbImage,
}

impl StoredImage {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// The directory uploaded images are written to and served from.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub async fn create(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for `name`, prefixed with the content hash so different
    /// files never share a path and identical files always do.
    pub fn destination(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let digest = blake3::hash(bytes).to_hex();
        self.root.join(format!("{}_{name}", &digest.as_str()[..16]))
    }

    /// Decodes `bytes` as an image and writes them under the upload
    /// directory. Nothing is written when decoding fails.
    pub async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<StoredImage, AppError> {
        let (bytes, decoded) = tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes).map(|image| image.to_rgb8());
            (bytes, decoded)
        })
        .await?;
        let image = decoded.map_err(AppError::InvalidImage)?;

        let path = self.destination(name, &bytes);
        tokio::fs::write(&path, &bytes).await?;

        Ok(StoredImage { path, image })
    }
}

/// Public URL of a stored image, served under `/static`.
pub fn public_url(image_path: &str) -> String {
    let name = Path::new(image_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/static/{name}")
}
