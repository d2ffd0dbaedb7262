use billscan_core::{ErrorClass, ErrorKind};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Extensions accepted as bill inputs (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported file format: '{0}'")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("PDF rasterization failed: {0}")]
    Rasterize(String),
    #[error("Document produced no pages")]
    NoPages,
}

impl ErrorClass for LoadError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::LoadError
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "jpg" | "jpeg" | "png" => Some(DocumentKind::Image),
            _ => None,
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Resolution used when rendering PDF pages.
    pub pdf_dpi: u32,
    /// Number of leading PDF pages to render.
    pub max_pages: u32,
    /// Poppler `pdftoppm` executable.
    pub pdftoppm: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            pdf_dpi: 300,
            max_pages: 1,
            pdftoppm: PathBuf::from("pdftoppm"),
        }
    }
}

/// Turns an input file into page images: one for a photo or scan, one per
/// rendered page for a PDF.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    config: LoaderConfig,
}

impl DocumentLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn load(&self, path: &Path) -> Result<Vec<DynamicImage>, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let kind = DocumentKind::from_path(path).ok_or_else(|| {
            LoadError::Unsupported(
                path.extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            )
        })?;

        let pages = match kind {
            DocumentKind::Image => vec![ImageReader::open(path)?.with_guessed_format()?.decode()?],
            DocumentKind::Pdf => self.rasterize_pdf(path)?,
        };
        if pages.is_empty() {
            return Err(LoadError::NoPages);
        }
        Ok(pages)
    }

    fn rasterize_pdf(&self, path: &Path) -> Result<Vec<DynamicImage>, LoadError> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");

        let output = Command::new(&self.config.pdftoppm)
            .arg("-png")
            .arg("-r")
            .arg(self.config.pdf_dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(self.config.max_pages.max(1).to_string())
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                LoadError::Rasterize(format!(
                    "could not run {}: {e}",
                    self.config.pdftoppm.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoadError::Rasterize(stderr.trim().to_string()));
        }

        // pdftoppm zero-pads page numbers uniformly, so name order is page order.
        let mut rendered: Vec<PathBuf> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "png"))
            .collect();
        rendered.sort();

        rendered
            .iter()
            .map(|p| image::open(p).map_err(LoadError::from))
            .collect()
    }
}
