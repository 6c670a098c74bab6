//! The parameters of one batch run.

use std::{ops::RangeInclusive, time::Duration};

use clap::ValueEnum;
use image::DynamicImage;

use crate::{prelude::*, recognize::RecognizeParams};

/// Default rasterization zoom. Zoom 1 is 72 DPI.
pub const DEFAULT_ZOOM: u32 = 3;

/// Default Tesseract page-segmentation mode: a single uniform block of
/// vertically aligned text.
pub const DEFAULT_PSM: u8 = 5;

/// Default Tesseract language.
pub const DEFAULT_LANG: &str = "jpn_vert";

/// Default extension of input documents.
pub const DEFAULT_EXTENSION: &str = "pdf";

/// Zoom factors we accept.
pub const ZOOM_RANGE: RangeInclusive<u32> = 1..=10;

/// Page-segmentation modes Tesseract understands.
pub const PSM_RANGE: RangeInclusive<u8> = 1..=13;

/// Preprocessing applied to each rendered page before recognition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Preprocess {
    /// Convert to single-channel grayscale.
    #[default]
    Grayscale,
    /// Hand the rendered image to the recognizer unchanged.
    #[value(name = "none")]
    AsRendered,
}

impl Preprocess {
    /// Apply this preprocessing step. This is CPU-bound, so call it from a
    /// blocking thread.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Preprocess::Grayscale => DynamicImage::ImageLuma8(image.to_luma8()),
            Preprocess::AsRendered => image,
        }
    }
}

/// Everything needed to process a batch of documents. Built once per run and
/// never modified afterwards.
#[derive(Clone, Debug)]
pub struct ProcessingJob {
    /// Directory scanned (non-recursively) for input documents.
    pub source_dir: PathBuf,
    /// Directory where `<stem>_output.txt` files are written.
    pub output_dir: PathBuf,
    /// Linear magnification used when rasterizing pages.
    pub zoom: u32,
    /// Tesseract page-segmentation mode.
    pub psm: u8,
    /// Tesseract language identifier, e.g. `jpn_vert` or `jpn+eng`.
    pub lang: String,
    /// Explicit path to the `tesseract` executable. `None` means `PATH`.
    pub tesseract: Option<PathBuf>,
    /// Preprocessing applied to every page.
    pub preprocess: Preprocess,
    /// File extension (without the dot) of input documents.
    pub extension: String,
    /// Give up on a single page's recognition after this long.
    pub page_timeout: Option<Duration>,
}

impl ProcessingJob {
    /// Create a job with default OCR settings.
    pub fn new(source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            source_dir,
            output_dir,
            zoom: DEFAULT_ZOOM,
            psm: DEFAULT_PSM,
            lang: DEFAULT_LANG.to_owned(),
            tesseract: None,
            preprocess: Preprocess::default(),
            extension: DEFAULT_EXTENSION.to_owned(),
            page_timeout: None,
        }
    }

    /// Check that our numeric settings are in range.
    pub fn validate(&self) -> Result<()> {
        if !ZOOM_RANGE.contains(&self.zoom) {
            return Err(anyhow!(
                "zoom must be between {} and {}, got {}",
                ZOOM_RANGE.start(),
                ZOOM_RANGE.end(),
                self.zoom
            ));
        }
        if !PSM_RANGE.contains(&self.psm) {
            return Err(anyhow!(
                "page-segmentation mode must be between {} and {}, got {}",
                PSM_RANGE.start(),
                PSM_RANGE.end(),
                self.psm
            ));
        }
        if self.lang.trim().is_empty() {
            return Err(anyhow!("language must not be empty"));
        }
        Ok(())
    }

    /// Where should we write the text for `document`?
    pub fn output_path_for(&self, document: &Path) -> Result<PathBuf> {
        let stem = document
            .file_stem()
            .with_context(|| format!("no file name in {:?}", document.display()))?;
        Ok(self
            .output_dir
            .join(format!("{}_output.txt", stem.to_string_lossy())))
    }

    /// Recognizer parameters for this job.
    pub fn recognize_params(&self) -> RecognizeParams<'_> {
        RecognizeParams {
            executable: self.tesseract.as_deref(),
            lang: &self.lang,
            psm: self.psm,
            timeout: self.page_timeout,
        }
    }
}

/// The identifier we record in the completion ledger: the base file name.
pub fn document_id(document: &Path) -> Result<String> {
    let name = document
        .file_name()
        .with_context(|| format!("no file name in {:?}", document.display()))?;
    Ok(name.to_string_lossy().into_owned())
}
