//! Text recognition interface.

use std::time::Duration;

use image::DynamicImage;

use crate::prelude::*;

pub mod tesseract;

/// Per-call recognizer settings. These come from the
/// [`ProcessingJob`](crate::job::ProcessingJob) and are passed explicitly on
/// every call.
#[derive(Clone, Copy, Debug)]
pub struct RecognizeParams<'a> {
    /// Path to the engine executable, if not on `PATH`.
    pub executable: Option<&'a Path>,
    /// Language identifier.
    pub lang: &'a str,
    /// Page-segmentation mode.
    pub psm: u8,
    /// Maximum time to spend on this image.
    pub timeout: Option<Duration>,
}

/// Interface to an OCR engine.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// Recognize the text in a single page image.
    async fn recognize(
        &self,
        image: &DynamicImage,
        params: &RecognizeParams<'_>,
    ) -> Result<String>;
}
