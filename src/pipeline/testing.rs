//! In-process stand-ins for Poppler and Tesseract, for tests.
//!
//! A fake document is a text file containing `pages=N`. Anything else fails
//! to open, the way a corrupt PDF would. Rendered pages are 1 pixel high and
//! `ordinal` pixels wide, which lets [`FakeRecognizer`] tell them apart.

use std::sync::Mutex;

use image::{ColorType, DynamicImage, RgbImage};

use crate::{
    pipeline::events::StopFlag,
    prelude::*,
    recognize::{RecognizeParams, Recognizer},
    render::PageRenderer,
};

/// Write a fake document with `pages` pages into `dir`.
pub fn write_fake_document(dir: &Path, name: &str, pages: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("pages={pages}"))?;
    Ok(path)
}

/// Write a file which the fake renderer can't open.
pub fn write_corrupt_document(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, "%PDF-garbage")?;
    Ok(path)
}

/// Write an executable into `dir` which hangs instead of recognizing text.
#[cfg(unix)]
pub fn write_hanging_executable(dir: &Path) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt as _;

    let path = dir.join("tesseract");
    std::fs::write(&path, "#!/bin/sh\nsleep 30\necho too late\n")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Renders fake documents.
pub struct FakeRenderer;

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn page_count(&self, document: &Path) -> Result<usize> {
        let contents = tokio::fs::read_to_string(document).await?;
        contents
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("{:?} is not a valid document", document.display()))
    }

    async fn render_page(
        &self,
        document: &Path,
        ordinal: usize,
        _zoom: u32,
    ) -> Result<DynamicImage> {
        let total = self.page_count(document).await?;
        if ordinal == 0 || ordinal > total {
            return Err(anyhow!("page {ordinal} out of range 1..={total}"));
        }
        let width = u32::try_from(ordinal)?;
        Ok(DynamicImage::ImageRgb8(RgbImage::new(width, 1)))
    }
}

/// Like [`FakeRenderer`], but rasterizing page `broken_page` always fails.
pub struct BrokenPageRenderer {
    pub broken_page: usize,
}

#[async_trait]
impl PageRenderer for BrokenPageRenderer {
    async fn page_count(&self, document: &Path) -> Result<usize> {
        FakeRenderer.page_count(document).await
    }

    async fn render_page(
        &self,
        document: &Path,
        ordinal: usize,
        zoom: u32,
    ) -> Result<DynamicImage> {
        if ordinal == self.broken_page {
            return Err(anyhow!("pdftocairo failed with exit code 1"));
        }
        FakeRenderer.render_page(document, ordinal, zoom).await
    }
}

/// What [`FakeRecognizer`] was asked to do.
#[derive(Clone, Debug)]
pub struct RecognizeCall {
    pub page: u32,
    pub color: ColorType,
    pub lang: String,
    pub psm: u8,
}

/// Recognizes fake pages as `text of page N\n`.
#[derive(Default)]
pub struct FakeRecognizer {
    fail_pages: Vec<u32>,
    stop_on_page: Option<(u32, StopFlag)>,
    calls: Mutex<Vec<RecognizeCall>>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever one of these page ordinals is recognized.
    pub fn failing_on(mut self, pages: &[u32]) -> Self {
        self.fail_pages = pages.to_vec();
        self
    }

    /// Request a stop while recognizing page `page`.
    pub fn stopping_on(mut self, page: u32, stop: StopFlag) -> Self {
        self.stop_on_page = Some((page, stop));
        self
    }

    pub fn calls(&self) -> Vec<RecognizeCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn recognize(
        &self,
        image: &DynamicImage,
        params: &RecognizeParams<'_>,
    ) -> Result<String> {
        let page = image.width();
        self.calls.lock().expect("lock poisoned").push(RecognizeCall {
            page,
            color: image.color(),
            lang: params.lang.to_owned(),
            psm: params.psm,
        });
        if let Some((stop_page, stop)) = &self.stop_on_page
            && *stop_page == page
        {
            stop.request_stop();
        }
        if self.fail_pages.contains(&page) {
            return Err(anyhow!("Failed loading language '{}'", params.lang));
        }
        Ok(format!("text of page {page}\n"))
    }
}
