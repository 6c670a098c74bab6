//! Rasterize PDF pages using Poppler's command-line tools.

use std::{collections::BTreeMap, sync::LazyLock};

use image::DynamicImage;
use regex::Regex;
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    prelude::*,
};

/// The MIME type we accept as a document.
const PDF_MIME_TYPE: &str = "application/pdf";

/// Resolution corresponding to a zoom of 1.
const BASE_DPI: u32 = 72;

/// Poppler prints errors as lines containing "error".
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler recovers from broken cross-reference tables on its own.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Something which can turn document pages into images.
#[async_trait]
pub trait PageRenderer: Send + Sync + 'static {
    /// Open `document` and count its pages. Fails if the document is missing
    /// or unreadable.
    async fn page_count(&self, document: &Path) -> Result<usize>;

    /// Render the 1-based page `ordinal` at `zoom` times its natural size.
    async fn render_page(
        &self,
        document: &Path,
        ordinal: usize,
        zoom: u32,
    ) -> Result<DynamicImage>;
}

/// A [`PageRenderer`] using `pdfinfo` and `pdftocairo`.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct PopplerRenderer {}

impl PopplerRenderer {
    /// Create a new Poppler-based renderer.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl PageRenderer for PopplerRenderer {
    #[instrument(level = "debug", skip_all, fields(path = %document.display()))]
    async fn page_count(&self, document: &Path) -> Result<usize> {
        let mime_type = get_mime_type(document)?;
        if mime_type != PDF_MIME_TYPE {
            return Err(anyhow!(
                "{:?} is {}, not a PDF",
                document.display(),
                mime_type
            ));
        }
        get_pdf_page_count(document).await
    }

    #[instrument(level = "debug", skip_all, fields(path = %document.display(), ordinal, zoom))]
    async fn render_page(
        &self,
        document: &Path,
        ordinal: usize,
        zoom: u32,
    ) -> Result<DynamicImage> {
        // pdftocairo appends `.png` to this prefix when given `-singlefile`.
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let out_prefix = tmpdir.path().join("page");
        let page = ordinal.to_string();
        let output = Command::new("pdftocairo")
            .arg("-png")
            .arg("-r")
            .arg((BASE_DPI * zoom).to_string())
            .arg("-f")
            .arg(&page)
            .arg("-l")
            .arg(&page)
            .arg("-singlefile")
            .arg(document)
            .arg(&out_prefix)
            .output()
            .await
            .with_context(|| {
                format!("failed to run pdftocairo on {:?}", document.display())
            })?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        let png_path = out_prefix.with_extension("png");
        let image = spawn_blocking_propagating_panics(move || {
            image::open(&png_path)
                .with_context(|| format!("failed to read {:?}", png_path.display()))
        })
        .await?;
        // `tmpdir` must outlive the decode above.
        drop(tmpdir);
        Ok(image)
    }
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    // Run pdfinfo to get the number of pages.
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    check_for_command_failure("pdfinfo", &output, None)?;

    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    parse_pdfinfo_page_count(&output).with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Pull the `Pages:` property out of `pdfinfo` output.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("no page count in pdfinfo output"))?;
    Ok(page_count_str.parse::<usize>()?)
}

/// Get the MIME type of a file.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}
