//! OCR every page of one document into one text file.

use std::{io, ops::ControlFlow};

use tokio::{
    fs::File,
    io::{AsyncWriteExt as _, BufWriter},
};

use super::page::process_page;
use crate::{
    job::ProcessingJob, prelude::*, recognize::Recognizer, render::PageRenderer,
};

/// Errors which abandon a single document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document is missing, unreadable, or not a document at all.
    #[error("cannot open {path:?}: {cause:#}")]
    Open { path: PathBuf, cause: anyhow::Error },

    /// A page could not be rasterized.
    #[error("cannot render page {page} of {path:?}: {cause:#}")]
    Render {
        path: PathBuf,
        page: usize,
        cause: anyhow::Error,
    },

    /// The output file could not be written.
    #[error("cannot write {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How did processing a document end, if it didn't fail?
#[derive(Debug, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Every page was processed and the text was written here.
    Completed(PathBuf),
    /// The progress callback asked us to stop before page `pages_done + 1`.
    Stopped { pages_done: usize },
}

/// Format one page of output.
pub fn page_block(ordinal: usize, text: &str) -> String {
    format!("--- Page {ordinal} ---\n{text}\n\n")
}

/// OCR all pages of `document` in order, writing `<stem>_output.txt` into
/// the job's output directory.
///
/// `on_page_progress(current, total)` is called before each page. Returning
/// [`ControlFlow::Break`] stops processing, leaving the pages done so far in
/// the output file.
#[instrument(level = "debug", skip_all, fields(document = %document.display()))]
pub async fn process_document<F>(
    renderer: &dyn PageRenderer,
    recognizer: &dyn Recognizer,
    document: &Path,
    job: &ProcessingJob,
    mut on_page_progress: F,
) -> Result<DocumentOutcome, DocumentError>
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    let open_error = |cause| DocumentError::Open {
        path: document.to_owned(),
        cause,
    };
    let total = renderer.page_count(document).await.map_err(open_error)?;
    let output_path = job.output_path_for(document).map_err(open_error)?;
    debug!(total, output = %output_path.display(), "Opened document");

    let output_error = |source| DocumentError::Output {
        path: output_path.clone(),
        source,
    };
    let file = File::create(&output_path).await.map_err(output_error)?;
    let mut writer = BufWriter::new(file);

    for ordinal in 1..=total {
        if on_page_progress(ordinal, total).is_break() {
            writer.flush().await.map_err(output_error)?;
            return Ok(DocumentOutcome::Stopped {
                pages_done: ordinal - 1,
            });
        }

        let text = process_page(renderer, recognizer, document, ordinal, job)
            .await
            .map_err(|cause| DocumentError::Render {
                path: document.to_owned(),
                page: ordinal,
                cause,
            })?;
        writer
            .write_all(page_block(ordinal, &text).as_bytes())
            .await
            .map_err(output_error)?;
    }

    writer.flush().await.map_err(output_error)?;
    Ok(DocumentOutcome::Completed(output_path))
}
