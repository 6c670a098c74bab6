//! OCR a single page.

use crate::{
    async_utils::spawn_blocking_propagating_panics, job::ProcessingJob, prelude::*,
    recognize::Recognizer, render::PageRenderer,
};

/// Render, preprocess and recognize page `ordinal` (1-based) of `document`.
///
/// Rendering failures are returned as errors. Recognition failures are
/// logged and produce an empty string, so that one unreadable page never
/// costs us the rest of the document.
#[instrument(level = "debug", skip_all, fields(document = %document.display(), ordinal))]
pub async fn process_page(
    renderer: &dyn PageRenderer,
    recognizer: &dyn Recognizer,
    document: &Path,
    ordinal: usize,
    job: &ProcessingJob,
) -> Result<String> {
    let image = renderer.render_page(document, ordinal, job.zoom).await?;

    let preprocess = job.preprocess;
    let image = spawn_blocking_propagating_panics(move || preprocess.apply(image)).await;

    match recognizer.recognize(&image, &job.recognize_params()).await {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(
                "OCR error on page {} of {:?}: {:#}",
                ordinal,
                document.display(),
                err
            );
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use image::ColorType;

    use super::*;
    use crate::{
        job::Preprocess,
        pipeline::testing::{FakeRecognizer, FakeRenderer, write_fake_document},
    };

    #[tokio::test]
    async fn recognized_text_is_returned() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "book.pdf", 3)?;
        let job = ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().to_owned());
        let recognizer = FakeRecognizer::new();

        let text = process_page(&FakeRenderer, &recognizer, &doc, 2, &job).await?;
        assert_eq!(text, "text of page 2\n");

        let calls = recognizer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].page, 2);
        assert_eq!(calls[0].lang, "jpn_vert");
        assert_eq!(calls[0].psm, 5);
        assert_eq!(calls[0].color, ColorType::L8);
        Ok(())
    }

    #[tokio::test]
    async fn preprocessing_can_be_disabled() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "book.pdf", 1)?;
        let job = ProcessingJob {
            preprocess: Preprocess::AsRendered,
            ..ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().to_owned())
        };
        let recognizer = FakeRecognizer::new();

        process_page(&FakeRenderer, &recognizer, &doc, 1, &job).await?;
        assert_eq!(recognizer.calls()[0].color, ColorType::Rgb8);
        Ok(())
    }

    #[tokio::test]
    async fn recognition_failures_become_empty_text() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "book.pdf", 3)?;
        let job = ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().to_owned());
        let recognizer = FakeRecognizer::new().failing_on(&[2]);

        let text = process_page(&FakeRenderer, &recognizer, &doc, 2, &job).await?;
        assert_eq!(text, "");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_pages_become_empty_text() -> Result<()> {
        use std::time::{Duration, Instant};

        use crate::{
            pipeline::testing::write_hanging_executable,
            recognize::tesseract::TesseractRecognizer,
        };

        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "book.pdf", 1)?;
        let job = ProcessingJob {
            tesseract: Some(write_hanging_executable(tmpdir.path())?),
            page_timeout: Some(Duration::from_secs(1)),
            ..ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().to_owned())
        };

        let started = Instant::now();
        let text =
            process_page(&FakeRenderer, &TesseractRecognizer::new(), &doc, 1, &job).await?;
        assert_eq!(text, "");
        assert!(started.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[tokio::test]
    async fn render_failures_are_errors() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "book.pdf", 1)?;
        let job = ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().to_owned());
        let recognizer = FakeRecognizer::new();

        let result = process_page(&FakeRenderer, &recognizer, &doc, 5, &job).await;
        assert!(result.is_err());
        assert!(recognizer.calls().is_empty());
        Ok(())
    }
}
