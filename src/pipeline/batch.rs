//! Run a whole directory of documents, skipping ones we've already done.

use std::{ops::ControlFlow, sync::Arc};

use tokio::fs;

use super::{
    document::{DocumentOutcome, process_document},
    events::{BatchEvent, EventSink, StopFlag},
};
use crate::{
    job::{ProcessingJob, document_id},
    ledger::CompletionLedger,
    prelude::*,
    recognize::Recognizer,
    render::PageRenderer,
};

/// What happened during a batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// How many candidate documents did we find?
    pub discovered: usize,
    /// How many documents did we finish and record in the ledger?
    pub completed: usize,
    /// How many documents were already in the ledger?
    pub skipped: usize,
    /// How many documents failed?
    pub failed: usize,
    /// Did the user stop the run early?
    pub stopped: bool,
}

impl BatchSummary {
    /// Fraction of attempted documents that failed.
    pub fn failure_rate(&self) -> f32 {
        let attempted = self.completed + self.failed;
        if attempted == 0 {
            0.0
        } else {
            self.failed as f32 / attempted as f32
        }
    }
}

/// Drives documents through the OCR pipeline one at a time, reporting
/// progress as [`BatchEvent`]s.
pub struct BatchCoordinator {
    renderer: Arc<dyn PageRenderer>,
    recognizer: Arc<dyn Recognizer>,
    events: EventSink,
    stop: StopFlag,
}

impl BatchCoordinator {
    /// Create a new coordinator.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        recognizer: Arc<dyn Recognizer>,
        events: EventSink,
        stop: StopFlag,
    ) -> Self {
        Self {
            renderer,
            recognizer,
            events,
            stop,
        }
    }

    /// Process every unprocessed document in `job.source_dir`.
    ///
    /// Individual document failures are reported and skipped. Only setup
    /// failures (unreadable source directory, unwritable output directory,
    /// unreadable ledger) are returned as errors. Either way, the last event
    /// sent is [`BatchEvent::Finished`].
    #[instrument(level = "debug", skip_all, fields(source = %job.source_dir.display()))]
    pub async fn run(&self, job: &ProcessingJob, ledger_path: &Path) -> Result<BatchSummary> {
        let result = self.run_documents(job, ledger_path).await;
        if let Err(err) = &result {
            self.events.error(format!("Critical error: {err:#}"));
        }
        self.events.send(BatchEvent::Finished);
        result
    }

    async fn run_documents(
        &self,
        job: &ProcessingJob,
        ledger_path: &Path,
    ) -> Result<BatchSummary> {
        fs::create_dir_all(&job.output_dir).await.with_context(|| {
            format!(
                "failed to create output directory {:?}",
                job.output_dir.display()
            )
        })?;

        let documents = discover_documents(&job.source_dir, &job.extension).await?;
        self.events.log(format!(
            "Found {} {} files in {}.",
            documents.len(),
            job.extension.to_uppercase(),
            job.source_dir.display()
        ));

        let mut ledger = CompletionLedger::load(ledger_path).await?;
        self.events.log(format!(
            "Already processed: {} files.",
            ledger.completed_count()
        ));

        let mut summary = BatchSummary {
            discovered: documents.len(),
            ..BatchSummary::default()
        };
        for document in &documents {
            if self.stop.is_stop_requested() {
                self.events.log("Process stopped by user.");
                summary.stopped = true;
                break;
            }

            let id = document_id(document)?;
            if ledger.contains(&id) {
                self.events
                    .log(format!("Skipping {id} (already processed)."));
                summary.skipped += 1;
                continue;
            }

            self.events.log(format!("Processing: {id}..."));
            let outcome = process_document(
                self.renderer.as_ref(),
                self.recognizer.as_ref(),
                document,
                job,
                |current, total| {
                    if self.stop.is_stop_requested() {
                        return ControlFlow::Break(());
                    }
                    self.events.send(BatchEvent::PageProgress {
                        document: id.clone(),
                        current,
                        total,
                    });
                    ControlFlow::Continue(())
                },
            )
            .await;

            match outcome {
                Ok(DocumentOutcome::Completed(output_path)) => {
                    match ledger.append(&id).await {
                        Ok(()) => {
                            summary.completed += 1;
                            self.events.log(format!(
                                "Completed: {id} -> {}",
                                output_path.display()
                            ));
                        }
                        Err(err) => {
                            summary.failed += 1;
                            self.events
                                .error(format!("Error recording {id} as done: {err:#}"));
                        }
                    }
                }
                Ok(DocumentOutcome::Stopped { pages_done }) => {
                    debug!(%id, pages_done, "Stopped mid-document");
                    self.events.log(format!(
                        "Process stopped by user during {id} ({pages_done} pages done)."
                    ));
                    summary.stopped = true;
                    break;
                }
                Err(err) => {
                    summary.failed += 1;
                    self.events.error(format!("Error processing {id}: {err}"));
                }
            }
        }
        Ok(summary)
    }
}

/// List the documents directly inside `source_dir` with the given extension
/// (compared case-insensitively), sorted by path.
pub async fn discover_documents(source_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(source_dir).await.with_context(|| {
        format!(
            "failed to read source directory {:?}",
            source_dir.display()
        )
    })?;
    let mut documents = vec![];
    while let Some(entry) = entries.next_entry().await.with_context(|| {
        format!(
            "failed to read entry in source directory {:?}",
            source_dir.display()
        )
    })? {
        let path = entry.path();
        let has_extension = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if !has_extension {
            continue;
        }
        // Broken links and files that vanish mid-scan stay in the list, so
        // they fail as individual documents instead of failing the batch.
        let is_candidate = match fs::metadata(&path).await {
            Ok(metadata) => metadata.is_file(),
            Err(err) => {
                debug!("cannot stat {:?}: {}", path.display(), err);
                true
            }
        };
        if is_candidate {
            documents.push(path);
        }
    }
    documents.sort();
    Ok(documents)
}
