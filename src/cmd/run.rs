//! The `run` subcommand.

use std::{env, sync::Arc, time::Duration};

use clap::Args;
use indicatif::ProgressBar;
use tokio::sync::mpsc::UnboundedReceiver;

use super::OcrOpts;
use crate::{
    job::{DEFAULT_EXTENSION, Preprocess, ProcessingJob},
    pipeline::{
        batch::{BatchCoordinator, BatchSummary},
        events::{BatchEvent, EventSink, StopFlag},
    },
    prelude::*,
    recognize::tesseract::{TesseractRecognizer, locate_tesseract},
    render::PopplerRenderer,
    settings::Settings,
    ui::{ProgressConfig, Ui},
};

/// Default location of the completion ledger.
const DEFAULT_LEDGER: &str = "processed_log.txt";

/// Options for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunOpts {
    /// Directory containing the documents to OCR. Defaults to the directory
    /// used last time, or your home directory.
    pub source_dir: Option<PathBuf>,

    /// Directory for `<name>_output.txt` files. Defaults to the directory used
    /// last time, or the current directory.
    #[clap(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    /// Image preprocessing applied before OCR.
    #[clap(long, value_enum, default_value_t = Preprocess::Grayscale)]
    pub preprocess: Preprocess,

    /// Extension of the documents to process.
    #[clap(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,

    /// Give up on a page's OCR after this many seconds, leaving it blank.
    #[clap(long, value_name = "SECONDS")]
    pub page_timeout: Option<u64>,

    /// File listing documents that are already done. They will be skipped.
    /// Delete it to process everything again.
    #[clap(long, default_value = DEFAULT_LEDGER)]
    pub ledger: PathBuf,

    /// Settings file to load defaults from and save them to.
    #[clap(long)]
    pub settings: Option<PathBuf>,

    /// Don't remember this run's settings.
    #[clap(long)]
    pub no_save_settings: bool,

    /// What portion of documents should we allow to fail before exiting with
    /// an error? Specified as a number between 0.0 and 1.0.
    #[clap(long, default_value = "1.0")]
    pub allowed_failure_rate: f32,
}

/// The `run` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_run(ui: Ui, opts: &RunOpts) -> Result<()> {
    let settings_path = opts.settings.clone().or_else(Settings::default_path);
    let settings = match &settings_path {
        Some(path) => Settings::load(path).await,
        None => Settings::default(),
    };
    let job = build_job(&ui, opts, &settings)?;
    job.validate()?;
    info!(
        zoom = job.zoom,
        psm = job.psm,
        lang = %job.lang,
        "OCRing {:?} into {:?}",
        job.source_dir.display(),
        job.output_dir.display()
    );

    // Start the batch on its own task. We only talk to it through events and
    // the stop flag.
    let stop = StopFlag::new();
    let (events, rx) = EventSink::channel();
    let coordinator = BatchCoordinator::new(
        Arc::new(PopplerRenderer::new()),
        Arc::new(TesseractRecognizer::new()),
        events,
        stop.clone(),
    );
    let worker_job = job.clone();
    let ledger_path = opts.ledger.clone();
    let worker =
        tokio::spawn(async move { coordinator.run(&worker_job, &ledger_path).await });

    let ctrl_c = tokio::spawn(stop_on_ctrl_c(ui.clone(), stop));
    report_events(&ui, rx).await;
    ctrl_c.abort();
    let result = worker.await.context("could not join batch worker")?;

    if !opts.no_save_settings
        && let Some(path) = &settings_path
        && let Err(err) = Settings::from_job(&job).save(path).await
    {
        warn!("Failed to save settings: {:#}", err);
    }

    let summary = result?;
    display_summary(&ui, &summary);
    check_failure_rate(&summary, opts.allowed_failure_rate)
}

/// Merge command-line options, saved settings and defaults into a job.
fn build_job(ui: &Ui, opts: &RunOpts, settings: &Settings) -> Result<ProcessingJob> {
    let source_dir = match opts.source_dir.clone().or_else(|| settings.source_dir.clone()) {
        Some(dir) => dir,
        None => dirs::home_dir().context("no source directory given")?,
    };
    let output_dir = match opts.output_dir.clone().or_else(|| settings.output_dir.clone()) {
        Some(dir) => dir,
        None => env::current_dir().context("cannot determine current directory")?,
    };
    let mut job = ProcessingJob::new(source_dir, output_dir);
    if let Some(zoom) = opts.ocr.zoom.or(settings.zoom) {
        job.zoom = zoom;
    }
    if let Some(psm) = opts.ocr.psm.or(settings.psm) {
        job.psm = psm;
    }
    if let Some(lang) = opts.ocr.lang.clone().or_else(|| settings.lang.clone()) {
        job.lang = lang;
    }
    job.preprocess = opts.preprocess;
    job.extension = opts.extension.trim_start_matches('.').to_owned();
    job.page_timeout = opts.page_timeout.map(Duration::from_secs);

    let configured = opts
        .ocr
        .tesseract
        .clone()
        .or_else(|| settings.tesseract_path.clone());
    job.tesseract = match locate_tesseract(configured.as_deref()) {
        Some(path) => {
            debug!("Using tesseract at {:?}", path.display());
            Some(path)
        }
        None => {
            ui.display_message(
                "⚠️",
                "Tesseract OCR could not be found. Install it, or pass --tesseract \
                 with the path to the executable. Every page will come out blank \
                 until then.",
            );
            configured
        }
    };
    Ok(job)
}

/// Request a cooperative stop on the first Ctrl-C, and exit on the second.
async fn stop_on_ctrl_c(ui: Ui, stop: StopFlag) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    stop.request_stop();
    ui.display_message(
        "🛑",
        "Stopping after the current page. Press Ctrl-C again to quit immediately.",
    );
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

/// Display batch events until the worker finishes.
async fn report_events(ui: &Ui, mut rx: UnboundedReceiver<BatchEvent>) {
    let mut page_bar: Option<(String, ProgressBar)> = None;
    while let Some(event) = rx.recv().await {
        match &event {
            BatchEvent::PageProgress {
                document,
                current,
                total,
            } => {
                let is_new_document = page_bar
                    .as_ref()
                    .is_none_or(|(name, _)| name != document);
                if is_new_document {
                    if let Some((_, bar)) = page_bar.take() {
                        bar.finish_and_clear();
                    }
                    let bar = ui.new_progress_bar(
                        &ProgressConfig {
                            emoji: "📄",
                            msg: document,
                            done_msg: document,
                        },
                        *total as u64,
                    );
                    page_bar = Some((document.clone(), bar));
                }
                if let Some((_, bar)) = &page_bar {
                    bar.set_position(*current as u64);
                }
                debug!("{}", event);
            }
            BatchEvent::Log(msg) => ui.display_message("📄", msg),
            BatchEvent::Error(msg) => ui.display_message("❌", msg),
            BatchEvent::Finished => {
                if let Some((_, bar)) = page_bar.take() {
                    bar.finish_and_clear();
                }
                ui.display_message("✅", &event.to_string());
                break;
            }
        }
    }
}

/// Tell the user how the run went.
fn display_summary(ui: &Ui, summary: &BatchSummary) {
    ui.display_message(
        "📊",
        &format!(
            "{} found, {} completed, {} skipped, {} failed",
            summary.discovered, summary.completed, summary.skipped, summary.failed
        ),
    );
    if summary.stopped {
        ui.display_message(
            "🛑",
            "Stopped early. Run again to pick up where this run left off.",
        );
    }
}

/// Fail if too many documents failed.
fn check_failure_rate(summary: &BatchSummary, allowed_failure_rate: f32) -> Result<()> {
    let failure_rate = summary.failure_rate();
    if failure_rate > allowed_failure_rate {
        Err(anyhow!(
            "{}/{} ({:.2}%) of documents failed, but only {:.2}% were allowed",
            summary.failed,
            summary.completed + summary.failed,
            failure_rate * 100.0,
            allowed_failure_rate * 100.0
        ))
    } else {
        Ok(())
    }
}
