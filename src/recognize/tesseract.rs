//! Tesseract OCR engine.

use std::{env, io::ErrorKind};

use image::{DynamicImage, ImageFormat};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    prelude::*,
};

use super::{RecognizeParams, Recognizer};

/// Name of the Tesseract binary on `PATH`.
const TESSERACT_COMMAND: &str = "tesseract";

/// Places Tesseract commonly lives when it isn't on `PATH`.
const WELL_KNOWN_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct TesseractRecognizer {}

impl TesseractRecognizer {
    /// Create a new `tesseract` engine.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    #[instrument(level = "debug", skip_all, fields(lang = %params.lang, psm = params.psm))]
    async fn recognize(
        &self,
        image: &DynamicImage,
        params: &RecognizeParams<'_>,
    ) -> Result<String> {
        // Write our input to a temporary PNG file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        let image = image.clone();
        let write_path = input_path.clone();
        spawn_blocking_propagating_panics(move || {
            image
                .save_with_format(&write_path, ImageFormat::Png)
                .context("cannot write tesseract input file")
        })
        .await?;

        // Run tesseract, printing the text to standard output.
        let executable = params
            .executable
            .unwrap_or_else(|| Path::new(TESSERACT_COMMAND));
        let mut cmd = Command::new(executable);
        cmd.arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(params.lang)
            .arg("--psm")
            .arg(params.psm.to_string())
            .kill_on_drop(true);
        let output = cmd.output();
        let output = match params.timeout {
            Some(timeout) => tokio::time::timeout(timeout, output)
                .await
                .map_err(|_| anyhow!("tesseract timed out after {:?}", timeout))?,
            None => output.await,
        };
        let output = output.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                anyhow!("cannot find tesseract at {:?}", executable.display())
            } else {
                anyhow::Error::new(err).context("cannot run tesseract")
            }
        })?;
        check_for_command_failure("tesseract", &output, None)?;

        String::from_utf8(output.stdout).context("tesseract output was not valid UTF-8")
    }
}

/// Find a usable `tesseract` executable.
///
/// A configured path wins if it exists. Otherwise we search `PATH`, then a
/// few well-known install locations. Returns `None` if nothing turns up.
pub fn locate_tesseract(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured
        && path.is_file()
    {
        return Some(path.to_owned());
    }
    if let Ok(path) = which::which(TESSERACT_COMMAND) {
        return Some(path);
    }
    let local_app_data = env::var_os("LOCALAPPDATA").map(|dir| {
        PathBuf::from(dir)
            .join("Programs")
            .join("Tesseract-OCR")
            .join("tesseract.exe")
    });
    WELL_KNOWN_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .chain(local_app_data)
        .find(|path| path.is_file())
}
