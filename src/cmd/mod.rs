//! Command-line entry points.

use clap::Args;

use crate::prelude::*;

pub mod probe;
pub mod run;

/// OCR engine options shared by subcommands. Anything left unset falls back
/// to saved settings, then to built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct OcrOpts {
    /// Zoom factor used to rasterize pages, where 1 is 72 DPI. [default: 3]
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub zoom: Option<u32>,

    /// Tesseract page-segmentation mode. [default: 5]
    #[clap(long, value_parser = clap::value_parser!(u8).range(1..=13))]
    pub psm: Option<u8>,

    /// Tesseract language, e.g. `jpn` or `jpn+eng`. [default: jpn_vert]
    #[clap(long)]
    pub lang: Option<String>,

    /// Path to the `tesseract` executable, if it isn't on your PATH.
    #[clap(long, value_name = "PATH")]
    pub tesseract: Option<PathBuf>,
}
