//! The `probe` subcommand: try several OCR configurations on one page.

use std::{fmt, str::FromStr};

use clap::Args;
use image::DynamicImage;

use super::OcrOpts;
use crate::{
    async_utils::spawn_blocking_propagating_panics,
    job::{DEFAULT_LANG, DEFAULT_PSM, DEFAULT_ZOOM, PSM_RANGE, ZOOM_RANGE},
    prelude::*,
    recognize::{
        RecognizeParams, Recognizer,
        tesseract::{TesseractRecognizer, locate_tesseract},
    },
    render::{PageRenderer, PopplerRenderer},
};

/// Options for the `probe` subcommand.
#[derive(Debug, Args)]
pub struct ProbeOpts {
    /// The PDF to test.
    pub document: PathBuf,

    /// The page to OCR, counting from 1.
    #[clap(long, default_value = "1")]
    pub page: usize,

    /// A configuration to try, written like `zoom=3,lang=jpn_vert,psm=5`.
    /// Add `rotate=90` (counter-clockwise degrees) or `gray` as needed. May be
    /// given more than once. Without it, we try a built-in set of
    /// vertical-Japanese configurations, or the one described by
    /// `--zoom`/`--psm`/`--lang` if any of those are given.
    #[clap(long = "config", value_name = "CONFIG")]
    pub configs: Vec<ProbeConfig>,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    /// How many characters of each result to show.
    #[clap(long, default_value = "200")]
    pub preview_chars: usize,
}

/// Rotation applied to a page before OCR.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Ccw90 => image.rotate270(),
            Rotation::Ccw180 => image.rotate180(),
            Rotation::Ccw270 => image.rotate90(),
        }
    }

    fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Ccw90 => 90,
            Rotation::Ccw180 => 180,
            Rotation::Ccw270 => 270,
        }
    }
}

/// One set of OCR settings to try.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub zoom: u32,
    pub lang: String,
    pub psm: u8,
    pub rotation: Rotation,
    pub grayscale: bool,
}

impl ProbeConfig {
    fn new(zoom: u32, lang: &str, psm: u8) -> Self {
        Self {
            zoom,
            lang: lang.to_owned(),
            psm,
            rotation: Rotation::None,
            grayscale: false,
        }
    }

    /// The configurations we compare when the user doesn't pick any.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(3, "jpn_vert", 5),
            Self::new(3, "jpn_vert", 6),
            Self::new(3, "jpn_vert", 3),
            Self::new(3, "jpn_vert", 1),
            Self::new(3, "jpn", 6),
        ]
    }

    /// Prepare a rendered page for OCR.
    fn prepare(&self, image: DynamicImage) -> DynamicImage {
        let image = self.rotation.apply(image);
        if self.grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image
        }
    }
}

impl fmt::Display for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zoom {}, {}, psm {}", self.zoom, self.lang, self.psm)?;
        if self.rotation != Rotation::None {
            write!(f, ", rotate {}", self.rotation.degrees())?;
        }
        if self.grayscale {
            write!(f, ", gray")?;
        }
        Ok(())
    }
}

impl FromStr for ProbeConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = Self::new(DEFAULT_ZOOM, DEFAULT_LANG, DEFAULT_PSM);
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (part, None),
            };
            let value_for = |key: &str| {
                value.ok_or_else(|| anyhow!("expected a value for `{key}`"))
            };
            match key {
                "zoom" => {
                    let zoom = value_for(key)?.parse::<u32>()?;
                    if !ZOOM_RANGE.contains(&zoom) {
                        return Err(anyhow!("zoom {zoom} out of range"));
                    }
                    config.zoom = zoom;
                }
                "psm" => {
                    let psm = value_for(key)?.parse::<u8>()?;
                    if !PSM_RANGE.contains(&psm) {
                        return Err(anyhow!("psm {psm} out of range"));
                    }
                    config.psm = psm;
                }
                "lang" => {
                    let lang = value_for(key)?;
                    if lang.is_empty() {
                        return Err(anyhow!("lang must not be empty"));
                    }
                    config.lang = lang.to_owned();
                }
                "rotate" => {
                    config.rotation = match value_for(key)? {
                        "0" => Rotation::None,
                        "90" => Rotation::Ccw90,
                        "180" => Rotation::Ccw180,
                        "270" => Rotation::Ccw270,
                        other => {
                            return Err(anyhow!(
                                "rotate must be 0, 90, 180 or 270, got {other}"
                            ));
                        }
                    };
                }
                "gray" | "grayscale" => {
                    config.grayscale = match value {
                        None | Some("true") => true,
                        Some("false") => false,
                        Some(other) => {
                            return Err(anyhow!("expected true or false, got {other}"));
                        }
                    };
                }
                other => return Err(anyhow!("unknown probe setting `{other}`")),
            }
        }
        Ok(config)
    }
}

/// The `probe` subcommand.
#[instrument(level = "debug", skip_all, fields(document = %opts.document.display()))]
pub async fn cmd_probe(opts: &ProbeOpts) -> Result<()> {
    let configs = if !opts.configs.is_empty() {
        opts.configs.clone()
    } else if opts.ocr.zoom.is_some() || opts.ocr.psm.is_some() || opts.ocr.lang.is_some() {
        vec![ProbeConfig::new(
            opts.ocr.zoom.unwrap_or(DEFAULT_ZOOM),
            opts.ocr.lang.as_deref().unwrap_or(DEFAULT_LANG),
            opts.ocr.psm.unwrap_or(DEFAULT_PSM),
        )]
    } else {
        ProbeConfig::defaults()
    };
    let tesseract = locate_tesseract(opts.ocr.tesseract.as_deref());
    if tesseract.is_none() {
        warn!("tesseract could not be found; every configuration will fail");
    }

    println!("Testing on page {}", opts.page);
    let results = probe_page(
        &PopplerRenderer::new(),
        &TesseractRecognizer::new(),
        &opts.document,
        opts.page,
        &configs,
        tesseract.as_deref(),
    )
    .await?;
    for (config, result) in results {
        println!("\n--- Testing: {config} ---");
        match result {
            Ok(text) => println!(
                "--- Output ({} chars) ---\n{}",
                text.chars().count(),
                preview(&text, opts.preview_chars)
            ),
            Err(err) => println!("Error: {err:#}"),
        }
    }
    Ok(())
}

/// OCR page `ordinal` of `document` once per configuration.
///
/// Problems with the document itself are returned as an error. Problems with
/// a particular configuration are returned alongside it.
pub async fn probe_page<'a>(
    renderer: &dyn PageRenderer,
    recognizer: &dyn Recognizer,
    document: &Path,
    ordinal: usize,
    configs: &'a [ProbeConfig],
    executable: Option<&Path>,
) -> Result<Vec<(&'a ProbeConfig, Result<String>)>> {
    let total = renderer
        .page_count(document)
        .await
        .with_context(|| format!("cannot open {:?}", document.display()))?;
    if ordinal == 0 || ordinal > total {
        return Err(anyhow!(
            "page {ordinal} is out of range; {:?} has {total} pages",
            document.display()
        ));
    }

    let mut results = Vec::with_capacity(configs.len());
    for config in configs {
        let image = renderer
            .render_page(document, ordinal, config.zoom)
            .await
            .with_context(|| format!("cannot render page {ordinal}"))?;
        let prepared = config.clone();
        let image =
            spawn_blocking_propagating_panics(move || prepared.prepare(image)).await;
        let params = RecognizeParams {
            executable,
            lang: &config.lang,
            psm: config.psm,
            timeout: None,
        };
        let result = recognizer.recognize(&image, &params).await;
        results.push((config, result));
    }
    Ok(results)
}

/// The first `max_chars` characters of `text`, on one line.
fn preview(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use image::ColorType;

    use super::*;
    use crate::pipeline::testing::{FakeRecognizer, FakeRenderer, write_fake_document};

    #[test]
    fn configs_parse() -> Result<()> {
        let config = "zoom=4, lang=jpn, psm=6, rotate=90, gray".parse::<ProbeConfig>()?;
        assert_eq!(
            config,
            ProbeConfig {
                zoom: 4,
                lang: "jpn".to_owned(),
                psm: 6,
                rotation: Rotation::Ccw90,
                grayscale: true,
            }
        );
        assert_eq!(config.to_string(), "Zoom 4, jpn, psm 6, rotate 90, gray");

        let partial = "psm=3".parse::<ProbeConfig>()?;
        assert_eq!(partial, ProbeConfig::new(3, "jpn_vert", 3));
        Ok(())
    }

    #[test]
    fn bad_configs_are_rejected() {
        for bad in [
            "zoom=0",
            "zoom=eleven",
            "psm=0",
            "psm=14",
            "lang=",
            "rotate=45",
            "gray=maybe",
            "psm",
            "contrast=2",
        ] {
            assert!(bad.parse::<ProbeConfig>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn default_configs_start_with_vertical_psm_5() {
        let defaults = ProbeConfig::defaults();
        assert_eq!(defaults.len(), 5);
        assert_eq!(defaults[0].to_string(), "Zoom 3, jpn_vert, psm 5");
        assert!(defaults.iter().all(|c| !c.grayscale));
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let image = DynamicImage::new_rgb8(4, 2);
        let config = ProbeConfig {
            rotation: Rotation::Ccw90,
            ..ProbeConfig::new(3, "jpn", 5)
        };
        let rotated = config.prepare(image);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
    }

    #[test]
    fn preview_is_single_line_and_truncated() {
        assert_eq!(preview("縦書き\nテキスト", 5), "縦書き テ");
    }

    #[tokio::test]
    async fn each_config_is_tried_on_the_page() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "sample.pdf", 12)?;
        let configs = vec![
            ProbeConfig::new(3, "jpn_vert", 5),
            "lang=jpn,psm=6,gray".parse::<ProbeConfig>()?,
        ];
        let recognizer = FakeRecognizer::new();

        let results =
            probe_page(&FakeRenderer, &recognizer, &doc, 11, &configs, None).await?;

        assert_eq!(results.len(), 2);
        for (_, result) in &results {
            assert_eq!(result.as_deref().ok(), Some("text of page 11\n"));
        }
        let calls = recognizer.calls();
        assert_eq!(calls[0].color, ColorType::Rgb8);
        assert_eq!(calls[1].color, ColorType::L8);
        assert_eq!(calls[1].lang, "jpn");
        assert_eq!(calls[1].psm, 6);
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_pages_are_rejected() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let doc = write_fake_document(tmpdir.path(), "sample.pdf", 2)?;
        let configs = ProbeConfig::defaults();
        let result =
            probe_page(&FakeRenderer, &FakeRecognizer::new(), &doc, 3, &configs, None)
                .await;
        assert!(result.is_err());
        Ok(())
    }
}
