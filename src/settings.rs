//! Remembered settings from the last run.
//!
//! Stored as a small JSON object. Every key is optional, and anything we
//! can't use (a directory that has disappeared, an out-of-range zoom) is
//! quietly dropped so the built-in default applies instead.

use std::io::ErrorKind;

use tokio::fs;

use crate::{
    job::{PSM_RANGE, ProcessingJob, ZOOM_RANGE},
    prelude::*,
};

/// Persisted job settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory containing input PDFs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    /// Directory for output text files. Need not exist yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Rasterization zoom.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<u32>,
    /// Tesseract page-segmentation mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psm: Option<u8>,
    /// Tesseract language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Path to the `tesseract` executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesseract_path: Option<PathBuf>,
}

impl Settings {
    /// Where settings live if the user doesn't say otherwise.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vert-ocr").join("settings.json"))
    }

    /// Capture the settings of a job, for saving.
    pub fn from_job(job: &ProcessingJob) -> Self {
        Self {
            source_dir: Some(job.source_dir.clone()),
            output_dir: Some(job.output_dir.clone()),
            zoom: Some(job.zoom),
            psm: Some(job.psm),
            lang: Some(job.lang.clone()),
            tesseract_path: job.tesseract.clone(),
        }
    }

    /// Load settings from `path`. This never fails: a missing or unreadable
    /// file just means "no settings".
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("Failed to load settings from {:?}: {}", path.display(), err);
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&contents) {
            Ok(settings) => {
                debug!("Settings loaded");
                settings.sanitized()
            }
            Err(err) => {
                warn!("Failed to parse settings in {:?}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Save settings to `path`, creating parent directories as needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create settings directory {:?}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(path, json + "\n")
            .await
            .with_context(|| format!("failed to write settings to {:?}", path.display()))
    }

    /// Drop any values we can't use.
    fn sanitized(mut self) -> Self {
        if self.source_dir.as_deref().is_some_and(|dir| !dir.is_dir()) {
            debug!("ignoring missing source directory from settings");
            self.source_dir = None;
        }
        if self.tesseract_path.as_deref().is_some_and(|exe| !exe.is_file()) {
            debug!("ignoring missing tesseract path from settings");
            self.tesseract_path = None;
        }
        self.zoom = self.zoom.filter(|zoom| ZOOM_RANGE.contains(zoom));
        self.psm = self.psm.filter(|psm| PSM_RANGE.contains(psm));
        self.lang = self.lang.filter(|lang| !lang.trim().is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let tmpdir = tempfile::TempDir::new().expect("tempdir");
        let settings = Settings::load(&tmpdir.path().join("settings.json")).await;
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn unparseable_file_gives_defaults() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let path = tmpdir.path().join("settings.json");
        std::fs::write(&path, "{ not json")?;
        assert_eq!(Settings::load(&path).await, Settings::default());
        Ok(())
    }

    #[tokio::test]
    async fn missing_keys_stay_unset() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let path = tmpdir.path().join("settings.json");
        std::fs::write(&path, r#"{ "zoom": 4, "lang": "jpn" }"#)?;
        let settings = Settings::load(&path).await;
        assert_eq!(settings.zoom, Some(4));
        assert_eq!(settings.lang.as_deref(), Some("jpn"));
        assert_eq!(settings.psm, None);
        assert_eq!(settings.source_dir, None);
        Ok(())
    }

    #[tokio::test]
    async fn unusable_values_are_ignored() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let path = tmpdir.path().join("settings.json");
        let json = serde_json::json!({
            "source_dir": tmpdir.path().join("gone"),
            "output_dir": tmpdir.path().join("not-yet-created"),
            "tesseract_path": tmpdir.path().join("no-tesseract.exe"),
            "zoom": 0,
            "psm": 99,
            "lang": "",
        });
        std::fs::write(&path, json.to_string())?;
        let settings = Settings::load(&path).await;
        assert_eq!(
            settings,
            Settings {
                output_dir: Some(tmpdir.path().join("not-yet-created")),
                ..Settings::default()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn detection_only_psm_is_ignored() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let path = tmpdir.path().join("settings.json");
        std::fs::write(&path, r#"{ "psm": 0 }"#)?;
        assert_eq!(Settings::load(&path).await.psm, None);
        Ok(())
    }

    #[tokio::test]
    async fn saved_settings_load_back() -> Result<()> {
        let tmpdir = tempfile::TempDir::new()?;
        let path = tmpdir.path().join("config").join("settings.json");
        let job = ProcessingJob {
            zoom: 4,
            psm: 6,
            lang: "jpn".to_owned(),
            ..ProcessingJob::new(tmpdir.path().to_owned(), tmpdir.path().join("out"))
        };
        let settings = Settings::from_job(&job);
        settings.save(&path).await?;
        assert_eq!(Settings::load(&path).await, settings);
        Ok(())
    }
}
