//! The completion ledger: which documents have already been OCRed.
//!
//! The ledger is a plain UTF-8 text file with one document identifier (the
//! base file name) per line. We only ever append to it, so an identifier,
//! once recorded, stays recorded until somebody deletes the file by hand.

use std::{collections::HashSet, io::ErrorKind};

use tokio::{fs, io::AsyncWriteExt as _};

use crate::prelude::*;

/// Documents known to have been processed successfully by some earlier run.
#[derive(Debug)]
pub struct CompletionLedger {
    /// Where the ledger is persisted.
    path: PathBuf,
    /// Everything recorded so far.
    completed: HashSet<String>,
}

impl CompletionLedger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let completed = match fs::read_to_string(path).await {
            Ok(contents) => contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_owned)
                .collect(),
            Err(err) if err.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read ledger {:?}", path.display())
                });
            }
        };
        debug!(count = completed.len(), "Loaded completion ledger");
        Ok(Self {
            path: path.to_owned(),
            completed,
        })
    }

    /// Has `id` already been processed?
    pub fn contains(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    /// How many documents have been recorded?
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Record `id` as complete, both in memory and on disk.
    pub async fn append(&mut self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create ledger directory {:?}", parent.display())
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open ledger {:?}", self.path.display()))?;
        file.write_all(format!("{id}\n").as_bytes())
            .await
            .with_context(|| format!("failed to append to ledger {:?}", self.path.display()))?;
        file.flush().await?;
        self.completed.insert(id.to_owned());
        Ok(())
    }
}
