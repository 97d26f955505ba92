use crate::error::Result;
use crate::model::{OptChoice, ScanResult};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Output file name for a site: leading `www.` dropped, separators flattened.
pub fn output_file_name(site: &str, mode: OptChoice) -> String {
    let host = site.strip_prefix("www.").unwrap_or(site);
    let name: String = host
        .chars()
        .map(|c| if matches!(c, '.' | '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}_{}_cookies.txt", name, mode)
}

/// Writes per-site result files; one writer at a time.
pub struct ResultStore {
    dir: PathBuf,
    mode: OptChoice,
    lock: Mutex<()>,
}

impl ResultStore {
    pub async fn create(dir: impl Into<PathBuf>, mode: OptChoice) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            mode,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> OptChoice {
        self.mode
    }

    pub fn path_for(&self, site: &str) -> PathBuf {
        self.dir.join(output_file_name(site, self.mode))
    }

    /// Persist one result. A null result writes nothing and returns `None`.
    pub async fn persist(&self, msg: &ScanResult) -> Result<Option<PathBuf>> {
        let Some(names) = &msg.result else {
            return Ok(None);
        };

        let path = self.path_for(&msg.group.site);
        let _guard = self.lock.lock().await;
        tokio::fs::write(&path, names.join("\n")).await?;
        debug!("Wrote {} cookie names to {}", names.len(), path.display());

        Ok(Some(path))
    }
}
