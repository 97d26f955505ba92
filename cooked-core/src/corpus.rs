//! Reading and writing the site list, the group corpus, and traversal checkpoints.

use crate::error::{CoreError, Result};
use crate::model::{SiteEntry, SiteGroup};
use csv::StringRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parse a ranked site list.
///
/// Columns are matched by name when the first row is a header (`rank` and
/// `site`, or `domain` as in published rankings); otherwise the first two
/// columns are taken as rank and site. Quoted fields are unquoted. Rows that
/// do not parse are logged and skipped.
pub fn read_site_list<R: io::Read>(input: R) -> Result<Vec<SiteEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut header: Option<StringRecord> = None;
    let mut sites = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable site list row: {}", e);
                continue;
            }
        };
        let line = record.position().map_or(idx + 1, |p| p.line() as usize);
        if record.iter().all(str::is_empty) {
            continue;
        }

        match record.deserialize::<SiteEntry>(header.as_ref()) {
            Ok(entry) if !entry.site.is_empty() => sites.push(entry),
            Ok(_) => warn!("Skipping site list row {} with no site", line),
            Err(_) if idx == 0 => {
                debug!("Site list header: {:?}", record);
                header = Some(record);
            }
            Err(e) => warn!("Skipping unparsable site list row {}: {}", line, e),
        }
    }

    Ok(sites)
}

pub fn load_site_list(path: &Path) -> Result<Vec<SiteEntry>> {
    read_site_list(File::open(path)?)
}

/// Load a newline-delimited JSON corpus of site groups.
pub fn load_corpus(path: &Path) -> Result<Vec<SiteGroup>> {
    let reader = BufReader::new(File::open(path)?);
    let mut groups = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let group = serde_json::from_str(&line).map_err(|e| CoreError::Corpus {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        groups.push(group);
    }

    Ok(groups)
}

/// Appends site groups to a corpus file, one JSON object per line.
pub struct CorpusWriter {
    file: File,
    path: PathBuf,
}

impl CorpusWriter {
    /// Open `path`, truncating it unless `append` is set.
    pub fn open(path: impl Into<PathBuf>, append: bool) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_group(&mut self, group: &SiteGroup) -> Result<()> {
        let line = serde_json::to_string(group)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Records the index of every completed traversal batch.
pub struct Checkpoint {
    path: PathBuf,
    last_completed: Option<usize>,
}

impl Checkpoint {
    /// Open a checkpoint file. Without `resume` any previous progress is discarded.
    pub fn open(path: impl Into<PathBuf>, resume: bool) -> Result<Self> {
        let path = path.into();

        let last_completed = if resume && path.exists() {
            fs::read_to_string(&path)?
                .lines()
                .filter_map(|line| line.trim().parse::<usize>().ok())
                .max()
        } else {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            None
        };

        Ok(Self { path, last_completed })
    }

    pub fn last_completed(&self) -> Option<usize> {
        self.last_completed
    }

    pub fn record(&mut self, batch: usize) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", batch)?;
        self.last_completed = Some(self.last_completed.map_or(batch, |last| last.max(batch)));
        Ok(())
    }
}
