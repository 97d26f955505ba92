use crate::corpus::{Checkpoint, CorpusWriter};
use crate::error::Result;
use crate::model::{SiteEntry, SiteGroup};
use cooked_scanner::{ContextFactory, SiteTraverser};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// Options for building a corpus from a ranked site list
#[derive(Debug, Clone)]
pub struct TraverseOptions {
    /// Internal pages to discover per site
    pub target_count: usize,
    /// Sites traversed concurrently per batch
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            target_count: 15,
            batch_size: 10,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub batches: usize,
    pub resumed_past: usize,
    pub groups_written: usize,
    pub sites_absent: usize,
    pub sites_failed: usize,
}

/// Traverse every site in `sites`, batch by batch, appending one corpus line
/// per site that answered on some scheme.
///
/// A batch whose index is at or below the checkpoint's last completed batch
/// is skipped.
pub async fn populate_corpus<B: ContextFactory>(
    traverser: &SiteTraverser<B>,
    sites: &[SiteEntry],
    writer: &mut CorpusWriter,
    checkpoint: &mut Checkpoint,
    options: &TraverseOptions,
) -> Result<PopulateSummary> {
    let batch_size = options.batch_size.max(1);
    let batches: Vec<&[SiteEntry]> = sites.chunks(batch_size).collect();
    let mut summary = PopulateSummary::default();

    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new(batches.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} batches {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style.progress_chars("=> "));
        Some(pb)
    } else {
        None
    };

    for (index, batch) in batches.iter().enumerate() {
        if checkpoint.last_completed().is_some_and(|last| index <= last) {
            summary.resumed_past += 1;
            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
            continue;
        }

        info!("Started processing batch {} ({} sites)", index, batch.len());
        if let Some(ref pb) = progress_bar {
            pb.set_message(format!("{}..", batch[0].site));
        }

        let outcomes = join_all(
            batch
                .iter()
                .map(|entry| traverser.traverse(&entry.site, options.target_count)),
        )
        .await;

        for (entry, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(Some(urls)) => {
                    writer.write_group(&SiteGroup {
                        rank: entry.rank,
                        site: entry.site.clone(),
                        urls: urls.into_iter().map(String::from).collect(),
                    })?;
                    summary.groups_written += 1;
                }
                Ok(None) => summary.sites_absent += 1,
                Err(e) => {
                    warn!("{}: traversal failed: {}", entry.site, e);
                    summary.sites_failed += 1;
                }
            }
        }

        checkpoint.record(index)?;
        summary.batches += 1;
        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("{} groups written", summary.groups_written));
    }

    Ok(summary)
}
