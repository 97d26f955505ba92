//! Distributed traversal: the leader hands out sites from a ranked list and
//! appends every traversed site's group to the corpus; workers traverse sites
//! in fresh browsing contexts and report the URLs they found.

use crate::corpus::{CorpusWriter, load_corpus};
use crate::error::{CoreError, Result};
use crate::frame::ChannelClient;
use crate::leader::{accept_loop, serve_requests};
use crate::model::{Ack, CrawlReply, CrawlResult, SiteEntry};
use crate::queue::WorkQueue;
use cooked_scanner::{ContextFactory, SiteTraverser};
use futures::future::try_join_all;
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

pub const DEFAULT_CRAWL_DISPATCH_PORT: u16 = 56303;
pub const DEFAULT_CRAWL_RESULT_PORT: u16 = 56304;

#[derive(Debug, Clone)]
pub struct CrawlLeaderOptions {
    /// Corpus file traversed groups are appended to
    pub output: PathBuf,
    /// Keep the existing corpus and skip the sites it already holds
    pub resume: bool,
}

impl Default for CrawlLeaderOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("results/internal_links.jsonl"),
            resume: false,
        }
    }
}

#[derive(Debug, Default)]
struct CrawlProgress {
    reported: AtomicUsize,
    written: AtomicUsize,
}

pub struct CrawlLeader {
    queue: Arc<Mutex<WorkQueue<SiteEntry>>>,
    writer: Arc<Mutex<CorpusWriter>>,
    progress: Arc<CrawlProgress>,
    total: usize,
    already_done: usize,
}

impl CrawlLeader {
    /// Queue every site of `sites`, minus those already in the corpus when resuming.
    pub fn new(sites: Vec<SiteEntry>, options: &CrawlLeaderOptions) -> Result<Self> {
        let done: HashSet<String> = if options.resume && options.output.exists() {
            load_corpus(&options.output)?.into_iter().map(|group| group.site).collect()
        } else {
            HashSet::new()
        };

        let listed = sites.len();
        let pending: Vec<SiteEntry> = sites.into_iter().filter(|entry| !done.contains(&entry.site)).collect();
        let already_done = listed - pending.len();
        if already_done > 0 {
            info!(
                "Resuming: {} of {} sites already in {}",
                already_done,
                listed,
                options.output.display()
            );
        }

        let writer = CorpusWriter::open(options.output.clone(), options.resume)?;

        Ok(Self {
            total: pending.len(),
            queue: Arc::new(Mutex::new(WorkQueue::new(pending))),
            writer: Arc::new(Mutex::new(writer)),
            progress: Arc::new(CrawlProgress::default()),
            already_done,
        })
    }

    /// Sites queued for this run.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Sites left out because a previous run already wrote them.
    pub fn already_done(&self) -> usize {
        self.already_done
    }

    pub fn reported(&self) -> usize {
        self.progress.reported.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> usize {
        self.progress.written.load(Ordering::SeqCst)
    }

    /// Serve sites and collect groups until `shutdown` fires.
    pub async fn serve(
        &self,
        dispatch: TcpListener,
        results: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(
            "Crawl leader serving {} sites: dispatch on {}, results on {}",
            self.total,
            dispatch.local_addr()?,
            results.local_addr()?
        );

        tokio::join!(
            accept_loop(dispatch, "Crawl dispatch", shutdown.resubscribe(), |stream, peer| {
                handle_crawl_dispatch(stream, peer, self.queue.clone())
            }),
            accept_loop(results, "Crawl result", shutdown, |stream, peer| {
                handle_crawl_results(stream, peer, self.writer.clone(), self.progress.clone(), self.total)
            }),
        );

        info!(
            "Crawl leader stopped: {}/{} sites reported, {} groups written",
            self.reported(),
            self.total,
            self.written()
        );
        Ok(())
    }
}

async fn handle_crawl_dispatch(stream: TcpStream, peer: SocketAddr, queue: Arc<Mutex<WorkQueue<SiteEntry>>>) {
    serve_requests(stream, peer, "Crawl dispatch", move |_| {
        let queue = queue.clone();
        async move {
            let mut queue = queue.lock().await;
            match queue.take_next() {
                Some(site) => {
                    debug!("Sending site {}/{}: {}", queue.dispatched(), queue.len(), site.site);
                    if queue.is_exhausted() {
                        info!("All {} sites dispatched", queue.len());
                    }
                    CrawlReply::Site(site)
                }
                None => CrawlReply::done(),
            }
        }
    })
    .await
}

async fn handle_crawl_results(
    stream: TcpStream,
    peer: SocketAddr,
    writer: Arc<Mutex<CorpusWriter>>,
    progress: Arc<CrawlProgress>,
    total: usize,
) {
    serve_requests(stream, peer, "Crawl result", move |frame| {
        let writer = writer.clone();
        let progress = progress.clone();
        async move {
            let result = match serde_json::from_slice::<CrawlResult>(&frame) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Undecodable crawl result from {}: {}", peer, e);
                    return Ack { ok: false };
                }
            };

            let site = result.site.site.clone();
            let ok = match result.into_group() {
                Some(group) => match writer.lock().await.write_group(&group) {
                    Ok(()) => {
                        progress.written.fetch_add(1, Ordering::SeqCst);
                        info!("Writing result for {} ({} urls)", site, group.urls.len());
                        true
                    }
                    Err(e) => {
                        error!("Failed to write result for {}: {}", site, e);
                        false
                    }
                },
                None => {
                    info!("Failed to crawl: {}", site);
                    true
                }
            };

            let reported = progress.reported.fetch_add(1, Ordering::SeqCst) + 1;
            if reported == total {
                info!("All {} sites reported", total);
            }
            Ack { ok }
        }
    })
    .await
}

#[derive(Debug, Clone)]
pub struct CrawlWorkerOptions {
    /// Internal pages to discover per site
    pub target_count: usize,
    /// Sites traversed at once, each over its own channel pair
    pub concurrency: usize,
}

impl Default for CrawlWorkerOptions {
    fn default() -> Self {
        Self {
            target_count: 15,
            concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub sites: usize,
    pub traversed: usize,
    pub absent: usize,
}

impl CrawlSummary {
    fn merge(self, other: CrawlSummary) -> CrawlSummary {
        CrawlSummary {
            sites: self.sites + other.sites,
            traversed: self.traversed + other.traversed,
            absent: self.absent + other.absent,
        }
    }
}

pub struct CrawlWorker<B> {
    traverser: SiteTraverser<B>,
    options: CrawlWorkerOptions,
}

impl<B: ContextFactory> CrawlWorker<B> {
    pub fn new(traverser: SiteTraverser<B>, options: CrawlWorkerOptions) -> Self {
        Self { traverser, options }
    }

    /// Pull and traverse sites until the leader has none left.
    pub async fn run(&self, dispatch: &str, results: &str) -> Result<CrawlSummary> {
        let concurrency = self.options.concurrency.max(1);
        info!(
            "Crawl worker pulling from {} with {} concurrent tasks, {} pages per site",
            dispatch, concurrency, self.options.target_count
        );

        let summaries = try_join_all((0..concurrency).map(|task| self.run_task(task, dispatch, results))).await?;
        let summary = summaries.into_iter().fold(CrawlSummary::default(), CrawlSummary::merge);

        info!(
            "No more sites: {} traversed, {} absent",
            summary.traversed, summary.absent
        );
        Ok(summary)
    }

    async fn run_task(&self, task: usize, dispatch: &str, results: &str) -> Result<CrawlSummary> {
        let mut dispatch = ChannelClient::connect(dispatch).await?;
        let mut results = ChannelClient::connect(results).await?;
        let mut summary = CrawlSummary::default();

        loop {
            let site = match dispatch.request::<_, CrawlReply>(&json!({})).await? {
                CrawlReply::Site(site) => site,
                CrawlReply::Done { done: true } => break,
                CrawlReply::Done { done: false } => {
                    return Err(CoreError::UnexpectedReply("'done: false' without a site".to_string()));
                }
            };

            info!("Starting work: {} (task {})", site.site, task);
            let urls = self.traverse(&site).await;
            summary.sites += 1;
            if urls.is_some() {
                summary.traversed += 1;
            } else {
                summary.absent += 1;
            }

            let name = site.site.clone();
            let ack: Ack = results.request(&CrawlResult { site, urls }).await?;
            if !ack.ok {
                warn!("Leader rejected the crawl result for {}", name);
            }
        }

        debug!("Crawl task {} done after {} sites", task, summary.sites);
        Ok(summary)
    }

    async fn traverse(&self, site: &SiteEntry) -> Option<Vec<String>> {
        match self.traverser.traverse(&site.site, self.options.target_count).await {
            Ok(Some(urls)) => Some(urls.into_iter().map(String::from).collect()),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to crawl {}: {}", site.site, e);
                None
            }
        }
    }
}
