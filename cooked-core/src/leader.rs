//! Leader side of the scan: serves site groups on the dispatch channel and
//! persists what workers report on the result channel.

use crate::error::Result;
use crate::frame::{read_frame, write_json};
use crate::model::{Ack, DispatchReply, OptChoice, ScanResult, SiteGroup};
use crate::queue::WorkQueue;
use crate::store::ResultStore;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DISPATCH_PORT: u16 = 56301;
pub const DEFAULT_RESULT_PORT: u16 = 56302;

#[derive(Debug, Clone)]
pub struct LeaderOptions {
    pub output_dir: PathBuf,
    pub mode: OptChoice,
    /// Include the output directory in every dispatched group
    pub advertise_output_dir: bool,
}

impl Default for LeaderOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("resultsIn"),
            mode: OptChoice::default(),
            advertise_output_dir: false,
        }
    }
}

pub struct Leader {
    queue: Arc<Mutex<WorkQueue>>,
    store: Arc<ResultStore>,
    output_hint: Option<String>,
}

impl Leader {
    /// Create the leader and its output directory.
    pub async fn new(groups: Vec<SiteGroup>, options: LeaderOptions) -> Result<Self> {
        let output_hint = options
            .advertise_output_dir
            .then(|| options.output_dir.display().to_string());
        let store = ResultStore::create(options.output_dir, options.mode).await?;

        Ok(Self {
            queue: Arc::new(Mutex::new(WorkQueue::new(groups))),
            store: Arc::new(store),
            output_hint,
        })
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// (dispatched, total)
    pub async fn progress(&self) -> (usize, usize) {
        let queue = self.queue.lock().await;
        (queue.dispatched(), queue.len())
    }

    /// Run both channels until `shutdown` fires.
    pub async fn serve(
        &self,
        dispatch: TcpListener,
        results: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(
            "Leader serving dispatch on {} and results on {}",
            dispatch.local_addr()?,
            results.local_addr()?
        );

        tokio::join!(
            accept_loop(dispatch, "Dispatch", shutdown.resubscribe(), |stream, peer| {
                handle_dispatch(stream, peer, self.queue.clone(), self.output_hint.clone())
            }),
            accept_loop(results, "Result", shutdown, |stream, peer| {
                handle_results(stream, peer, self.store.clone())
            }),
        );

        let (dispatched, total) = self.progress().await;
        info!("Leader stopped after dispatching {}/{} groups", dispatched, total);
        Ok(())
    }
}

/// Accept connections until `shutdown` fires, one task per connection.
pub(crate) async fn accept_loop<H, F>(
    listener: TcpListener,
    channel: &'static str,
    mut shutdown: broadcast::Receiver<()>,
    handler: H,
) where
    H: Fn(TcpStream, SocketAddr) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("{} connection from {}", channel, peer);
                    connections.spawn(handler(stream, peer));
                }
                Err(e) => warn!("{} accept failed: {}", channel, e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

/// Answer request frames on one connection until the peer hangs up.
pub(crate) async fn serve_requests<H, F, R>(
    mut stream: TcpStream,
    peer: SocketAddr,
    channel: &'static str,
    mut respond: H,
) where
    H: FnMut(Vec<u8>) -> F,
    F: Future<Output = R>,
    R: Serialize,
{
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("{} request from {} failed: {}", channel, peer, e);
                break;
            }
        };

        let reply = respond(frame).await;

        if let Err(e) = write_json(&mut stream, &reply).await {
            warn!("{} reply to {} failed: {}", channel, peer, e);
            break;
        }
    }
    debug!("{} connection from {} closed", channel, peer);
}

async fn handle_dispatch(
    stream: TcpStream,
    peer: SocketAddr,
    queue: Arc<Mutex<WorkQueue>>,
    output_hint: Option<String>,
) {
    serve_requests(stream, peer, "Dispatch", move |_| {
        let queue = queue.clone();
        let output_hint = output_hint.clone();
        async move {
            let mut queue = queue.lock().await;
            match queue.take_next() {
                Some(group) => {
                    info!("Processing group {}/{}: {}", queue.dispatched(), queue.len(), group.site);
                    if queue.is_exhausted() {
                        info!("All {} groups dispatched", queue.len());
                    }
                    DispatchReply::group(group, output_hint)
                }
                None => DispatchReply::done(),
            }
        }
    })
    .await
}

async fn handle_results(stream: TcpStream, peer: SocketAddr, store: Arc<ResultStore>) {
    serve_requests(stream, peer, "Result", move |frame| {
        let store = store.clone();
        async move {
            match serde_json::from_slice::<ScanResult>(&frame) {
                Ok(msg) => {
                    record(&store, &msg).await;
                    Ack { ok: true }
                }
                Err(e) => {
                    warn!("Undecodable result from {}: {}", peer, e);
                    Ack { ok: false }
                }
            }
        }
    })
    .await
}

async fn record(store: &ResultStore, msg: &ScanResult) {
    let site = &msg.group.site;
    match store.persist(msg).await {
        Ok(Some(path)) => info!(
            "Saved {} cookies for {} to {}",
            msg.result.as_ref().map_or(0, Vec::len),
            site,
            path.display()
        ),
        Ok(None) => info!("Skipped {} (rank {}): no result", site, msg.group.rank),
        Err(e) => error!("Failed to save results for {}: {}", site, e),
    }
}
