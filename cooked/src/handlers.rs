use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use cooked_core::bridge::BridgeOptions;
use cooked_core::corpus::{Checkpoint, CorpusWriter, load_corpus, load_site_list};
use cooked_core::{
    BridgeHost, ChannelClient, CrawlLeader, CrawlLeaderOptions, CrawlWorker, CrawlWorkerOptions, Leader,
    LeaderOptions, OptChoice, TraverseOptions, Worker, WorkerOptions, populate_corpus,
};
use cooked_scanner::{BrowserOptions, Explorer, HttpBrowser, HttpContext, SiteTraverser, normalize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

pub fn print_banner() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "{}  {}",
        "  COOKED".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!();
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Default checkpoint location: next to the corpus, `.checkpoint` appended.
pub fn default_checkpoint_path(corpus: &Path) -> PathBuf {
    let mut name = corpus.as_os_str().to_owned();
    name.push(".checkpoint");
    PathBuf::from(name)
}

pub fn endpoint(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// One URL per line, or a JSON array.
pub fn format_pages(pages: &[Url], json: bool) -> Result<String> {
    if json {
        let list: Vec<&str> = pages.iter().map(Url::as_str).collect();
        Ok(serde_json::to_string_pretty(&list)?)
    } else {
        Ok(pages.iter().map(Url::as_str).collect::<Vec<_>>().join("\n"))
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(args: &'a ArgMatches, name: &str) -> Result<&'a T> {
    args.get_one::<T>(name)
        .ok_or_else(|| anyhow!("missing required argument --{}", name))
}

fn seconds(args: &ArgMatches, name: &str) -> Result<Duration> {
    required::<u64>(args, name).map(|s| Duration::from_secs(*s))
}

pub async fn handle_traverse(args: &ArgMatches) -> Result<()> {
    let input = expand_path(required::<String>(args, "input")?);
    let output = expand_path(required::<String>(args, "output")?);
    let checkpoint_path = args
        .get_one::<String>("checkpoint")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| default_checkpoint_path(&output));
    let resume = args.get_flag("resume");
    let timeout = seconds(args, "timeout")?;

    let options = TraverseOptions {
        target_count: *required::<usize>(args, "count")?,
        batch_size: *required::<usize>(args, "batch-size")?,
        show_progress: !args.get_flag("quiet"),
    };

    let sites = load_site_list(&input).with_context(|| format!("Failed to read site list {}", input.display()))?;

    println!("{} {} sites from {}", "✓".green().bold(), sites.len(), input.display());
    println!(
        "{} {} pages per site, {} sites per batch, {}s timeout",
        "→".blue(),
        options.target_count,
        options.batch_size,
        timeout.as_secs()
    );
    println!("{} Corpus: {}", "→".blue(), output.display().to_string().bright_white());
    println!();

    let mut writer = CorpusWriter::open(&output, resume)
        .with_context(|| format!("Failed to open corpus {}", output.display()))?;
    let mut checkpoint = Checkpoint::open(&checkpoint_path, resume)
        .with_context(|| format!("Failed to open checkpoint {}", checkpoint_path.display()))?;
    if let Some(last) = checkpoint.last_completed() {
        info!("Resuming after batch {}", last);
    }

    let traverser = build_traverser(args, timeout);

    let summary = populate_corpus(&traverser, &sites, &mut writer, &mut checkpoint, &options).await?;

    println!();
    println!("{} Traversal complete!", "✓".green().bold());
    println!("  Groups written: {}", summary.groups_written.to_string().bright_white());
    println!("  Sites skipped (no scheme answered): {}", summary.sites_absent);
    if summary.sites_failed > 0 {
        println!("  Sites failed: {}", summary.sites_failed.to_string().red());
    }
    if summary.resumed_past > 0 {
        println!("  Batches resumed past: {}", summary.resumed_past);
    }
    Ok(())
}

pub async fn handle_explore(args: &ArgMatches) -> Result<()> {
    let url = required::<Url>(args, "url")?;
    let target = *required::<usize>(args, "count")?;
    let timeout = seconds(args, "timeout")?;

    let context = HttpContext::new(BrowserOptions {
        page_timeout: timeout,
        probe_timeout: timeout,
        ..BrowserOptions::default()
    })
    .context("Failed to create browsing context")?;
    let start = normalize(url.as_str(), None)?;

    let mut explorer = match args.get_one::<u64>("seed") {
        Some(seed) => Explorer::seeded(&context, *seed),
        None => Explorer::new(&context),
    };
    let pages = explorer.explore(&start, target).await;

    if pages.is_empty() {
        warn!("No pages found from {}", start);
    }
    println!("{}", format_pages(&pages, args.get_flag("json"))?);
    Ok(())
}

/// Broadcast on Ctrl-C.
fn shutdown_on_ctrl_c() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            let _ = shutdown_tx.send(());
        }
    });
    shutdown_rx
}

fn build_traverser(args: &ArgMatches, timeout: Duration) -> SiteTraverser<HttpBrowser> {
    let browser = HttpBrowser::new(BrowserOptions {
        page_timeout: timeout,
        probe_timeout: timeout,
        ..BrowserOptions::default()
    });
    let traverser = SiteTraverser::new(browser);
    match args.get_one::<u64>("seed") {
        Some(seed) => traverser.with_seed(*seed),
        None => traverser,
    }
}

pub async fn handle_leader(args: &ArgMatches) -> Result<()> {
    let corpus_path = expand_path(&required::<PathBuf>(args, "corpus")?.to_string_lossy());
    let output_dir = expand_path(required::<String>(args, "output-dir")?);
    let mode = *required::<OptChoice>(args, "mode")?;
    let bind = required::<String>(args, "bind")?;
    let dispatch_port = *required::<u16>(args, "dispatch-port")?;
    let result_port = *required::<u16>(args, "result-port")?;

    let groups = load_corpus(&corpus_path)
        .with_context(|| format!("Failed to load corpus {}", corpus_path.display()))?;
    println!("{} Loaded {} site groups", "✓".green().bold(), groups.len());

    let leader = Leader::new(
        groups,
        LeaderOptions {
            output_dir: output_dir.clone(),
            mode,
            advertise_output_dir: args.get_flag("advertise-output-dir"),
        },
    )
    .await
    .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let dispatch = TcpListener::bind(endpoint(bind, dispatch_port))
        .await
        .with_context(|| format!("Failed to bind dispatch channel on {}", endpoint(bind, dispatch_port)))?;
    let results = TcpListener::bind(endpoint(bind, result_port))
        .await
        .with_context(|| format!("Failed to bind result channel on {}", endpoint(bind, result_port)))?;

    println!("{} Results: {} ({})", "→".blue(), output_dir.display().to_string().bright_white(), mode);
    println!("{} Press Ctrl-C to stop", "→".blue());
    println!();

    leader.serve(dispatch, results, shutdown_on_ctrl_c()).await?;
    Ok(())
}

pub async fn handle_worker(args: &ArgMatches) -> Result<()> {
    let host = required::<String>(args, "leader")?;
    let dispatch_addr = endpoint(host, *required::<u16>(args, "dispatch-port")?);
    let result_addr = endpoint(host, *required::<u16>(args, "result-port")?);
    let mode = *required::<OptChoice>(args, "mode")?;

    let options = WorkerOptions {
        report_timeout: seconds(args, "report-timeout")?,
        settle: Duration::from_millis(*required::<u64>(args, "settle-ms")?),
        mode,
    };

    let session = HttpContext::new(BrowserOptions {
        page_timeout: seconds(args, "page-timeout")?,
        ..BrowserOptions::default()
    })
    .context("Failed to create browsing session")?;

    let dispatch = ChannelClient::connect(dispatch_addr.clone())
        .await
        .with_context(|| format!("Failed to connect to dispatch channel {}", dispatch_addr))?;
    let results = ChannelClient::connect(result_addr.clone())
        .await
        .with_context(|| format!("Failed to connect to result channel {}", result_addr))?;
    println!("{} Connected to leader at {}", "✓".green().bold(), host.bright_white());

    let mut worker = Worker::new(dispatch, results, session, options);
    if !args.get_flag("no-bridge") {
        let bridge_port = *required::<u16>(args, "bridge-port")?;
        let bridge = BridgeHost::bind(BridgeOptions {
            bind: SocketAddr::from(([127, 0, 0, 1], bridge_port)),
            choice: mode,
        })
        .await
        .with_context(|| format!("Failed to bind extension bridge on port {}", bridge_port))?;
        println!("{} Extension bridge on ws://{}", "→".blue(), bridge.local_addr());
        worker = worker.with_bridge(bridge);
    }

    let summary = worker.run().await.context("Lost connection to the leader")?;

    println!();
    println!("{} Worker finished!", "✓".green().bold());
    println!("  Groups scanned: {}", summary.groups.to_string().bright_white());
    println!("  Groups skipped: {}", summary.skipped);
    Ok(())
}

pub async fn handle_crawl_leader(args: &ArgMatches) -> Result<()> {
    let input = expand_path(required::<String>(args, "input")?);
    let output = expand_path(required::<String>(args, "output")?);
    let bind = required::<String>(args, "bind")?;
    let dispatch_port = *required::<u16>(args, "dispatch-port")?;
    let result_port = *required::<u16>(args, "result-port")?;

    let sites = load_site_list(&input).with_context(|| format!("Failed to read site list {}", input.display()))?;
    println!("{} Loaded {} sites from {}", "✓".green().bold(), sites.len(), input.display());

    let leader = CrawlLeader::new(
        sites,
        &CrawlLeaderOptions {
            output: output.clone(),
            resume: args.get_flag("resume"),
        },
    )
    .with_context(|| format!("Failed to open corpus {}", output.display()))?;
    if leader.already_done() > 0 {
        println!("{} {} sites already in the corpus", "→".blue(), leader.already_done());
    }

    let dispatch = TcpListener::bind(endpoint(bind, dispatch_port))
        .await
        .with_context(|| format!("Failed to bind dispatch channel on {}", endpoint(bind, dispatch_port)))?;
    let results = TcpListener::bind(endpoint(bind, result_port))
        .await
        .with_context(|| format!("Failed to bind result channel on {}", endpoint(bind, result_port)))?;

    println!("{} Corpus: {}", "→".blue(), output.display().to_string().bright_white());
    println!("{} Press Ctrl-C to stop", "→".blue());
    println!();

    leader.serve(dispatch, results, shutdown_on_ctrl_c()).await?;

    println!();
    println!("  Sites reported: {}/{}", leader.reported(), leader.total());
    println!("  Groups written: {}", leader.written().to_string().bright_white());
    Ok(())
}

pub async fn handle_crawl_worker(args: &ArgMatches) -> Result<()> {
    let host = required::<String>(args, "leader")?;
    let dispatch_addr = endpoint(host, *required::<u16>(args, "dispatch-port")?);
    let result_addr = endpoint(host, *required::<u16>(args, "result-port")?);
    let timeout = seconds(args, "timeout")?;

    let worker = CrawlWorker::new(
        build_traverser(args, timeout),
        CrawlWorkerOptions {
            target_count: *required::<usize>(args, "count")?,
            concurrency: *required::<usize>(args, "max-workers")?,
        },
    );

    let summary = worker
        .run(&dispatch_addr, &result_addr)
        .await
        .with_context(|| format!("Lost connection to the crawl leader at {}", host))?;

    println!();
    println!("{} Crawl worker finished!", "✓".green().bold());
    println!("  Sites traversed: {}", summary.traversed.to_string().bright_white());
    println!("  Sites skipped (no scheme answered): {}", summary.absent);
    Ok(())
}
