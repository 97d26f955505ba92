// Tests for distributed traversal between a crawl leader and crawl workers

use cooked_core::corpus::{CorpusWriter, load_corpus};
use cooked_core::{
    ChannelClient, CrawlLeader, CrawlLeaderOptions, CrawlReply, CrawlResult, CrawlWorker, CrawlWorkerOptions,
    SiteEntry, SiteGroup,
};
use cooked_scanner::{BrowserOptions, HttpBrowser, SiteTraverser};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Running {
    dispatch: SocketAddr,
    results: SocketAddr,
    leader: Arc<CrawlLeader>,
    shutdown: broadcast::Sender<()>,
}

async fn start_leader(sites: Vec<SiteEntry>, output: &Path, resume: bool) -> Running {
    let leader = Arc::new(
        CrawlLeader::new(
            sites,
            &CrawlLeaderOptions {
                output: output.to_path_buf(),
                resume,
            },
        )
        .unwrap(),
    );

    let dispatch_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let result_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dispatch = dispatch_listener.local_addr().unwrap();
    let results = result_listener.local_addr().unwrap();

    let (shutdown, rx) = broadcast::channel(1);
    let serving = leader.clone();
    tokio::spawn(async move { serving.serve(dispatch_listener, result_listener, rx).await });

    Running {
        dispatch,
        results,
        leader,
        shutdown,
    }
}

fn entry(rank: u64, site: &str) -> SiteEntry {
    SiteEntry {
        rank,
        site: site.to_string(),
    }
}

fn crawl_worker(concurrency: usize) -> CrawlWorker<HttpBrowser> {
    let traverser = SiteTraverser::new(HttpBrowser::new(BrowserOptions {
        page_timeout: Duration::from_secs(2),
        probe_timeout: Duration::from_secs(2),
        ..BrowserOptions::default()
    }))
    .with_seed(3);
    CrawlWorker::new(
        traverser,
        CrawlWorkerOptions {
            target_count: 15,
            concurrency,
        },
    )
}

async fn small_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<a href="/contact">Contact</a>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<p>contact</p>"),
        )
        .mount(&server)
        .await;
    server
}

fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

// ============================================================================
// Leader Tests
// ============================================================================

#[tokio::test]
async fn test_sites_dispatched_in_order_then_done() {
    let tmp = TempDir::new().unwrap();
    let running = start_leader(
        vec![entry(1, "a.com"), entry(2, "b.com")],
        &tmp.path().join("links.jsonl"),
        false,
    )
    .await;

    let mut client = ChannelClient::connect(running.dispatch).await.unwrap();
    let mut replies = Vec::new();
    for _ in 0..3 {
        let reply: CrawlReply = client.request(&json!({})).await.unwrap();
        replies.push(reply);
    }

    assert_eq!(
        replies,
        vec![
            CrawlReply::Site(entry(1, "a.com")),
            CrawlReply::Site(entry(2, "b.com")),
            CrawlReply::done(),
        ]
    );
    running.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_only_traversed_sites_are_appended() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("links.jsonl");
    let running = start_leader(vec![entry(1, "up.com"), entry(2, "down.com")], &output, false).await;

    let mut client = ChannelClient::connect(running.results).await.unwrap();
    let up = CrawlResult {
        site: entry(1, "up.com"),
        urls: Some(vec!["https://up.com/".into()]),
    };
    let down = CrawlResult {
        site: entry(2, "down.com"),
        urls: None,
    };
    let ack: cooked_core::Ack = client.request(&up).await.unwrap();
    assert!(ack.ok);
    let ack: cooked_core::Ack = client.request(&down).await.unwrap();
    assert!(ack.ok);

    assert_eq!(
        load_corpus(&output).unwrap(),
        vec![SiteGroup {
            rank: 1,
            site: "up.com".into(),
            urls: vec!["https://up.com/".into()],
        }]
    );
    assert_eq!(running.leader.reported(), 2);
    assert_eq!(running.leader.written(), 1);

    let raw = client.exchange(b"not json").await.unwrap();
    let ack: cooked_core::Ack = serde_json::from_slice(&raw).unwrap();
    assert!(!ack.ok);
    running.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_resume_skips_sites_already_in_corpus() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("links.jsonl");
    let mut writer = CorpusWriter::open(&output, false).unwrap();
    writer
        .write_group(&SiteGroup {
            rank: 1,
            site: "done.com".into(),
            urls: vec!["https://done.com/".into()],
        })
        .unwrap();
    drop(writer);

    let running = start_leader(vec![entry(1, "done.com"), entry(2, "next.com")], &output, true).await;
    assert_eq!(running.leader.already_done(), 1);
    assert_eq!(running.leader.total(), 1);

    let mut client = ChannelClient::connect(running.dispatch).await.unwrap();
    let reply: CrawlReply = client.request(&json!({})).await.unwrap();
    assert_eq!(reply, CrawlReply::Site(entry(2, "next.com")));

    // The existing corpus survives the restart
    assert_eq!(load_corpus(&output).unwrap().len(), 1);
    running.shutdown.send(()).unwrap();
}

// ============================================================================
// End-to-end Tests
// ============================================================================

#[tokio::test]
async fn test_workers_build_corpus() {
    let server = small_site().await;
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("links.jsonl");
    let running = start_leader(
        vec![entry(1, &host_of(&server)), entry(2, "127.0.0.1:1")],
        &output,
        false,
    )
    .await;

    let summary = crawl_worker(2)
        .run(&running.dispatch.to_string(), &running.results.to_string())
        .await
        .unwrap();

    assert_eq!(summary.sites, 2);
    assert_eq!(summary.traversed, 1);
    assert_eq!(summary.absent, 1);

    let corpus = load_corpus(&output).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].rank, 1);
    let mut urls = corpus[0].urls.clone();
    urls.sort();
    assert_eq!(urls, vec![format!("{}/", server.uri()), format!("{}/contact", server.uri())]);
    assert_eq!(running.leader.reported(), 2);
    running.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_worker_with_no_sites_exits() {
    let tmp = TempDir::new().unwrap();
    let running = start_leader(Vec::new(), &tmp.path().join("links.jsonl"), false).await;

    let summary = crawl_worker(3)
        .run(&running.dispatch.to_string(), &running.results.to_string())
        .await
        .unwrap();

    assert_eq!(summary.sites, 0);
    running.shutdown.send(()).unwrap();
}
