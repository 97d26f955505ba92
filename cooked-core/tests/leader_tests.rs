// Tests for the leader's dispatch and result channels

use cooked_core::frame::{ChannelClient, read_frame, write_frame};
use cooked_core::{Ack, DispatchReply, Leader, LeaderOptions, OptChoice, ScanResult, SiteGroup};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct Running {
    dispatch: SocketAddr,
    results: SocketAddr,
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<cooked_core::Result<()>>,
}

async fn start_leader(groups: Vec<SiteGroup>, dir: &Path, advertise: bool) -> Running {
    let leader = Leader::new(
        groups,
        LeaderOptions {
            output_dir: dir.to_path_buf(),
            mode: OptChoice::OptIn,
            advertise_output_dir: advertise,
        },
    )
    .await
    .unwrap();

    let dispatch_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let result_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dispatch = dispatch_listener.local_addr().unwrap();
    let results = result_listener.local_addr().unwrap();

    let (shutdown, rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { leader.serve(dispatch_listener, result_listener, rx).await });

    Running {
        dispatch,
        results,
        shutdown,
        handle,
    }
}

fn group(rank: u64, site: &str, urls: &[&str]) -> SiteGroup {
    SiteGroup {
        rank,
        site: site.to_string(),
        urls: urls.iter().map(|u| u.to_string()).collect(),
    }
}

async fn next(client: &mut ChannelClient) -> DispatchReply {
    client.request(&json!({})).await.unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Dispatch Channel Tests
// ============================================================================

#[tokio::test]
async fn test_dispatch_in_corpus_order_then_done() {
    let tmp = TempDir::new().unwrap();
    let corpus = vec![
        group(1, "a.com", &["https://a.com/"]),
        group(2, "b.com", &["https://b.com/"]),
        group(3, "c.com", &["https://c.com/"]),
    ];
    let leader = start_leader(corpus.clone(), tmp.path(), false).await;

    let mut client = ChannelClient::connect(leader.dispatch).await.unwrap();
    for expected in &corpus {
        assert_eq!(next(&mut client).await, DispatchReply::group(expected.clone(), None));
    }

    // Exhausted: every further request gets the sentinel
    assert_eq!(next(&mut client).await, DispatchReply::done());
    assert_eq!(next(&mut client).await, DispatchReply::done());

    leader.shutdown.send(()).unwrap();
    leader.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_groups_shared_across_workers() {
    let tmp = TempDir::new().unwrap();
    let corpus: Vec<SiteGroup> = (1..=4).map(|r| group(r, &format!("s{}.org", r), &[])).collect();
    let leader = start_leader(corpus, tmp.path(), false).await;

    let mut first = ChannelClient::connect(leader.dispatch).await.unwrap();
    let mut second = ChannelClient::connect(leader.dispatch).await.unwrap();

    let mut ranks = Vec::new();
    for _ in 0..2 {
        for client in [&mut first, &mut second] {
            if let DispatchReply::Group { group, .. } = next(client).await {
                ranks.push(group.rank);
            }
        }
    }

    assert_eq!(ranks, vec![1, 2, 3, 4]);
    assert_eq!(next(&mut first).await, DispatchReply::done());
    leader.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_output_dir_hint() {
    let tmp = TempDir::new().unwrap();
    let leader = start_leader(vec![group(1, "a.com", &[])], tmp.path(), true).await;

    let mut client = ChannelClient::connect(leader.dispatch).await.unwrap();
    let raw = client.exchange(b"").await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

    assert_eq!(value["site"], "a.com");
    assert_eq!(value["outputDir"], tmp.path().display().to_string());
    leader.shutdown.send(()).unwrap();
}

// A group held by a worker that vanishes is never handed out again
#[tokio::test]
async fn test_lost_group_is_never_redispatched() {
    let tmp = TempDir::new().unwrap();
    let corpus = vec![group(1, "lost.com", &["https://lost.com/"]), group(2, "kept.com", &[])];
    let leader = start_leader(corpus, tmp.path(), false).await;

    {
        let mut crashed = ChannelClient::connect(leader.dispatch).await.unwrap();
        match next(&mut crashed).await {
            DispatchReply::Group { group, .. } => assert_eq!(group.site, "lost.com"),
            other => panic!("expected a group, got {:?}", other),
        }
    }

    let mut survivor = ChannelClient::connect(leader.dispatch).await.unwrap();
    match next(&mut survivor).await {
        DispatchReply::Group { group, .. } => assert_eq!(group.site, "kept.com"),
        other => panic!("expected a group, got {:?}", other),
    }
    assert_eq!(next(&mut survivor).await, DispatchReply::done());

    assert!(files_in(tmp.path()).is_empty());
    leader.shutdown.send(()).unwrap();
}

// ============================================================================
// Result Channel Tests
// ============================================================================

// Cookie names from one group land in a single file, one per line
#[tokio::test]
async fn test_result_written_newline_joined() {
    let tmp = TempDir::new().unwrap();
    let g = group(1, "example.com", &["https://example.com/a", "https://example.com/b"]);
    let leader = start_leader(vec![g.clone()], tmp.path(), false).await;

    let mut client = ChannelClient::connect(leader.results).await.unwrap();
    let ack: Ack = client
        .request(&ScanResult {
            group: g,
            result: Some(vec!["sid".into(), "consent".into()]),
        })
        .await
        .unwrap();

    assert!(ack.ok);
    let content = std::fs::read_to_string(tmp.path().join("example_com_optIn_cookies.txt")).unwrap();
    assert_eq!(content, "sid\nconsent");
    leader.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_null_result_writes_no_file() {
    let tmp = TempDir::new().unwrap();
    let g = group(5, "www.down.net", &[]);
    let leader = start_leader(vec![g.clone()], tmp.path(), false).await;

    let mut client = ChannelClient::connect(leader.results).await.unwrap();
    let ack: Ack = client.request(&ScanResult { group: g, result: None }).await.unwrap();

    assert!(ack.ok);
    assert!(files_in(tmp.path()).is_empty());
    leader.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_undecodable_result_is_nacked() {
    let tmp = TempDir::new().unwrap();
    let leader = start_leader(Vec::new(), tmp.path(), false).await;

    let mut client = ChannelClient::connect(leader.results).await.unwrap();
    let ack: Ack = serde_json::from_slice(&client.exchange(b"{\"group\": 3}").await.unwrap()).unwrap();
    assert!(!ack.ok);

    // The connection stays usable
    let ack: Ack = client
        .request(&ScanResult {
            group: group(1, "ok.io", &[]),
            result: Some(vec![]),
        })
        .await
        .unwrap();
    assert!(ack.ok);
    assert_eq!(files_in(tmp.path()), vec!["ok_io_optIn_cookies.txt".to_string()]);
    leader.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_result_channel_not_blocked_by_stalled_dispatch() {
    let tmp = TempDir::new().unwrap();
    let leader = start_leader(vec![group(1, "a.com", &[])], tmp.path(), false).await;

    // Half a frame on the dispatch channel, never completed
    let mut stalled = TcpStream::connect(leader.dispatch).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut stalled, &[8, 0]).await.unwrap();

    let mut results = TcpStream::connect(leader.results).await.unwrap();
    let msg = serde_json::to_vec(&ScanResult {
        group: group(1, "a.com", &[]),
        result: Some(vec!["x".into()]),
    })
    .unwrap();
    write_frame(&mut results, &msg).await.unwrap();

    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), read_frame(&mut results))
        .await
        .expect("result channel stalled")
        .unwrap()
        .unwrap();
    let ack: Ack = serde_json::from_slice(&reply).unwrap();
    assert!(ack.ok);

    // Dispatch still works for other workers
    let mut client = ChannelClient::connect(leader.dispatch).await.unwrap();
    assert!(matches!(next(&mut client).await, DispatchReply::Group { .. }));
    leader.shutdown.send(()).unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_serving() {
    let tmp = TempDir::new().unwrap();
    let leader = start_leader(Vec::new(), tmp.path(), false).await;

    leader.shutdown.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), leader.handle)
        .await
        .expect("leader did not stop")
        .unwrap()
        .unwrap();
}
