//! Worker side of the scan: pull a group, visit its URLs in one cookie-keeping
//! session, report the cookie names back.

use crate::bridge::BridgeHost;
use crate::error::{CoreError, Result};
use crate::frame::ChannelClient;
use crate::model::{Ack, DispatchReply, OptChoice, ScanResult, SiteGroup};
use cooked_scanner::BrowserSession;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Fallback wait for the extension's report on each page
    pub report_timeout: Duration,
    /// Pause after each page before moving on
    pub settle: Duration,
    pub mode: OptChoice,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            report_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(1),
            mode: OptChoice::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub groups: usize,
    pub skipped: usize,
}

pub struct Worker<S> {
    dispatch: ChannelClient,
    results: ChannelClient,
    session: S,
    bridge: Option<BridgeHost>,
    options: WorkerOptions,
}

impl<S: BrowserSession> Worker<S> {
    pub fn new(dispatch: ChannelClient, results: ChannelClient, session: S, options: WorkerOptions) -> Self {
        Self {
            dispatch,
            results,
            session,
            bridge: None,
            options,
        }
    }

    /// Wait for extension reports on every page.
    pub fn with_bridge(mut self, bridge: BridgeHost) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Pull and scan groups until the leader says there is no more work.
    pub async fn run(&mut self) -> Result<WorkerSummary> {
        info!(
            "Worker pulling from {} (mode {}, extension bridge {})",
            self.dispatch.peer(),
            self.options.mode,
            if self.bridge.is_some() { "on" } else { "off" }
        );

        let mut summary = WorkerSummary::default();
        while let Some(group) = self.next_group().await? {
            let result = self.scan_group(&group).await;
            if result.is_none() {
                summary.skipped += 1;
            }
            self.report(ScanResult { group, result }).await?;
            summary.groups += 1;
        }

        info!("No more work: {} groups scanned, {} skipped", summary.groups, summary.skipped);
        Ok(summary)
    }

    /// Ask the leader for the next group; `None` once the corpus is exhausted.
    pub async fn next_group(&mut self) -> Result<Option<SiteGroup>> {
        let reply: DispatchReply = self.dispatch.request(&json!({})).await?;
        match reply {
            DispatchReply::Group { group, output_dir } => {
                if let Some(dir) = output_dir {
                    debug!("Leader writes results to {}", dir);
                }
                info!("Received group {}: {} ({} urls)", group.rank, group.site, group.urls.len());
                Ok(Some(group))
            }
            DispatchReply::Done { done: true } => Ok(None),
            DispatchReply::Done { done: false } => {
                Err(CoreError::UnexpectedReply("'done: false' without a group".to_string()))
            }
        }
    }

    /// Visit every URL of the group in order and collect the cookies they set.
    ///
    /// Cookies are cleared once up front and accumulate across the group. A
    /// failed page is logged and skipped. An empty group yields `None`.
    pub async fn scan_group(&self, group: &SiteGroup) -> Option<Vec<String>> {
        if group.urls.is_empty() {
            info!("No related URLs for {}, skipping", group.site);
            return None;
        }

        self.session.clear_cookies();

        for raw in &group.urls {
            let url = match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping malformed URL {}: {}", raw, e);
                    continue;
                }
            };
            info!("Visiting: {}", url);

            let waiter = self.bridge.as_ref().and_then(|bridge| match bridge.arm_report() {
                Ok(waiter) => Some(waiter),
                Err(e) => {
                    warn!("Cannot wait for a report on {}: {}", url, e);
                    None
                }
            });

            match self.session.goto(&url).await {
                Ok(status) => {
                    debug!("{} answered {}", url, status);
                    if let Some(waiter) = waiter {
                        let report = waiter.wait(self.options.report_timeout).await;
                        debug!("{}: {} CMPs, {} popups", url, report.cmps.len(), report.popups.len());
                    }
                }
                Err(e) => warn!("Error visiting {}: {}", url, e),
            }

            tokio::time::sleep(self.options.settle).await;
        }

        let names = self.session.cookie_names();
        info!("{}: {} cookies after {} urls", group.site, names.len(), group.urls.len());
        Some(names)
    }

    /// Send one result and wait for the leader's acknowledgement.
    pub async fn report(&mut self, result: ScanResult) -> Result<()> {
        let ack: Ack = self.results.request(&result).await?;
        if !ack.ok {
            warn!("Leader rejected the result for {}", result.group.site);
        }
        Ok(())
    }
}
