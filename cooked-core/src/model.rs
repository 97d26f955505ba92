use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row of a ranked site list; also the unit of distributed traversal work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub rank: u64,
    #[serde(alias = "domain")]
    pub site: String,
}

/// A site plus its pre-discovered internal URLs; the unit of dispatch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteGroup {
    pub rank: u64,
    pub site: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// What a worker reports back for one group.
///
/// `result: None` means the group failed entirely; `Some(vec![])` means it
/// was scanned and nothing was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub group: SiteGroup,
    pub result: Option<Vec<String>>,
}

/// Consent choice the extension is told to apply; also names output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptChoice {
    #[default]
    OptIn,
    OptOut,
}

impl OptChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptChoice::OptIn => "optIn",
            OptChoice::OptOut => "optOut",
        }
    }
}

impl fmt::Display for OptChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "optin" | "in" => Ok(OptChoice::OptIn),
            "optout" | "out" => Ok(OptChoice::OptOut),
            _ => Err(format!("unknown opt choice '{}' (expected optIn or optOut)", s)),
        }
    }
}

/// Leader's answer on the dispatch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchReply {
    /// End-of-work sentinel: the corpus is exhausted.
    Done { done: bool },
    Group {
        #[serde(flatten)]
        group: SiteGroup,
        #[serde(rename = "outputDir", default, skip_serializing_if = "Option::is_none")]
        output_dir: Option<String>,
    },
}

impl DispatchReply {
    pub fn done() -> Self {
        DispatchReply::Done { done: true }
    }

    pub fn group(group: SiteGroup, output_dir: Option<String>) -> Self {
        DispatchReply::Group { group, output_dir }
    }
}

/// Leader's answer on the traversal dispatch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrawlReply {
    Done { done: bool },
    Site(SiteEntry),
}

impl CrawlReply {
    pub fn done() -> Self {
        CrawlReply::Done { done: true }
    }
}

/// A traversal worker's report for one site. `urls: None` means no scheme
/// answered or the traversal could not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    #[serde(flatten)]
    pub site: SiteEntry,
    pub urls: Option<Vec<String>>,
}

impl CrawlResult {
    /// The corpus line for this site, if it was traversed.
    pub fn into_group(self) -> Option<SiteGroup> {
        let urls = self.urls?;
        Some(SiteGroup {
            rank: self.site.rank,
            site: self.site.site,
            urls,
        })
    }
}

/// Result-channel acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}
