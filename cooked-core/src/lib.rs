pub mod bridge;
pub mod corpus;
pub mod crawl;
pub mod error;
pub mod frame;
pub mod leader;
pub mod model;
pub mod populate;
pub mod queue;
pub mod store;
pub mod worker;

pub use bridge::{BridgeHost, BridgeMessage, BridgeOptions, MessageKind, Report};
pub use corpus::{Checkpoint, CorpusWriter, load_corpus, load_site_list, read_site_list};
pub use crawl::{CrawlLeader, CrawlLeaderOptions, CrawlSummary, CrawlWorker, CrawlWorkerOptions};
pub use error::{CoreError, Result};
pub use frame::ChannelClient;
pub use leader::{Leader, LeaderOptions};
pub use model::{Ack, CrawlReply, CrawlResult, DispatchReply, OptChoice, ScanResult, SiteEntry, SiteGroup};
pub use populate::{PopulateSummary, TraverseOptions, populate_corpus};
pub use queue::WorkQueue;
pub use store::ResultStore;
pub use worker::{Worker, WorkerOptions, WorkerSummary};
