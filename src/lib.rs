//! Local replica and lookup client for a Safe Browsing v4-style threat
//! service.
//!
//! The crate keeps per-list hash-prefix sets synchronized with the remote
//! service through the incremental update protocol, and answers
//! "is this URL dangerous?" queries locally. Only when a local prefix
//! matches does a batched full-hash verification call leave the machine,
//! and confirmed matches are cached with the server-advertised TTL.
//!
//! ```no_run
//! use safebrowse::{Config, SafeBrowser};
//!
//! # async fn demo() -> Result<(), safebrowse::Error> {
//! let config = Config::from_env()?;
//! let browser = SafeBrowser::connect(config).await?;
//! browser.start();
//! let matches = browser.check("http://testsafebrowsing.appspot.com/s/malware.html").await?;
//! println!("{} confirmed matches", matches.len());
//! browser.stop();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod expression;
pub mod hashes;
pub mod lists;
pub mod matcher;
pub mod storage;
mod sync;
pub mod types;

pub use api::{HttpThreatApi, ThreatApi, DEFAULT_ENDPOINT};
pub use cache::FullHashCache;
pub use config::{default_lists, Config};
pub use engine::SafeBrowser;
pub use error::Error;
pub use events::{EventBus, EventKind, UpdateEvent};
pub use lists::ThreatListStore;
pub use matcher::Matcher;
pub use storage::{Batch, MemoryStore, RedisStore, Store};
pub use types::{ListIdentity, MatchRecord, PlatformType, ThreatEntryType, ThreatType};
