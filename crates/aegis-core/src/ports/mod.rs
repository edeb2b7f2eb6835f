//! Port definitions (spec §9: "hexagonal architecture ... the port layer
//! defines contracts; adapters implement them"). Every port here is a
//! `Send + Sync + 'static` `#[async_trait]` object meant to be held behind
//! an `Arc<dyn Trait>`, the shape the teacher uses throughout
//! `observability` and `spark-router::DefaultRouter`.

pub mod kv;
pub mod transport;

pub use kv::{CasOptions, Entry, KvStore, WatchEvent, WatchOp};
pub use transport::{DurableMode, Subscription, Transport};
