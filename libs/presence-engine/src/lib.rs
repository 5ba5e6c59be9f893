pub mod error;
mod service;
mod store;
mod sweeper;

pub use error::EngineError;
pub use service::{PresenceConfig, PresenceService};
pub use store::{LockedStore, ShardedStore, StoreKind, build_store};
pub use sweeper::{SweepReport, Sweeper, default_sweep_period, spawn_sweeper};
