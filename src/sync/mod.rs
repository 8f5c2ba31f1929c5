pub mod engine;
pub mod scheduler;

pub use engine::{map_raw_trade, sync_trades, sync_with_client, SyncError, SyncOptions};
pub use scheduler::SyncScheduler;
