pub mod types;
pub mod queue;
pub mod pool;


pub use types::*;
pub use queue::{PendingEntry, PendingQueue};
pub use pool::WorkerPool;
