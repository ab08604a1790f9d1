pub mod lock;
pub mod store;

pub use lock::{ProgressBusy, ProgressLockMap};
pub use store::{DomainStore, TurnCtx};
