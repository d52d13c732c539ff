pub mod memory;
pub mod reconciler;
pub mod remote;

pub use memory::MemoryRemoteStore;
pub use reconciler::{PersistOutcome, RemoteFailure, SyncOutcome, SyncReconciler};
pub use remote::{RemoteFuture, RemoteStore};
