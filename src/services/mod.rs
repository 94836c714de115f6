pub mod binding;
pub mod draft;
pub mod mutation;
pub mod query;
pub mod remote;
pub mod session;

// 重新导出常用类型
pub use binding::{DetailView, FeedView, MountGuard, Reconciled, ViewNotice};
pub use draft::{DraftStore, FileDraftStore, MemoryDraftStore, PlanEditor};
pub use mutation::{MutationCoordinator, MutationTicket, PendingDelete};
pub use query::{CacheEvent, FeedSnapshot, QueryCache, QueryStatus};
pub use remote::{HttpClient, Mutation, Operation, RemoteResource};
pub use session::Session;
