pub mod page;
pub mod plan;
pub mod response;
pub mod trip;

pub use page::{FeedFilter, FeedKey, FeedPage, PageRequest, ResourceKind, SortKey};
pub use plan::{PlanDraft, PlanId};
pub use response::Ack;
pub use trip::{Area, Flag, Trip};
