//! Request throttling: tracker resolution, route policies and counting.

mod counter;
mod guard;
mod policy;
mod storage;
mod tracker;

pub use counter::WindowCounter;
pub use guard::{ThrottleAllowance, ThrottleRejection, ThrottleRequest, ThrottlerGuard};
pub use policy::{
    auth_rule, default_rules, upload_rule, PolicySelector, RateLimitPolicy, RouteRule,
    SelectedPolicy, DEFAULT_ROUTE_CLASS,
};
pub use storage::{MemoryStorage, ThrottleKey, ThrottleRecord, ThrottlerStorage};
pub use tracker::{parse_forwarded_for, resolve_tracker, ClientIdentity, RequestInfo, UNKNOWN_TRACKER};
