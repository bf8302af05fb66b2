//! Activity log: explicit, typed recording of user and system actions.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod recorder;
pub mod security;
pub mod store;

pub use recorder::{ActivityRecorder, ActivitySubscriber};
pub use store::{ActivityStore, NewActivity, PgActivityStore, RequestContext, Subject};
