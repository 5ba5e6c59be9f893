mod clock;
mod store;
mod types;
mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::LivenessStore;
pub use types::{PresenceStatus, SubjectId, TimestampMs};
pub use util::{format_iso8601, now_ms};
