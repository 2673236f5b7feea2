//! Test sessions: identity and the full run record.

mod id;
mod record;

pub use id::SessionId;
pub use record::TestSession;
