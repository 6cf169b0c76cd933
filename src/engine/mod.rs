pub mod controller;
pub mod deadline;
pub mod feed;
pub mod session;
pub mod summary;

pub use controller::{RunController, RunOptions, SweepOptions};
pub use deadline::Deadline;
pub use feed::FeedEnumerator;
pub use session::{Session, SessionError, SessionManager, SessionRegistry, SessionState};
pub use summary::{ActionOutcome, NeighborStat, RunLog, RunSummary};
