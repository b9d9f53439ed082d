//! Live streams
//!
//! One polling task per watchlisted symbol. The supervisor owns the
//! symbol to handle map and reconciles it against the watchlist.

mod handle;
mod poller;
mod supervisor;

pub use handle::{StreamHandle, StreamHealth, StreamState};
pub use poller::{PollOutcome, PollerExit, PollerSettings, SymbolPoller, MAX_CONSECUTIVE_ERRORS};
pub use supervisor::{ReconcileReport, StreamSupervisor, SupervisorSettings};
