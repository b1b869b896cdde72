//! State tracking for a crawl run
//!
//! - `TargetState`: the fetch state machine a single target moves through
//! - `WorkerState`: counters owned by one worker for its lifetime

mod target_state;
mod worker_state;

pub use target_state::TargetState;
pub use worker_state::{WorkerExit, WorkerState};
