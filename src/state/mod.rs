//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `JobStatus`: The per-job state machine (pending, in progress, completed, failed)
//! - `HostState`: Tracks per-host request slots for pacing

mod host_state;
mod job_status;

pub use host_state::HostState;
pub use job_status::JobStatus;
