//! # solve-core
//!
//! Practice-session bookkeeping for coding-challenge pages: an active-time
//! session timer, a run/submit attempt tracker with a one-shot analysis
//! latch, and the staged sync pipeline that runs after an accepted
//! submission.
//!
//! ## Design Principles
//!
//! - **Async at the edges**: store and collaborator calls are `async`; the
//!   timer and tracker themselves are plain state machines.
//! - **Per-key write ordering**: every record write goes through
//!   [`WriteQueue`], so a timer tick and a pipeline write never interleave.
//! - **Graceful degradation**: missing or unreadable stored records load as
//!   empty; stage failures end up in a [`PipelineReport`], not a panic.
//! - **No globals**: timers come from a [`SessionRegistry`] or are owned by a
//!   [`SolveEngine`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solve_core::{SolveEngine, WriteQueue, MemoryStore, SystemClock};
//!
//! let queue = Arc::new(WriteQueue::new(Arc::new(MemoryStore::new())));
//! let mut engine = SolveEngine::new(config, queue, Arc::new(SystemClock), services);
//! engine.navigate("https://leetcode.com/problems/two-sum/").await;
//! let outcome = engine.handle_event(event).await;
//! ```

pub mod bridge;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod services;
pub mod store;
pub mod timer;
pub mod tracker;

// Re-export commonly used items at crate root
pub use bridge::{BridgeBackendSync, BridgeChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use engine::{EventOutcome, SolveEngine};
pub use error::{ErrorKind, Result, SolveError};
pub use pipeline::{
    PipelineReport, PipelineStage, StageOutcome, SyncPipeline, SyncServices, SyncSettings,
};
pub use record::{canonical_problem_url, Difficulty, ProblemRecord, SolvedStatus, SubmissionStats};
pub use services::*;
pub use store::{JsonFileStore, MemoryStore, PersistentStore, WriteQueue};
pub use timer::{format_elapsed, Session, SessionRegistry, SessionTimer};
pub use tracker::{Attempt, AttemptKind, AttemptOutcome, AttemptTracker, TrackerCounters};
