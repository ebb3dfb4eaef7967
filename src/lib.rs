//! UXRay Stream - streaming client for the UXRay page-analysis service.
//!
//! This crate provides:
//! - An incremental decoder for the service's `text/event-stream` responses
//! - Total classification of heterogeneous event payloads
//! - A reconciliation store folding progress, execution steps and late
//!   screenshots into one consistent [`ReconciledState`]
//! - A session controller that runs one analysis at a time, with cancellation,
//!   deadlines and a JSON (non-streaming) fallback
//!
//! # Example
//!
//! ```rust,no_run
//! use uxray_stream::{AnalysisSession, ClientConfig, RunOutcome};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let session = AnalysisSession::new(ClientConfig::new("http://localhost:3000"))?;
//! let mut updates = session.subscribe();
//!
//! match session.run("https://example.com").await? {
//!     RunOutcome::Complete(payload) => println!("done: {:?}", payload.message),
//!     RunOutcome::Degraded(state) => println!("partial: {} steps", state.execution_results.len()),
//! }
//! println!("progress: {}%", updates.borrow_and_update().progress_percent);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod model;
pub mod reconcile;
pub mod runner;
pub mod session;
pub mod stream;
pub mod transport;

// Re-export configuration
pub use config::{ClientConfig, Config};

// Re-export the data model
pub use model::{
    ActionSuggestion, AnalysisPayload, CurrentExecution, ElementInfo, ExecutionOutcome, ExecutionRecord,
    ExecutionSummary, ReconciledState, ResultFilter, ScreenshotRef,
};

// Re-export reconciliation
pub use reconcile::{RecordKey, ReplayResult, reduce, replay};

// Re-export run result types
pub use runner::{RunOutcome, RunReport};

// Re-export the session controller
pub use session::AnalysisSession;

// Re-export stream types
pub use stream::{ClassifiedEvent, EventKind, Frame, FrameDecoder, Ingest, StreamError, StreamResult, classify};

// Re-export transport helpers
pub use transport::check_health;
