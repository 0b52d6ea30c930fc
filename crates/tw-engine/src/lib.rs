//! tw-engine - Build-and-run engine for Tidewater
//!
//! The Builder turns a compiled graph and run options into a concrete,
//! filtered execution graph. The Runner drives that graph to completion
//! against a warehouse, respecting dependencies, run caching, retries,
//! cancellation and timeouts, and streams progress snapshots to listeners.

pub mod builder;
pub mod error;
mod notifier;
pub mod options;
pub mod prune;
pub mod retry;
pub mod runner;

pub use builder::{build, Builder};
pub use error::{EngineError, EngineResult};
pub use notifier::Listener;
pub use options::ExecutionOptions;
pub use prune::{included_targets, prune};
pub use retry::RetryPolicy;
pub use runner::{run, Runner};
