//! `amaplayer-actions` — the client-side optimistic action pipeline.
//!
//! Interactive actions (liking a post, following a profile) update the UI
//! immediately and reconcile with the document store afterwards. Searches run
//! through the same retry machinery.
//!
//! # Architecture
//!
//! ```text
//! toggle / apply_optimistic
//!     │                 tentative value applied synchronously
//!     ▼
//! OptimisticStore   ← per-key EntityState, debounce, last-issued-wins
//!     │                 durable write after the debounce window
//!     ▼
//! RetryScheduler    ← one pending operation per key, exponential backoff
//!     │                 failures classified by amaplayer_core::Classifier
//!     ▼
//! DurableWrite      ← caller-supplied backend seam
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use amaplayer_actions::{OptimisticStore, ScriptedBackend};
//! use amaplayer_core::config::PipelineConfig;
//!
//! let store = OptimisticStore::new(ScriptedBackend::echo(), &PipelineConfig::default())?;
//! store.toggle("post-1", false);            // UI shows `true`, loading
//! let state = store.settled("post-1").await; // confirmed by the backend
//! ```

pub mod backend;
pub mod error;
pub mod retry;
pub mod search;
pub mod store;
pub mod types;


pub use backend::{DurableWrite, Outcome, ScriptedBackend, SearchBackend, SearchHit, WriteCall};
pub use error::ActionError;
pub use retry::RetryScheduler;
pub use search::SearchExecutor;
pub use store::OptimisticStore;
pub use types::{ActionRequest, EntityState, QueuedOperation, StateChange, StateValue};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ActionError>;
