//! Streaming insertion of generated text into a live document.
//!
//! [`InsertionEngine`] owns the per-call state (buffer, live leaf, remembered
//! container); [`placement`] decides where the first chunk goes for each
//! [`InsertionStrategy`](modelpad_types::InsertionStrategy).

mod engine;
pub mod placement;

pub use engine::{EnginePhase, EngineStats, FlushOutcome, InsertionEngine};
pub use placement::Placement;
