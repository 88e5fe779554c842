//! Run execution: scheduling and the coordinating engine

pub mod engine;
pub(crate) mod scheduler;

pub use engine::{
    cancel_pair, CancelHandle, CancelSignal, EventHandler, ExecutionEngine, ExecutionEvent,
};
