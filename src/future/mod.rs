//! Enhanced promise/future pair over a single-assignment result cell.
//!
//! The cell holds exactly one of: no value yet, a value, an error, or a
//! cancellation marker. Transitions are monotonic. The producer side is a
//! [`Promise`]; any number of [`EnhancedFuture`] handles share the cell
//! for fan-out reads.
//!
//! # Suspension Points
//!
//! `EnhancedFuture::get`/`wait`/`wait_for` block the calling OS thread.
//! There is no cooperative scheduler underneath; non-blocking composition
//! goes through `on_complete` callbacks or `then` chaining.

mod cell;
mod enhanced;
mod promise;

pub use cell::Resolution;
pub use enhanced::EnhancedFuture;
pub use promise::Promise;

pub(crate) use cell::ResultCell;
