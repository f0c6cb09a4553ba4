//! Iteration supervision: state machine, retries, process sessions and
//! cancellation.

mod cancel;
mod context;
mod observer;
mod outcome;
mod pipeline;
mod retry;
mod runner;
mod session;
mod state;

pub use cancel::*;
pub use context::*;
pub use observer::*;
pub use outcome::*;
pub use pipeline::*;
pub use retry::*;
pub use runner::*;
pub use session::*;
pub use state::*;

#[cfg(test)]
pub(crate) use observer::testing;
