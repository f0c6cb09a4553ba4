//! Agent process spawning and stream parsing.

mod diagnostics;
mod events;
mod process;
mod stream;

pub use diagnostics::*;
pub use events::*;
pub use process::*;
pub use stream::*;
