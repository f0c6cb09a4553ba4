//! Agent process and stream tests.

mod events_test;
mod process_test;
mod stream_test;
