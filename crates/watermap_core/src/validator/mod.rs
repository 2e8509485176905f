//! Input validators applied before anything reaches storage.
//!
//! Validators are pure functions: no I/O, no shared state, safe to call from
//! any number of threads.

pub mod geometry;
