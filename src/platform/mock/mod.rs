//! Mock implementations for testing.
//!
//! `MockFs` feeds canned file contents to `ProcfsPlatform`; `MockPlatform`
//! implements the `Platform` trait directly and can express container
//! topologies procfs never produces (overlapping sources, namespace
//! rebuilds, counters that move backwards).

mod filesystem;
mod platform;
mod scenarios;

pub use filesystem::MockFs;
pub use platform::MockPlatform;
