pub mod backend;
pub mod conf;
pub mod core;
pub mod dataset;
pub mod harness;
pub mod runner;
pub mod sink;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
