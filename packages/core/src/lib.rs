// Library root: exposes the harvester modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod db;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod sources;
pub mod store;

// Only needed by the binary, but public so integration tests can reach them.
pub mod cli;
pub mod config;
pub mod logging;
