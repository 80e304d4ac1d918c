//! The worker side of a pool: serves one program over stdin and stdout.
//!
//! A worker binary builds its [`Program`](taskpool_core::Program) and hands it
//! to [`WorkerImpl`], which answers every request frame with exactly one
//! reply frame until the pool closes stdin or the process is interrupted.

pub mod error_tracker;
pub mod shutdown;
pub mod task_loop;
pub mod worker;
pub mod worker_config;

pub use shutdown::{shutdown_manager::ShutdownManager, shutdown_reason::ShutdownReason};
pub use worker::WorkerImpl;
pub use worker_config::WorkerConfig;
