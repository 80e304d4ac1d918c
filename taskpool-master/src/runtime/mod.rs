//! Execution units: the thing a [`Worker`](crate::Worker) owns and talks to.
//!
//! A [`Runtime`] spawns units bound to a program; an [`ExecutionUnit`] accepts
//! request frames and yields signals. Two runtimes ship with the pool: one
//! OS thread per worker ([`thread::ThreadRuntime`]) and one child process per
//! worker ([`process::ProcessRuntime`]).

use std::{future::Future, io};

use taskpool_core::{
    protocol::{Reply, Request},
    WorkerId,
};

use crate::{config::ResourceLimits, error::SpawnError};

pub mod process;
pub mod thread;

/// What an execution unit reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    // A reply frame from the program.
    Message(Reply),
    // The unit produced something that is not a reply.
    Error(String),
    // The unit stopped running.
    Exit(String),
}

pub trait ExecutionUnit: Send + 'static {
    fn send(&mut self, request: Request) -> impl Future<Output = io::Result<()>> + Send;

    /// Resolves with the first signal the unit produces. Cancel safe.
    fn next_signal(&mut self) -> impl Future<Output = Signal> + Send;

    /// Stops the unit. Calling it more than once is a no-op.
    fn terminate(&mut self) -> impl Future<Output = ()> + Send;
}

pub trait Runtime: Send + Sync + 'static {
    type Program: Send + Sync + 'static;
    type Unit: ExecutionUnit;

    fn spawn(
        &self,
        id: WorkerId,
        program: &Self::Program,
        limits: &ResourceLimits,
    ) -> Result<Self::Unit, SpawnError>;
}
