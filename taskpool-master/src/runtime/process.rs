use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use futures_util::{SinkExt, StreamExt};
use taskpool_core::{
    protocol::{self, Reply, Request},
    BuildProgram, ProgramBuildError, WorkerId, STACK_SIZE_ENV, WORKER_ID_ENV,
};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::debug;

use super::{ExecutionUnit, Runtime, Signal};
use crate::{config::ResourceLimits, error::SpawnError};

/// A worker program compiled ahead of time into its own binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    path: PathBuf,
    args: Vec<String>,
}

impl Executable {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

pub struct ExecutableBuilder {
    path: PathBuf,
    args: Vec<String>,
}

impl ExecutableBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl BuildProgram for ExecutableBuilder {
    type Program = Executable;

    fn build(self) -> Result<Executable, ProgramBuildError> {
        let metadata =
            std::fs::metadata(&self.path).map_err(|error| ProgramBuildError::ExecutableNotFound {
                path: self.path.clone(),
                reason: error.to_string(),
            })?;
        if !metadata.is_file() {
            return Err(ProgramBuildError::NotAFile(self.path));
        }

        Ok(Executable {
            path: self.path,
            args: self.args,
        })
    }
}

/// Runs every worker as a child process speaking line-delimited JSON over
/// its stdin and stdout. The child's stderr is inherited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRuntime;

impl Runtime for ProcessRuntime {
    type Program = Executable;
    type Unit = ProcessUnit;

    fn spawn(
        &self,
        id: WorkerId,
        program: &Executable,
        limits: &ResourceLimits,
    ) -> Result<ProcessUnit, SpawnError> {
        let mut command = Command::new(&program.path);
        command
            .args(&program.args)
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(stack_size_mb) = limits.stack_size_mb {
            command.env(STACK_SIZE_ENV, stack_size_mb.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|source| SpawnError::Process { worker: id, source })?;
        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe {
            worker: id,
            pipe: "stdin",
        })?;
        let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe {
            worker: id,
            pipe: "stdout",
        })?;

        Ok(ProcessUnit {
            id,
            child,
            writer: FramedWrite::new(stdin, LinesCodec::new()),
            reader: FramedRead::new(stdout, LinesCodec::new()),
            exited: None,
        })
    }
}

pub struct ProcessUnit {
    id: WorkerId,
    child: Child,
    writer: FramedWrite<ChildStdin, LinesCodec>,
    reader: FramedRead<ChildStdout, LinesCodec>,
    exited: Option<String>,
}

enum Event {
    Frame(Option<Result<String, LinesCodecError>>),
    Exited(io::Result<ExitStatus>),
}

fn describe(status: io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(error) => format!("unknown exit status: {}", error),
    }
}

impl ExecutionUnit for ProcessUnit {
    async fn send(&mut self, request: Request) -> io::Result<()> {
        let line = protocol::encode(&request).map_err(io::Error::other)?;
        self.writer.send(line).await.map_err(|error| match error {
            LinesCodecError::Io(error) => error,
            other => io::Error::other(other),
        })
    }

    async fn next_signal(&mut self) -> Signal {
        if let Some(status) = &self.exited {
            return Signal::Exit(status.clone());
        }

        let event = tokio::select! {
            biased;
            frame = self.reader.next() => Event::Frame(frame),
            status = self.child.wait() => Event::Exited(status),
        };

        match event {
            Event::Frame(Some(Ok(line))) => match protocol::decode::<Reply>(&line) {
                Ok(reply) => Signal::Message(reply),
                Err(error) => Signal::Error(error.to_string()),
            },
            Event::Frame(Some(Err(error))) => Signal::Error(error.to_string()),
            Event::Frame(None) => {
                let status = describe(self.child.wait().await);
                self.exited = Some(status.clone());
                Signal::Exit(status)
            }
            Event::Exited(status) => {
                let status = describe(status);
                self.exited = Some(status.clone());
                Signal::Exit(status)
            }
        }
    }

    async fn terminate(&mut self) {
        if self.exited.is_some() {
            return;
        }
        if let Err(error) = self.child.kill().await {
            debug!("Failed to kill worker [{}] process: {}", self.id, error);
        }
        self.exited = Some("terminated".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_fails_to_build() {
        let error = ExecutableBuilder::new("/definitely/not/here")
            .build()
            .unwrap_err();
        assert!(matches!(error, ProgramBuildError::ExecutableNotFound { .. }));
    }

    #[test]
    fn test_directory_is_not_an_executable() {
        let dir = std::env::temp_dir();
        let error = ExecutableBuilder::new(&dir).build().unwrap_err();
        assert_eq!(error, ProgramBuildError::NotAFile(dir));
    }

    #[test]
    fn test_builder_keeps_arguments() {
        let current = std::env::current_exe().unwrap();
        let executable = ExecutableBuilder::new(&current)
            .arg("--serve")
            .build()
            .unwrap();
        assert_eq!(executable.path(), current.as_path());
        assert_eq!(executable.args(), ["--serve".to_string()]);
    }
}
