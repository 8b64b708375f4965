//! # Process (Subprocess Spawn)
//!
//! Wraps `tokio::process::Command` with piped stdio so a child's
//! stdout/stderr read like ordinary stream-core handles — grounded in
//! `original_source/tjs/src/process.c`.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::error::TransportError;

/// A spawned child process with piped stdio.
pub struct ChildProcess {
    child: Child,
}

/// The result of a completed child process, as far as the host surface
/// reports it.
pub struct ExitStatus {
    /// Process exit code, when the child exited normally.
    pub code: Option<i32>,
}

impl ChildProcess {
    /// Spawns `program` with `args`, piping stdin/stdout/stderr.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, TransportError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::from_io(&e))?;
        Ok(Self { child })
    }

    /// Writes to the child's stdin.
    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::from_io(&std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin not piped",
            )))?;
        stdin.write_all(data).await.map_err(|e| TransportError::from_io(&e))
    }

    /// Reads whatever is currently buffered on the child's stdout, up to
    /// 64 KiB, matching the stream core's default read chunk size.
    pub async fn read_stdout(&mut self) -> Result<Vec<u8>, TransportError> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| TransportError::from_io(&std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdout not piped",
            )))?;
        let mut buf = vec![0u8; 64 * 1024];
        let n = stdout.read(&mut buf).await.map_err(|e| TransportError::from_io(&e))?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Waits for the child to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, TransportError> {
        let status = self.child.wait().await.map_err(|e| TransportError::from_io(&e))?;
        Ok(ExitStatus { code: status.code() })
    }

    /// Sends a kill signal to the child.
    pub async fn kill(&mut self) -> Result<(), TransportError> {
        self.child.kill().await.map_err(|e| TransportError::from_io(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_child_reports_exit_code_zero() {
        let mut child = ChildProcess::spawn("true", &[]).unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code, Some(0));
    }

    #[tokio::test]
    async fn stdout_of_cat_echoes_written_stdin() {
        let mut child = ChildProcess::spawn("cat", &[]).unwrap();
        child.write_stdin(b"hi").await.unwrap();
        drop(child.child.stdin.take());
        let out = child.read_stdout().await.unwrap();
        assert_eq!(out, b"hi");
        child.wait().await.unwrap();
    }
}
