//! command_executor.rs - Streams the output of external shell commands.
//!
//! A [`CommandStream`] owns one child `bash -c` process. Iterating it blocks
//! until the child prints a line, closes its stdout, or dies. Lines come out
//! trimmed and in the order the child wrote them. Once stdout is exhausted
//! the child is reaped and a non-zero exit status becomes a final
//! `ExternalCommand` error item.
//!
//! The stdout handle lives in an `Option` and is taken exactly once, so it is
//! closed once whether the caller drains the stream, hits an error, or drops
//! it half way. Dropping an unfinished stream terminates and reaps the child.

use crate::error::{Result, StageError};
use crate::process_guard::{self, CommandProcessGroup};
use std::io::{BufRead, BufReader};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long an abandoned child gets between SIGTERM and SIGKILL
const ABANDON_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Lazy, single-pass view of a running command's stdout
#[derive(Debug)]
pub struct CommandStream {
    command: String,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    status: Option<ExitStatus>,
}

impl CommandStream {
    /// Start `command` under `bash -c`.
    ///
    /// stdout is piped for streaming, stderr goes straight to ours.
    pub fn spawn(command: &str) -> Result<Self> {
        info!("Executing: {}", command);

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .in_new_process_group()
            .spawn()?;
        process_guard::track(child.id());

        let stdout = child.stdout.take().map(BufReader::new);
        Ok(Self {
            command: command.to_string(),
            child,
            stdout,
            status: None,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit code once the child has been reaped.
    ///
    /// Signal deaths report `128 + signal`, like a shell does.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.map(exit_code)
    }

    /// Drain whatever output is left and check the exit status.
    ///
    /// Lets a caller learn whether the command succeeded without consuming
    /// the lines itself.
    pub fn finish(mut self) -> Result<()> {
        while let Some(line) = self.next() {
            let line = line?;
            debug!("[{}] {}", self.command, line);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Option<std::io::Result<String>> {
        let reader = self.stdout.as_mut()?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => Some(Ok(String::from_utf8_lossy(&buf).trim().to_string())),
            Err(e) => Some(Err(e)),
        }
    }

    /// Close stdout and wait for the child
    fn reap(&mut self) -> Result<ExitStatus> {
        drop(self.stdout.take());
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        process_guard::untrack(self.child.id());
        self.status = Some(status);
        debug!("Command `{}` exited with {}", self.command, exit_code(status));
        Ok(status)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

impl Iterator for CommandStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        // stdout is gone once the stream has ended
        self.stdout.as_ref()?;

        match self.read_line() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(e)) => {
                if let Err(wait_err) = self.reap() {
                    warn!("Failed to reap `{}` after read error: {}", self.command, wait_err);
                }
                Some(Err(e.into()))
            }
            None => match self.reap() {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(StageError::ExternalCommand {
                    command: self.command.clone(),
                    exit_code: exit_code(status),
                })),
                Err(e) => Some(Err(e)),
            },
        }
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        drop(self.stdout.take());
        let pgid = self.child.id();
        if let Ok(None) = self.child.try_wait() {
            warn!("Command `{}` abandoned before completion, terminating", self.command);
            process_guard::terminate_group(pgid);

            let deadline = Instant::now() + ABANDON_GRACE_PERIOD;
            while let Ok(None) = self.child.try_wait() {
                if Instant::now() >= deadline {
                    warn!("Command `{}` ignored SIGTERM, sending SIGKILL", self.command);
                    process_guard::kill_group(pgid);
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap abandoned command `{}`: {}", self.command, e);
        }
        process_guard::untrack(self.child.id());
    }
}

/// Start `command` and return its line stream
pub fn stream_command(command: &str) -> Result<CommandStream> {
    CommandStream::spawn(command)
}

/// Run `command`, passing each output line to `echo`.
///
/// Returns the first error: a read failure or a non-zero exit.
pub fn run_command<F>(command: &str, mut echo: F) -> Result<()>
where
    F: FnMut(&str),
{
    for line in stream_command(command)? {
        echo(&line?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_in_order_and_trimmed() {
        let lines: Vec<String> = stream_command("printf '  one \\ntwo\\n\\nthree'")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }

    #[test]
    fn test_exit_code_recorded() {
        let mut stream = stream_command("echo hi; exit 3").unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "hi");
        assert!(stream.exit_code().is_none());
        match stream.next() {
            Some(Err(StageError::ExternalCommand { exit_code, .. })) => assert_eq!(exit_code, 3),
            other => panic!("unexpected item: {:?}", other),
        }
        assert_eq!(stream.exit_code(), Some(3));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_finish_without_consuming() {
        assert!(stream_command("seq 1 1000").unwrap().finish().is_ok());
        let err = stream_command("echo partial; exit 2").unwrap().finish().unwrap_err();
        assert!(matches!(err, StageError::ExternalCommand { exit_code: 2, .. }));
    }

    #[test]
    fn test_signal_exit_code() {
        let err = stream_command("kill -TERM $$").unwrap().finish().unwrap_err();
        match err {
            StageError::ExternalCommand { exit_code, .. } => assert_eq!(exit_code, 128 + 15),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_command_echoes() {
        let mut seen = Vec::new();
        run_command("echo a; echo b", |line| seen.push(line.to_string())).unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_stderr_not_captured() {
        let lines: Vec<String> = stream_command("echo out; echo err >&2")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["out"]);
    }

    #[test]
    fn test_drop_kills_child_ignoring_sigterm() {
        let start = std::time::Instant::now();
        let mut stream = stream_command("trap '' TERM; echo ready; sleep 30; echo late").unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "ready");
        drop(stream);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
