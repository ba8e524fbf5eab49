//! Child process ownership and the output reader thread.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};

use crate::error::{Error, Result};

/// A spawned helper program.
///
/// Dropping a helper that was not waited for sends it one termination
/// request and reaps it, so early returns never leak a running process or
/// a zombie.
#[derive(Debug)]
pub(crate) struct HelperProcess {
    program: String,
    child: Child,
    terminated: bool,
    reaped: bool,
}

impl HelperProcess {
    pub fn spawn(command: &mut Command, program: &Path) -> Result<Self> {
        let program = program.display().to_string();
        let child = command
            .spawn()
            .map_err(|e| Error::process(program.clone(), e))?;
        log::debug!("spawned {} (pid {})", program, child.id());
        Ok(Self {
            program,
            child,
            terminated: false,
            reaped: false,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Ask the process to stop. Only the first call has an effect.
    pub fn terminate(&mut self) {
        if self.terminated || self.reaped {
            return;
        }
        self.terminated = true;
        log::debug!("terminating {} (pid {})", self.program, self.child.id());
        if let Err(e) = send_sigterm(&mut self.child) {
            log::warn!("failed to terminate {}: {}", self.program, e);
        }
    }

    /// Wait for the process to exit.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self
            .child
            .wait()
            .map_err(|e| Error::process(self.program.clone(), e))?;
        self.reaped = true;
        log::debug!("{} exited with {}", self.program, status);
        Ok(status)
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        self.terminate();
        // close our pipe ends before blocking on the exit
        drop(self.child.stdin.take());
        drop(self.child.stdout.take());
        if let Err(e) = self.child.wait() {
            log::warn!("failed to reap {}: {}", self.program, e);
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(child.id()) {
        Ok(pid) => kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from),
        Err(_) => child.kill(),
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// A message from the reader thread.
#[derive(Debug)]
pub(crate) enum Chunk {
    Data(Vec<u8>),
    Eof,
    Failed(io::Error),
}

/// Read `source` on a separate thread, `chunk_size` bytes at a time.
///
/// The thread ends after sending `Eof` or `Failed`, or as soon as the
/// receiver is gone.
pub(crate) fn spawn_reader<R>(mut source: R, chunk_size: usize) -> (Receiver<Chunk>, JoinHandle<()>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(16);
    let handle = thread::spawn(move || {
        let mut buf = vec![0u8; chunk_size.max(1)];
        loop {
            let message = match source.read(&mut buf) {
                Ok(0) => Chunk::Eof,
                Ok(count) => Chunk::Data(buf[..count].to_vec()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Chunk::Failed(e),
            };
            let last = !matches!(message, Chunk::Data(_));
            if tx.send(message).is_err() || last {
                break;
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reader_delivers_all_chunks() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let (rx, handle) = spawn_reader(Cursor::new(data.clone()), 1024);
        let mut received = Vec::new();
        loop {
            match rx.recv().unwrap() {
                Chunk::Data(bytes) => {
                    assert!(bytes.len() <= 1024);
                    received.extend(bytes);
                }
                Chunk::Eof => break,
                Chunk::Failed(e) => panic!("read failed: {e}"),
            }
        }
        handle.join().unwrap();
        assert_eq!(received, data);
    }

    #[test]
    fn test_spawn_missing_program() {
        let program = Path::new("/nonexistent/psthumb-helper");
        let err = HelperProcess::spawn(&mut Command::new(program), program).unwrap_err();
        assert!(matches!(err, Error::Process { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_terminates_and_reaps() {
        use std::process::Stdio;

        let program = Path::new("sleep");
        let mut command = Command::new(program);
        command.arg("30").stdout(Stdio::piped());
        let helper = HelperProcess::spawn(&mut command, program).unwrap();
        let pid = helper.child.id();
        assert_eq!(helper.program(), "sleep");
        let started = std::time::Instant::now();
        drop(helper);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        // the pid no longer names a child of ours
        let gone = nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(pid as i32), None).is_err();
        assert!(gone);
    }
}
