//! Management console connection.
//!
//! Commands are newline-terminated text. A response has no terminator, so it
//! is read until the connection stays idle for a short while.

use log::debug;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
pub struct Console {
    stream: UnixStream,
    path: PathBuf,
    idle_timeout: Duration,
}

impl Console {
    /// Connect to the console socket at `path`, making up to `attempts` tries.
    ///
    /// The socket appears some time after the process is spawned, so a
    /// missing path or a refused connection is retried after `interval`.
    pub fn connect_with_retries(
        path: &Path,
        attempts: u32,
        interval: Duration,
        idle_timeout: Duration,
    ) -> io::Result<Self> {
        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("console {} not found", path.display()),
        );

        for attempt in 1..=attempts.max(1) {
            if path.exists() {
                match UnixStream::connect(path) {
                    Ok(stream) => {
                        debug!("Console {:?} connected after {} attempt(s)", path, attempt);
                        return Ok(Self {
                            stream,
                            path: path.to_path_buf(),
                            idle_timeout,
                        });
                    }
                    Err(e) => last_err = e,
                }
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        Err(last_err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn send(&mut self, command: &str) -> io::Result<()> {
        debug!("sending '{}' to {:?}", command.trim_end(), self.path);
        self.stream.write_all(command.as_bytes())?;
        self.stream.flush()
    }

    /// Read until the connection has been idle for the idle timeout
    pub fn recv(&mut self) -> io::Result<String> {
        self.stream.set_read_timeout(Some(self.idle_timeout))?;
        let mut res = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => res.extend_from_slice(&buf[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => return Err(e),
            }
        }
        Ok(String::from_utf8_lossy(&res).into_owned())
    }

    /// Send a command and collect its response
    pub fn exchange(&mut self, command: &str) -> io::Result<String> {
        self.send(command)?;
        self.recv()
    }
}
