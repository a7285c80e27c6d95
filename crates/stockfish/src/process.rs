//! Engine subprocess supervision.
//!
//! [`EngineProcess`] owns a spawned engine and exposes its pipes as a
//! [`LineChannel`]: whole lines in, whole lines out. A background thread
//! forwards stdout lines into a channel so reads can be bounded by a timeout.
//!
//! The forwarding thread is never joined. It ends when stdout reaches EOF or
//! the process handle is gone, whichever comes last; a grandchild that
//! inherited stdout may keep it alive, but never holds up [`LineChannel::close`].

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Result, StockfishError};

/// A line-oriented duplex connection to an engine.
pub trait LineChannel {
    /// Send one command line. The newline is appended.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Wait up to `timeout` for the next output line, without its newline.
    ///
    /// # Errors
    ///
    /// - [`StockfishError::Timeout`] if no line arrived in time
    /// - [`StockfishError::Eof`] if the engine closed its output
    /// - [`StockfishError::Closed`] if the channel was closed locally
    fn read_line(&mut self, timeout: Duration) -> Result<String>;

    /// Shut the connection down. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Terminates an engine process from outside the session that owns it.
///
/// Killing the process closes its stdout, which wakes a read blocked in
/// [`EngineProcess::read_line`] with [`StockfishError::Eof`].
#[derive(Clone)]
pub struct KillSwitch {
    child: Arc<Mutex<Child>>,
}

impl KillSwitch {
    /// Kill the process. Failures, such as the process having already
    /// exited, are logged and otherwise ignored.
    pub fn kill(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = child.kill() {
            tracing::debug!("Kill of engine process {} failed: {}", child.id(), e);
        }
    }
}

/// A running engine subprocess.
pub struct EngineProcess {
    /// Path the engine was launched from.
    path: PathBuf,
    /// The child process handle, shared with any [`KillSwitch`].
    child: Arc<Mutex<Child>>,
    /// Engine stdin; `None` once closed.
    stdin: Option<ChildStdin>,
    /// Lines forwarded from engine stdout.
    lines: Receiver<std::io::Result<String>>,
    closed: bool,
}

impl EngineProcess {
    /// Spawn the engine at `path` with `args`, piping stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns [`StockfishError::Launch`] if the process cannot be started
    /// or its pipes cannot be set up.
    pub fn spawn(path: impl AsRef<Path>, args: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let launch_err = |source| StockfishError::Launch {
            path: path.clone(),
            source,
        };

        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(launch_err)?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let (stdin, stdout) = match pipes {
            Some(pipes) => pipes,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(launch_err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "engine pipes unavailable",
                )));
            }
        };

        let (tx, lines) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name("stockfish-stdout".to_string())
            .spawn(move || forward_lines(stdout, tx));
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_err(e));
        }

        tracing::info!("Started engine {} (pid {})", path.display(), child.id());

        Ok(Self {
            path,
            child: Arc::new(Mutex::new(child)),
            stdin: Some(stdin),
            lines,
            closed: false,
        })
    }

    /// Path the engine was launched from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// OS process id of the engine.
    pub fn id(&self) -> u32 {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id()
    }

    /// A handle that can kill this process from another thread.
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            child: Arc::clone(&self.child),
        }
    }
}

impl LineChannel for EngineProcess {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = match (&mut self.stdin, self.closed) {
            (Some(stdin), false) => stdin,
            _ => return Err(StockfishError::Closed),
        };
        tracing::debug!("> {}", line);
        writeln!(stdin, "{}", line).map_err(StockfishError::Write)?;
        stdin.flush().map_err(StockfishError::Write)?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        if self.closed {
            return Err(StockfishError::Closed);
        }
        let line = receive(&self.lines, timeout)?;
        tracing::debug!("< {}", line);
        Ok(line)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.stdin.take());

        {
            let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
            let pid = child.id();
            if let Err(e) = child.kill() {
                tracing::debug!("Kill of engine process {} failed: {}", pid, e);
            }
            match child.wait() {
                Ok(status) => tracing::info!("Engine process {} exited: {}", pid, status),
                Err(e) => tracing::warn!("Failed to reap engine process {}: {}", pid, e),
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Wait up to `timeout` for the next forwarded line.
fn receive(lines: &Receiver<std::io::Result<String>>, timeout: Duration) -> Result<String> {
    match lines.recv_timeout(timeout) {
        Ok(Ok(line)) => Ok(line),
        Ok(Err(e)) => Err(StockfishError::Read(e)),
        Err(RecvTimeoutError::Timeout) => Err(StockfishError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(StockfishError::Eof),
    }
}

/// Forward stdout lines until EOF, a read error, or the receiver going away.
fn forward_lines(stdout: impl Read, tx: Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim().to_string();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_nonexistent_executable_returns_error() {
        match EngineProcess::spawn("/nonexistent/path/to/stockfish", &[]) {
            Err(StockfishError::Launch { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/path/to/stockfish"));
            }
            Err(other) => panic!("Expected Launch error, got {:?}", other),
            Ok(_) => panic!("Expected Launch error"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_lines_round_trip_through_cat() {
        let mut process = EngineProcess::spawn("cat", &[]).unwrap();
        process.write_line("isready").unwrap();
        process.write_line("  go depth 3  ").unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(process.read_line(timeout).unwrap(), "isready");
        assert_eq!(process.read_line(timeout).unwrap(), "go depth 3");
        process.close().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_read_times_out() {
        let mut process = EngineProcess::spawn("cat", &[]).unwrap();
        let err = process.read_line(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, StockfishError::Timeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_process_reports_eof() {
        let mut process = EngineProcess::spawn("true", &[]).unwrap();
        let err = process.read_line(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, StockfishError::Eof));
    }

    #[cfg(unix)]
    #[test]
    fn test_operations_after_close_fail() {
        let mut process = EngineProcess::spawn("cat", &[]).unwrap();
        process.close().unwrap();
        process.close().unwrap();

        assert!(process.is_closed());
        assert!(matches!(
            process.write_line("uci"),
            Err(StockfishError::Closed)
        ));
        assert!(matches!(
            process.read_line(Duration::from_millis(10)),
            Err(StockfishError::Closed)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_switch_unblocks_pending_read() {
        let mut process = EngineProcess::spawn("cat", &[]).unwrap();
        let switch = process.kill_switch();

        let reader = std::thread::spawn(move || process.read_line(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(50));
        switch.kill();

        let result = reader.join().unwrap();
        assert!(matches!(result, Err(StockfishError::Eof)));
    }

    /// Yields `data`, then fails.
    struct FailingReader {
        data: std::io::Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "pipe reset",
                )),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_read_error_is_reported_after_pending_lines() {
        let (tx, rx) = mpsc::channel();
        let stdout = FailingReader {
            data: std::io::Cursor::new(b"readyok\r\n".to_vec()),
        };
        forward_lines(stdout, tx);

        let timeout = Duration::from_secs(1);
        assert_eq!(receive(&rx, timeout).unwrap(), "readyok");
        match receive(&rx, timeout) {
            Err(StockfishError::Read(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset)
            }
            other => panic!("Expected Read error, got {:?}", other),
        }
        assert!(matches!(receive(&rx, timeout), Err(StockfishError::Eof)));
    }

    #[cfg(unix)]
    #[test]
    fn test_close_does_not_wait_for_inherited_stdout() {
        // The backgrounded sleep keeps the stdout pipe open after the shell dies.
        let args = ["-c".to_string(), "sleep 30 & exec cat".to_string()];
        let mut process = EngineProcess::spawn("sh", &args).unwrap();
        process.write_line("uci").unwrap();
        assert_eq!(process.read_line(Duration::from_secs(5)).unwrap(), "uci");

        let started = std::time::Instant::now();
        process.close().unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "close took {:?}",
            started.elapsed()
        );
    }
}
