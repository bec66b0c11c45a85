//! Child process supervision shared by the synthesizer and the player.
//!
//! Both external engines are plain executables. A supervised child is polled until it
//! exits, and killed through its own handle as soon as the caller asks it to stop.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ExitStatus};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

/// How often a running child is checked for exit or a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a supervised child ended.
#[derive(Debug)]
pub enum ChildExit {
    /// The child exited on its own. `stderr` holds its trimmed diagnostic output.
    Exited { status: ExitStatus, stderr: String },
    /// The child was killed after a stop request.
    Killed,
}

/// Wait for `child` to finish, killing it once `should_stop` returns true.
///
/// Stderr (if piped) is drained on a helper thread so a chatty child cannot block on a
/// full pipe.
///
/// # Errors
/// Returns an error if the child's status cannot be queried.
pub fn supervise(mut child: Child, should_stop: impl Fn() -> bool) -> io::Result<ChildExit> {
    let stderr_reader = child.stderr.take().map(drain_stderr);

    let status = loop {
        if should_stop() {
            if let Err(e) = child.kill() {
                // Already exited between polls
                debug!("Kill of pid {} failed: {}", child.id(), e);
            }
            child.wait()?;
            break None;
        }

        if let Some(status) = child.try_wait()? {
            break Some(status);
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    match status {
        Some(status) => {
            let stderr = stderr_reader.and_then(|handle| handle.join().ok()).unwrap_or_default();
            Ok(ChildExit::Exited { status, stderr: stderr.trim().to_string() })
        }
        // Grandchildren may still hold the pipe open, so the reader is left detached
        None => Ok(ChildExit::Killed),
    }
}

/// Write `input` to a child's stdin on a helper thread, closing it afterwards.
///
/// The caller supervises the child meanwhile, so a child that stops reading cannot block
/// cancellation.
pub fn feed_stdin(mut stdin: ChildStdin, input: Vec<u8>) -> JoinHandle<io::Result<()>> {
    std::thread::spawn(move || stdin.write_all(&input))
}

fn drain_stderr(mut pipe: std::process::ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Err(e) = pipe.read_to_string(&mut buf) {
            debug!("Failed to read child stderr: {}", e);
        }
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::{Command, Stdio};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_exit_status_and_stderr_are_reported() {
        let child = Command::new("sh").args(["-c", "echo '  boom  ' >&2; exit 3"]).stderr(Stdio::piped()).spawn().unwrap();

        match supervise(child, || false).unwrap() {
            ChildExit::Exited { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            ChildExit::Killed => panic!("child should have exited on its own"),
        }
    }

    #[test]
    fn test_stdin_is_fed_and_closed() {
        let mut child = Command::new("sh")
            .args(["-c", "wc -c >&2"])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let writer = feed_stdin(child.stdin.take().unwrap(), vec![b'x'; 100_000]);

        let exit = supervise(child, || false).unwrap();
        writer.join().unwrap().unwrap();

        match exit {
            ChildExit::Exited { status, stderr } => {
                assert!(status.success());
                assert_eq!(stderr, "100000");
            }
            ChildExit::Killed => panic!("child should have exited on its own"),
        }
    }

    #[test]
    fn test_stop_request_kills_child() {
        let child = Command::new("sleep").arg("10").spawn().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let stopper = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::SeqCst);
            })
        };

        let started = Instant::now();
        let exit = supervise(child, || stop.load(Ordering::SeqCst)).unwrap();
        stopper.join().unwrap();

        assert!(matches!(exit, ChildExit::Killed));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
