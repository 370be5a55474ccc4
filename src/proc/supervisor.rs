use std::collections::VecDeque;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};

use crate::error::ExifPipeError;
use crate::proc::framer::ReplyFramer;

/// One command's raw result: the bytes the worker emitted before the
/// sentinel, plus any stderr lines attributed to the command.
#[derive(Debug)]
pub struct RawReply {
    pub output: Vec<u8>,
    pub warnings: Vec<String>,
}

impl RawReply {
    /// Splits the reply into UTF-8 text and its attributed warnings.
    pub fn into_text(self) -> Result<(String, Vec<String>), ExifPipeError> {
        Ok((String::from_utf8(self.output)?, self.warnings))
    }
}

/// Handle for a submitted command. Resolved exactly once: with the
/// worker's reply, or with [`ExifPipeError::ProcessTerminated`] if the
/// worker exits first. There is no mid-flight cancellation.
#[derive(Debug)]
pub struct PendingReply {
    rx: Receiver<Result<RawReply, ExifPipeError>>,
}

impl PendingReply {
    /// Blocks until the reply for this command is observed.
    pub fn wait(self) -> Result<RawReply, ExifPipeError> {
        match self.rx.recv() {
            Ok(result) => result,
            // Completion slot dropped without resolving: the reader
            // side is gone.
            Err(_) => Err(ExifPipeError::ProcessTerminated),
        }
    }
}

/// Bookkeeping for one in-flight command. Warnings accumulate from the
/// error stream until the reply resolves, after which the list is
/// handed off with the reply.
struct PendingCall {
    tx: Sender<Result<RawReply, ExifPipeError>>,
    warnings: Vec<String>,
}

struct Shared {
    pending: Mutex<VecDeque<PendingCall>>,
    ended: AtomicBool,
}

impl Shared {
    /// Fails every in-flight command and refuses future ones.
    fn terminate(&self) {
        self.ended.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        while let Some(call) = pending.pop_front() {
            let _ = call.tx.send(Err(ExifPipeError::ProcessTerminated));
        }
    }
}

/// Owns one worker process and turns its serial stdin/stdout streams
/// into a queue of independent request/reply pairs.
///
/// Commands are written one argument per line followed by the
/// `-execute` marker; replies are delimited by the `{ready}` sentinel.
/// The worker answers strictly in submission order and no sequence
/// numbers are exchanged, so FIFO delivery is the only correlation
/// mechanism. Callers may submit concurrently; the supervisor
/// serializes the writes.
pub struct Supervisor {
    shared: Arc<Shared>,
    stdin: Mutex<Option<Box<dyn Write + Send>>>,
    child: Mutex<Option<Child>>,
}

impl Supervisor {
    /// Launches `executable` in stay-open mode.
    pub fn spawn(executable: &Path) -> Result<Self, ExifPipeError> {
        let mut child = Command::new(executable)
            .arg("-stay_open")
            .arg("True")
            .arg("-@")
            .arg("-") // read command args from stdin
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExifPipeError::ExecutableNotFound)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

        let supervisor = Self::from_streams(BufWriter::new(stdin), stdout, stderr);
        *supervisor.child.lock().expect("child lock poisoned") = Some(child);
        debug!("spawned worker: {}", executable.display());
        Ok(supervisor)
    }

    /// Builds a supervisor over arbitrary streams. Tests drive this
    /// with scripted in-memory pipes instead of a live worker.
    pub(crate) fn from_streams(
        stdin: impl Write + Send + 'static,
        stdout: impl Read + Send + 'static,
        stderr: impl Read + Send + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            ended: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        thread::spawn(move || read_replies(stdout, reader_shared));

        let stderr_shared = Arc::clone(&shared);
        thread::spawn(move || read_diagnostics(stderr, stderr_shared));

        Self {
            shared,
            stdin: Mutex::new(Some(Box::new(stdin))),
            child: Mutex::new(None),
        }
    }

    /// Submits one command. The returned handle resolves with the raw
    /// text the worker emits for it, in strict submission order.
    ///
    /// The stdin lock is held across enqueue and write so that queue
    /// order and wire order cannot diverge between concurrent callers;
    /// FIFO is the protocol's only reply-correlation mechanism.
    pub fn call<S: AsRef<str>>(&self, args: &[S]) -> Result<PendingReply, ExifPipeError> {
        let (tx, rx) = mpsc::channel();

        let mut stdin_guard = self.stdin.lock().expect("stdin lock poisoned");
        let stdin = stdin_guard
            .as_mut()
            .ok_or(ExifPipeError::SupervisorClosed)?;

        // Enqueue before writing: the reply may arrive on the reader
        // thread before this thread regains control. Termination holds
        // the same queue lock, so a call enqueued here is guaranteed to
        // be failed by it rather than stranded.
        {
            let mut pending = self.shared.pending.lock().expect("pending queue poisoned");
            if self.shared.ended.load(Ordering::SeqCst) {
                return Err(ExifPipeError::SupervisorClosed);
            }
            pending.push_back(PendingCall {
                tx,
                warnings: Vec::new(),
            });
        }

        let write_result = (|| -> Result<(), ExifPipeError> {
            for arg in args {
                writeln!(stdin, "{}", arg.as_ref())?;
            }
            writeln!(stdin, "-execute")?;
            stdin.flush()?;
            Ok(())
        })();

        if let Err(err) = write_result {
            // A partly-written command clogs the wire for every later
            // call; the only safe state is dead.
            self.shared.terminate();
            return Err(err);
        }

        Ok(PendingReply { rx })
    }

    /// Writes the stop directive and closes the worker's input stream.
    /// Does not kill the process; that policy belongs to whoever owns
    /// the supervisor's lifecycle.
    pub fn close(&self) -> Result<(), ExifPipeError> {
        let mut guard = self.stdin.lock().expect("stdin lock poisoned");
        if let Some(stdin) = guard.as_mut() {
            writeln!(stdin, "-stay_open")?;
            writeln!(stdin, "False")?;
            writeln!(stdin, "-execute")?;
            stdin.flush()?;
        }
        // Dropping the handle closes the pipe.
        *guard = None;
        Ok(())
    }

    /// Whether the worker has exited. A supervisor in this state
    /// accepts no further calls and should be replaced.
    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    /// Force-terminates the child process, if one is attached.
    pub(crate) fn kill(&self) {
        if let Some(mut child) = self.child.lock().expect("child lock poisoned").take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Stdout pump: feed the framer, complete the oldest pending call per
/// frame, fail everything on EOF.
fn read_replies(mut stdout: impl Read, shared: Arc<Shared>) {
    let mut framer = ReplyFramer::new();
    let mut chunk = [0u8; 4096];
    loop {
        let bytes_read = match stdout.read(&mut chunk) {
            Ok(0) | Err(_) => {
                debug!("worker output stream closed");
                shared.terminate();
                return;
            }
            Ok(n) => n,
        };

        for output in framer.push(&chunk[..bytes_read]) {
            let call = {
                let mut pending = shared.pending.lock().expect("pending queue poisoned");
                pending.pop_front()
            };
            match call {
                Some(call) => {
                    let _ = call.tx.send(Ok(RawReply {
                        output,
                        warnings: call.warnings,
                    }));
                }
                // A reply with no pending call means the queue
                // desynchronized; nothing sane can be done with it.
                None => warn!("worker reply with no pending call ({} bytes)", output.len()),
            }
        }
    }
}

/// Stderr pump: attribute diagnostics to the oldest pending call, or
/// surface them to the operator when none is in flight.
fn read_diagnostics(stderr: impl Read, shared: Arc<Shared>) {
    let reader = BufReader::new(stderr);
    for line in reader.lines().map_while(Result::ok) {
        let mut pending = shared.pending.lock().expect("pending queue poisoned");
        match pending.front_mut() {
            Some(call) => call.warnings.push(line),
            None => warn!("exiftool: {line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::test_stream::{ChannelReader, ChannelWriter};
    use assert_matches::assert_matches;
    use std::time::Duration;

    struct Fixture {
        supervisor: Supervisor,
        commands: Receiver<Vec<u8>>,
        stdout_tx: Sender<Vec<u8>>,
        stderr_tx: Sender<Vec<u8>>,
    }

    fn fixture() -> Fixture {
        let (command_tx, commands) = mpsc::channel();
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        let supervisor = Supervisor::from_streams(
            ChannelWriter::new(command_tx),
            ChannelReader::new(stdout_rx),
            ChannelReader::new(stderr_rx),
        );
        Fixture {
            supervisor,
            commands,
            stdout_tx,
            stderr_tx,
        }
    }

    #[test]
    fn call_writes_args_and_execute_marker() {
        let fx = fixture();
        let reply = fx.supervisor.call(&["-json", "-fast", "a.jpg"]).unwrap();

        let written = fx.commands.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "-json\n-fast\na.jpg\n-execute\n"
        );

        fx.stdout_tx.send(b"[{}]\n{ready}\n".to_vec()).unwrap();
        let raw = reply.wait().unwrap();
        assert_eq!(raw.output, b"[{}]\n");
        assert!(raw.warnings.is_empty());
    }

    #[test]
    fn replies_resolve_in_submission_order() {
        let fx = fixture();
        let first = fx.supervisor.call(&["one"]).unwrap();
        let second = fx.supervisor.call(&["two"]).unwrap();

        fx.stdout_tx
            .send(b"reply-1\n{ready}\nreply-2\n{ready}\n".to_vec())
            .unwrap();

        assert_eq!(first.wait().unwrap().output, b"reply-1\n");
        assert_eq!(second.wait().unwrap().output, b"reply-2\n");
    }

    #[test]
    fn stderr_attaches_to_oldest_pending_call() {
        let fx = fixture();
        let reply = fx.supervisor.call(&["a.jpg"]).unwrap();

        fx.stderr_tx
            .send(b"Warning: Bad IFD0 directory\n".to_vec())
            .unwrap();
        // Give the stderr pump a moment before completing the reply.
        std::thread::sleep(Duration::from_millis(50));
        fx.stdout_tx.send(b"ok\n{ready}\n".to_vec()).unwrap();

        let raw = reply.wait().unwrap();
        assert_eq!(raw.warnings, vec!["Warning: Bad IFD0 directory"]);
    }

    #[test]
    fn worker_exit_fails_all_pending_and_future_calls() {
        let fx = fixture();
        let first = fx.supervisor.call(&["one"]).unwrap();
        let second = fx.supervisor.call(&["two"]).unwrap();

        drop(fx.stdout_tx); // EOF on the worker's output

        assert_matches!(first.wait(), Err(ExifPipeError::ProcessTerminated));
        assert_matches!(second.wait(), Err(ExifPipeError::ProcessTerminated));

        // The supervisor is poisoned; wait for the flag then re-submit.
        for _ in 0..100 {
            if fx.supervisor.is_ended() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_matches!(
            fx.supervisor.call(&["three"]),
            Err(ExifPipeError::SupervisorClosed)
        );
    }

    #[test]
    fn incomplete_frame_never_resolves() {
        let fx = fixture();
        let reply = fx.supervisor.call(&["a.jpg"]).unwrap();

        fx.stdout_tx.send(b"partial output without".to_vec()).unwrap();
        assert!(reply
            .rx
            .recv_timeout(Duration::from_millis(100))
            .is_err());

        fx.stdout_tx.send(b" sentinel\n{ready}\n".to_vec()).unwrap();
        let raw = reply.wait().unwrap();
        assert_eq!(raw.output, b"partial output without sentinel\n");
    }

    #[test]
    fn close_writes_stop_directive_and_drops_stdin() {
        let fx = fixture();
        fx.supervisor.close().unwrap();

        let written = fx.commands.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "-stay_open\nFalse\n-execute\n"
        );
        // Writer handle dropped: the channel-backed stream disconnects.
        assert!(fx.commands.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
