//! PTY relay between the user's terminal and the worker process.
//!
//! The worker runs under a pseudo-terminal so its TUI (colors, spinners,
//! redraws) survives intact. Bytes are mirrored to the real stdout verbatim
//! and simultaneously copied to the session for chunking; user keystrokes are
//! forwarded to the worker untouched.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::supervisor::WorkerControl;

/// Quiet time on the output stream before the worker counts as idle.
pub const IDLE_AFTER: Duration = Duration::from_secs(3);

/// What the bridge reports to the session loop.
#[derive(Debug)]
pub enum BridgeEvent {
    /// Raw worker output, already mirrored to the user's terminal.
    Output(Vec<u8>),
    /// No output for [`IDLE_AFTER`]; emitted once per quiet period.
    Idle,
    /// The worker exited and its final output has already been delivered.
    /// Terminal state is restored.
    Exit { code: i32 },
}

/// Shared handle to the PTY input side.
#[derive(Clone)]
pub struct BridgeController {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl BridgeController {
    fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("pty writer poisoned"))?;
        writer.write_all(bytes).context("write to worker pty")?;
        writer.flush().context("flush worker pty")?;
        Ok(())
    }
}

impl WorkerControl for BridgeController {
    /// Type the message into the worker and press enter.
    fn inject(&mut self, message: &str) -> Result<()> {
        let mut bytes = message.as_bytes().to_vec();
        bytes.push(b'\r');
        self.write_bytes(&bytes)
    }

    /// Escape cancels the worker's in-flight generation without killing it.
    fn send_cancel_key(&mut self) -> Result<()> {
        self.write_bytes(&[0x1b])
    }
}

pub struct TerminalBridge {
    controller: BridgeController,
    killer: Box<dyn portable_pty::ChildKiller + Send + Sync>,
    child_pid: Option<u32>,
    idle_rx: watch::Receiver<bool>,
    raw_mode: bool,
    // Dropping this ends the resize task, which owns the master pty.
    _resize_stop: oneshot::Sender<()>,
}

impl TerminalBridge {
    /// Spawn the worker under a fresh PTY and start the relay.
    pub fn start(
        command: &str,
        args: &[String],
    ) -> Result<(Self, mpsc::UnboundedReceiver<BridgeEvent>)> {
        let size = terminal_size();
        let pair = native_pty_system()
            .openpty(size)
            .context("open pseudo-terminal")?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("spawn worker {command}"))?;
        drop(pair.slave);

        let killer = child.clone_killer();
        let child_pid = child.process_id();

        let writer = pair.master.take_writer().context("take pty writer")?;
        let writer = Arc::new(Mutex::new(writer));
        let reader = pair.master.try_clone_reader().context("clone pty reader")?;

        let raw_mode = crossterm::tty::IsTty::is_tty(&std::io::stdin());
        if raw_mode {
            crossterm::terminal::enable_raw_mode().context("enable raw mode")?;
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (idle_tx, idle_rx) = watch::channel(false);

        let (exit_tx, exit_rx) = oneshot::channel();
        spawn_reader_thread(reader, raw_tx);
        spawn_stdin_thread(Arc::clone(&writer));
        tokio::spawn(pump(raw_rx, event_tx, idle_tx, exit_rx));

        let (resize_stop, resize_stopped) = oneshot::channel();
        tokio::spawn(resize_task(pair.master, resize_stopped));

        // Reap the child off the runtime and restore the terminal. The exit
        // code goes through the pump so it cannot overtake output still in
        // flight from the reader thread.
        tokio::task::spawn_blocking(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(err) => {
                    warn!(error = %err, "wait for worker failed");
                    1
                }
            };
            if raw_mode {
                let _ = crossterm::terminal::disable_raw_mode();
            }
            let _ = exit_tx.send(code);
        });

        Ok((
            Self {
                controller: BridgeController { writer },
                killer,
                child_pid,
                idle_rx,
                raw_mode,
                _resize_stop: resize_stop,
            },
            event_rx,
        ))
    }

    pub fn controller(&self) -> BridgeController {
        self.controller.clone()
    }

    /// Watch channel holding `true` while the output stream is quiet.
    pub fn idle_watch(&self) -> watch::Receiver<bool> {
        self.idle_rx.clone()
    }

    /// Terminate the worker: SIGTERM to its pid, falling back to the PTY
    /// killer when no pid is known.
    pub fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child_pid {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                return;
            }
        }
        if let Err(err) = self.killer.kill() {
            warn!(error = %err, "failed to kill worker");
        }
    }
}

impl Drop for TerminalBridge {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

fn terminal_size() -> PtySize {
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Blocking PTY read loop: mirror to stdout, copy to the pump.
fn spawn_reader_thread(mut reader: Box<dyn Read + Send>, raw_tx: mpsc::UnboundedSender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(&buf[..n]);
                    let _ = stdout.flush();
                    if raw_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Blocking stdin loop: forward keystrokes to the worker unmodified.
fn spawn_stdin_thread(writer: Arc<Mutex<Box<dyn Write + Send>>>) {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let Ok(mut writer) = writer.lock() else { break };
                    if writer.write_all(&buf[..n]).is_err() || writer.flush().is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Owns the idle timer: output rearms it, expiry flips the watch and emits
/// one `Idle` event per quiet period.
///
/// `Exit` is emitted only after the reader thread hits EOF and every pending
/// `Output` has been forwarded, so the worker's final burst is never lost.
async fn pump(
    mut raw_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: mpsc::UnboundedSender<BridgeEvent>,
    idle_tx: watch::Sender<bool>,
    exit_rx: oneshot::Receiver<i32>,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            chunk = raw_rx.recv() => {
                let Some(bytes) = chunk else { break };
                let _ = idle_tx.send(false);
                deadline = Some(Instant::now() + IDLE_AFTER);
                if event_tx.send(BridgeEvent::Output(bytes)).is_err() {
                    return;
                }
            }
            () = maybe_sleep(deadline) => {
                deadline = None;
                let _ = idle_tx.send(true);
                if event_tx.send(BridgeEvent::Idle).is_err() {
                    return;
                }
            }
        }
    }
    let code = exit_rx.await.unwrap_or(1);
    let _ = event_tx.send(BridgeEvent::Exit { code });
}

/// Sleeps until `deadline`, or forever when there is none.
pub(crate) async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}


/// Keeps the master pty alive and mirrors terminal resizes into it.
async fn resize_task(master: Box<dyn MasterPty + Send>, mut stop: oneshot::Receiver<()>) {
    #[cfg(unix)]
    {
        let Ok(mut winch) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
        else {
            let _ = (&mut stop).await;
            return;
        };
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = winch.recv() => {
                    let size = terminal_size();
                    if let Err(err) = master.resize(size) {
                        debug!(error = %err, "pty resize failed");
                    }
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = master;
        let _ = stop.await;
    }
}
