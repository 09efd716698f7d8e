use anyhow::{Context, Result};
use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use shellpilot_core::error::PilotError;
use shellpilot_core::session::{ChannelEvent, ShellChannel};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;

/// Local bash running in a pseudo-terminal.
pub struct PtyChannel {
    id: String,
    writer: Mutex<Box<dyn Write + Send>>,
    _master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    alive: Arc<AtomicBool>,
    tx: broadcast::Sender<ChannelEvent>,
    startup: Mutex<Option<broadcast::Receiver<ChannelEvent>>>,
}

impl PtyChannel {
    pub fn spawn(id: &str, cwd: Option<std::path::PathBuf>) -> Result<Arc<Self>> {
        shellpilot_core::debug_log!("PtyChannel::spawn: initializing PTY with cwd: {:?}", cwd);
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 40,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new("bash");
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }
        cmd.env("HISTFILE", "/dev/null");
        cmd.env("TERM", "xterm-256color");
        cmd.env("PS1", "\\u@\\h:\\w$ ");
        cmd.arg("--norc");
        cmd.arg("--noprofile");

        let child = pair.slave.spawn_command(cmd).context("Failed to spawn shell")?;

        let (tx, startup) = broadcast::channel(1024);
        let alive = Arc::new(AtomicBool::new(true));

        // Blocking reads stay off the runtime
        let mut reader = pair.master.try_clone_reader().context("Failed to clone PTY reader")?;
        let reader_tx = tx.clone();
        let reader_alive = alive.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match std::io::Read::read(&mut reader, &mut buffer) {
                    Ok(0) => {
                        shellpilot_core::debug_log!("PTY reader: EOF reached");
                        break;
                    }
                    Ok(n) => {
                        // No subscribers is fine; output between commands is dropped
                        let _ = reader_tx.send(ChannelEvent::Data(buffer[..n].to_vec()));
                    }
                    Err(e) => {
                        shellpilot_core::error_log!("PTY reader error: {}", e);
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            let _ = reader_tx.send(ChannelEvent::Closed);
        });

        let writer = pair.master.take_writer().context("Failed to take PTY writer")?;
        Ok(Arc::new(Self {
            id: id.to_string(),
            writer: Mutex::new(writer),
            _master: Mutex::new(pair.master),
            child: Mutex::new(child),
            alive,
            tx,
            startup: Mutex::new(Some(startup)),
        }))
    }

    /// Wait until the shell printed something (its first prompt), up to `limit`.
    pub async fn wait_ready(&self, limit: Duration) -> bool {
        let receiver = self.startup.lock().ok().and_then(|mut guard| guard.take());
        let Some(mut receiver) = receiver else {
            return true;
        };
        let first = tokio::time::timeout(limit, async {
            loop {
                match receiver.recv().await {
                    Ok(ChannelEvent::Data(_)) => return true,
                    Ok(ChannelEvent::Closed) | Err(broadcast::error::RecvError::Closed) => return false,
                    Err(broadcast::error::RecvError::Lagged(_)) => return true,
                }
            }
        })
        .await;
        // Let the rest of the prompt arrive before the first command
        tokio::time::sleep(Duration::from_millis(200)).await;
        first.unwrap_or(false)
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
        }
    }
}

#[async_trait]
impl ShellChannel for PtyChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn write(&self, data: &[u8]) -> shellpilot_core::Result<()> {
        let mut writer = self.writer.lock().map_err(|_| PilotError::ChannelWrite {
            message: "PTY writer lock poisoned".to_string(),
        })?;
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| PilotError::ChannelWrite {
                message: e.to_string(),
            })
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }
}
