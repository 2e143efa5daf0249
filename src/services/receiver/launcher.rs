use crate::services::receiver::command::{hostname, receiver_args};
use crate::services::receiver::{ReceiverBackend, ReceiverConfig};
use async_lock::Mutex;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessLaunchError {
    #[error("Invalid audio device: {0}")]
    InvalidDevice(String),
    #[error("Unable to start receiver: {0}")]
    SpawnError(#[from] std::io::Error),
    #[error("Unable to prepare audio backend: {0}")]
    BackendError(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ProcessExit {
    pub(crate) code: Option<i32>,
    pub(crate) stderr_tail: Vec<String>,
}

impl ProcessExit {
    pub(crate) fn summary(&self) -> String {
        let status = match self.code {
            Some(code) => format!("Receiver exited with code {}", code),
            None => "Receiver was terminated by a signal".to_string(),
        };

        if self.stderr_tail.is_empty() {
            status
        } else {
            format!("{}: {}", status, self.stderr_tail.join("\n"))
        }
    }
}

#[async_trait]
pub(crate) trait ReceiverProcess: Send {
    /// Resolves once the process has exited.
    async fn wait(&mut self) -> ProcessExit;

    /// Asks the process to terminate, killing it after `timeout`.
    async fn stop(&mut self, timeout: Duration);
}

#[async_trait]
pub(crate) trait ReceiverLauncher: Send + Sync {
    async fn launch(
        &self,
        config: &ReceiverConfig,
        backend: &ReceiverBackend,
    ) -> Result<Box<dyn ReceiverProcess>, ProcessLaunchError>;

    /// Releases whatever `launch` set up around the process.
    async fn release(&self);
}

/// Runs the `librespot` binary.
pub(crate) struct LibrespotLauncher {
    loaded_modules: Mutex<Vec<String>>,
}

impl LibrespotLauncher {
    pub(crate) fn new() -> Self {
        Self {
            loaded_modules: Mutex::new(vec![]),
        }
    }

    async fn pactl(args: &[&str]) -> Result<String, ProcessLaunchError> {
        let output = Command::new("pactl")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProcessLaunchError::BackendError(format!(
                "pactl {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(?args, %stdout, "pactl");

        Ok(stdout)
    }

    async fn load_rtp_modules(
        &self,
        address: &str,
        port: u16,
        sink: &str,
    ) -> Result<(), ProcessLaunchError> {
        let mut loaded_modules = self.loaded_modules.lock().await;

        if !loaded_modules.is_empty() {
            return Ok(());
        }

        let modules: [Vec<String>; 2] = [
            vec!["module-null-sink".into(), format!("sink_name={}", sink)],
            vec![
                "module-rtp-send".into(),
                format!("destination_ip={}", address),
                "inhibit_auto_suspend=always".into(),
                format!("port={}", port),
                format!("source={}.monitor", sink),
            ],
        ];

        for module in modules {
            let mut args = vec!["load-module"];
            args.extend(module.iter().map(String::as_str));

            match Self::pactl(&args).await {
                Ok(id) => loaded_modules.push(id),
                Err(error) => {
                    Self::unload_modules(&mut loaded_modules).await;
                    return Err(error);
                }
            }
        }

        info!(modules = ?*loaded_modules, "PulseAudio RTP modules loaded");

        Ok(())
    }

    async fn unload_modules(modules: &mut Vec<String>) {
        while let Some(module) = modules.pop() {
            if let Err(error) = Self::pactl(&["unload-module", &module]).await {
                warn!(%module, %error, "Unable to unload PulseAudio module");
            }
        }
    }
}

#[async_trait]
impl ReceiverLauncher for LibrespotLauncher {
    async fn launch(
        &self,
        config: &ReceiverConfig,
        backend: &ReceiverBackend,
    ) -> Result<Box<dyn ReceiverProcess>, ProcessLaunchError> {
        if let ReceiverBackend::PulseRtp {
            address,
            port,
            sink,
        } = backend
        {
            self.load_rtp_modules(address, *port, sink).await?;
        }

        let args = receiver_args(config, backend, &hostname());
        debug!(path = %config.librespot_path, ?args, "Starting receiver");

        let mut child = Command::new(&config.librespot_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr_tail = Arc::new(std::sync::Mutex::new(VecDeque::new()));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_stderr(stderr, Arc::clone(&stderr_tail))));

        Ok(Box::new(LibrespotProcess {
            child,
            stderr_tail,
            stderr_reader,
        }))
    }

    async fn release(&self) {
        let mut loaded_modules = self.loaded_modules.lock().await;

        if !loaded_modules.is_empty() {
            Self::unload_modules(&mut loaded_modules).await;
            info!("PulseAudio RTP modules unloaded");
        }
    }
}

async fn read_stderr(stderr: ChildStderr, tail: Arc<std::sync::Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "librespot", "{}", line);

        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

struct LibrespotProcess {
    child: Child,
    stderr_tail: Arc<std::sync::Mutex<VecDeque<String>>>,
    stderr_reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl ReceiverProcess for LibrespotProcess {
    async fn wait(&mut self) -> ProcessExit {
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(error) => {
                warn!(%error, "Unable to wait for receiver");
                None
            }
        };

        // Let the reader catch up with the last lines written before exit.
        if let Some(reader) = self.stderr_reader.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
        }

        let stderr_tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        ProcessExit { code, stderr_tail }
    }

    async fn stop(&mut self, timeout: Duration) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain syscall on a pid owned by this child handle.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        if tokio::time::timeout(timeout, self.child.wait()).await.is_err() {
            warn!("Receiver did not terminate in time; killing");

            if let Err(error) = self.child.kill().await {
                warn!(%error, "Unable to kill receiver");
            }
        }

        if let Some(reader) = self.stderr_reader.take() {
            reader.abort();
        }
    }
}
