use crate::services::receiver::{
    ProcessExit, ReceiverBackend, ReceiverConfig, ReceiverLauncher, ReceiverProcess,
    ReceiverState, ReceiverStatus,
};
use crate::utils::exponential_backoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

enum Command {
    Start,
    Stop(oneshot::Sender<()>),
    Retry,
    Reconfigure(ReceiverConfig),
    Shutdown(oneshot::Sender<()>),
}

enum Phase {
    Stopped,
    Starting,
    Running(Box<dyn ReceiverProcess>),
    BackingOff(Duration),
    Failed,
    Exit,
}

/// Handle to the receiver supervision task. Cheap to clone; every clone
/// talks to the same task, which is the only writer of the receiver state.
#[derive(Clone)]
pub(crate) struct ReceiverSupervisor {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ReceiverStatus>,
}

impl ReceiverSupervisor {
    /// Spawns the supervision task. The receiver starts right away when
    /// enabled in `config`.
    pub(crate) fn spawn(
        config: ReceiverConfig,
        launcher: Arc<dyn ReceiverLauncher>,
    ) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let initial_status = ReceiverStatus {
            state: ReceiverState::Stopped,
            attempt_count: 0,
            backend: config.backend,
            last_error_summary: None,
            stream_url: None,
        };
        let (status_tx, status_rx) = watch::channel(initial_status);

        let task = SupervisorTask {
            config,
            launcher,
            commands: commands_rx,
            status: status_tx,
            attempts: 0,
            last_error: None,
            backend: None,
        };

        let handle = tokio::spawn(task.run());

        (
            Self {
                commands: commands_tx,
                status: status_rx,
            },
            handle,
        )
    }

    pub(crate) fn status(&self) -> ReceiverStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ReceiverStatus> {
        self.status.clone()
    }

    /// Requests a start. A no-op while the receiver is already starting or
    /// running, and while it is `Failed`.
    pub(crate) fn start(&self) -> ReceiverStatus {
        self.send(Command::Start);
        self.status()
    }

    pub(crate) async fn stop(&self) -> ReceiverStatus {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx));
        let _ = rx.await;
        self.status()
    }

    /// Clears the attempt counter and starts again, leaving `Failed`.
    pub(crate) fn retry(&self) -> ReceiverStatus {
        self.send(Command::Retry);
        self.status()
    }

    pub(crate) fn reconfigure(&self, config: ReceiverConfig) {
        self.send(Command::Reconfigure(config));
    }

    /// Stops the receiver and ends the supervision task.
    pub(crate) async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx));
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Receiver supervisor is gone; command dropped");
        }
    }
}

struct SupervisorTask {
    config: ReceiverConfig,
    launcher: Arc<dyn ReceiverLauncher>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ReceiverStatus>,
    attempts: u32,
    last_error: Option<String>,
    backend: Option<ReceiverBackend>,
}

impl SupervisorTask {
    async fn run(mut self) {
        let mut phase = if self.config.enabled {
            Phase::Starting
        } else {
            Phase::Stopped
        };

        loop {
            phase = match phase {
                Phase::Stopped => {
                    self.publish(ReceiverState::Stopped);
                    self.idle(ReceiverState::Stopped).await
                }
                Phase::Failed => {
                    self.publish(ReceiverState::Failed);
                    self.idle(ReceiverState::Failed).await
                }
                Phase::Starting => {
                    self.publish(ReceiverState::Starting);
                    self.launch().await
                }
                Phase::Running(process) => {
                    self.publish(ReceiverState::Running);
                    self.supervise(process).await
                }
                Phase::BackingOff(delay) => {
                    self.publish(ReceiverState::BackingOff);
                    self.back_off(delay).await
                }
                Phase::Exit => break,
            };
        }

        info!("Receiver supervisor stopped");
    }

    fn publish(&self, state: ReceiverState) {
        let stream_url = match state {
            ReceiverState::Starting | ReceiverState::Running => self
                .backend
                .as_ref()
                .and_then(ReceiverBackend::stream_url),
            _ => None,
        };

        self.status.send_replace(ReceiverStatus {
            state,
            attempt_count: self.attempts,
            backend: self.config.backend,
            last_error_summary: self.last_error.clone(),
            stream_url,
        });
    }

    fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }

    /// Waits for a command while nothing is running.
    async fn idle(&mut self, state: ReceiverState) -> Phase {
        let current = || match state {
            ReceiverState::Failed => Phase::Failed,
            _ => Phase::Stopped,
        };

        match self.commands.recv().await {
            Some(Command::Start) if state == ReceiverState::Failed => {
                debug!("Receiver has failed; start ignored until retry");
                current()
            }
            Some(Command::Start) => {
                self.reset_attempts();
                Phase::Starting
            }
            Some(Command::Retry) => {
                self.reset_attempts();
                Phase::Starting
            }
            Some(Command::Stop(reply)) => {
                let _ = reply.send(());
                current()
            }
            Some(Command::Reconfigure(config)) => {
                self.apply_config(config);
                if self.config.enabled {
                    Phase::Starting
                } else {
                    Phase::Stopped
                }
            }
            Some(Command::Shutdown(reply)) => {
                self.publish(ReceiverState::Stopped);
                let _ = reply.send(());
                Phase::Exit
            }
            None => Phase::Exit,
        }
    }

    async fn launch(&mut self) -> Phase {
        let backend = match self.config.resolve_backend() {
            Ok(backend) => backend,
            Err(error) => return self.on_failure(error.to_string()).await,
        };

        self.backend = Some(backend.clone());

        info!(
            attempt = self.attempts + 1,
            max_attempts = self.config.max_attempts,
            ?backend,
            "Launching receiver"
        );

        let mut process = match self.launcher.launch(&self.config, &backend).await {
            Ok(process) => process,
            Err(error) => return self.on_failure(error.to_string()).await,
        };

        let grace = tokio::time::sleep(self.config.grace_period);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                exit = process.wait() => {
                    warn!(code = ?exit.code, "Receiver exited during grace period");
                    return self.on_exit(exit).await;
                }
                _ = &mut grace => {
                    info!("Receiver is running");
                    self.reset_attempts();
                    return Phase::Running(process);
                }
                command = self.commands.recv() => {
                    match self.on_command_while_active(command, &mut process).await {
                        Some(phase) => return phase,
                        None => continue,
                    }
                }
            }
        }
    }

    async fn supervise(&mut self, mut process: Box<dyn ReceiverProcess>) -> Phase {
        loop {
            tokio::select! {
                exit = process.wait() => {
                    warn!(code = ?exit.code, "Receiver exited unexpectedly");
                    return self.on_exit(exit).await;
                }
                command = self.commands.recv() => {
                    match self.on_command_while_active(command, &mut process).await {
                        Some(phase) => return phase,
                        None => continue,
                    }
                }
            }
        }
    }

    /// `None` keeps the current process running.
    async fn on_command_while_active(
        &mut self,
        command: Option<Command>,
        process: &mut Box<dyn ReceiverProcess>,
    ) -> Option<Phase> {
        match command {
            Some(Command::Start) | Some(Command::Retry) => {
                debug!("Receiver already active");
                None
            }
            Some(Command::Stop(reply)) => {
                self.terminate(process).await;
                self.publish(ReceiverState::Stopped);
                let _ = reply.send(());
                Some(Phase::Stopped)
            }
            Some(Command::Reconfigure(config)) => {
                self.terminate(process).await;
                self.apply_config(config);
                Some(if self.config.enabled {
                    Phase::Starting
                } else {
                    Phase::Stopped
                })
            }
            Some(Command::Shutdown(reply)) => {
                self.terminate(process).await;
                self.publish(ReceiverState::Stopped);
                let _ = reply.send(());
                Some(Phase::Exit)
            }
            None => {
                self.terminate(process).await;
                Some(Phase::Exit)
            }
        }
    }

    async fn back_off(&mut self, delay: Duration) -> Phase {
        debug!(?delay, attempts = self.attempts, "Receiver backing off");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Phase::Starting,
                command = self.commands.recv() => match command {
                    Some(Command::Start) => continue,
                    Some(Command::Retry) => {
                        self.reset_attempts();
                        return Phase::Starting;
                    }
                    Some(Command::Stop(reply)) => {
                        self.publish(ReceiverState::Stopped);
                        let _ = reply.send(());
                        return Phase::Stopped;
                    }
                    Some(Command::Reconfigure(config)) => {
                        self.apply_config(config);
                        return if self.config.enabled {
                            Phase::Starting
                        } else {
                            Phase::Stopped
                        };
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.launcher.release().await;
                        self.publish(ReceiverState::Stopped);
                        let _ = reply.send(());
                        return Phase::Exit;
                    }
                    None => {
                        self.launcher.release().await;
                        return Phase::Exit;
                    }
                },
            }
        }
    }

    fn apply_config(&mut self, config: ReceiverConfig) {
        info!(enabled = config.enabled, backend = ?config.backend, "Receiver reconfigured");
        self.config = config;
        self.backend = None;
        self.reset_attempts();
    }

    async fn terminate(&mut self, process: &mut Box<dyn ReceiverProcess>) {
        info!("Stopping receiver");
        process.stop(self.config.stop_timeout).await;
        self.launcher.release().await;
    }

    async fn on_exit(&mut self, exit: ProcessExit) -> Phase {
        self.on_failure(exit.summary()).await
    }

    async fn on_failure(&mut self, summary: String) -> Phase {
        self.attempts += 1;
        self.last_error = Some(summary);

        if self.attempts >= self.config.max_attempts {
            error!(
                attempts = self.attempts,
                last_error = ?self.last_error,
                "Receiver failed too many times"
            );
            self.launcher.release().await;
            return Phase::Failed;
        }

        warn!(
            attempts = self.attempts,
            max_attempts = self.config.max_attempts,
            last_error = ?self.last_error,
            "Receiver launch failed; will retry"
        );

        Phase::BackingOff(exponential_backoff(
            self.config.backoff_base,
            self.attempts,
            MAX_BACKOFF,
        ))
    }
}
