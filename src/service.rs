//! Controller service: the event controller as an actor task.
//!
//! # Architecture
//!
//! ```text
//! ControllerHandle                    ControllerService task
//! ----------------                    ----------------------
//! arm / stop / snapshot  --mpsc-->    select! {
//!                                       command   => controller op, reply
//!       <--oneshot--                    deadline  => controller.advance()
//!                                     }
//! watch::Receiver        <--watch--   StatusSnapshot after every step
//! RecordWriter           <--mpsc---   CompletedEvent per sealed run
//! ```
//!
//! The task only ever sleeps until the controller's next deadline, so
//! barrier polls, run loop ticks and pulse releases all share one timer and
//! one task. A line failure ends the task and is returned from
//! [`ControllerService::run`].

use std::future;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use crate::error::{AppResult, BuilderError};
use crate::event::{CompletedEvent, ControllerEvent, EventConfig, EventController};
use crate::session::Session;
use crate::status::StatusSnapshot;

/// Default capacity of the command mailbox
pub const DEFAULT_MAILBOX: usize = 32;
const COMPLETED_CAPACITY: usize = 16;

/// Event parameters as sent by a caller.
#[derive(Debug, Clone)]
pub enum ArmRequest {
    /// Already validated
    Config(EventConfig),
    /// Operator text, parsed by the controller
    Text {
        /// Seconds from run start to trigger enable
        trigger_enable_delay: String,
        /// Maximum event length in seconds
        max_duration: String,
    },
}

/// Commands accepted by the controller task.
///
/// Each variant carries the `oneshot::Sender` for its reply. Use the helper
/// constructors to get the matching receiver.
#[derive(Debug)]
pub enum ControllerCommand {
    /// Arm a new event.
    ///
    /// The reply is sent once the readiness barrier has succeeded (with the
    /// run's session) or failed, or straight away if the arm is rejected.
    Arm {
        /// Event parameters
        request: ArmRequest,
        /// Session of the started run, or why it did not start
        response: oneshot::Sender<AppResult<Session>>,
    },
    /// Operator "Stop Event"; replies whether a run was in progress
    ManualTrigger {
        /// True when a run will end on the next tick
        response: oneshot::Sender<bool>,
    },
    /// Single trigger enable pulse outside an event
    TakeImage {
        /// Rejected unless Idle
        response: oneshot::Sender<AppResult<()>>,
    },
    /// Current status
    Snapshot {
        /// Snapshot at the time the command is handled
        response: oneshot::Sender<StatusSnapshot>,
    },
    /// Tear down and stop the task
    Shutdown {
        /// Sent once teardown is done
        response: oneshot::Sender<()>,
    },
}

impl ControllerCommand {
    /// Arm command and its reply receiver.
    pub fn arm(request: ArmRequest) -> (Self, oneshot::Receiver<AppResult<Session>>) {
        let (response, rx) = oneshot::channel();
        (Self::Arm { request, response }, rx)
    }

    /// Manual trigger command and its reply receiver.
    pub fn manual_trigger() -> (Self, oneshot::Receiver<bool>) {
        let (response, rx) = oneshot::channel();
        (Self::ManualTrigger { response }, rx)
    }

    /// Take-image command and its reply receiver.
    pub fn take_image() -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (response, rx) = oneshot::channel();
        (Self::TakeImage { response }, rx)
    }

    /// Snapshot command and its reply receiver.
    pub fn snapshot() -> (Self, oneshot::Receiver<StatusSnapshot>) {
        let (response, rx) = oneshot::channel();
        (Self::Snapshot { response }, rx)
    }

    /// Shutdown command and its reply receiver.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (response, rx) = oneshot::channel();
        (Self::Shutdown { response }, rx)
    }
}

/// Clonable front end to a running [`ControllerService`].
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerCommand>,
    status: watch::Receiver<StatusSnapshot>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        (command, rx): (ControllerCommand, oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BuilderError::ControllerStopped)?;
        rx.await.map_err(|_| BuilderError::ControllerStopped)
    }

    /// Arm with validated parameters; resolves when the readiness barrier
    /// is decided.
    pub async fn arm(&self, config: EventConfig) -> AppResult<Session> {
        self.request(ControllerCommand::arm(ArmRequest::Config(config)))
            .await?
    }

    /// Arm from operator text.
    pub async fn arm_from_input(
        &self,
        trigger_enable_delay: &str,
        max_duration: &str,
    ) -> AppResult<Session> {
        self.request(ControllerCommand::arm(ArmRequest::Text {
            trigger_enable_delay: trigger_enable_delay.to_string(),
            max_duration: max_duration.to_string(),
        }))
        .await?
    }

    /// Request "Stop Event". Returns false when no run is in progress.
    pub async fn manual_trigger(&self) -> AppResult<bool> {
        self.request(ControllerCommand::manual_trigger()).await
    }

    /// Pulse every enable line once. Idle only.
    pub async fn take_image(&self) -> AppResult<()> {
        self.request(ControllerCommand::take_image()).await?
    }

    /// Ask the controller for its current status.
    pub async fn snapshot(&self) -> AppResult<StatusSnapshot> {
        self.request(ControllerCommand::snapshot()).await
    }

    /// Stop the controller. Succeeds if it is already gone.
    pub async fn shutdown(&self) -> AppResult<()> {
        match self.request(ControllerCommand::shutdown()).await {
            Ok(()) | Err(BuilderError::ControllerStopped) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Receiver for status snapshots, updated after every controller step.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// Owns the controller and drives it from commands and its own deadlines.
pub struct ControllerService {
    controller: EventController,
    command_rx: mpsc::Receiver<ControllerCommand>,
    status_tx: watch::Sender<StatusSnapshot>,
    completed_tx: mpsc::Sender<CompletedEvent>,
    pending_arm: Option<oneshot::Sender<AppResult<Session>>>,
}

impl ControllerService {
    /// Wrap a controller. Returns the service (to be spawned), a handle, and
    /// the receiver of completed events for the record writer.
    pub fn new(
        controller: EventController,
        mailbox: usize,
    ) -> (Self, ControllerHandle, mpsc::Receiver<CompletedEvent>) {
        let (tx, command_rx) = mpsc::channel(mailbox);
        let (status_tx, status) = watch::channel(controller.snapshot());
        let (completed_tx, completed_rx) = mpsc::channel(COMPLETED_CAPACITY);
        let service = Self {
            controller,
            command_rx,
            status_tx,
            completed_tx,
            pending_arm: None,
        };
        (service, ControllerHandle { tx, status }, completed_rx)
    }

    /// Run until shutdown, until every handle is dropped, or until a line
    /// fails.
    pub async fn run(mut self) -> AppResult<()> {
        info!("event controller started");
        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(ControllerCommand::Shutdown { response }) => {
                            info!("Shutdown command received");
                            let result = self.shutdown().await;
                            let _ = response.send(());
                            return result;
                        }
                        Some(command) => {
                            if let Err(e) = self.handle_command(command).await {
                                return self.fail(e);
                            }
                        }
                        None => {
                            info!("all controller handles dropped");
                            return self.shutdown().await;
                        }
                    }
                }
                now = wait_until(deadline) => {
                    match self.controller.advance(now).await {
                        Ok(Some(event)) => self.handle_event(event).await,
                        Ok(None) => {}
                        Err(e) => return self.fail(e),
                    }
                }
            }
            self.publish();
        }
    }

    async fn handle_command(&mut self, command: ControllerCommand) -> AppResult<()> {
        match command {
            ControllerCommand::Arm { request, response } => {
                let now = Instant::now();
                let result = match request {
                    ArmRequest::Config(config) => self.controller.arm(config, now).await,
                    ArmRequest::Text {
                        trigger_enable_delay,
                        max_duration,
                    } => {
                        self.controller
                            .arm_from_input(&trigger_enable_delay, &max_duration, now)
                            .await
                    }
                };
                match result {
                    Ok(()) => self.pending_arm = Some(response),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        let _ = response.send(Err(e));
                    }
                }
            }
            ControllerCommand::ManualTrigger { response } => {
                let _ = response.send(self.controller.request_stop());
            }
            ControllerCommand::TakeImage { response } => {
                match self.controller.take_image(Instant::now()).await {
                    Err(e) if e.is_fatal() => return Err(e),
                    result => {
                        let _ = response.send(result);
                    }
                }
            }
            ControllerCommand::Snapshot { response } => {
                let _ = response.send(self.controller.snapshot());
            }
            ControllerCommand::Shutdown { response } => {
                let _ = response.send(());
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::RunStarted { session, .. } => {
                if let Some(response) = self.pending_arm.take() {
                    let _ = response.send(Ok(session));
                }
            }
            ControllerEvent::ArmFailed(e) => {
                if let Some(response) = self.pending_arm.take() {
                    let _ = response.send(Err(e));
                }
            }
            ControllerEvent::RunEnded(completed) => self.deliver(completed).await,
            ControllerEvent::Drained => {}
        }
    }

    async fn deliver(&self, completed: CompletedEvent) {
        let run_id = completed.run.id;
        if self.completed_tx.send(completed).await.is_err() {
            warn!(%run_id, "no record writer attached, event record dropped");
        }
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        if let Some(response) = self.pending_arm.take() {
            let _ = response.send(Err(BuilderError::ControllerStopped));
        }
        let completed = self.controller.shutdown(Instant::now()).await?;
        if let Some(completed) = completed {
            self.deliver(completed).await;
        }
        self.publish();
        Ok(())
    }

    fn fail(&mut self, e: BuilderError) -> AppResult<()> {
        error!(error = %e, "event controller stopped on line failure");
        if let Some(response) = self.pending_arm.take() {
            let _ = response.send(Err(BuilderError::ControllerStopped));
        }
        Err(e)
    }

    fn publish(&self) {
        let snapshot = self.controller.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Sleep until `deadline`, or forever when nothing is scheduled.
///
/// Returns the instant the task actually woke, which is later than the
/// deadline whenever the scheduler runs behind.
async fn wait_until(deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(at) => {
            sleep_until(at).await;
            Instant::now()
        }
        None => future::pending().await,
    }
}
