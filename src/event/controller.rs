//! Event controller: the lifecycle state machine.
//!
//! The controller owns the line driver, node status and session, and moves
//! through `Idle → Arming → WaitingReady → Running → Ending → Draining → Idle`.
//! It never sleeps. Callers feed it the current instant through
//! [`EventController::advance`] and schedule the next call at
//! [`EventController::next_deadline`]; the service does this on the tokio
//! timer, tests do it with explicit instants.

use chrono::{DateTime, Local};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::barrier::{Drain, DrainBarrier, Readiness, ReadinessBarrier};
use super::latch::LatchMonitor;
use super::run_loop::{RunLoop, RunSample, RunTick};
use super::state::{
    ControllerState, EndReasons, EventConfig, EventRun, NodeState, NodeStatus,
};
use crate::config::{StorageConfig, TimingConfig};
use crate::error::{AppResult, BuilderError};
use crate::hardware::{Line, LineDriver};
use crate::session::{point_images_at_dump, Session};
use crate::status::{Notice, StatusSnapshot};

/// A sealed run, handed to the record writer exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedEvent {
    /// The sealed run
    pub run: EventRun,
    /// Node status as of the deciding tick
    pub nodes: Vec<NodeStatus>,
    /// Where the run's data went
    pub session: Session,
}

/// Something the caller should know about, produced by a controller step.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Readiness barrier succeeded and the run loop started
    RunStarted {
        /// Identifier of the new run
        run_id: Uuid,
        /// Run directory opened for it
        session: Session,
    },
    /// The arm attempt ended without a run
    ArmFailed(BuilderError),
    /// Run loop decided to end; outputs are torn down and draining began
    RunEnded(CompletedEvent),
    /// Every node went inactive; the controller is Idle again
    Drained,
}

enum Phase {
    Idle,
    WaitingReady {
        barrier: ReadinessBarrier,
        config: EventConfig,
    },
    Running {
        run: RunLoop,
        id: Uuid,
        started_at: DateTime<Local>,
        session: Session,
    },
    Draining {
        barrier: DrainBarrier,
        session: Session,
    },
}

/// Owns the lines and drives one event at a time through its lifecycle.
pub struct EventController {
    driver: LineDriver,
    timing: TimingConfig,
    storage: StorageConfig,
    state: ControllerState,
    nodes: Vec<NodeStatus>,
    latch: LatchMonitor,
    phase: Phase,
    /// Next barrier poll or run loop tick
    next_tick: Option<Instant>,
    manual_trigger: bool,
    last_run: Option<EventRun>,
    notice: Option<Notice>,
    elapsed: Option<Duration>,
}

impl EventController {
    /// Idle controller with every node `Unknown`.
    pub fn new(driver: LineDriver, timing: TimingConfig, storage: StorageConfig) -> Self {
        let nodes = (0..driver.node_count()).map(NodeStatus::unknown).collect();
        Self {
            driver,
            timing,
            storage,
            state: ControllerState::Idle,
            nodes,
            latch: LatchMonitor::new(),
            phase: Phase::Idle,
            next_tick: None,
            manual_trigger: false,
            last_run: None,
            notice: None,
            elapsed: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Per-node status, in node order.
    pub fn nodes(&self) -> &[NodeStatus] {
        &self.nodes
    }

    /// Most recently sealed run.
    pub fn last_run(&self) -> Option<&EventRun> {
        self.last_run.as_ref()
    }

    /// Number of times the latch was seen rising during a run.
    pub fn latch_trips(&self) -> u64 {
        self.latch.trips()
    }

    /// Immutable copy of everything observers may see.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            nodes: self.nodes.clone(),
            elapsed: self.elapsed,
            arm_enabled: self.state.can_arm(),
            stop_enabled: self.state.can_stop(),
            last_run: self.last_run.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Earliest instant at which [`advance`](Self::advance) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let enable = match &self.phase {
            Phase::Running { run, .. } => run.enable_deadline(),
            _ => None,
        };
        [self.next_tick, enable, self.driver.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Arm from operator text. Unparseable input is rejected before any line
    /// is touched.
    pub async fn arm_from_input(
        &mut self,
        trigger_enable_delay: &str,
        max_duration: &str,
        now: Instant,
    ) -> AppResult<()> {
        self.ensure_idle()?;
        match EventConfig::parse(trigger_enable_delay, max_duration) {
            Ok(config) => self.arm(config, now).await,
            Err(e) => {
                warn!(error = %e, "arm rejected");
                self.notice = Some(Notice::InvalidInput(e.to_string()));
                Err(e)
            }
        }
    }

    /// Start an arm attempt.
    ///
    /// On success the controller is in `WaitingReady` with its first readiness
    /// poll due at `now`. A held latch gets one reset pulse and leaves the
    /// controller Idle.
    pub async fn arm(&mut self, config: EventConfig, now: Instant) -> AppResult<()> {
        self.ensure_idle()?;
        self.transition(ControllerState::Arming);
        self.notice = None;
        self.manual_trigger = false;
        for node in &mut self.nodes {
            node.state = NodeState::Unknown;
        }

        if let Err(e) = self
            .latch
            .clear_for_arm(&mut self.driver, self.timing.reset_hold, now)
            .await
        {
            if matches!(e, BuilderError::LatchHeld) {
                self.notice = Some(Notice::LatchHeld);
            }
            self.transition(ControllerState::Idle);
            return Err(e);
        }

        let arms: Vec<Line> = (0..self.driver.node_count()).map(Line::NodeArm).collect();
        self.driver.write_all(arms, true).await?;

        info!(
            delay = ?config.trigger_enable_delay(),
            max = ?config.max_duration(),
            "event armed, waiting for nodes"
        );
        self.phase = Phase::WaitingReady {
            barrier: ReadinessBarrier::new(self.timing.ready_budget),
            config,
        };
        self.next_tick = Some(now);
        self.transition(ControllerState::WaitingReady);
        Ok(())
    }

    /// Operator "Stop Event". Takes effect on the next run loop tick.
    ///
    /// Returns false when no run is in progress.
    pub fn request_stop(&mut self) -> bool {
        if !self.state.can_stop() {
            debug!(state = %self.state, "stop ignored");
            return false;
        }
        info!("manual trigger requested");
        self.manual_trigger = true;
        true
    }

    /// Single enable pulse on every node outside of an event.
    pub async fn take_image(&mut self, now: Instant) -> AppResult<()> {
        self.ensure_idle()?;
        for i in 0..self.driver.node_count() {
            self.driver
                .pulse(Line::NodeEnable(i), self.timing.enable_pulse_hold, now)
                .await?;
        }
        info!("single image trigger sent");
        Ok(())
    }

    /// Do whatever is due at `now`: release pulse holds, fire the trigger
    /// enable, and run one barrier poll or run loop tick.
    ///
    /// Errors are line failures and are fatal.
    pub async fn advance(&mut self, now: Instant) -> AppResult<Option<ControllerEvent>> {
        self.driver.service(now).await?;

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let (phase, event) = match phase {
            Phase::Idle => (Phase::Idle, None),
            Phase::WaitingReady { barrier, config } => {
                if self.tick_due(now) {
                    self.poll_ready(barrier, config, now).await?
                } else {
                    (Phase::WaitingReady { barrier, config }, None)
                }
            }
            Phase::Running {
                mut run,
                id,
                started_at,
                session,
            } => {
                if run.take_enable(now) {
                    self.raise_enables(id).await?;
                }
                if self.tick_due(now) {
                    self.run_tick(run, id, started_at, session, now).await?
                } else {
                    (
                        Phase::Running {
                            run,
                            id,
                            started_at,
                            session,
                        },
                        None,
                    )
                }
            }
            draining @ Phase::Draining { .. } => {
                self.phase = draining;
                let event = if self.tick_due(now) {
                    self.poll_drain(now).await?
                } else {
                    None
                };
                return Ok(event);
            }
        };
        self.phase = phase;
        Ok(event)
    }

    /// One drain check. Has no effect unless the controller is draining.
    ///
    /// The drain closes once every node reads inactive and the end-of-event
    /// marker and its latch reset have both been released, so nothing from
    /// this event can reach the lines of the next one.
    pub async fn poll_drain(&mut self, now: Instant) -> AppResult<Option<ControllerEvent>> {
        let Phase::Draining { barrier, session } = &mut self.phase else {
            return Ok(None);
        };
        let levels = self.driver.read_nodes().await?;
        match barrier.poll(&levels, now) {
            Drain::Waiting { still_active, warn } => {
                if warn {
                    warn!(
                        nodes = ?still_active,
                        waited = ?barrier.waited(now),
                        "still waiting for nodes to finish saving"
                    );
                }
                self.notice = Some(Notice::WaitingForNodes(still_active));
                self.next_tick = Some(now + self.timing.drain_poll);
                Ok(None)
            }
            Drain::Complete if self.driver.is_busy() => {
                if matches!(self.notice, Some(Notice::WaitingForNodes(_))) {
                    self.notice = None;
                }
                trace!(release = ?self.driver.next_deadline(), "nodes idle, teardown pulses pending");
                self.next_tick = Some(now + self.timing.drain_poll);
                Ok(None)
            }
            Drain::Complete => {
                info!(
                    waited = ?barrier.waited(now),
                    directory = %session.directory.display(),
                    "all nodes inactive, event closed"
                );
                self.phase = Phase::Idle;
                self.next_tick = None;
                if matches!(self.notice, Some(Notice::WaitingForNodes(_))) {
                    self.notice = None;
                }
                self.transition(ControllerState::Idle);
                Ok(Some(ControllerEvent::Drained))
            }
        }
    }

    /// Tear everything down for exit.
    ///
    /// A running event is ended as a manual trigger and returned so it can
    /// still be recorded. Outputs go low and the images link goes back to
    /// the dump directory. Safe to call more than once.
    pub async fn shutdown(&mut self, now: Instant) -> AppResult<Option<CompletedEvent>> {
        self.driver.service(now).await?;
        let mut completed = None;
        if let Phase::Running {
            run,
            id,
            started_at,
            session,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        {
            self.manual_trigger = true;
            if let (_, Some(ControllerEvent::RunEnded(event))) =
                self.run_tick(run, id, started_at, session, now).await?
            {
                completed = Some(event);
            }
        }

        self.phase = Phase::Idle;
        self.next_tick = None;
        self.driver.reset_outputs().await?;
        if let Err(e) = point_images_at_dump(&self.storage) {
            warn!(error = %e, "could not point images link at dump");
        }
        if self.state != ControllerState::Idle {
            self.transition(ControllerState::Idle);
        }
        info!("controller shut down");
        Ok(completed)
    }

    fn ensure_idle(&self) -> AppResult<()> {
        if self.state.can_arm() {
            Ok(())
        } else {
            Err(BuilderError::NotIdle(self.state))
        }
    }

    fn tick_due(&self, now: Instant) -> bool {
        self.next_tick.is_some_and(|at| at <= now)
    }

    fn transition(&mut self, to: ControllerState) {
        debug!(from = %self.state, %to, "state change");
        self.state = to;
    }

    async fn poll_ready(
        &mut self,
        mut barrier: ReadinessBarrier,
        config: EventConfig,
        now: Instant,
    ) -> AppResult<(Phase, Option<ControllerEvent>)> {
        let levels = self.driver.read_nodes().await?;
        match barrier.poll(&levels) {
            Readiness::Pending => {
                self.next_tick = Some(now + self.timing.ready_poll);
                Ok((Phase::WaitingReady { barrier, config }, None))
            }
            Readiness::Ready => {
                for node in &mut self.nodes {
                    node.state = NodeState::Ready;
                }
                let session = match Session::open(&self.storage, Local::now()) {
                    Ok(session) => session,
                    Err(e) => {
                        error!(error = %e, "could not open run directory");
                        self.notice = Some(Notice::StorageFailed(e.to_string()));
                        self.abort_arm(now).await?;
                        return Ok((Phase::Idle, Some(ControllerEvent::ArmFailed(e.into()))));
                    }
                };
                self.driver
                    .pulse(Line::Reset, self.timing.reset_hold, now)
                    .await?;

                let id = Uuid::new_v4();
                info!(
                    run_id = %id,
                    polls = barrier.polls(),
                    directory = %session.directory.display(),
                    "all nodes ready, run started"
                );
                self.elapsed = Some(Duration::ZERO);
                self.next_tick = Some(now);
                self.transition(ControllerState::Running);
                let event = ControllerEvent::RunStarted {
                    run_id: id,
                    session: session.clone(),
                };
                Ok((
                    Phase::Running {
                        run: RunLoop::new(config, now),
                        id,
                        started_at: Local::now(),
                        session,
                    },
                    Some(event),
                ))
            }
            Readiness::TimedOut { failed } => {
                for (node, active) in self.nodes.iter_mut().zip(&levels) {
                    node.state = if *active {
                        NodeState::Ready
                    } else {
                        NodeState::Failed
                    };
                }
                warn!(nodes = ?failed, polls = barrier.polls(), "readiness barrier timed out");
                self.notice = Some(Notice::InactiveNodes(failed.clone()));
                self.abort_arm(now).await?;
                Ok((
                    Phase::Idle,
                    Some(ControllerEvent::ArmFailed(BuilderError::ReadinessTimeout {
                        failed,
                    })),
                ))
            }
        }
    }

    /// Back out of an arm attempt that never reached Running.
    async fn abort_arm(&mut self, now: Instant) -> AppResult<()> {
        self.next_tick = None;
        self.driver.reset_outputs().await?;
        self.driver
            .pulse(Line::Reset, self.timing.reset_hold, now)
            .await?;
        if let Err(e) = point_images_at_dump(&self.storage) {
            warn!(error = %e, "could not point images link at dump");
        }
        self.transition(ControllerState::Idle);
        Ok(())
    }

    async fn raise_enables(&mut self, run_id: Uuid) -> AppResult<()> {
        let enables: Vec<Line> = (0..self.driver.node_count())
            .map(Line::NodeEnable)
            .collect();
        self.driver.write_all(enables, true).await?;
        info!(%run_id, "trigger enable raised");
        Ok(())
    }

    async fn run_tick(
        &mut self,
        mut run: RunLoop,
        id: Uuid,
        started_at: DateTime<Local>,
        session: Session,
        now: Instant,
    ) -> AppResult<(Phase, Option<ControllerEvent>)> {
        let latched = self.latch.sample(&self.driver).await?;
        let nodes = self.driver.read_nodes().await?;
        let sample = RunSample {
            now,
            latched,
            manual_trigger: self.manual_trigger,
            nodes,
        };

        match run.tick(&sample) {
            RunTick::Continue { elapsed } => {
                self.elapsed = Some(elapsed);
                self.next_tick = Some(now + self.timing.run_tick);
                Ok((
                    Phase::Running {
                        run,
                        id,
                        started_at,
                        session,
                    },
                    None,
                ))
            }
            RunTick::End {
                elapsed,
                reasons,
                inactive,
            } => {
                self.elapsed = Some(elapsed);
                self.manual_trigger = false;
                for node in &mut self.nodes {
                    node.state = if inactive.contains(&node.id) {
                        NodeState::Inactive
                    } else {
                        NodeState::Active
                    };
                }
                let sealed = EventRun {
                    id,
                    config: *run.config(),
                    started_at,
                    ended_at: Local::now(),
                    elapsed,
                    end_reasons: reasons,
                    inactive_nodes: inactive,
                    trigger_enabled: run.enable_fired(),
                };
                log_end(&sealed);
                self.transition(ControllerState::Ending);
                self.teardown_run(now).await?;

                self.last_run = Some(sealed.clone());
                let completed = CompletedEvent {
                    run: sealed,
                    nodes: self.nodes.clone(),
                    session: session.clone(),
                };
                self.next_tick = Some(now);
                self.transition(ControllerState::Draining);
                Ok((
                    Phase::Draining {
                        barrier: DrainBarrier::new(now, self.timing.drain_warn_after),
                        session,
                    },
                    Some(ControllerEvent::RunEnded(completed)),
                ))
            }
        }
    }

    /// Drop arm and enable lines, mark the end of the event, then reset the
    /// latch once the marker is released. The drain stays open until both
    /// pulses are done.
    async fn teardown_run(&mut self, now: Instant) -> AppResult<()> {
        let count = self.driver.node_count();
        self.driver
            .write_all((0..count).map(Line::NodeArm), false)
            .await?;
        self.driver
            .write_all((0..count).map(Line::NodeEnable), false)
            .await?;
        self.driver
            .pulse(Line::EndEvent, self.timing.end_marker_hold, now)
            .await?;
        self.driver.pulse_after(
            Line::Reset,
            self.timing.end_marker_hold,
            self.timing.reset_hold,
            now,
        );
        Ok(())
    }
}

fn log_end(run: &EventRun) {
    if run.end_reasons.contains(EndReasons::LATCH_TRIGGERED) {
        warn!(run_id = %run.id, elapsed = ?run.elapsed, "run ended by trigger latch");
    } else {
        info!(
            run_id = %run.id,
            elapsed = ?run.elapsed,
            reasons = %run.end_reasons,
            inactive = ?run.inactive_nodes,
            "run ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinesConfig;
    use crate::hardware::{LineMap, MockLines};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn controller(nodes: usize) -> (EventController, MockLines, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let lines = MockLines::new();
        let all: Vec<u8> = (0..nodes as u8 * 3).map(|p| p + 1).collect();
        let config = LinesConfig {
            node_active: all[..nodes].to_vec(),
            node_arm: all[nodes..nodes * 2].to_vec(),
            node_enable: all[nodes * 2..].to_vec(),
            ..LinesConfig::default()
        };
        let driver = LineDriver::new(Arc::new(lines.clone()), LineMap::from_config(&config));
        let storage = StorageConfig {
            data_root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        (
            EventController::new(driver, TimingConfig::default(), storage),
            lines,
            dir,
        )
    }

    #[tokio::test]
    async fn arm_rejected_unless_idle() {
        let (mut c, _lines, _dir) = controller(2);
        let t0 = Instant::now();
        c.arm(EventConfig::from_secs(0.0, 1.0).unwrap(), t0)
            .await
            .unwrap();
        let err = c
            .arm(EventConfig::from_secs(0.0, 1.0).unwrap(), t0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::NotIdle(ControllerState::WaitingReady)
        ));
    }

    #[tokio::test]
    async fn invalid_input_touches_no_lines() {
        let (mut c, lines, _dir) = controller(3);
        let err = c
            .arm_from_input("soon", "1.0", Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, BuilderError::InvalidInput(_)));
        assert!(lines.writes().is_empty());
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(matches!(c.snapshot().notice, Some(Notice::InvalidInput(_))));
    }

    #[tokio::test]
    async fn held_latch_blocks_arm() {
        let (mut c, lines, _dir) = controller(3);
        lines.set(Line::Latch, true);
        let err = c
            .arm(EventConfig::from_secs(0.0, 1.0).unwrap(), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, BuilderError::LatchHeld));
        assert_eq!(lines.writes(), vec![(Line::Reset, true)]);
        assert_eq!(c.state(), ControllerState::Idle);
        assert_eq!(c.snapshot().notice, Some(Notice::LatchHeld));
    }

    #[tokio::test]
    async fn first_readiness_poll_is_due_at_arm() {
        let (mut c, lines, _dir) = controller(2);
        lines.set_nodes(2, true);
        let t0 = Instant::now();
        c.arm(EventConfig::from_secs(5.0, 10.0).unwrap(), t0)
            .await
            .unwrap();
        assert_eq!(c.next_deadline(), Some(t0));
        assert!(lines.level(Line::NodeArm(0)) && lines.level(Line::NodeArm(1)));

        let event = c.advance(t0).await.unwrap();
        assert!(matches!(event, Some(ControllerEvent::RunStarted { .. })));
        assert_eq!(c.state(), ControllerState::Running);
        assert!(c.nodes().iter().all(|n| n.state == NodeState::Ready));
    }

    #[tokio::test]
    async fn stop_only_while_running() {
        let (mut c, _lines, _dir) = controller(1);
        assert!(!c.request_stop());
    }

    #[tokio::test]
    async fn take_image_pulses_every_enable_line() {
        let (mut c, lines, _dir) = controller(3);
        let t0 = Instant::now();
        c.take_image(t0).await.unwrap();
        for i in 0..3 {
            assert!(lines.level(Line::NodeEnable(i)));
        }
        c.advance(t0 + Duration::from_millis(10)).await.unwrap();
        for i in 0..3 {
            assert!(!lines.level(Line::NodeEnable(i)));
            assert_eq!(lines.rising_edges(Line::NodeEnable(i)), 1);
        }
    }

    #[tokio::test]
    async fn poll_drain_while_idle_is_a_no_op() {
        let (mut c, lines, _dir) = controller(2);
        let before = c.snapshot();
        assert!(c.poll_drain(Instant::now()).await.unwrap().is_none());
        assert_eq!(c.snapshot(), before);
        assert!(lines.writes().is_empty());
    }

    #[tokio::test]
    async fn shutdown_while_idle_is_idempotent() {
        let (mut c, lines, dir) = controller(2);
        let t0 = Instant::now();
        assert!(c.shutdown(t0).await.unwrap().is_none());
        let after_first: Vec<bool> = lines
            .writes()
            .iter()
            .map(|(_, level)| *level)
            .collect();
        assert!(after_first.iter().all(|level| !level));
        assert!(c.shutdown(t0).await.unwrap().is_none());
        assert!(dir.path().join("dump").is_dir());
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[tokio::test]
    #[traced_test]
    async fn drain_closes_after_teardown_pulses_and_logs_the_run_directory() {
        let (mut c, lines, _dir) = controller(1);
        lines.set_nodes(1, true);
        let t0 = Instant::now();
        c.arm(EventConfig::from_secs(0.0, 0.0).unwrap(), t0)
            .await
            .unwrap();

        let mut directory = None;
        let mut drained_at = None;
        while let Some(at) = c.next_deadline() {
            match c.advance(at).await.unwrap() {
                Some(ControllerEvent::RunEnded(done)) => {
                    directory = Some(done.session.directory);
                    lines.set_nodes(1, false);
                }
                Some(ControllerEvent::Drained) => {
                    drained_at = Some(at);
                    break;
                }
                _ => {}
            }
        }

        // Run ends on the 10 ms tick; marker 1 s, then a 10 ms reset.
        assert_eq!(drained_at, Some(t0 + Duration::from_millis(1020)));
        assert!(!lines.level(Line::EndEvent) && !lines.level(Line::Reset));
        let directory = directory.unwrap();
        assert!(logs_contain("event closed"));
        assert!(logs_contain(&directory.display().to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn hung_node_keeps_drain_waiting_and_warns() {
        let (mut c, lines, _dir) = controller(2);
        lines.set_nodes(2, true);
        let t0 = Instant::now();
        c.arm(EventConfig::from_secs(0.0, 0.0).unwrap(), t0)
            .await
            .unwrap();

        let until = t0 + Duration::from_secs(25);
        let mut ended = false;
        while let Some(at) = c.next_deadline() {
            if at > until {
                break;
            }
            if let Some(ControllerEvent::RunEnded(_)) = c.advance(at).await.unwrap() {
                ended = true;
                lines.set(Line::NodeActive(0), false);
            }
        }

        assert!(ended);
        assert_eq!(c.state(), ControllerState::Draining);
        assert_eq!(
            c.snapshot().notice,
            Some(Notice::WaitingForNodes(vec![1]))
        );
        assert!(logs_contain("still waiting for nodes to finish saving"));
    }
}
