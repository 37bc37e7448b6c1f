//! End-to-end scenarios for the event controller, driven with explicit
//! instants so every poll and tick lands exactly where the protocol says.

use event_builder::config::{LinesConfig, StorageConfig, TimingConfig};
use event_builder::error::BuilderError;
use event_builder::event::{
    CompletedEvent, ControllerEvent, ControllerState, EndReasons, EventConfig, EventController,
    NodeState,
};
use event_builder::hardware::{Line, LineDriver, LineMap, MockLines};
use event_builder::status::Notice;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::{Duration, Instant};

struct Bench {
    controller: EventController,
    lines: MockLines,
    dir: TempDir,
    nodes: usize,
}

fn lines_for(nodes: usize) -> LinesConfig {
    if nodes == 3 {
        return LinesConfig::default();
    }
    let pins: Vec<u8> = (1..=(nodes as u8) * 3).collect();
    LinesConfig {
        node_active: pins[..nodes].to_vec(),
        node_arm: pins[nodes..nodes * 2].to_vec(),
        node_enable: pins[nodes * 2..].to_vec(),
        latch: 60,
        reset: 61,
        end_event: 62,
    }
}

fn bench(nodes: usize) -> Bench {
    let dir = tempfile::tempdir().unwrap();
    let lines = MockLines::new();
    let driver = LineDriver::new(
        Arc::new(lines.clone()),
        LineMap::from_config(&lines_for(nodes)),
    );
    let storage = StorageConfig {
        data_root: dir.path().to_path_buf(),
        ..StorageConfig::default()
    };
    Bench {
        controller: EventController::new(driver, TimingConfig::default(), storage),
        lines,
        dir,
        nodes,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

impl Bench {
    /// Step the controller through every deadline up to and including `until`.
    async fn drive_until(&mut self, until: Instant) -> Vec<(Instant, ControllerEvent)> {
        let mut events = Vec::new();
        while let Some(at) = self.controller.next_deadline() {
            if at > until {
                break;
            }
            if let Some(event) = self.controller.advance(at).await.unwrap() {
                events.push((at, event));
            }
        }
        events
    }

    /// Arm with every node already up; returns the run start instant.
    async fn start_run(&mut self, delay: f64, max: f64, t0: Instant) -> Instant {
        self.lines.set_nodes(self.nodes, true);
        self.controller
            .arm(EventConfig::from_secs(delay, max).unwrap(), t0)
            .await
            .unwrap();
        let events = self.drive_until(t0).await;
        assert!(matches!(
            events.as_slice(),
            [(_, ControllerEvent::RunStarted { .. })]
        ));
        assert_eq!(self.controller.state(), ControllerState::Running);
        t0
    }
}

fn ended(events: Vec<(Instant, ControllerEvent)>) -> (Instant, CompletedEvent) {
    let mut found = None;
    for (at, event) in events {
        if let ControllerEvent::RunEnded(completed) = event {
            assert!(found.is_none(), "run ended twice");
            found = Some((at, completed));
        }
    }
    found.expect("run did not end")
}

#[tokio::test]
async fn three_nodes_run_to_max_duration_and_drain() {
    let mut b = bench(3);
    let t0 = Instant::now();
    b.controller
        .arm(EventConfig::from_secs(0.1, 1.0).unwrap(), t0)
        .await
        .unwrap();

    assert!(b.drive_until(t0 + ms(40)).await.is_empty());
    assert_eq!(b.controller.state(), ControllerState::WaitingReady);

    // Nodes come up at t = 0.05 s; the barrier sees them on the 50 ms poll.
    b.lines.set_nodes(3, true);
    let events = b.drive_until(t0 + ms(50)).await;
    let tic = match events.as_slice() {
        [(at, ControllerEvent::RunStarted { session, .. })] => {
            assert_eq!(
                fs::read_link(b.dir.path().join("Images")).unwrap(),
                session.directory
            );
            *at
        }
        other => panic!("unexpected events: {:?}", other),
    };
    assert_eq!(tic, t0 + ms(50));
    assert!(b
        .controller
        .nodes()
        .iter()
        .all(|n| n.state == NodeState::Ready));

    b.drive_until(tic + ms(99)).await;
    assert!(!b.lines.level(Line::NodeEnable(0)));
    b.drive_until(tic + ms(100)).await;
    for i in 0..3 {
        assert!(b.lines.level(Line::NodeEnable(i)));
    }

    assert!(b.drive_until(tic + ms(1000)).await.is_empty());
    assert_eq!(b.controller.state(), ControllerState::Running);

    let (at, completed) = ended(b.drive_until(tic + ms(1010)).await);
    assert_eq!(at, tic + ms(1010));
    assert_eq!(completed.run.end_reasons, EndReasons::MAX_TIME_EXCEEDED);
    assert_eq!(completed.run.elapsed, ms(1010));
    assert!(completed.run.trigger_enabled);
    assert!(completed.run.inactive_nodes.is_empty());
    assert!(completed.nodes.iter().all(|n| n.state == NodeState::Active));
    assert_eq!(b.controller.state(), ControllerState::Draining);

    for i in 0..3 {
        assert!(!b.lines.level(Line::NodeArm(i)));
        assert!(!b.lines.level(Line::NodeEnable(i)));
        assert_eq!(b.lines.rising_edges(Line::NodeEnable(i)), 1);
    }
    assert!(b.lines.level(Line::EndEvent));

    b.drive_until(tic + ms(1015)).await;
    assert_eq!(b.controller.state(), ControllerState::Draining);
    assert!(!b.controller.snapshot().arm_enabled);

    // Nodes are quiet by tic + 1.02 s, but the drain stays open until the
    // end marker (1 s) and the latch reset after it have been released.
    b.lines.set_nodes(3, false);
    assert!(b.drive_until(tic + ms(1020)).await.is_empty());
    assert_eq!(b.controller.state(), ControllerState::Draining);
    assert_eq!(b.controller.snapshot().notice, None);

    assert!(b.drive_until(tic + ms(2015)).await.is_empty());
    assert!(!b.lines.level(Line::EndEvent));
    assert!(b.lines.level(Line::Reset));

    let events = b.drive_until(tic + ms(2020)).await;
    assert!(matches!(
        events.as_slice(),
        [(at, ControllerEvent::Drained)] if *at == tic + ms(2020)
    ));
    assert_eq!(b.controller.state(), ControllerState::Idle);
    assert!(b.controller.snapshot().arm_enabled);
    assert!(!b.lines.level(Line::Reset));
    assert_eq!(b.lines.rising_edges(Line::EndEvent), 1);
    assert_eq!(b.lines.rising_edges(Line::Reset), 2);
}

#[tokio::test]
async fn latch_mid_run_records_only_latch() {
    let mut b = bench(3);
    let tic = b.start_run(0.1, 1.0, Instant::now()).await;

    assert!(b.drive_until(tic + ms(390)).await.is_empty());
    b.lines.set(Line::Latch, true);
    let (at, completed) = ended(b.drive_until(tic + ms(400)).await);

    assert_eq!(at, tic + ms(400));
    assert_eq!(completed.run.end_reasons, EndReasons::LATCH_TRIGGERED);
    assert_eq!(completed.run.elapsed, ms(400));
    assert_eq!(b.controller.latch_trips(), 1);
}

#[tokio::test]
async fn latch_and_timeout_on_same_tick_is_latch() {
    let mut b = bench(2);
    let tic = b.start_run(0.0, 0.05, Instant::now()).await;

    b.drive_until(tic + ms(50)).await;
    b.lines.set(Line::Latch, true);
    let (_, completed) = ended(b.drive_until(tic + ms(60)).await);
    assert_eq!(completed.run.end_reasons, EndReasons::LATCH_TRIGGERED);
}

#[tokio::test]
async fn manual_trigger_ends_within_one_tick() {
    let mut b = bench(3);
    let tic = b.start_run(5.0, 10.0, Instant::now()).await;

    b.drive_until(tic + ms(200)).await;
    assert!(b.controller.request_stop());
    let (at, completed) = ended(b.drive_until(tic + ms(210)).await);

    assert_eq!(at, tic + ms(210));
    assert_eq!(completed.run.end_reasons, EndReasons::MANUAL_TRIGGER);
    assert!(!completed.run.trigger_enabled);

    // The pending enable was cancelled with the run.
    b.lines.set_nodes(3, false);
    b.drive_until(tic + ms(6000)).await;
    assert_eq!(b.controller.state(), ControllerState::Idle);
    for i in 0..3 {
        assert_eq!(b.lines.rising_edges(Line::NodeEnable(i)), 0);
    }
}

#[tokio::test]
async fn inactive_node_ends_run_and_drain_waits_for_the_rest() {
    let mut b = bench(3);
    let tic = b.start_run(0.1, 10.0, Instant::now()).await;

    b.drive_until(tic + ms(290)).await;
    b.lines.set(Line::NodeActive(2), false);
    let (_, completed) = ended(b.drive_until(tic + ms(300)).await);

    assert_eq!(completed.run.end_reasons, EndReasons::NODE_INACTIVE);
    assert_eq!(completed.run.inactive_nodes, vec![2]);
    let states: Vec<NodeState> = completed.nodes.iter().map(|n| n.state).collect();
    assert_eq!(
        states,
        vec![NodeState::Active, NodeState::Active, NodeState::Inactive]
    );

    b.drive_until(tic + ms(400)).await;
    assert_eq!(b.controller.state(), ControllerState::Draining);
    assert_eq!(
        b.controller.snapshot().notice,
        Some(Notice::WaitingForNodes(vec![0, 1]))
    );

    b.lines.set_nodes(3, false);
    b.drive_until(tic + ms(405)).await;
    assert_eq!(b.controller.snapshot().notice, None);
    b.drive_until(tic + ms(1310)).await;
    assert_eq!(b.controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn simultaneous_end_conditions_are_all_recorded() {
    let mut b = bench(2);
    let tic = b.start_run(0.0, 0.1, Instant::now()).await;

    b.drive_until(tic + ms(100)).await;
    b.lines.set(Line::NodeActive(0), false);
    assert!(b.controller.request_stop());
    let (_, completed) = ended(b.drive_until(tic + ms(110)).await);
    assert_eq!(
        completed.run.end_reasons,
        EndReasons::MAX_TIME_EXCEEDED | EndReasons::MANUAL_TRIGGER | EndReasons::NODE_INACTIVE
    );
}

#[tokio::test]
async fn readiness_success_for_any_node_count() {
    for nodes in 1..=5 {
        let mut b = bench(nodes);
        let t0 = Instant::now();
        b.controller
            .arm(EventConfig::from_secs(1.0, 2.0).unwrap(), t0)
            .await
            .unwrap();
        b.drive_until(t0 + ms(495)).await;
        b.lines.set_nodes(nodes, true);
        let events = b.drive_until(t0 + ms(990)).await;

        assert!(
            matches!(events.first(), Some((at, ControllerEvent::RunStarted { .. })) if *at == t0 + ms(500)),
            "{nodes} nodes"
        );
        assert_eq!(b.controller.nodes().len(), nodes);
        assert!(b
            .controller
            .nodes()
            .iter()
            .all(|n| n.state == NodeState::Ready));
    }
}

#[tokio::test]
async fn readiness_success_on_final_poll() {
    let mut b = bench(3);
    let t0 = Instant::now();
    b.controller
        .arm(EventConfig::from_secs(1.0, 2.0).unwrap(), t0)
        .await
        .unwrap();
    b.drive_until(t0 + ms(980)).await;
    b.lines.set_nodes(3, true);
    let events = b.drive_until(t0 + ms(990)).await;
    assert!(matches!(
        events.first(),
        Some((_, ControllerEvent::RunStarted { .. }))
    ));
}

#[tokio::test]
async fn readiness_timeout_marks_only_missing_nodes_failed() {
    let mut b = bench(3);
    b.lines.set(Line::NodeActive(0), true);
    b.lines.set(Line::NodeActive(2), true);
    let t0 = Instant::now();
    b.controller
        .arm(EventConfig::from_secs(0.1, 1.0).unwrap(), t0)
        .await
        .unwrap();

    assert!(b.drive_until(t0 + ms(980)).await.is_empty());
    let events = b.drive_until(t0 + ms(990)).await;
    match events.as_slice() {
        [(_, ControllerEvent::ArmFailed(BuilderError::ReadinessTimeout { failed }))] => {
            assert_eq!(failed, &vec![1]);
        }
        other => panic!("unexpected events: {:?}", other),
    }

    let states: Vec<NodeState> = b.controller.nodes().iter().map(|n| n.state).collect();
    assert_eq!(
        states,
        vec![NodeState::Ready, NodeState::Failed, NodeState::Ready]
    );
    assert_eq!(b.controller.state(), ControllerState::Idle);
    assert_eq!(
        b.controller.snapshot().notice,
        Some(Notice::InactiveNodes(vec![1]))
    );
    for i in 0..3 {
        assert!(!b.lines.level(Line::NodeArm(i)));
        assert_eq!(b.lines.rising_edges(Line::NodeEnable(i)), 0);
    }
    assert_eq!(b.lines.rising_edges(Line::Reset), 1);
    assert_eq!(
        fs::read_link(b.dir.path().join("Images")).unwrap(),
        b.dir.path().join("dump")
    );
}

#[tokio::test]
async fn held_latch_blocks_arm_until_cleared() {
    let mut b = bench(3);
    b.lines.set(Line::Latch, true);
    let t0 = Instant::now();
    let err = b
        .controller
        .arm(EventConfig::from_secs(0.1, 1.0).unwrap(), t0)
        .await
        .unwrap_err();
    assert!(matches!(err, BuilderError::LatchHeld));
    assert_eq!(b.controller.state(), ControllerState::Idle);
    assert_eq!(b.lines.rising_edges(Line::Reset), 1);
    assert_eq!(b.lines.rising_edges(Line::NodeArm(0)), 0);

    b.drive_until(t0 + ms(10)).await;
    assert!(!b.lines.level(Line::Reset));

    b.lines.set(Line::Latch, false);
    b.start_run(0.1, 1.0, t0 + ms(20)).await;
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_line_moves() {
    let mut b = bench(3);
    for (delay, max) in [("abc", "1.0"), ("0.1", ""), ("-1", "1.0"), ("0.1", "inf")] {
        let err = b
            .controller
            .arm_from_input(delay, max, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, BuilderError::InvalidInput(_)), "{delay}/{max}");
    }
    assert!(b.lines.writes().is_empty());
    assert_eq!(b.controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn arm_is_rejected_until_drain_completes() {
    let mut b = bench(2);
    let tic = b.start_run(0.0, 0.02, Instant::now()).await;
    ended(b.drive_until(tic + ms(30)).await);

    let err = b
        .controller
        .arm(EventConfig::from_secs(0.0, 1.0).unwrap(), tic + ms(35))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BuilderError::NotIdle(ControllerState::Draining)
    ));

    b.lines.set_nodes(2, false);
    b.drive_until(tic + ms(1040)).await;
    assert_eq!(b.controller.state(), ControllerState::Idle);

    // Drain checks while Idle change nothing.
    let before = b.controller.snapshot();
    assert!(b
        .controller
        .poll_drain(tic + ms(1045))
        .await
        .unwrap()
        .is_none());
    assert_eq!(b.controller.snapshot(), before);
}

#[tokio::test]
async fn consecutive_events_get_their_own_directories() {
    let mut b = bench(1);
    let mut dirs = Vec::new();
    let mut t = Instant::now();
    for _ in 0..2 {
        let tic = b.start_run(0.0, 0.02, t).await;
        let (_, completed) = ended(b.drive_until(tic + ms(30)).await);
        dirs.push(completed.session.directory.clone());
        b.lines.set_nodes(1, false);
        b.drive_until(tic + ms(1040)).await;
        assert_eq!(b.controller.state(), ControllerState::Idle);
        t = tic + ms(1050);
    }
    assert_ne!(dirs[0], dirs[1]);
    assert!(dirs.iter().all(|d| d.is_dir()));
}

#[tokio::test]
async fn next_event_starts_only_after_teardown_pulses_finish() {
    let mut b = bench(2);
    let tic = b.start_run(0.0, 0.1, Instant::now()).await;
    let (end, _) = ended(b.drive_until(tic + ms(110)).await);
    assert_eq!(end, tic + ms(110));
    b.lines.set_nodes(2, false);

    // Nodes went quiet on the first drain poll, the marker is still high.
    b.drive_until(end + ms(995)).await;
    assert_eq!(b.controller.state(), ControllerState::Draining);
    assert!(!b.controller.snapshot().arm_enabled);
    assert!(b.lines.level(Line::EndEvent));
    let err = b
        .controller
        .arm(EventConfig::from_secs(0.0, 5.0).unwrap(), end + ms(995))
        .await
        .unwrap_err();
    assert!(matches!(err, BuilderError::NotIdle(ControllerState::Draining)));

    let events = b.drive_until(end + ms(1010)).await;
    let drained_at = match events.as_slice() {
        [(at, ControllerEvent::Drained)] => *at,
        other => panic!("unexpected events: {:?}", other),
    };
    assert_eq!(drained_at, end + ms(1010));
    assert!(!b.lines.level(Line::EndEvent));
    assert!(!b.lines.level(Line::Reset));
    let resets = b.lines.rising_edges(Line::Reset);
    assert_eq!(resets, 2);

    // The second event sees only its own start reset, so a latch late in
    // the run is still there to be read.
    let tic2 = b.start_run(0.0, 5.0, drained_at).await;
    assert_eq!(b.lines.rising_edges(Line::Reset), resets + 1);
    assert!(b.drive_until(tic2 + ms(1490)).await.is_empty());
    assert!(!b.lines.level(Line::EndEvent));
    b.lines.set(Line::Latch, true);
    let (_, completed) = ended(b.drive_until(tic2 + ms(1500)).await);
    assert_eq!(completed.run.end_reasons, EndReasons::LATCH_TRIGGERED);
    assert_eq!(b.lines.rising_edges(Line::Reset), resets + 1);
}

#[tokio::test]
async fn shutdown_mid_run_ends_as_manual_trigger() {
    let mut b = bench(3);
    let tic = b.start_run(5.0, 10.0, Instant::now()).await;
    b.drive_until(tic + ms(100)).await;

    let completed = b
        .controller
        .shutdown(tic + ms(105))
        .await
        .unwrap()
        .expect("running event is returned");
    assert!(completed
        .run
        .end_reasons
        .contains(EndReasons::MANUAL_TRIGGER));
    assert_eq!(b.controller.state(), ControllerState::Idle);
    for line in [Line::NodeArm(0), Line::EndEvent, Line::Reset] {
        assert!(!b.lines.level(line), "{line} left high");
    }
    assert_eq!(
        fs::read_link(b.dir.path().join("Images")).unwrap(),
        b.dir.path().join("dump")
    );
    assert!(b.controller.shutdown(tic + ms(110)).await.unwrap().is_none());
}
