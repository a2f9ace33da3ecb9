//! Session teardown and rescan tests
//!
//! Teardown must release every chunk in every queue exactly once and
//! dispose of in-flight executions regardless of completion.

mod common;

use std::sync::Arc;

use chunkscan::scan::{PlanConfig, ScanErrorCode, ScanSession, SessionConfig, SessionState};

use common::{collect_rows, dense_table, rowids, Script, ScriptedDevice};

fn open_gated(device: &ScriptedDevice, windows: usize, budget: usize) -> ScanSession {
    let config = SessionConfig {
        max_async_chunks: budget,
        idle_poll_interval_us: 1,
        ..SessionConfig::with_chunk_size(8)
    };
    ScanSession::open(
        Arc::new(dense_table(8, windows)),
        PlanConfig::with_kernel("k", [0], [0]),
        config,
        Some(device),
    )
    .unwrap()
}

#[test]
fn test_teardown_mid_scan_releases_all_queues_once() {
    let device = ScriptedDevice::new(Script {
        polls_to_complete: 4,
        capacity: 2,
        ..Script::default()
    });
    let mut session = open_gated(&device, 20, 4);

    // One row: some chunks ready, some executing, some pending.
    assert!(session.next().unwrap().is_some());
    let queues = session.queues().unwrap();
    assert!(queues.len() > 0);

    let before = session.arena_stats();
    assert!(before.live() > 0);

    session.end();
    let after = session.arena_stats();
    assert_eq!(after.allocated, before.allocated);
    assert_eq!(after.released, after.allocated);
    assert_eq!(session.metrics().chunks_released, after.allocated);
    assert_eq!(
        device.log.discards(),
        device.log.submits() - device.log.completions()
    );

    // Second end is a no-op.
    session.end();
    assert_eq!(session.arena_stats().released, after.allocated);
    assert_eq!(session.state(), SessionState::Ended);
}

#[test]
fn test_full_scan_releases_each_chunk_once() {
    let device = ScriptedDevice::new(Script::default());
    let mut session = open_gated(&device, 6, 2);
    assert_eq!(collect_rows(&mut session).len(), 48);

    // Drained chunks were released eagerly, before teardown.
    let stats = session.arena_stats();
    assert_eq!(stats.allocated, 6);
    assert_eq!(stats.released, 6);
    // One draining chunk plus at most a budget each of ready and outstanding.
    assert!(stats.peak_live <= 5);

    let metrics = session.end();
    assert_eq!(metrics.chunks_released, 6);
    assert_eq!(device.log.discards(), 0);
}

#[test]
fn test_drop_without_end_tears_down() {
    let device = ScriptedDevice::new(Script {
        polls_to_complete: 3,
        ..Script::default()
    });
    {
        let mut session = open_gated(&device, 10, 4);
        assert!(session.next().unwrap().is_some());
    }
    assert!(device.log.discards() > 0);
    assert_eq!(
        device.log.discards(),
        device.log.submits() - device.log.completions()
    );
}

#[test]
fn test_rescan_replays_and_releases() {
    let device = ScriptedDevice::new(Script::default());
    let mut session = open_gated(&device, 3, 2);

    let first: Vec<i64> = (0..5)
        .map(|_| session.next().unwrap().unwrap().rowid)
        .collect();
    session.rescan().unwrap();
    let all = rowids(&collect_rows(&mut session));

    assert_eq!(first, vec![0, 1, 2, 3, 4]);
    assert_eq!(all, (0..24).collect::<Vec<_>>());
    let stats = session.arena_stats();
    assert_eq!(stats.allocated, 6);
    assert_eq!(stats.live(), 0);
}

#[test]
fn test_next_after_end_is_invalid_state() {
    let device = ScriptedDevice::new(Script::default());
    let mut session = open_gated(&device, 1, 1);
    session.end();
    assert_eq!(
        session.next().unwrap_err().code(),
        ScanErrorCode::InvalidState
    );
}
