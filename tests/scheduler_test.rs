mod helpers;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use helpers::{t0, task, ListSource, RecordingChannel};
use recall_mate::reminder::bridge::{BridgePermission, ClientRegistry, DEFAULT_BRIDGE_TIMEOUT};
use recall_mate::reminder::clock::{ManualClock, TokioClock};
use recall_mate::reminder::dispatch::{
    ChannelKind, DispatchOutcome, Dispatcher, PlatformCapabilities, SuppressReason,
};
use recall_mate::reminder::permission::{PermissionGate, PermissionSource, PermissionState};
use recall_mate::reminder::scheduler::ReminderLoop;
use recall_mate::reminder::window::DueWindow;
use recall_mate::tasks::types::ChangeKind;
use recall_mate::tasks::TaskChange;
use tokio::sync::broadcast;

struct Fixture {
    source: Arc<ListSource>,
    channel: Arc<RecordingChannel>,
    clock: ManualClock,
    gate: PermissionGate,
    reminders: ReminderLoop,
}

fn fixture_with(window: DueWindow, permission: PermissionState) -> Fixture {
    let source = ListSource::new(Vec::new());
    let channel = RecordingChannel::new(ChannelKind::Persistent);
    let clock = ManualClock::new(t0());
    let gate = PermissionGate::new(permission);

    let dispatcher = Dispatcher::new(gate.clone(), PlatformCapabilities::default())
        .with_persistent(channel.clone());
    let reminders = ReminderLoop::builder(
        "foreground",
        source.clone(),
        Arc::new(gate.clone()),
        dispatcher,
    )
    .window(window)
    .clock(Arc::new(clock.clone()))
    .build();

    Fixture {
        source,
        channel,
        clock,
        gate,
        reminders,
    }
}

fn fixture() -> Fixture {
    fixture_with(DueWindow::symmetric(Duration::seconds(30)), PermissionState::Granted)
}

#[tokio::test]
async fn on_time_task_is_notified_exactly_once() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0() + Duration::seconds(15)))]);

    let first = f.reminders.tick().await;
    assert!(first.permission_granted);
    assert_eq!(first.delivered, vec!["a".to_string()]);
    assert!(f.reminders.is_notified("a").await);

    f.clock.advance(Duration::seconds(30));
    let second = f.reminders.tick().await;
    assert_eq!(second.due, 1, "still inside the window after one interval");
    assert_eq!(second.already_notified, 1);
    assert!(second.delivered.is_empty());

    assert_eq!(f.channel.count(), 1);
    assert_eq!(f.channel.titles(), vec!["⏰ task a".to_string()]);
    assert_eq!(f.channel.tags(), vec!["reminder-a".to_string()]);
}

#[tokio::test]
async fn window_boundary_is_inclusive() {
    let f = fixture();
    f.source.set(vec![
        task("edge", Some(t0() + Duration::seconds(30))),
        task("late-edge", Some(t0() - Duration::seconds(30))),
        task("too-early", Some(t0() + Duration::seconds(31))),
        task("unscheduled", None),
    ]);

    let report = f.reminders.tick().await;
    assert_eq!(report.fetched, 4);
    assert_eq!(report.due, 2);
    assert_eq!(report.delivered, vec!["edge".to_string(), "late-edge".to_string()]);
}

#[tokio::test]
async fn denied_permission_skips_the_tick() {
    for state in [PermissionState::Denied, PermissionState::Default] {
        let f = fixture_with(DueWindow::symmetric(Duration::seconds(30)), state);
        f.source.set(vec![task("a", Some(t0()))]);

        let report = f.reminders.tick().await;
        assert!(!report.permission_granted);
        assert!(report.delivered.is_empty());
        assert_eq!(f.reminders.notified_count().await, 0);
        assert_eq!(f.channel.count(), 0);
        assert_eq!(f.source.fetch_count(), 0, "nothing is fetched without permission");

        // the dispatcher on its own also refuses
        let outcome = f.reminders.dispatcher().dispatch("a", None, "a").await;
        assert_eq!(outcome, DispatchOutcome::Suppressed(SuppressReason::NotGranted));
    }
}

#[tokio::test]
async fn grant_after_denial_resumes_delivery() {
    let f = fixture_with(DueWindow::symmetric(Duration::seconds(30)), PermissionState::Denied);
    f.source.set(vec![task("a", Some(t0()))]);

    assert!(!f.reminders.tick().await.permission_granted);
    assert!(!f.reminders.tick().await.permission_granted);

    f.gate.mirror(PermissionState::Granted);
    let report = f.reminders.tick().await;
    assert_eq!(report.delivered, vec!["a".to_string()]);
}

#[tokio::test]
async fn denial_is_reported_once_per_streak() {
    let f = fixture_with(DueWindow::symmetric(Duration::seconds(30)), PermissionState::Denied);
    f.source.set(vec![task("a", Some(t0()))]);

    assert!(f.reminders.tick().await.denial_reported);
    assert!(!f.reminders.tick().await.denial_reported);
    assert!(!f.reminders.tick().await.denial_reported);

    f.gate.mirror(PermissionState::Granted);
    let granted = f.reminders.tick().await;
    assert!(granted.permission_granted);
    assert!(!granted.denial_reported);

    // a new streak is reported again
    f.gate.mirror(PermissionState::Denied);
    assert!(f.reminders.tick().await.denial_reported);
    assert!(!f.reminders.tick().await.denial_reported);
}

#[tokio::test]
async fn lagging_change_feed_clears_every_record() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0())), task("b", Some(t0()))]);
    assert_eq!(f.reminders.tick().await.delivered.len(), 2);

    let reminders = Arc::new(f.reminders);
    let (tx, rx) = broadcast::channel(1);
    let follower = reminders.follow_changes(rx);

    // none of these invalidate a record on their own; overflowing the feed does
    for id in ["x", "y", "z"] {
        tx.send(TaskChange::new(id, ChangeKind::Created)).unwrap();
    }
    drop(tx);
    follower.await.unwrap();

    assert_eq!(reminders.notified_count().await, 0);
    assert!(!reminders.is_notified("a").await);
}

#[tokio::test]
async fn non_invalidating_changes_keep_records() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0()))]);
    f.reminders.tick().await;

    let reminders = Arc::new(f.reminders);
    let (tx, rx) = broadcast::channel(8);
    let follower = reminders.follow_changes(rx);
    tx.send(TaskChange::new("a", ChangeKind::Created)).unwrap();
    drop(tx);
    follower.await.unwrap();

    assert!(reminders.is_notified("a").await);
}

#[tokio::test]
async fn snoozed_task_fires_again_after_clear() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0() + Duration::seconds(10)))]);
    assert_eq!(f.reminders.tick().await.delivered.len(), 1);

    // user snoozes five minutes later; the CRUD layer clears the ledger entry
    f.clock.advance(Duration::minutes(5));
    let t1 = t0() + Duration::minutes(5);
    f.source.set(vec![task("a", Some(t1 + Duration::seconds(10)))]);
    assert!(f.reminders.clear("a").await);
    assert!(!f.reminders.is_notified("a").await);

    let report = f.reminders.tick().await;
    assert_eq!(report.delivered, vec!["a".to_string()]);
    assert_eq!(f.channel.count(), 2);
}

#[tokio::test]
async fn failed_dispatch_is_not_recorded_and_siblings_continue() {
    let f = fixture();
    f.source.set(vec![
        task("a", Some(t0())),
        task("b", Some(t0() + Duration::seconds(5))),
    ]);
    f.channel.reject("reminder-a");

    let report = f.reminders.tick().await;
    assert_eq!(report.failed, vec!["a".to_string()]);
    assert_eq!(report.delivered, vec!["b".to_string()]);
    assert!(!f.reminders.is_notified("a").await);
    assert!(f.reminders.is_notified("b").await);
}

#[tokio::test]
async fn fetch_failure_is_swallowed() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0()))]);
    f.source.fail(true);

    let report = f.reminders.tick().await;
    assert!(report.fetch_failed);
    assert!(report.delivered.is_empty());

    f.source.fail(false);
    let report = f.reminders.tick().await;
    assert!(!report.fetch_failed);
    assert_eq!(report.delivered, vec!["a".to_string()]);
}

#[tokio::test]
async fn ledger_entries_expire_after_retention() {
    // a window wide enough that the task stays due for hours
    let f = fixture_with(DueWindow::symmetric(Duration::hours(3)), PermissionState::Granted);
    f.source.set(vec![task("a", Some(t0()))]);
    assert_eq!(f.reminders.tick().await.delivered.len(), 1);

    f.clock.advance(Duration::minutes(59));
    let report = f.reminders.tick().await;
    assert_eq!(report.already_notified, 1);
    assert_eq!(report.expired, 0);

    f.clock.advance(Duration::minutes(1));
    let report = f.reminders.tick().await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.delivered, vec!["a".to_string()]);
}

#[tokio::test]
async fn concurrent_checks_do_not_double_dispatch() {
    let f = fixture();
    f.source.set(vec![task("a", Some(t0()))]);

    let first = f.reminders.check_now();
    let second = f.reminders.check_now();
    let third = f.reminders.tick();
    let (a, b, c) = tokio::join!(first, second, third);

    let delivered = a.unwrap().delivered.len() + b.unwrap().delivered.len() + c.delivered.len();
    assert_eq!(delivered, 1);
    assert_eq!(f.channel.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn running_loop_checks_on_start_and_every_interval() {
    let source = ListSource::new(vec![task("a", Some(t0() + Duration::seconds(45)))]);
    let channel = RecordingChannel::new(ChannelKind::Direct);
    let gate = PermissionGate::new(PermissionState::Granted);
    let dispatcher =
        Dispatcher::new(gate.clone(), PlatformCapabilities::default()).with_direct(channel.clone());
    let reminders = ReminderLoop::builder("foreground", source.clone(), Arc::new(gate), dispatcher)
        .interval(StdDuration::from_secs(30))
        .clock(Arc::new(TokioClock::starting_at(t0())))
        .build();

    assert!(reminders.start());
    assert!(!reminders.start(), "start while running is a no-op");
    tokio::time::sleep(StdDuration::from_millis(10)).await;
    assert_eq!(source.fetch_count(), 1, "first check runs immediately");
    assert_eq!(channel.count(), 0, "45s out is not due yet");

    tokio::time::sleep(StdDuration::from_secs(30)).await;
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(channel.count(), 1);

    tokio::time::sleep(StdDuration::from_secs(30)).await;
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(channel.count(), 1);

    assert!(reminders.stop());
    tokio::time::sleep(StdDuration::from_secs(120)).await;
    assert_eq!(source.fetch_count(), 3, "no ticks after stop");
    assert!(!reminders.is_running());
    assert!(!reminders.stop());

    // restart checks immediately again
    assert!(reminders.start());
    tokio::time::sleep(StdDuration::from_millis(10)).await;
    assert_eq!(source.fetch_count(), 4);
    reminders.stop();
}

#[tokio::test(start_paused = true)]
async fn bridge_timeout_suppresses_the_whole_tick() {
    let registry = ClientRegistry::new();
    let _silent_foreground = registry.connect();

    let worker_gate = PermissionGate::new(PermissionState::Granted);
    let permission = BridgePermission::new(registry.clone(), worker_gate.clone(), DEFAULT_BRIDGE_TIMEOUT);
    let channel = RecordingChannel::new(ChannelKind::Persistent);
    let source = ListSource::new(vec![task("a", Some(t0())), task("b", Some(t0()))]);
    let dispatcher = Dispatcher::new(worker_gate.clone(), PlatformCapabilities::default())
        .with_persistent(channel.clone());
    let reminders = ReminderLoop::builder("worker", source.clone(), Arc::new(permission), dispatcher)
        .window(DueWindow::new(Duration::seconds(60), Duration::seconds(30)))
        .clock(Arc::new(ManualClock::new(t0())))
        .build();

    let started = tokio::time::Instant::now();
    let report = reminders.tick().await;
    assert!(started.elapsed() >= DEFAULT_BRIDGE_TIMEOUT);
    assert!(!report.permission_granted);
    assert_eq!(channel.count(), 0);
    assert_eq!(reminders.notified_count().await, 0);
    assert!(!worker_gate.is_granted(), "worker mirror fails closed");
}

#[tokio::test]
async fn no_foreground_means_denied() {
    let worker_gate = PermissionGate::new(PermissionState::Granted);
    let permission = BridgePermission::new(ClientRegistry::new(), worker_gate, DEFAULT_BRIDGE_TIMEOUT);
    assert_eq!(permission.current().await, PermissionState::Denied);
}
