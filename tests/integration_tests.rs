//! Integration tests for the audio scheduler
//!
//! These drive the real scheduler and worker thread against a recording
//! backend, with interval minutes shrunk to milliseconds.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_scheduler::playlist::{AudioItem, MoveDirection, Playlist};
use audio_scheduler::scheduler::{Phase, Scheduler, SchedulerStatus, StopOutcome};
use audio_scheduler::store::PlaylistStore;
use audio_scheduler::{AppError, SchedulerApp, SchedulerError};

use common::{fast_settings, sound_file, wait_until, RecordingBackend};

const LONG: u32 = 1_000;

fn scheduler(
    dir: &tempfile::TempDir,
    items: Vec<AudioItem>,
    backend: Arc<RecordingBackend>,
    unit: Duration,
) -> Scheduler {
    Scheduler::new(
        Playlist::from_items(items).into_shared(),
        backend,
        fast_settings(dir.path(), unit),
    )
}

#[test]
fn test_start_then_stop_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(20)));
    let items = vec![
        AudioItem::new(sound_file(dir.path(), "a.wav"), 1).unwrap(),
        AudioItem::new(sound_file(dir.path(), "b.wav"), 1).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(50));

    assert_eq!(scheduler.start().unwrap(), 0);
    assert!(scheduler.is_running());

    let started = Instant::now();
    assert_eq!(scheduler.stop(), StopOutcome::Stopped);
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(scheduler.status(), SchedulerStatus::idle());
    assert!(!scheduler.worker_alive());
}

#[test]
fn test_second_stop_reports_already_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(10)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), 1).unwrap()];
    let scheduler = scheduler(&dir, items, backend, Duration::from_millis(50));

    scheduler.start().unwrap();
    assert_eq!(scheduler.stop(), StopOutcome::Stopped);
    assert_eq!(scheduler.stop(), StopOutcome::AlreadyStopped);
}

#[test]
fn test_second_start_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(10)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), LONG).unwrap()];
    let scheduler = scheduler(&dir, items, backend, Duration::from_millis(50));

    scheduler.start().unwrap();
    assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning)));
    scheduler.stop();
}

#[test]
fn test_interval_is_never_short() {
    let dir = tempfile::tempdir().unwrap();
    let unit = Duration::from_millis(80);
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), 1).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), unit);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 4));
    scheduler.stop();

    let plays = backend.plays();
    for pair in plays.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(gap >= unit, "cycle started early: {:?}", gap);
        // poll granularity plus scheduling noise
        assert!(gap < unit + Duration::from_millis(500), "cycle too late: {:?}", gap);
    }
}

#[test]
fn test_interval_edit_applies_from_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let unit = Duration::from_millis(100);
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), 5).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), unit);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        backend.play_count() == 1 && scheduler.status().phase == Phase::Waiting
    }));

    scheduler.set_interval(0, 1).unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 3));
    scheduler.stop();

    let plays = backend.plays();
    let in_flight = plays[1].1.duration_since(plays[0].1);
    let edited = plays[2].1.duration_since(plays[1].1);
    assert!(in_flight >= unit * 5, "wait in progress was shortened: {:?}", in_flight);
    assert!(edited >= unit, "new interval cut short: {:?}", edited);
    assert!(edited < unit * 4, "new interval not applied: {:?}", edited);
}

#[test]
fn test_missing_file_skipped_once_per_encounter() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let first = sound_file(dir.path(), "first.wav");
    let third = sound_file(dir.path(), "third.wav");
    let items = vec![
        AudioItem::new(&first, 1).unwrap(),
        AudioItem::new(dir.path().join("missing.wav"), 1).unwrap(),
        AudioItem::new(&third, LONG).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        backend.play_count() >= 2 && scheduler.status().phase == Phase::Waiting
    }));

    assert_eq!(backend.played_paths(), vec![first, third]);
    assert_eq!(scheduler.metrics().skips(), 1);
    assert_eq!(scheduler.status().current_index, Some(2));

    assert_eq!(scheduler.stop(), StopOutcome::Stopped);
}

#[test]
fn test_start_skips_leading_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let items = vec![
        AudioItem::new(dir.path().join("gone.wav"), 1).unwrap(),
        AudioItem::new(sound_file(dir.path(), "here.wav"), LONG).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    assert_eq!(scheduler.start().unwrap(), 1);
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 1));
    scheduler.stop();
}

#[test]
fn test_remove_before_current_keeps_logical_item() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let third = sound_file(dir.path(), "c.wav");
    let items = vec![
        AudioItem::new(sound_file(dir.path(), "a.wav"), 1).unwrap(),
        AudioItem::new(sound_file(dir.path(), "b.wav"), 1).unwrap(),
        AudioItem::new(&third, LONG).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        let status = scheduler.status();
        status.current_index == Some(2) && status.phase == Phase::Waiting
    }));

    scheduler.remove_item(0).unwrap();
    let status = scheduler.status();
    assert!(status.running);
    assert_eq!(status.current_index, Some(1));
    assert_eq!(scheduler.playlist_snapshot().get(1).unwrap().path, third);

    assert!(matches!(
        scheduler.remove_item(1),
        Err(SchedulerError::RemoveActiveItem(1))
    ));
    assert!(scheduler.is_running());

    scheduler.stop();
}

#[test]
fn test_reorder_while_running_follows_item() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let items = vec![
        AudioItem::new(sound_file(dir.path(), "a.wav"), LONG).unwrap(),
        AudioItem::new(sound_file(dir.path(), "b.wav"), 1).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        scheduler.status().phase == Phase::Waiting
    }));

    assert_eq!(scheduler.move_item(0, MoveDirection::Down).unwrap(), 1);
    assert_eq!(scheduler.status().current_index, Some(1));

    scheduler.stop();
}

#[test]
fn test_jump_replaces_the_running_worker() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(200)));
    let second = sound_file(dir.path(), "b.wav");
    let items = vec![
        AudioItem::new(sound_file(dir.path(), "a.wav"), LONG).unwrap(),
        AudioItem::new(&second, LONG).unwrap(),
    ];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 1));

    // interrupts the first clip mid-play
    assert_eq!(scheduler.jump_to(1).unwrap(), 1);
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 2));

    assert_eq!(backend.played_paths()[1], second);
    assert_eq!(backend.max_concurrent(), 1);
    assert!(scheduler.is_running());

    scheduler.stop();
}

#[test]
fn test_stop_is_bounded_when_backend_ignores_it() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::stubborn(Duration::from_millis(800)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), 1).unwrap()];
    let mut settings = fast_settings(dir.path(), Duration::from_millis(30));
    settings.stop_timeout = Duration::from_millis(100);
    let scheduler = Scheduler::new(
        Playlist::from_items(items).into_shared(),
        backend.clone(),
        settings,
    );

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 1));

    let started = Instant::now();
    assert_eq!(scheduler.stop(), StopOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(700));
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.status(), SchedulerStatus::idle());

    // the worker is already signalled, so a repeat does not wait again
    let repeated = Instant::now();
    assert_eq!(scheduler.stop(), StopOutcome::AlreadyStopped);
    assert!(repeated.elapsed() < Duration::from_millis(50));

    // once the clip ends the straggler exits without touching the cursor
    assert!(wait_until(Duration::from_secs(5), || !scheduler.worker_alive()));
    assert_eq!(scheduler.status(), SchedulerStatus::idle());

    // the straggler is joined before the next run begins
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 2));
    assert_eq!(backend.max_concurrent(), 1);
}

#[test]
fn test_alert_plays_before_each_clip() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let alert = sound_file(dir.path(), "alert.wav");
    let clip = sound_file(dir.path(), "a.wav");
    let items = vec![AudioItem::new(&clip, 1).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 4));
    scheduler.stop();

    let played = backend.played_paths();
    assert_eq!(&played[..4], &[alert.clone(), clip.clone(), alert, clip]);
}

#[test]
fn test_alert_disabled_plays_clip_only() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    sound_file(dir.path(), "alert.wav");
    let clip = sound_file(dir.path(), "a.wav");
    let items = vec![AudioItem::new(&clip, 1).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));
    scheduler.set_alert_enabled(false);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 2));
    scheduler.stop();

    assert!(backend.played_paths().iter().all(|p| *p == clip));
}

#[test]
fn test_worker_stops_when_files_disappear() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let clip = sound_file(dir.path(), "a.wav");
    let items = vec![AudioItem::new(&clip, 1).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(50));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 1));
    std::fs::remove_file(&clip).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        scheduler.status() == SchedulerStatus::idle()
    }));
    assert_eq!(scheduler.stop(), StopOutcome::AlreadyStopped);
}

#[test]
fn test_drop_joins_worker() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let items = vec![AudioItem::new(sound_file(dir.path(), "a.wav"), LONG).unwrap()];
    let scheduler = scheduler(&dir, items, Arc::clone(&backend), Duration::from_millis(30));

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() == 1));
    drop(scheduler);

    // only the test's handle is left once the worker has been joined
    assert_eq!(Arc::strong_count(&backend), 1);
}

#[test]
fn test_saved_state_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("audio_list.json");
    let settings = fast_settings(dir.path(), Duration::from_millis(30));
    let first = sound_file(dir.path(), "a.wav");
    let second = sound_file(dir.path(), "b.wav");

    {
        let app = SchedulerApp::new(
            Arc::new(RecordingBackend::new(Duration::ZERO)),
            PlaylistStore::new(&store_path),
            settings.clone(),
        );
        app.add_item(&first, 5).unwrap();
        app.add_item(&second, 10).unwrap();
        app.set_alert_enabled(true);
        app.set_volume(0.7);
    }

    let app = SchedulerApp::new(
        Arc::new(RecordingBackend::new(Duration::ZERO)),
        PlaylistStore::new(&store_path),
        settings,
    );

    let playlist = app.playlist();
    assert_eq!(
        playlist.items(),
        &[
            AudioItem::new(&first, 5).unwrap(),
            AudioItem::new(&second, 10).unwrap()
        ]
    );
    let options = app.scheduler().options();
    assert!(options.alert_enabled);
    assert!((options.volume - 0.7).abs() < f32::EPSILON);
}

#[test]
fn test_legacy_list_loads_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("audio_list.json");
    std::fs::write(
        &store_path,
        r#"[{"path": "a.wav", "interval": 5}, {"path": "b.wav", "interval": 10}]"#,
    )
    .unwrap();

    let app = SchedulerApp::new(
        Arc::new(RecordingBackend::new(Duration::ZERO)),
        PlaylistStore::new(&store_path),
        fast_settings(dir.path(), Duration::from_millis(30)),
    );

    assert_eq!(app.playlist().len(), 2);
    let options = app.scheduler().options();
    assert!(options.alert_enabled);
    assert_eq!(options.volume, 0.5);
    assert!(!app.schedule_window().enabled);
}

#[test]
fn test_app_rejects_start_on_empty_playlist() {
    let dir = tempfile::tempdir().unwrap();
    let app = SchedulerApp::new(
        Arc::new(RecordingBackend::new(Duration::ZERO)),
        PlaylistStore::new(dir.path().join("audio_list.json")),
        fast_settings(dir.path(), Duration::from_millis(30)),
    );

    assert!(matches!(
        app.start(),
        Err(AppError::Scheduler(SchedulerError::EmptyPlaylist))
    ));
    assert_eq!(app.stop(), StopOutcome::AlreadyStopped);
}

#[test]
fn test_shutdown_stops_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::new(Duration::from_millis(5)));
    let store_path = dir.path().join("audio_list.json");
    let app = SchedulerApp::new(
        backend.clone(),
        PlaylistStore::new(&store_path),
        fast_settings(dir.path(), Duration::from_millis(30)),
    );

    app.add_item(sound_file(dir.path(), "a.wav"), LONG).unwrap();
    app.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || backend.play_count() >= 1));

    assert_eq!(app.shutdown(), StopOutcome::Stopped);
    assert!(!app.status().running);
    assert!(store_path.exists());
}
