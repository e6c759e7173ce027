//! Integration tests for the alert scheduler
//!
//! These drive the public scheduler facade against the recording mock
//! driver and check ordering, exclusivity and cancellation behavior.

use crate::test_utils::*;
use r_alertsound::audio::{AudioDeviceDescriptor, TransportKind};
use r_alertsound::catalog::SoundCategory;
use r_alertsound::config::Settings;
use r_alertsound::scheduler::{SchedulerError, FAULT_PRIORITY, MIN_CYCLE_INTERVAL};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod scheduler_integration_tests {
    use super::*;

    /// Blocks the output with a stream that never finishes on its own.
    async fn occupy_output(
        driver: &MockAudioDriver,
        scheduler: &r_alertsound::scheduler::AlertScheduler,
    ) -> CancellationToken {
        driver.set_clip("blocker", None);
        let token = CancellationToken::new();
        let blocker = scheduler.catalog().find("blocker");
        scheduler.schedule(blocker, 0, token.clone()).unwrap();
        assert!(wait_until(WAIT, || scheduler.status().is_playing()).await);
        token
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_alerts_play_in_fifo_order() {
        let driver = MockAudioDriver::new(Duration::from_millis(20));
        let scheduler = build_scheduler(
            &driver,
            Settings::default(),
            vec![
                asset("A", SoundCategory::None),
                asset("B", SoundCategory::None),
                asset("C", SoundCategory::None),
            ],
        );

        for name in ["A", "B", "C"] {
            scheduler.schedule(scheduler.catalog().find(name), 0, CancellationToken::new()).unwrap();
        }

        assert!(wait_until(WAIT, || driver.plays().len() == 3 && is_idle(&scheduler)).await);
        assert_eq!(driver.plays(), vec!["A", "B", "C"]);
        assert_eq!(driver.open_handles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_evicts_oldest_pending() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = build_scheduler(
            &driver,
            settings_with_capacity(2),
            vec![
                asset("blocker", SoundCategory::None),
                asset("A", SoundCategory::None),
                asset("B", SoundCategory::None),
                asset("C", SoundCategory::None),
            ],
        );
        let blocker = occupy_output(&driver, &scheduler).await;

        for name in ["A", "B", "C"] {
            scheduler.schedule(scheduler.catalog().find(name), 0, CancellationToken::new()).unwrap();
        }
        let pending: Vec<String> = scheduler.status().queue.items.into_iter().map(|i| i.asset_name).collect();
        assert_eq!(pending, vec!["B", "C"]);

        blocker.cancel();
        assert!(wait_until(WAIT, || driver.plays().len() == 3 && is_idle(&scheduler)).await);
        assert_eq!(driver.plays(), vec!["blocker", "B", "C"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_active_session_under_concurrent_scheduling() {
        let driver = MockAudioDriver::new(Duration::from_millis(5));
        let names: Vec<String> = (0..20).map(|n| format!("alert{}", n)).collect();
        let scheduler = build_scheduler(
            &driver,
            settings_with_capacity(50),
            names.iter().map(|n| asset(n, SoundCategory::None)).collect(),
        );

        let mut callers = Vec::new();
        for name in names.clone() {
            let scheduler = scheduler.clone();
            callers.push(tokio::spawn(async move {
                let asset = scheduler.catalog().find(&name);
                scheduler.schedule(asset, 0, CancellationToken::new())
            }));
        }
        for caller in callers {
            assert!(caller.await.unwrap().is_ok());
        }

        assert!(wait_until(WAIT, || driver.plays().len() == 20 && is_idle(&scheduler)).await);
        assert_eq!(driver.max_open_handles(), 1);
        assert_eq!(driver.open_handles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_all_is_idempotent() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = build_scheduler(
            &driver,
            Settings::default(),
            vec![asset("blocker", SoundCategory::None), asset("next", SoundCategory::None)],
        );
        scheduler.stop_all().await.unwrap();

        let _blocker = occupy_output(&driver, &scheduler).await;
        scheduler.schedule(scheduler.catalog().find("next"), 0, CancellationToken::new()).unwrap();

        scheduler.stop_all().await.unwrap();
        scheduler.stop_all().await.unwrap();

        assert!(is_idle(&scheduler));
        assert_eq!(driver.open_handles(), 0);
        assert!(scheduler.catalog().assets().iter().all(|a| !a.is_playing()));
        assert_eq!(driver.plays(), vec!["blocker"]);
        let stops = driver.events().iter().filter(|e| matches!(e, DriverEvent::Stop { .. })).count();
        assert_eq!(stops, 1);

        // The scheduler keeps working after a stop.
        scheduler.schedule(scheduler.catalog().find("next"), 0, CancellationToken::new()).unwrap();
        assert!(wait_until(WAIT, || driver.plays().len() == 2 && is_idle(&scheduler)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelling_continuous_loop_is_prompt_and_loop_continues() {
        let driver = MockAudioDriver::new(Duration::from_millis(30));
        let mut settings = Settings::default();
        settings.intrusion.auto_stop = false;
        let scheduler = build_scheduler(
            &driver,
            settings,
            vec![asset("intrusion", SoundCategory::Intrusion), asset("after", SoundCategory::None)],
        );

        let token = CancellationToken::new();
        scheduler.notify_intrusion(token.clone()).unwrap();
        scheduler.schedule(scheduler.catalog().find("after"), 0, CancellationToken::new()).unwrap();

        // Continuous loop replays past several clip lengths.
        assert!(wait_until(WAIT, || driver.plays().len() >= 3).await);
        assert!(driver.plays().iter().all(|p| p == "intrusion"));

        let cancelled_at = Instant::now();
        token.cancel();
        assert!(wait_until(WAIT, || driver.plays().last().map(String::as_str) == Some("after")).await);
        assert!(cancelled_at.elapsed() < Duration::from_millis(500));

        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);
        assert_eq!(driver.max_open_handles(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_category_leaves_active_session() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let mut settings = settings_with_capacity(10);
        settings.fault.duration_secs = 0.0;
        let scheduler = build_scheduler(
            &driver,
            settings,
            vec![
                asset("blocker", SoundCategory::Intrusion),
                asset("i1", SoundCategory::Intrusion),
                asset("f1", SoundCategory::Fault),
                asset("i2", SoundCategory::Intrusion),
            ],
        );
        let blocker = occupy_output(&driver, &scheduler).await;
        for name in ["i1", "f1", "i2"] {
            scheduler.schedule(scheduler.catalog().find(name), 0, CancellationToken::new()).unwrap();
        }

        assert_eq!(scheduler.clear_category(SoundCategory::Intrusion), 2);
        let status = scheduler.status();
        let pending: Vec<String> = status.queue.items.iter().map(|i| i.asset_name.clone()).collect();
        assert_eq!(pending, vec!["f1"]);
        assert_eq!(status.playing.map(|p| p.asset_name), Some("blocker".to_string()));

        blocker.cancel();
        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);
        assert_eq!(driver.plays(), vec!["blocker", "f1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_device_switch_stops_old_handle_before_opening_new() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = build_scheduler(
            &driver,
            Settings::default(),
            vec![asset("blocker", SoundCategory::None), asset("next", SoundCategory::None)],
        );
        let usb = AudioDeviceDescriptor::new("USB Speaker", TransportKind::Direct, "hw:1,0");
        scheduler.devices().refresh(&MockEnumerator(vec![usb.clone()])).await.unwrap();

        let _blocker = occupy_output(&driver, &scheduler).await;
        scheduler.select_device(usb.clone()).await.unwrap();
        assert_eq!(scheduler.devices().selected(), Some(usb.clone()));
        assert!(is_idle(&scheduler));

        scheduler.schedule(scheduler.catalog().find("next"), 0, CancellationToken::new()).unwrap();
        assert!(wait_until(WAIT, || driver.plays().len() == 2 && is_idle(&scheduler)).await);

        let events = driver.events();
        let old_handle = match &events[0] {
            DriverEvent::Open { handle, device: None, .. } => *handle,
            other => panic!("expected default open first, got {:?}", other),
        };
        let position = |wanted: &DriverEvent| events.iter().position(|e| e == wanted);
        let stop = position(&DriverEvent::Stop { handle: old_handle }).expect("old stream stopped");
        let close = position(&DriverEvent::Close { handle: old_handle }).expect("old handle closed");
        let reopen = events
            .iter()
            .position(|e| matches!(e, DriverEvent::Open { device: Some(name), .. } if name == "USB Speaker"))
            .expect("new device opened");
        assert!(stop < close && close < reopen);
        assert_eq!(
            events.iter().filter(|e| **e == DriverEvent::Stop { handle: old_handle }).count(),
            1
        );
        assert_eq!(driver.max_open_handles(), 1);
    }

    #[tokio::test]
    async fn test_selecting_unknown_device_is_rejected() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = build_scheduler(&driver, Settings::default(), vec![]);
        let ghost = AudioDeviceDescriptor::new("Ghost", TransportKind::Basic, "hw:9,0");
        let result = scheduler.select_device(ghost).await;
        assert!(matches!(result, Err(SchedulerError::InvalidArgument(_))));
        assert!(scheduler.devices().selected().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_falls_back_to_event_driven_default() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        driver.fail_transport(TransportKind::Direct);
        let scheduler = build_scheduler(&driver, Settings::default(), vec![asset("beep", SoundCategory::None)]);
        let usb = AudioDeviceDescriptor::new("USB Speaker", TransportKind::Direct, "hw:1,0");
        scheduler.devices().refresh(&MockEnumerator(vec![usb.clone()])).await.unwrap();
        scheduler.select_device(usb).await.unwrap();

        scheduler.schedule(scheduler.catalog().find("beep"), 0, CancellationToken::new()).unwrap();
        assert!(wait_until(WAIT, || driver.plays().len() == 1 && is_idle(&scheduler)).await);

        let events = driver.events();
        assert_eq!(
            events[0],
            DriverEvent::OpenFailed { device: Some("USB Speaker".to_string()), kind: TransportKind::Direct }
        );
        assert!(matches!(events[1], DriverEvent::Open { device: None, kind: TransportKind::EventDriven, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unopenable_output_does_not_stall_queue() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        driver.fail_transport(TransportKind::EventDriven);
        let scheduler = build_scheduler(
            &driver,
            Settings::default(),
            vec![asset("a", SoundCategory::None), asset("b", SoundCategory::None)],
        );
        scheduler.schedule(scheduler.catalog().find("a"), 0, CancellationToken::new()).unwrap();
        scheduler.schedule(scheduler.catalog().find("b"), 0, CancellationToken::new()).unwrap();

        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);
        let failures = driver.events().iter().filter(|e| matches!(e, DriverEvent::OpenFailed { .. })).count();
        assert_eq!(failures, 2);
        assert!(driver.plays().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_mid_stream_error_moves_on_to_next_alert() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        driver.fail_mid_stream("bad");
        let mut settings = Settings::default();
        settings.fault.file_name = "bad".to_string();
        let scheduler = build_scheduler(
            &driver,
            settings,
            vec![asset("bad", SoundCategory::Fault), asset("good", SoundCategory::None)],
        );

        scheduler.notify_fault(CancellationToken::new()).unwrap();
        scheduler.schedule(scheduler.catalog().find("good"), 0, CancellationToken::new()).unwrap();

        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);
        // The failing bounded loop is not replayed after the error.
        assert_eq!(driver.plays(), vec!["bad", "good"]);
        assert_eq!(driver.open_handles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_loop_ends_near_its_duration() {
        let driver = MockAudioDriver::new(Duration::from_millis(100));
        let mut settings = Settings::default();
        settings.fault.duration_secs = 0.35;
        let scheduler = build_scheduler(&driver, settings, vec![asset("fault", SoundCategory::Fault)]);

        let started = Instant::now();
        let id = scheduler.notify_fault(CancellationToken::new()).unwrap();
        assert_eq!(id.len(), 8);
        assert!(wait_until(WAIT, || scheduler.status().is_playing()).await);
        assert_eq!(scheduler.status().playing.map(|p| p.correlation_id), Some(id));

        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "ended too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "ended too late: {:?}", elapsed);
        assert!(driver.plays().len() >= 3);
        assert!(driver.plays().iter().all(|p| p == "fault"));
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = build_scheduler(&driver, Settings::default(), vec![asset("intrusion", SoundCategory::Intrusion)]);

        assert!(matches!(
            scheduler.schedule(None, FAULT_PRIORITY, CancellationToken::new()),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            scheduler.notify_fault(CancellationToken::new()),
            Err(SchedulerError::AssetNotFound(_))
        ));
        assert!(matches!(
            scheduler.notify(SoundCategory::None, CancellationToken::new()),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(scheduler.set_capacity(0), Err(SchedulerError::InvalidArgument(_))));
        assert_eq!(scheduler.status().queue.capacity, 3);
        assert!(is_idle(&scheduler));
    }

    fn blocking_scheduler(driver: &MockAudioDriver) -> r_alertsound::scheduler::AlertScheduler {
        build_scheduler(
            driver,
            Settings::default(),
            vec![asset("blocker", SoundCategory::None), asset("next", SoundCategory::None)],
        )
    }

    /// Two overlapping stops must both wait until the device is closed.
    async fn overlapping_stops_both_wait_for_release() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = blocking_scheduler(&driver);
        let _blocker = occupy_output(&driver, &scheduler).await;

        let second = scheduler.clone();
        let (first, open_after_second) = tokio::time::timeout(WAIT, async {
            tokio::join!(scheduler.stop_all(), async {
                second.stop_all().await.unwrap();
                driver.open_handles()
            })
        })
        .await
        .expect("overlapping stop_all calls finished");

        first.unwrap();
        assert_eq!(open_after_second, 0);
        assert_eq!(driver.open_handles(), 0);
        assert!(is_idle(&scheduler));
    }

    #[tokio::test]
    async fn test_overlapping_stop_all_waits_for_release_current_thread() {
        overlapping_stops_both_wait_for_release().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_stop_all_waits_for_release_multi_thread() {
        overlapping_stops_both_wait_for_release().await;
    }

    /// A stop racing a device switch: both finish, the old handle is closed
    /// before the new device opens.
    async fn stop_racing_device_switch() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = blocking_scheduler(&driver);
        let usb = AudioDeviceDescriptor::new("USB Speaker", TransportKind::Direct, "hw:1,0");
        scheduler.devices().refresh(&MockEnumerator(vec![usb.clone()])).await.unwrap();
        let _blocker = occupy_output(&driver, &scheduler).await;

        let (stopped, switched) = tokio::time::timeout(WAIT, async {
            tokio::join!(scheduler.stop_all(), async {
                let result = scheduler.select_device(usb.clone()).await;
                (result, driver.open_handles())
            })
        })
        .await
        .expect("stop_all and select_device finished");

        stopped.unwrap();
        let (result, open_after_switch) = switched;
        result.unwrap();
        assert_eq!(open_after_switch, 0);
        assert_eq!(scheduler.devices().selected(), Some(usb.clone()));

        scheduler.schedule(scheduler.catalog().find("next"), 0, CancellationToken::new()).unwrap();
        assert!(wait_until(WAIT, || driver.plays().len() == 2 && is_idle(&scheduler)).await);
        let last_open = driver
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::Open { device, .. } => Some(device),
                _ => None,
            })
            .last();
        assert_eq!(last_open, Some(Some("USB Speaker".to_string())));
        assert_eq!(driver.max_open_handles(), 1);

        // Reverting while idle takes the fast path.
        tokio::time::timeout(WAIT, scheduler.reset_device()).await.expect("reset finished").unwrap();
        assert!(scheduler.devices().selected().is_none());
    }

    #[tokio::test]
    async fn test_stop_all_racing_select_device_current_thread() {
        stop_racing_device_switch().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_all_racing_select_device_multi_thread() {
        stop_racing_device_switch().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reset_device_while_playing_releases_first() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        let scheduler = blocking_scheduler(&driver);
        let usb = AudioDeviceDescriptor::new("USB Speaker", TransportKind::Direct, "hw:1,0");
        scheduler.devices().refresh(&MockEnumerator(vec![usb.clone()])).await.unwrap();
        scheduler.select_device(usb).await.unwrap();
        let _blocker = occupy_output(&driver, &scheduler).await;

        tokio::time::timeout(WAIT, scheduler.reset_device()).await.expect("reset finished").unwrap();
        assert_eq!(driver.open_handles(), 0);
        assert!(scheduler.devices().selected().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_clip_loop_is_paced() {
        let driver = MockAudioDriver::new(Duration::from_millis(10));
        driver.set_clip("blip", Some(Duration::ZERO));
        let mut settings = Settings::default();
        settings.intrusion.file_name = "blip".to_string();
        settings.intrusion.auto_stop = false;
        let scheduler = build_scheduler(&driver, settings, vec![asset("blip", SoundCategory::Intrusion)]);

        let token = CancellationToken::new();
        scheduler.notify_intrusion(token.clone()).unwrap();
        tokio::time::sleep(MIN_CYCLE_INTERVAL * 6).await;
        token.cancel();
        assert!(wait_until(WAIT, || is_idle(&scheduler)).await);

        let cycles = driver.plays().len();
        assert!(cycles >= 2, "loop stalled after {} cycles", cycles);
        assert!(cycles <= 10, "empty clip replayed {} times", cycles);
    }
}
