// src/link/tests.rs

use super::*;
use crate::display::{Point, Rect, StaticTopology};
use crate::source::ManualDriver;
use std::sync::mpsc::{channel, Receiver};
use test_log::test;

fn display(id: u32, x: f64, primary: bool) -> DisplayInfo {
    DisplayInfo {
        id: DisplayId(id),
        bounds: Rect {
            x,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        },
        refresh_hz: Some(60.0),
        is_primary: primary,
        name: format!("display-{}", id),
    }
}

/// A link over a two-display topology (primary at the origin, secondary to
/// its right) driven by a manual source.
fn manual_link() -> (RefreshLink, Arc<ManualDriver>, Arc<StaticTopology>) {
    let topology = Arc::new(StaticTopology::new(vec![
        display(1, 0.0, true),
        display(2, 1920.0, false),
    ]));
    let driver = Arc::new(ManualDriver::new());
    let link = RefreshLink::new(topology.clone(), driver.clone(), LinkConfig::default());
    (link, driver, topology)
}

/// A callback that forwards every invocation to a channel the test drains.
fn recording_callback() -> (
    impl FnMut(FrameTiming) + Send + 'static,
    Receiver<FrameTiming>,
) {
    let (tx, rx) = channel();
    let callback = move |timing: FrameTiming| {
        let _ = tx.send(timing);
    };
    (callback, rx)
}

fn recv_one(rx: &Receiver<FrameTiming>) -> FrameTiming {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("expected a tick delivery")
}

fn assert_no_delivery(rx: &Receiver<FrameTiming>) {
    thread::sleep(Duration::from_millis(50));
    assert!(
        rx.try_recv().is_err(),
        "callback was invoked when it should not have been"
    );
}

fn wait_until_stopped(link: &RefreshLink) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while link.is_running() {
        assert!(Instant::now() < deadline, "link did not stop in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn it_should_track_running_state_across_start_and_stop() {
    let (link, _driver, _topology) = manual_link();
    let (callback, _rx) = recording_callback();

    assert!(!link.is_running());
    link.start(callback).unwrap();
    assert!(link.is_running());
    link.stop();
    assert!(!link.is_running());
    // stop is idempotent from any state.
    link.stop();
    assert!(!link.is_running());
}

#[test]
fn it_should_reject_start_while_already_running() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    let (second_callback, second_rx) = recording_callback();
    assert_eq!(link.start(second_callback), Err(LinkError::AlreadyRunning));

    // The original callback keeps receiving; the rejected one never does.
    assert!(link.is_running());
    assert!(driver.tick(DisplayId(1)));
    recv_one(&rx);
    assert!(second_rx.try_recv().is_err());
}

#[test]
fn it_should_deliver_timing_with_strictly_increasing_timestamps() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    let base = Instant::now();
    assert!(driver.tick_at(DisplayId(1), base));
    assert!(driver.tick_at(DisplayId(1), base + Duration::from_millis(16)));
    assert!(driver.tick_at(DisplayId(1), base + Duration::from_millis(33)));

    let first = recv_one(&rx);
    let second = recv_one(&rx);
    let third = recv_one(&rx);

    assert!(first.now < second.now && second.now < third.now);
    assert!(first.frame_out <= second.frame_out && second.frame_out <= third.frame_out);

    // First period is the nominal 60 Hz interval, later ones are measured.
    assert_eq!(first.period, Duration::from_secs_f64(1.0 / 60.0));
    assert_eq!(second.period, Duration::from_millis(16));
    assert_eq!(third.period, Duration::from_millis(17));
    assert!([first, second, third].iter().all(|t| t.display == DisplayId(1)));
}

#[test]
fn it_should_not_invoke_the_callback_after_stop_returns() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    assert!(driver.tick(DisplayId(1)));
    recv_one(&rx);

    link.stop();
    assert!(!link.is_running());
    // The source is gone, so injection has nowhere to deliver.
    assert!(!driver.tick(DisplayId(1)));
    assert_no_delivery(&rx);
}

#[test]
fn it_should_fail_to_start_with_no_displays_attached() {
    let topology = Arc::new(StaticTopology::new(Vec::new()));
    let driver = Arc::new(ManualDriver::new());
    let link = RefreshLink::new(topology, driver, LinkConfig::default());

    let (callback, rx) = recording_callback();
    assert!(matches!(
        link.start(callback),
        Err(LinkError::SourceUnavailable(_))
    ));
    assert!(!link.is_running());
    assert_no_delivery(&rx);
}

#[test]
fn it_should_retarget_to_the_display_under_the_pointer_while_running() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();
    assert_eq!(link.linked_display(), Some(DisplayId(1)));

    let base = Instant::now();
    assert!(driver.tick_at(DisplayId(1), base));
    let before = recv_one(&rx);

    // Pointer sits on the secondary display.
    link.link_to_display_under_pointer(&PointerSnapshot::at(2500.0, 500.0))
        .unwrap();
    assert!(link.is_running());
    assert_eq!(link.linked_display(), Some(DisplayId(2)));
    assert_eq!(driver.opened(), vec![DisplayId(1), DisplayId(2)]);

    // The old source is fully torn down; only the new one delivers.
    assert!(!driver.tick(DisplayId(1)));
    assert!(driver.tick_at(DisplayId(2), base + Duration::from_millis(30)));
    let after = recv_one(&rx);

    assert_eq!(before.display, DisplayId(1));
    assert_eq!(after.display, DisplayId(2));
    assert!(before.now < after.now, "tick windows must not overlap");
}

#[test]
fn it_should_leave_the_binding_unchanged_when_the_pointer_misses() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    let miss = link.link_to_display_under_pointer(&PointerSnapshot::at(-50.0, -50.0));
    assert_eq!(
        miss,
        Err(LinkError::NoDisplayAtLocation(Point::new(-50.0, -50.0)))
    );

    // Binding, state, and delivery are all untouched.
    assert!(link.is_running());
    assert_eq!(link.linked_display(), Some(DisplayId(1)));
    assert_eq!(driver.opened(), vec![DisplayId(1)]);
    assert!(driver.tick(DisplayId(1)));
    assert_eq!(recv_one(&rx).display, DisplayId(1));
}

#[test]
fn it_should_remember_a_retarget_issued_while_stopped() {
    let (link, driver, _topology) = manual_link();

    link.link_to_display_under_pointer(&PointerSnapshot::at(2500.0, 500.0))
        .unwrap();
    assert!(!link.is_running());
    assert_eq!(link.linked_display(), Some(DisplayId(2)));

    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();
    assert_eq!(driver.opened(), vec![DisplayId(2)]);
    assert!(driver.tick(DisplayId(2)));
    assert_eq!(recv_one(&rx).display, DisplayId(2));
}

#[test]
fn it_should_treat_a_same_display_retarget_as_a_cheap_no_op() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    link.link_to_primary().unwrap();
    assert_eq!(driver.opened(), vec![DisplayId(1)], "source must not be rebuilt");
    assert!(driver.tick(DisplayId(1)));
    recv_one(&rx);
}

#[test]
fn it_should_restart_with_a_fresh_callback() {
    let (link, driver, _topology) = manual_link();

    let (first_callback, first_rx) = recording_callback();
    link.start(first_callback).unwrap();
    assert!(driver.tick(DisplayId(1)));
    recv_one(&first_rx);
    link.stop();

    let (second_callback, second_rx) = recording_callback();
    link.start(second_callback).unwrap();
    assert!(driver.tick(DisplayId(1)));
    recv_one(&second_rx);

    // The first callback was released at stop; nothing further reaches it.
    assert!(first_rx.try_recv().is_err());
    link.stop();
}

#[test]
fn it_should_halt_delivery_when_the_callback_panics() {
    let (link, driver, _topology) = manual_link();
    let (notify_tx, notify_rx) = channel();
    link.start(move |_timing| {
        let _ = notify_tx.send(());
        panic!("animation callback exploded");
    })
    .unwrap();

    assert!(driver.tick(DisplayId(1)));
    notify_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback never ran");

    wait_until_stopped(&link);

    // The link stays usable: a restart binds a fresh source and callback.
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();
    assert!(driver.tick(DisplayId(1)));
    recv_one(&rx);
}

#[test]
fn it_should_stop_when_the_linked_display_disappears() {
    let (link, driver, _topology) = manual_link();
    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    assert!(driver.tick(DisplayId(1)));
    recv_one(&rx);

    assert!(driver.lose_display(DisplayId(1)));
    wait_until_stopped(&link);
    assert_no_delivery(&rx);
}

#[test]
fn it_should_support_stop_called_from_inside_the_callback() {
    let topology = Arc::new(StaticTopology::new(vec![display(1, 0.0, true)]));
    let driver = Arc::new(ManualDriver::new());
    let link = Arc::new(RefreshLink::new(
        topology,
        driver.clone(),
        LinkConfig::default(),
    ));

    let (notify_tx, notify_rx) = channel();
    let link_inside = link.clone();
    link.start(move |_timing| {
        link_inside.stop();
        let _ = notify_tx.send(());
    })
    .unwrap();

    assert!(driver.tick(DisplayId(1)));
    notify_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback never ran");

    wait_until_stopped(&link);
    // A later external stop reaps the exited thread and stays a no-op.
    link.stop();
    assert!(!link.is_running());
}

#[test]
fn it_should_deliver_real_timer_ticks_end_to_end() {
    let topology = Arc::new(StaticTopology::new(vec![DisplayInfo {
        refresh_hz: Some(100.0),
        ..display(1, 0.0, true)
    }]));
    let link = RefreshLink::with_timer(topology, LinkConfig::default());

    let (callback, rx) = recording_callback();
    link.start(callback).unwrap();

    let first = recv_one(&rx);
    let second = recv_one(&rx);
    let third = recv_one(&rx);
    assert!(first.now < second.now && second.now < third.now);
    assert!(third.period <= Duration::from_millis(100));

    link.stop();
    assert!(!link.is_running());
    assert_no_delivery(&rx);
}
