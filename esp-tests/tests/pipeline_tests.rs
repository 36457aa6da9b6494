//! Integration Tests für Handoff und Publish
//!
//! Der Ingestion-Schritt und der Publish-Schritt laufen hier abwechselnd im
//! selben Thread, so wie die beiden Tasks auf einem Executor.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{MemoryBackend, MockBroker, MockClock, MockDisplay, MockLink, VirtualClock};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use esp_core::link::encode_sensor_frame;
use esp_core::pipeline::{DISPLAY_TOGGLE_MS, PublishError, ingest_once};
use esp_core::{
    BrokerError, CalendarTime, ConfigStore, DisplayRotation, FrameSlot, Publisher, SensorFrame,
    TOPIC_SENSOR, TimeSource,
};

fn frame(id: &str, moisture: i32) -> SensorFrame {
    SensorFrame::new(id, 20.0, 50.0, moisture)
}

// ============================================================================
// Tests: Latest-wins
// ============================================================================

#[test]
fn test_two_frames_before_publish_yield_one_publish() {
    let clock = VirtualClock::new();
    let mut link = MockLink::new(&clock);
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::live();
    let publisher = Publisher::new("H-1");

    link.feed(&encode_sensor_frame(&frame("F1", 1)));
    block_on(ingest_once(&mut link, &slot)).unwrap();
    link.feed(&encode_sensor_frame(&frame("F2", 2)));
    block_on(ingest_once(&mut link, &slot)).unwrap();

    assert_eq!(
        block_on(publisher.publish_once(&mut broker, &slot, None, 0)),
        Ok(true)
    );
    assert_eq!(
        block_on(publisher.publish_once(&mut broker, &slot, None, 0)),
        Ok(false)
    );

    assert_eq!(broker.published.len(), 1);
    assert!(broker.published[0].1.starts_with(r#"{"sensor_id":"F2","#));
}

#[test]
fn test_frame_waits_while_broker_down() {
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::new();
    let publisher = Publisher::new("H-1");

    slot.offer(frame("N1", 7));
    assert_eq!(
        block_on(publisher.publish_once(&mut broker, &slot, None, 0)),
        Ok(false)
    );
    assert!(slot.is_ready());

    broker.connected = true;
    assert_eq!(
        block_on(publisher.publish_once(&mut broker, &slot, None, 0)),
        Ok(true)
    );
    assert!(!slot.is_ready());
}

#[test]
fn test_publish_failure_consumes_frame() {
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::live();
    broker.fail_publish = true;
    let publisher = Publisher::new("H-1");

    slot.offer(frame("N1", 7));
    assert_eq!(
        block_on(publisher.publish_once(&mut broker, &slot, None, 0)),
        Err(PublishError::Broker(BrokerError::PublishFailed))
    );
    assert!(!slot.is_ready());
    assert!(broker.published.is_empty());
}

#[test]
fn test_publish_uses_topic_and_date() {
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::live();
    let publisher = Publisher::new("H-1");
    let time = MockClock(CalendarTime::from_unix(1_709_325_015, 6 * 3600));

    slot.offer(frame("N1", 7));
    block_on(publisher.publish_once(&mut broker, &slot, time.current_time(), 99)).unwrap();

    let (topic, payload) = &broker.published[0];
    assert_eq!(topic, TOPIC_SENSOR);
    assert!(payload.contains(
        r#""date":{"year":2024,"month":3,"day":2,"hour":2,"minute":30,"second":15}"#
    ));
    assert!(!payload.contains("uptime_ms"));
}

#[test]
fn test_publish_without_time_uses_uptime() {
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::live();
    let publisher = Publisher::with_topic("H-1", "test/topic");
    let time = MockClock(None);

    slot.offer(frame("N1", 7));
    block_on(publisher.publish_once(&mut broker, &slot, time.current_time(), 123_456)).unwrap();

    let (topic, payload) = &broker.published[0];
    assert_eq!(topic, "test/topic");
    assert!(payload.ends_with(r#""moisture":7,"uptime_ms":123456}"#));
    assert!(!payload.contains("date"));
}

// ============================================================================
// Tests: End-to-End Szenario
// ============================================================================

#[test]
fn test_scenario_config_to_publish() {
    let mut sd = MemoryBackend::new("sd");
    let mut flash = MemoryBackend::new("flash");

    {
        let mut store = ConfigStore::new([&mut sd, &mut flash]);
        store.init_storage();
        store
            .apply_update(
                br#"{"mqtt_server":"broker.local","mqtt_port":1883,"wifi_ssid":"Net","wifi_password":"pw123456","hub_id":"H-7"}"#,
            )
            .unwrap();
    }

    // Neustart
    let mut store = ConfigStore::new([&mut sd, &mut flash]);
    store.init_storage();
    store.load().unwrap();
    let config = store.config();
    assert_eq!(config.hub_id.as_str(), "H-7");

    let clock = VirtualClock::new();
    let mut link = MockLink::new(&clock);
    let slot = FrameSlot::<NoopRawMutex>::new();
    let mut broker = MockBroker::live();
    let publisher = Publisher::new(config.hub_id.as_str());

    link.feed(&encode_sensor_frame(&SensorFrame::new("N1", 21.5, 55.0, 300)));
    block_on(ingest_once(&mut link, &slot)).unwrap();
    block_on(publisher.publish_once(&mut broker, &slot, None, 5000)).unwrap();

    assert_eq!(broker.published.len(), 1);
    assert!(broker.published[0].1.starts_with(
        r#"{"sensor_id":"N1","hub_id":"H-7","temp":21.5,"humidity":55.0,"moisture":300,"#
    ));
}

// ============================================================================
// Tests: Handoff zwischen zwei Threads
// ============================================================================

#[test]
fn test_slot_shared_between_threads_keeps_only_newest() {
    const FRAMES: i32 = 10_000;
    let slot = FrameSlot::<CriticalSectionRawMutex>::new();
    let done = AtomicBool::new(false);

    let seen = std::thread::scope(|s| {
        s.spawn(|| {
            for moisture in 1..=FRAMES {
                slot.offer(frame("P", moisture));
            }
            done.store(true, Ordering::Release);
        });

        let consumer = s.spawn(|| {
            let mut seen = Vec::new();
            loop {
                let finished = done.load(Ordering::Acquire);
                if let Some(f) = slot.take() {
                    seen.push(f.moisture);
                }
                if finished {
                    break;
                }
                std::thread::yield_now();
            }
            seen
        });

        consumer.join().unwrap()
    });

    // Nie ein älterer Frame nach einem neueren, nie ein Frame doppelt
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last(), Some(&FRAMES));
    assert!(seen.len() <= FRAMES as usize);

    // Höchstens ein ungelesener Frame: nach dem letzten Take ist der Slot leer
    assert!(!slot.is_ready());
    assert_eq!(slot.take(), None);
    assert_eq!(slot.latest().map(|f| f.moisture), Some(FRAMES));
}

// ============================================================================
// Tests: Anzeige
// ============================================================================

fn sample_time() -> CalendarTime {
    CalendarTime::from_unix(1_700_000_000, 0).unwrap()
}

#[test]
fn test_fresh_frame_is_shown_immediately() {
    let mut display = MockDisplay::new();
    let mut rotation = DisplayRotation::new(0);

    rotation.refresh(&mut display, None, None, None, false, 100);
    assert!(display.frames.is_empty());

    let received = frame("N1", 5);
    rotation.refresh(&mut display, Some(received), Some(received), None, true, 200);

    assert_eq!(display.frames, vec![received]);
    assert_eq!(display.broker, vec![false, true]);
}

#[test]
fn test_rotation_alternates_between_time_and_frame() {
    let latest = frame("N1", 5);
    let time = sample_time();
    let mut display = MockDisplay::new();
    let mut rotation = DisplayRotation::new(0);

    rotation.refresh(&mut display, None, Some(latest), Some(time), true, DISPLAY_TOGGLE_MS - 100);
    assert!(display.frames.is_empty());
    assert!(display.times.is_empty());

    rotation.refresh(&mut display, None, Some(latest), Some(time), true, DISPLAY_TOGGLE_MS);
    assert_eq!(display.times, vec![time]);
    assert!(display.frames.is_empty());

    rotation.refresh(&mut display, None, Some(latest), Some(time), true, 2 * DISPLAY_TOGGLE_MS);
    assert_eq!(display.frames, vec![latest]);
    assert_eq!(display.times.len(), 1);
    assert_eq!(display.broker.len(), 3);
}

#[test]
fn test_fresh_frame_restarts_rotation_interval() {
    let received = frame("N1", 5);
    let time = sample_time();
    let mut display = MockDisplay::new();
    let mut rotation = DisplayRotation::new(0);

    rotation.refresh(&mut display, Some(received), Some(received), Some(time), true, 4000);
    assert_eq!(display.frames.len(), 1);

    // Intervall läuft ab dem neuen Frame
    rotation.refresh(&mut display, None, Some(received), Some(time), true, DISPLAY_TOGGLE_MS);
    assert!(display.times.is_empty());

    rotation.refresh(&mut display, None, Some(received), Some(time), true, 4000 + DISPLAY_TOGGLE_MS);
    assert_eq!(display.times, vec![time]);
}
