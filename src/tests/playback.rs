use super::support::{FakeDevice, fragment};
use crate::audio::AudioError;
use crate::audio::playback::{PlaybackScheduler, SourceId};

const EPS: f64 = 1e-9;

#[test]
fn given_two_fragments_when_scheduled_then_second_starts_where_first_ends() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();

    // When
    let first = scheduler.on_fragment(&mut device, &fragment(0.5)).unwrap();
    let second = scheduler.on_fragment(&mut device, &fragment(0.3)).unwrap();

    // Then
    assert!((first.start - 0.0).abs() < EPS);
    assert!((first.duration - 0.5).abs() < EPS);
    assert!((second.start - 0.5).abs() < EPS);
    assert!((scheduler.next_start_time() - 0.8).abs() < EPS);
    assert_eq!(scheduler.active_len(), 2);

    let scheduled = device.scheduled();
    assert_eq!(scheduled[0], (SourceId(0), 0.0, 12000));
    assert_eq!(scheduled[1].2, 7200);
}

#[test]
fn given_timeline_behind_device_clock_when_fragment_arrives_then_it_starts_now() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    scheduler.on_fragment(&mut device, &fragment(0.2)).unwrap();
    device.set_time(1.5);

    // When
    let late = scheduler.on_fragment(&mut device, &fragment(0.1)).unwrap();

    // Then
    assert!((late.start - 1.5).abs() < EPS);
    assert!((scheduler.next_start_time() - 1.6).abs() < EPS);
}

#[test]
fn given_playing_fragments_when_interrupted_then_all_stopped_and_next_starts_at_device_time() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    scheduler.on_fragment(&mut device, &fragment(0.5)).unwrap();
    scheduler.on_fragment(&mut device, &fragment(0.3)).unwrap();
    device.set_time(0.2);

    // When
    scheduler.on_interrupt(&mut device);

    // Then
    assert_eq!(device.stopped(), vec![SourceId(0), SourceId(1)]);
    assert_eq!(scheduler.active_len(), 0);
    assert_eq!(scheduler.next_start_time(), 0.0);

    // When
    device.set_time(0.25);
    let resumed = scheduler.on_fragment(&mut device, &fragment(0.1)).unwrap();

    // Then
    assert!((resumed.start - 0.25).abs() < EPS);
}

#[test]
fn given_interrupt_with_nothing_playing_when_handled_then_no_stops_issued() {
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();

    scheduler.on_interrupt(&mut device);

    assert!(device.stopped().is_empty());
    assert_eq!(scheduler.next_start_time(), 0.0);
}

#[test]
fn given_malformed_fragment_when_received_then_rejected_and_timeline_untouched() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    scheduler.on_fragment(&mut device, &fragment(0.5)).unwrap();

    // When
    let not_base64 = scheduler.on_fragment(&mut device, "%%%not base64%%%");
    let odd_bytes = scheduler.on_fragment(&mut device, "AAAA");
    let empty = scheduler.on_fragment(&mut device, "");

    // Then
    assert!(matches!(not_base64, Err(AudioError::Decode(_))));
    assert!(matches!(odd_bytes, Err(AudioError::Decode(_))));
    assert!(matches!(empty, Err(AudioError::Decode(_))));
    assert!((scheduler.next_start_time() - 0.5).abs() < EPS);
    assert_eq!(scheduler.active_len(), 1);
    assert_eq!(device.scheduled().len(), 1);
}

#[test]
fn given_two_sources_when_first_ends_then_only_it_is_removed() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    let first = scheduler.on_fragment(&mut device, &fragment(0.1)).unwrap();
    let second = scheduler.on_fragment(&mut device, &fragment(0.1)).unwrap();

    // When
    let removed = scheduler.on_source_ended(first.id);

    // Then
    assert!(removed);
    let remaining: Vec<SourceId> = scheduler.active_sources().map(|s| s.id).collect();
    assert_eq!(remaining, vec![second.id]);
    assert!(!scheduler.on_source_ended(first.id));
}

#[test]
fn given_flushed_sources_when_late_end_arrives_then_ignored() {
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    let source = scheduler.on_fragment(&mut device, &fragment(0.1)).unwrap();
    scheduler.on_interrupt(&mut device);

    assert!(!scheduler.on_source_ended(source.id));
}

#[test]
fn given_scheduled_sources_when_flushed_then_clock_kept() {
    // Given
    let mut device = FakeDevice::default();
    let mut scheduler = PlaybackScheduler::default();
    scheduler.on_fragment(&mut device, &fragment(0.4)).unwrap();

    // When
    let stopped = scheduler.flush_all(&mut device);

    // Then
    assert_eq!(stopped, 1);
    assert_eq!(scheduler.active_len(), 0);
    assert!((scheduler.next_start_time() - 0.4).abs() < EPS);
}
