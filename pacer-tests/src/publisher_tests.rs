//! Throttled publisher scenario tests.
//!
//! Hand-driven sequences of publishes and confirms with exact expectations
//! about what is in flight, what is queued, and what the channel saw.

#![allow(clippy::too_many_lines)]

use std::cell::Cell;
use std::rc::Rc;

use pacer_core::{DeliveryTag, PublishFlags, SequenceId};
use pacer_flow::{PublisherState, ThrottleConfig, ThrottleError, ThrottledPublisher};

use crate::scenarios::{channels, Harness};

fn bodies(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("message-{i}")).collect()
}

#[test]
fn test_publisher_throttle_two_five_messages() {
    let mut harness = Harness::new(2);
    assert_eq!(harness.publish(5), 5);

    assert_eq!(harness.open(), vec![1, 2]);
    assert_eq!(harness.queued(), vec![3, 4, 5]);

    assert!(harness.ack(1, false));
    assert_eq!(harness.open(), vec![2, 3]);
    assert_eq!(harness.queued(), vec![4, 5]);

    // Cumulative ack through 2 removes only 2; nothing lower is open.
    assert!(harness.ack(2, true));
    assert_eq!(harness.open(), vec![3, 4]);
    assert_eq!(harness.queued(), vec![5]);

    for tag in 3..=5 {
        assert!(harness.ack(tag, false));
        assert!(harness.publisher().unacknowledged() <= harness.publisher().throttle());
    }

    let publisher = harness.publisher();
    assert_eq!(publisher.queued(), 0);
    assert_eq!(publisher.unacknowledged(), 0);
    assert_eq!(publisher.waiting(), 0);
    assert_eq!(harness.dispatched_bodies(), bodies(0..5));
}

#[test]
fn test_publisher_nack_frees_capacity_without_redispatch() {
    let mut harness = Harness::new(3);
    harness.publish(3);
    assert_eq!(harness.publisher().unacknowledged(), 3);

    assert!(harness.nack(2, false));

    assert_eq!(harness.publisher().unacknowledged(), 2);
    assert_eq!(harness.publisher().queued(), 0);
    assert_eq!(harness.open(), vec![1, 3]);
    assert_eq!(harness.dispatched_bodies().len(), 3);
}

#[test]
fn test_publisher_nack_capacity_goes_to_queue_head() {
    let mut harness = Harness::new(2);
    harness.publish(4);

    assert!(harness.nack(1, false));
    assert_eq!(harness.open(), vec![2, 3]);
    assert_eq!(harness.queued(), vec![4]);
    assert_eq!(harness.dispatched_bodies(), bodies(0..3));
}

#[test]
fn test_publisher_cumulative_ack_boundary() {
    let mut harness = Harness::new(10);
    harness.publish(6);

    assert!(harness.ack(3, true));
    assert_eq!(harness.open(), vec![4, 5, 6]);
    assert_eq!(harness.publisher().last_confirmed(), SequenceId::new(3));
    assert_eq!(harness.publisher().waiting(), 3);
}

#[test]
fn test_publisher_out_of_order_acks() {
    let mut harness = Harness::new(4);
    harness.publish(4);

    for tag in [3, 2, 4] {
        assert!(harness.ack(tag, false));
        assert_eq!(harness.publisher().last_confirmed(), SequenceId::ZERO);
        assert_eq!(harness.publisher().waiting(), 4);
    }

    assert!(harness.ack(1, false));
    assert_eq!(harness.publisher().last_confirmed(), SequenceId::new(4));
    assert_eq!(harness.publisher().waiting(), 0);
}

#[test]
fn test_publisher_flush_all_and_bounded() {
    let mut harness = Harness::new(1);
    harness.publish(6);
    assert_eq!(harness.queued(), vec![2, 3, 4, 5, 6]);

    assert_eq!(harness.publisher_mut().flush(2), 2);
    assert_eq!(harness.open(), vec![1, 2, 3]);
    assert_eq!(harness.queued(), vec![4, 5, 6]);

    assert_eq!(harness.publisher_mut().flush(0), 3);
    assert_eq!(harness.open(), vec![1, 2, 3, 4, 5, 6]);
    assert!(harness.queued().is_empty());

    // Flushed messages are confirmed like any other.
    assert!(harness.ack(6, true));
    assert_eq!(harness.publisher().unacknowledged(), 0);
    assert_eq!(harness.publisher().waiting(), 0);
}

#[test]
fn test_publisher_close_when_idle_is_synchronous() {
    let mut harness = Harness::new(4);
    let handle = harness.publisher_mut().close();

    assert!(handle.is_succeeded());
    assert_eq!(harness.publisher().state(), PublisherState::Closed);
    assert_eq!(harness.publisher().channel().close_calls(), 1);
}

#[test]
fn test_publisher_close_drains_before_closing_channel() {
    let mut harness = Harness::new(2);
    harness.publish(5);

    let handle = harness.publisher_mut().close();
    assert_eq!(harness.publisher().state(), PublisherState::Closing);
    assert_eq!(harness.publish(1), 0);

    harness.ack(1, false);
    harness.ack(2, false);
    harness.ack(3, false);
    harness.ack(4, false);
    assert!(handle.is_pending());
    assert_eq!(harness.publisher().channel().close_calls(), 0);

    harness.ack(5, false);
    assert!(handle.is_succeeded());
    assert_eq!(harness.publisher().channel().close_calls(), 1);
    assert_eq!(harness.dispatched_bodies(), bodies(0..5));

    // Further events change nothing.
    harness.publisher_mut().on_ack(DeliveryTag::new(9), true);
    assert_eq!(harness.publisher().state(), PublisherState::Closed);
    assert_eq!(harness.publisher().channel().close_calls(), 1);
}

#[test]
fn test_publisher_close_follows_hanging_channel() {
    let mut harness = Harness::with_channel(channels::hanging_close(1), 2);
    harness.publish(2);

    let handle = harness.publisher_mut().close();
    let fired = Rc::new(Cell::new(0));
    let counter = Rc::clone(&fired);
    handle.on_success(move || counter.set(counter.get() + 1));

    harness.ack(2, true);
    assert_eq!(harness.publisher().state(), PublisherState::Closed);
    assert!(handle.is_pending());
    assert_eq!(fired.get(), 0);

    assert_eq!(harness.publisher_mut().channel_mut().complete_close(), 1);
    assert!(handle.is_succeeded());
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_publisher_close_twice_shares_handle() {
    let mut harness = Harness::with_channel(channels::hanging_close(1), 2);
    let first = harness.publisher_mut().close();
    let second = harness.publisher_mut().close();

    assert!(first.same_as(&second));
    assert_eq!(harness.publisher().channel().close_calls(), 1);
}

#[test]
fn test_publisher_close_with_zero_throttle_needs_flush() {
    let mut harness = Harness::new(0);
    harness.publish(2);

    let handle = harness.publisher_mut().close();
    assert!(handle.is_pending());

    assert_eq!(harness.publisher_mut().flush(0), 2);
    assert_eq!(harness.ack_everything(), 2);
    assert!(handle.is_succeeded());
}

#[test]
fn test_publisher_rejected_after_close_keeps_ids() {
    let mut harness = Harness::new(1);
    harness.publish(2);
    harness.publisher_mut().close();

    assert_eq!(harness.publish(3), 0);
    assert_eq!(harness.publisher().next_sequence_id().get(), 3);
    assert_eq!(harness.publisher().waiting(), 2);
    assert_eq!(harness.publisher().stats().total_rejected, 3);
}

#[test]
fn test_publisher_errors_leave_state_alone() {
    let mut harness = Harness::new(1);
    harness.publish(2);
    harness.publisher_mut().close();

    harness.publisher_mut().report_error("connection reset by peer");
    assert_eq!(harness.publisher().state(), PublisherState::Closing);
    assert_eq!(harness.publisher().unacknowledged(), 1);
    assert_eq!(harness.publisher().queued(), 1);
    assert_eq!(
        harness.errors(),
        vec![ThrottleError::Channel {
            message: "connection reset by peer".into()
        }]
    );

    harness.ack_everything();
    assert_eq!(harness.publisher().state(), PublisherState::Closed);
}

#[test]
fn test_publisher_skewed_channel_reports_and_tracks() {
    let mut harness = Harness::with_channel(channels::skewed(1, 100), 2);
    harness.publish(3);

    assert_eq!(harness.open(), vec![101, 102]);
    assert_eq!(harness.errors().len(), 2);
    assert!(harness
        .errors()
        .iter()
        .all(|err| matches!(err, ThrottleError::TagMismatch { .. })));

    // The frontier counts ids, so a partial ack leaves the rest waiting.
    assert!(harness.ack(101, false));
    let publisher = harness.publisher();
    assert_eq!(harness.open(), vec![102, 103]);
    assert_eq!(publisher.last_confirmed(), SequenceId::new(1));
    assert_eq!(publisher.waiting(), 2);
    assert!(publisher.waiting() >= publisher.unacknowledged() + publisher.queued());

    harness.ack_everything();
    assert_eq!(harness.publisher().unacknowledged(), 0);
    assert_eq!(harness.publisher().queued(), 0);
    assert_eq!(harness.publisher().waiting(), 0);
    assert_eq!(harness.errors().len(), 3);
}

#[test]
fn test_publisher_flaky_channel_keeps_order() {
    let mut harness = Harness::with_channel(channels::flaky(7), 4);
    assert_eq!(harness.publish(200), 200);

    for _ in 0..1_000 {
        let publisher = harness.publisher();
        if publisher.queued() == 0 && publisher.unacknowledged() == 0 {
            break;
        }
        if publisher.unacknowledged() == 0 {
            harness.publisher_mut().flush(0);
        } else {
            harness.ack_everything();
        }
    }

    assert_eq!(harness.publisher().queued(), 0);
    assert_eq!(harness.dispatched_bodies(), bodies(0..200));
    assert!(harness.publisher().stats().dispatch_failures > 0);
}

#[test]
fn test_publisher_config_from_toml() {
    let config: ThrottleConfig = toml::from_str(
        r"
        throttle = 3

        [limits]
        max_body_bytes = 1024
        ",
    )
    .unwrap();
    assert_eq!(config.throttle, 3);

    let mut publisher = ThrottledPublisher::new(channels::reliable(1), config).unwrap();
    assert!(publisher.publish("events", "all", vec![0_u8; 1024], PublishFlags::NONE));
    assert!(!publisher.publish("events", "all", vec![0_u8; 1025], PublishFlags::NONE));
    assert_eq!(publisher.next_sequence_id().get(), 2);
}
