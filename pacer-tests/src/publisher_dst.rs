//! Throttled publisher DST tests.
//!
//! Two layers:
//! - Profile sweeps: every built-in workload profile across the regression
//!   seeds, plus a CI sweep, verified by `pacer_workload::Verification`.
//! - Stepwise checks: a local random driver that asserts the publisher's
//!   invariants after every single step, so a failure points at the step.

#![allow(clippy::cast_possible_truncation)]

use pacer_channel::{ChannelFaultConfig, SimulatedChannel};
use pacer_core::{DeliveryTag, PublishFlags};
use pacer_flow::{PublisherState, ThrottledPublisher};
use pacer_workload::{list_profiles, load_profile, Workload, WorkloadConfig};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::scenarios::seeds::{CI_SEED_COUNT, REGRESSION_SEEDS};

fn run_profile(name: &str, seed: u64, operations: u64) {
    let mut config = load_profile(name).unwrap().workload;
    config.seed = seed;
    config.operations = operations;

    let stats = Workload::new(config).unwrap().run();
    assert!(
        stats.is_ok(),
        "profile {name} seed {seed}: {} violations, first: {}",
        stats.violations.len(),
        stats.violations[0]
    );
    assert!(stats.closed, "profile {name} seed {seed} did not close");
}

#[test]
fn test_dst_publisher_profiles_regression_seeds() {
    for name in list_profiles() {
        for &seed in REGRESSION_SEEDS {
            run_profile(name, seed, 400);
        }
    }
}

#[test]
fn test_dst_publisher_ci_seed_sweep() {
    for seed in 0..u64::from(CI_SEED_COUNT) {
        run_profile("baseline", seed, 300);
    }
}

#[test]
fn test_dst_publisher_replay_is_identical() {
    let config = WorkloadConfig {
        seed: 0xDEAD_BEEF,
        operations: 500,
        ..WorkloadConfig::default()
    };

    let mut first = Workload::new(config.clone()).unwrap();
    let mut second = Workload::new(config).unwrap();
    first.run();
    second.run();

    let kinds = |workload: &Workload| {
        workload
            .history()
            .operations()
            .iter()
            .map(|op| op.kind.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(kinds(&first), kinds(&second));
    assert_eq!(
        first.history().dispatched(),
        second.history().dispatched()
    );
}

// ============================================================================
// Stepwise invariant checking
// ============================================================================

/// Drives a publisher randomly and checks invariants after every step.
struct StepChecker {
    publisher: ThrottledPublisher<SimulatedChannel>,
    rng: ChaCha8Rng,
    accepted: u64,
    last_confirmed: u64,
}

impl StepChecker {
    fn new(seed: u64, throttle: usize, faults: ChannelFaultConfig) -> Self {
        let channel = SimulatedChannel::with_faults(seed, faults);
        Self {
            publisher: ThrottledPublisher::with_throttle(channel, throttle),
            rng: ChaCha8Rng::seed_from_u64(seed),
            accepted: 0,
            last_confirmed: 0,
        }
    }

    fn step(&mut self, seed: u64, step: usize) {
        let unacked_before = self.publisher.unacknowledged();
        let mut flushed = false;

        match self.rng.gen_range(0..100) {
            0..=49 => {
                let expected = self.publisher.next_sequence_id();
                if self
                    .publisher
                    .publish("dst", "step", format!("{seed}:{step}"), PublishFlags::NONE)
                {
                    self.accepted += 1;
                    assert_eq!(expected.get(), self.accepted, "seed {seed} step {step}: id gap");
                }
            }
            50..=84 => {
                let unconfirmed = self.publisher.channel().unconfirmed();
                if let Some(&tag) = unconfirmed.choose(&mut self.rng) {
                    let multiple = self.rng.gen_bool(0.3);
                    let positive = self.rng.gen_bool(0.85);
                    self.confirm(tag, multiple, positive, seed, step);
                }
            }
            85..=92 => {
                let throttle = self.rng.gen_range(0..=10);
                self.publisher.set_throttle(throttle);
            }
            _ => {
                let max = self.rng.gen_range(0..=3);
                let queued = self.publisher.queued();
                let sent = self.publisher.flush(max);
                let bound = if max == 0 { queued } else { max.min(queued) };
                assert!(sent <= bound, "seed {seed} step {step}: flush overran");
                flushed = true;
            }
        }

        self.check(seed, step, unacked_before, flushed);
    }

    fn confirm(
        &mut self,
        tag: DeliveryTag,
        multiple: bool,
        positive: bool,
        seed: u64,
        step: usize,
    ) {
        let open_before = self.publisher.open_tags();
        let event = self
            .publisher
            .channel_mut()
            .confirm(tag, multiple, positive)
            .unwrap();
        self.publisher.handle_event(event);

        // Tags above the confirmed one are untouched.
        let open_after = self.publisher.open_tags();
        for open in open_before.iter().filter(|&&open| open > tag) {
            assert!(
                open_after.contains(open),
                "seed {seed} step {step}: confirm of {tag} removed {open}"
            );
        }
        if multiple {
            assert!(
                open_after.iter().all(|&open| open > tag),
                "seed {seed} step {step}: cumulative confirm of {tag} left lower tags"
            );
        } else {
            assert!(!open_after.contains(&tag));
        }
    }

    fn check(&mut self, seed: u64, step: usize, unacked_before: usize, flushed: bool) {
        let publisher = &self.publisher;
        let stats = publisher.stats();
        let unacked = publisher.unacknowledged();

        if !flushed && unacked > unacked_before {
            assert!(
                unacked <= publisher.throttle(),
                "seed {seed} step {step}: {unacked} in flight over throttle {}",
                publisher.throttle()
            );
        }

        let last = publisher.last_confirmed().get();
        assert!(last >= self.last_confirmed, "seed {seed} step {step}: frontier regressed");
        assert!(last <= stats.total_dispatched, "seed {seed} step {step}: frontier ahead");
        self.last_confirmed = last;

        assert_eq!(publisher.waiting() as u64, self.accepted - last);
        assert!(publisher.waiting() >= unacked + publisher.queued());
        assert_eq!(stats.total_published, stats.total_dispatched + publisher.queued() as u64);
        assert_eq!(
            stats.total_dispatched,
            unacked as u64 + stats.total_acked + stats.total_nacked
        );
        assert_eq!(unacked, publisher.channel().unconfirmed_count());
    }

    fn close_and_drain(&mut self, seed: u64) {
        let handle = self.publisher.close();
        for _ in 0..10_000 {
            if self.publisher.state() == PublisherState::Closed {
                break;
            }
            if self.publisher.unacknowledged() == 0 {
                self.publisher.flush(0);
            } else if let Some(event) = self.publisher.channel_mut().confirm_all() {
                self.publisher.handle_event(event);
            }
        }

        assert!(handle.is_succeeded(), "seed {seed}: close not resolved");
        assert_eq!(self.publisher.channel().close_calls(), 1);
        assert_eq!(self.publisher.waiting(), 0);
        assert_eq!(
            self.publisher.channel().published_count() as u64,
            self.accepted,
            "seed {seed}: messages lost"
        );
    }
}

#[test]
fn test_dst_publisher_stepwise_invariants() {
    for &seed in REGRESSION_SEEDS {
        let mut checker = StepChecker::new(seed, 4, ChannelFaultConfig::none());
        for step in 0..500 {
            checker.step(seed, step);
        }
        checker.close_and_drain(seed);
    }
}

#[test]
fn test_dst_publisher_stepwise_invariants_flaky_channel() {
    for &seed in REGRESSION_SEEDS {
        let faults = ChannelFaultConfig::none().with_publish_fail_rate(0.1);
        let mut checker = StepChecker::new(seed, 3, faults);
        for step in 0..500 {
            checker.step(seed, step);
        }
        checker.close_and_drain(seed);
    }
}

#[test]
fn test_dst_publisher_stepwise_invariants_skewed_channel() {
    for &seed in REGRESSION_SEEDS {
        let faults = ChannelFaultConfig::none().with_tag_skew(50);
        let mut checker = StepChecker::new(seed, 4, faults);
        for step in 0..500 {
            checker.step(seed, step);
        }
        assert_eq!(
            checker.publisher.stats().tag_mismatches,
            checker.publisher.stats().total_dispatched
        );
        checker.close_and_drain(seed);
    }
}
