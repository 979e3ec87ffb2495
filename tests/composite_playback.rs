//! Composite playback integration tests: completion, holds, gates and
//! direction, driven with explicit 0.125 s ticks.

use std::cell::RefCell;
use std::rc::Rc;

use assert_approx_eq::assert_approx_eq;
use feedbacks::composite::{Composite, CompositeSettings, KillSwitch, NotificationKind};
use feedbacks::effects::{HoldingPause, PlayTap, Pulse};
use feedbacks::sequence::{Sequence, SequenceBinding, SequenceEvent, SequenceTrack, TrackId};
use feedbacks::timing::{Direction, TimingPolicy, TimescaleMode};
use feedbacks::unit::{Effect, EffectUnit, Owner, PlayContext, Vec3};

const TICK: f64 = 0.125;

type Notes = Rc<RefCell<Vec<(NotificationKind, f64)>>>;

fn build(units: Vec<EffectUnit>, settings: CompositeSettings) -> (Composite, Notes) {
    let mut c = Composite::new("scenario", units)
        .with_settings(CompositeSettings {
            seed: Some(42),
            ..settings
        })
        .with_kill_switch(KillSwitch::new());
    c.initialize(&Owner::new(1, "player"));
    let notes = Notes::default();
    let sink = notes.clone();
    c.subscribe(move |n| sink.borrow_mut().push((n.kind, n.time)));
    (c, notes)
}

fn pulse(tap: &PlayTap, name: &str, duration: f64) -> EffectUnit {
    EffectUnit::new(name, Pulse::new(name, duration).with_tap(tap.clone()))
}

fn count(notes: &Notes, kind: NotificationKind) -> usize {
    notes.borrow().iter().filter(|(k, _)| *k == kind).count()
}

#[test]
fn parallel_run_completes_with_its_longest_unit() {
    let tap = PlayTap::new();
    let (mut c, notes) = build(
        vec![pulse(&tap, "a", 1.0), pulse(&tap, "b", 2.0), pulse(&tap, "c", 0.5)],
        CompositeSettings::default(),
    );
    assert_eq!(c.total_duration(), 2.0);
    assert!(c.play(Vec3::ZERO, 1.0));
    let mut ticks = 0;
    while c.is_playing() {
        c.tick(TICK);
        ticks += 1;
        assert!(ticks < 100, "composite never completed");
    }
    assert_eq!(ticks, 16);
    let complete: Vec<f64> = notes
        .borrow()
        .iter()
        .filter(|(k, _)| *k == NotificationKind::Complete)
        .map(|(_, t)| *t)
        .collect();
    assert_eq!(complete.len(), 1);
    assert_approx_eq!(complete[0], 2.0, TICK);
}

#[test]
fn repeat_forever_stops_within_a_tick_and_never_completes() {
    let tap = PlayTap::new();
    let unit = pulse(&tap, "buzz", 0.25).with_timing(TimingPolicy {
        repeat_forever: true,
        ..Default::default()
    });
    let (mut c, notes) = build(vec![unit], CompositeSettings::default());
    c.play(Vec3::ZERO, 1.0);
    for _ in 0..40 {
        c.tick(TICK);
    }
    assert_eq!(c.now(), 5.0);
    assert!(c.is_playing());
    let fired = tap.len();
    assert_eq!(fired, 21);

    c.stop(Vec3::ZERO, 1.0);
    for _ in 0..40 {
        c.tick(TICK);
    }
    assert_eq!(tap.len(), fired);
    assert_eq!(count(&notes, NotificationKind::Complete), 0);
}

#[test]
fn holding_pause_holds_followers_until_it_completes() {
    let tap = PlayTap::new();
    let (mut c, _) = build(
        vec![
            pulse(&tap, "a", 0.25),
            EffectUnit::new(
                "b",
                HoldingPause {
                    duration: 1.0,
                    tap: tap.clone(),
                },
            ),
            pulse(&tap, "c", 0.0),
        ],
        CompositeSettings::default(),
    );
    c.play(Vec3::ZERO, 1.0);
    let first: Vec<(String, f64)> = tap.take().into_iter().map(|r| (r.effect, r.time)).collect();
    assert_eq!(
        first,
        vec![("a".to_string(), 0.0), ("holding_pause".to_string(), 0.0)]
    );
    for _ in 0..7 {
        c.tick(TICK);
        assert!(tap.is_empty(), "c started before the hold released");
    }
    c.tick(TICK);
    let next = tap.take();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].effect, "c");
    assert_eq!(next[0].time, 1.0);
}

#[test]
fn resume_releases_a_holding_pause_early() {
    let tap = PlayTap::new();
    let (mut c, notes) = build(
        vec![
            pulse(&tap, "a", 0.0),
            EffectUnit::new(
                "b",
                HoldingPause {
                    duration: 10.0,
                    tap: PlayTap::new(),
                },
            ),
            pulse(&tap, "c", 0.0),
        ],
        CompositeSettings::default(),
    );
    c.play(Vec3::ZERO, 1.0);
    for _ in 0..4 {
        c.tick(TICK);
    }
    assert_eq!(tap.len(), 1);
    c.resume();
    let records = tap.take();
    assert_eq!(records.last().map(|r| r.effect.as_str()), Some("c"));
    assert_eq!(records.last().map(|r| r.time), Some(0.5));
    assert_eq!(count(&notes, NotificationKind::Resume), 1);
}

#[test]
fn revert_twice_restores_direction_without_touching_the_run() {
    let tap = PlayTap::new();
    let (mut c, notes) = build(
        vec![pulse(&tap, "a", 1.0), pulse(&tap, "b", 0.5)],
        CompositeSettings::default(),
    );
    c.play(Vec3::ZERO, 1.0);
    c.tick(TICK);
    c.revert();
    c.revert();
    assert_eq!(c.direction(), Direction::Forward);
    assert!(c.is_playing());
    while c.is_playing() {
        c.tick(TICK);
    }
    assert_eq!(c.now(), 1.0);
    assert_eq!(tap.len(), 2);
    assert_eq!(count(&notes, NotificationKind::Revert), 2);
}

#[test]
fn cooldown_boundary() {
    let tap = PlayTap::new();
    let (mut c, _) = build(
        vec![pulse(&tap, "a", 0.0)],
        CompositeSettings {
            cooldown: 1.0,
            ..Default::default()
        },
    );
    assert!(c.play(Vec3::ZERO, 1.0));
    for _ in 0..7 {
        c.tick(TICK);
    }
    assert!(!c.play(Vec3::ZERO, 1.0), "played inside the cooldown");
    c.tick(TICK);
    c.tick(TICK);
    assert!(c.play(Vec3::ZERO, 1.0));
    assert_eq!(tap.len(), 2);
}

#[test]
fn chance_boundaries_over_many_trials() {
    let tap = PlayTap::new();
    let never = pulse(&tap, "never", 0.0).with_chance(0.0);
    let (mut c, _) = build(vec![never], CompositeSettings::default());
    for _ in 0..1000 {
        c.play(Vec3::ZERO, 1.0);
        c.tick(TICK);
    }
    assert!(tap.is_empty());

    let always = pulse(&tap, "always", 0.0).with_chance(100.0);
    let (mut c, _) = build(vec![always], CompositeSettings::default());
    for _ in 0..1000 {
        c.play(Vec3::ZERO, 1.0);
        c.tick(TICK);
    }
    assert_eq!(tap.len(), 1000);

    let (mut c, _) = build(
        vec![pulse(&tap, "gated", 0.0)],
        CompositeSettings {
            chance: 0.0,
            ..Default::default()
        },
    );
    assert!((0..1000).all(|_| !c.play(Vec3::ZERO, 1.0)));
}

#[test]
fn seeded_chance_is_reproducible() {
    let run = || {
        let tap = PlayTap::new();
        let (mut c, _) = build(
            vec![pulse(&tap, "maybe", 0.0).with_chance(50.0)],
            CompositeSettings::default(),
        );
        for _ in 0..200 {
            c.play(Vec3::ZERO, 1.0);
            c.tick(TICK);
        }
        tap.take().iter().map(|r| r.time).collect::<Vec<_>>()
    };
    let first = run();
    assert!(!first.is_empty() && first.len() < 200);
    assert_eq!(first, run());
}

#[test]
fn total_duration_formula() {
    for repeats in 0..5u32 {
        let policy = TimingPolicy {
            initial_delay: 0.5,
            repeat_count: repeats,
            delay_between_repeats: 0.25,
            ..Default::default()
        };
        let d = 0.75;
        assert_approx_eq!(
            policy.total_duration(d),
            0.5 + d + repeats as f64 * (d + 0.25)
        );
    }
}

#[test]
fn time_scale_speeds_up_scaled_units() {
    let tap = PlayTap::new();
    let (mut c, notes) = build(
        vec![pulse(&tap, "a", 2.0)],
        CompositeSettings {
            time_scale: 2.0,
            ..Default::default()
        },
    );
    c.play(Vec3::ZERO, 1.0);
    let mut ticks = 0;
    while c.is_playing() {
        c.tick(TICK);
        ticks += 1;
    }
    assert_eq!(ticks, 8);
    assert_eq!(notes.borrow().last(), Some(&(NotificationKind::Complete, 2.0)));
}

#[test]
fn unscaled_unit_ignores_time_scale() {
    let tap = PlayTap::new();
    let unit = pulse(&tap, "late", 0.0).with_timing(TimingPolicy {
        initial_delay: 1.0,
        timescale_mode: TimescaleMode::Unscaled,
        ..Default::default()
    });
    let (mut c, _) = build(
        vec![unit],
        CompositeSettings {
            time_scale: 4.0,
            ..Default::default()
        },
    );
    c.play(Vec3::ZERO, 1.0);
    for _ in 0..7 {
        c.tick(TICK);
    }
    assert!(tap.is_empty());
    c.tick(TICK);
    assert_eq!(tap.len(), 1);
}

#[test]
fn sequence_bound_unit_fires_on_quantized_beats() {
    let sequence = Rc::new(
        Sequence::new("beat", vec![SequenceTrack::new(0)])
            .with_events([
                SequenceEvent::new(0, 0.0),
                SequenceEvent::new(0, 0.49),
                SequenceEvent::new(0, 1.01),
            ])
            .with_trailing_silence(1.0),
    );
    let tap = PlayTap::new();
    let unit = pulse(&tap, "kick", 0.0).with_timing(TimingPolicy {
        sequence: Some(SequenceBinding::quantized(sequence, TrackId(0), 120.0)),
        ..Default::default()
    });
    let (mut c, _) = build(vec![unit], CompositeSettings::default());
    c.play(Vec3::ZERO, 1.0);
    while c.is_playing() {
        c.tick(TICK);
    }
    let times: Vec<f64> = tap.take().iter().map(|r| r.time).collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0]);
}

#[test]
fn backward_run_skips_forward_only_units() {
    let tap = PlayTap::new();
    let forward_only = pulse(&tap, "open", 0.0).with_timing(TimingPolicy {
        direction_condition: feedbacks::timing::DirectionCondition::OnlyForward,
        ..Default::default()
    });
    let (mut c, _) = build(
        vec![forward_only, pulse(&tap, "close", 0.0)],
        CompositeSettings::default(),
    );
    c.play_in_reverse(Vec3::ZERO, 1.0);
    let records = tap.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].effect, "close");
    assert_eq!(records[0].direction, Direction::Backward);
}

#[test]
fn uninitialized_composite_still_plays() {
    let tap = PlayTap::new();
    let mut c = Composite::new("raw", vec![pulse(&tap, "a", 0.0)])
        .with_kill_switch(KillSwitch::new());
    assert!(c.play(Vec3::ZERO, 1.0));
    assert_eq!(tap.len(), 1);
}

struct StopCounter(Rc<RefCell<u32>>);

impl Effect for StopCounter {
    fn kind(&self) -> &str {
        "stop_counter"
    }

    fn duration(&self) -> f64 {
        5.0
    }

    fn play(&mut self, _cx: &PlayContext) {}

    fn stop(&mut self, _position: Vec3, _intensity: f64) {
        *self.0.borrow_mut() += 1;
    }
}

#[test]
fn dropping_a_playing_composite_stops_its_units() {
    let stops = Rc::new(RefCell::new(0));
    {
        let (mut c, _) = build(
            vec![EffectUnit::new("s", StopCounter(stops.clone()))],
            CompositeSettings::default(),
        );
        c.play(Vec3::ZERO, 1.0);
        c.tick(TICK);
    }
    assert_eq!(*stops.borrow(), 1);
}

#[test]
fn unsubscribed_observer_hears_nothing() {
    let tap = PlayTap::new();
    let mut c = Composite::new("quiet", vec![pulse(&tap, "a", 0.0)])
        .with_kill_switch(KillSwitch::new());
    let heard = Rc::new(RefCell::new(0));
    let h = heard.clone();
    let id = c.subscribe(move |_| *h.borrow_mut() += 1);
    c.play(Vec3::ZERO, 1.0);
    assert_eq!(*heard.borrow(), 1);
    assert!(c.unsubscribe(id));
    c.tick(TICK);
    assert_eq!(*heard.borrow(), 1);
}
