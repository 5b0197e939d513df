//! Drives the engine through generated keying scripts on a virtual clock,
//! firing boundaries exactly when they would elapse.

use std::time::Duration;

use morse_ime::cw::{CwEngine, DeadlineToken, DecoderOptions, SpeedLevel};
use morse_ime::input::replay::script_for_text;
use morse_ime::input::{KeyMap, KeyTransitionEvent};
use morse_ime::sink::TextBuffer;

struct Simulation {
    engine: CwEngine<TextBuffer>,
    token: Option<DeadlineToken>,
    armed_at: u64,
}

fn nanos(duration: Duration) -> u64 {
    duration.as_nanos() as u64
}

impl Simulation {
    fn new(level: SpeedLevel) -> Self {
        Self {
            engine: CwEngine::new(TextBuffer::new(), KeyMap::default(), level, DecoderOptions::default()),
            token: None,
            armed_at: 0,
        }
    }

    /// Note when the live deadline changed
    fn track(&mut self, now: u64) {
        let current = self.engine.state().armed_deadline().map(|d| d.token);
        if current != self.token {
            self.token = current;
            self.armed_at = now;
        }
    }

    /// Fire every deadline due at or before `t`
    fn advance(&mut self, t: u64) {
        while let Some(deadline) = self.engine.state().armed_deadline() {
            let due = self.armed_at + nanos(deadline.after);
            if due > t {
                break;
            }
            self.engine.boundary_elapsed(deadline.token).unwrap();
            self.track(due);
        }
    }

    fn event(&mut self, event: &KeyTransitionEvent) {
        self.advance(event.timestamp);
        self.engine.handle_event(event).unwrap();
        self.track(event.timestamp);
    }

    fn run(mut self, events: &[KeyTransitionEvent]) -> String {
        for event in events {
            self.event(event);
        }
        self.advance(u64::MAX / 2);
        self.engine.sink().text()
    }
}

fn type_text(text: &str, level: SpeedLevel) -> String {
    let script = script_for_text(text, &level.profile()).unwrap();
    Simulation::new(level).run(&script.to_events().unwrap())
}

#[test]
fn test_sentence_at_every_speed() {
    for level in SpeedLevel::all() {
        assert_eq!(
            type_text("the quick brown fox 123", level),
            "THE QUICK BROWN FOX 123 ",
            "speed level {level}"
        );
    }
}

#[test]
fn test_every_table_character_decodes() {
    let all = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.,?/=+-@!'():;\"_&";
    let typed = type_text(all, SpeedLevel::DEFAULT);
    assert_eq!(typed, format!("{all} "));
}

#[test]
fn test_script_at_wrong_speed_garbles_text() {
    // keyed for level 1, decoded at level 9: every press is a dash and every
    // pause between characters is long enough to end a word
    let script = script_for_text("eee", &SpeedLevel::new(1).unwrap().profile()).unwrap();
    let typed = Simulation::new(SpeedLevel::new(9).unwrap()).run(&script.to_events().unwrap());
    assert_eq!(typed, "T T T ");
}

#[test]
fn test_consecutive_spaces_collapse() {
    assert_eq!(type_text("  hi   there ", SpeedLevel::new(7).unwrap()), "HI THERE ");
}
