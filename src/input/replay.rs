//! Scripted key sources.
//!
//! A keying script is a JSON list of timed key transitions. Playing it back
//! in real time exercises the decoder exactly like a live keyboard would,
//! including the boundary deadlines.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{CaptureGuard, Edge, KeyId, KeySource, KeyTransitionEvent};
use crate::cw::{encode, SpeedProfile, Timebase};
use crate::error::InputError;

const NANOS_PER_MS: u64 = 1_000_000;

/// Key used for keying when generating scripts from text
const SCRIPT_KEY: &str = "a";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Key name from the keymap name table, or a raw key code
    pub key: String,
    pub edge: Edge,
    /// Offset from the start of the script
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub events: Vec<ScriptEvent>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, InputError> {
        let json = std::fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, InputError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve key names and check ordering. Timestamps are nanosecond ticks.
    pub fn to_events(&self) -> Result<Vec<KeyTransitionEvent>, InputError> {
        let mut last_ms = 0;
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let key = KeyId::from_name(&event.key).ok_or_else(|| {
                    InputError::Script(format!("event {}: unknown key {:?}", i, event.key))
                })?;
                if event.at_ms < last_ms {
                    return Err(InputError::Script(format!(
                        "event {} at {}ms is earlier than the previous event at {}ms",
                        i, event.at_ms, last_ms
                    )));
                }
                last_ms = event.at_ms;
                Ok(KeyTransitionEvent {
                    key,
                    edge: event.edge,
                    timestamp: event.at_ms * NANOS_PER_MS,
                })
            })
            .collect()
    }

    fn push(&mut self, edge: Edge, at_ms: u64) {
        self.events.push(ScriptEvent {
            key: SCRIPT_KEY.to_string(),
            edge,
            at_ms,
        });
    }
}

/// Script that keys `text` at the given speed.
///
/// Dots are held one unit (half the dit threshold) and dashes three. Between
/// characters the key rests for the character boundary plus half the word
/// boundary, so the character is committed well before the word boundary
/// could pass; a space in `text` adds a full word boundary on top.
pub fn script_for_text(text: &str, profile: &SpeedProfile) -> Result<ReplayScript, InputError> {
    let unit = duration_ms(profile.dit_length()).max(1);
    let word_gap = duration_ms(profile.word_boundary);
    let char_gap = duration_ms(profile.char_boundary) + word_gap / 2;

    let mut script = ReplayScript::default();
    let mut at = 0;
    let mut started = false;
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = started;
            continue;
        }
        let code = encode(ch)
            .ok_or_else(|| InputError::Script(format!("no Morse code for {:?}", ch)))?;

        if started {
            at += char_gap;
            if pending_space {
                at += word_gap;
            }
        }
        pending_space = false;
        started = true;

        for (i, symbol) in code.chars().enumerate() {
            if i > 0 {
                at += unit;
            }
            let held = if symbol == '.' { unit } else { unit * 3 };
            script.push(Edge::Down, at);
            at += held;
            script.push(Edge::Up, at);
        }
    }
    Ok(script)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Plays a script in real time on its own thread
pub struct ReplaySource {
    name: String,
    events: Vec<KeyTransitionEvent>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, script: &ReplayScript) -> Result<Self, InputError> {
        Ok(Self {
            name: name.into(),
            events: script.to_events()?,
        })
    }
}

impl KeySource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn timebase(&self) -> Timebase {
        Timebase::NANOS
    }

    fn open(self: Box<Self>, events: Sender<KeyTransitionEvent>) -> Result<CaptureGuard, InputError> {
        let ReplaySource { name, events: script } = *self;
        // Dropping the stop sender wakes the player and ends playback
        let (stop_tx, stop_rx) = bounded::<()>(0);

        info!("[input] replaying {} events from {}", script.len(), name);
        let player = thread::Builder::new()
            .name("replay".into())
            .spawn(move || {
                let start = Instant::now();
                for event in script {
                    let due = start + Timebase::NANOS.to_duration(event.timestamp);
                    match stop_rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => {
                            debug!("[input] replay stopped early");
                            return;
                        }
                    }
                    if events.send(event).is_err() {
                        return;
                    }
                }
                debug!("[input] replay finished");
            })
            .map_err(|e| InputError::Script(format!("failed to start replay thread: {}", e)))?;

        Ok(CaptureGuard::new(name, move || {
            drop(stop_tx);
            let _ = player.join();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cw::SpeedLevel;

    #[test]
    fn test_script_json_roundtrip_resolves_keys() {
        let json = r#"{ "events": [
            { "key": "a", "edge": "down", "at_ms": 0 },
            { "key": "a", "edge": "up", "at_ms": 60 },
            { "key": "backspace", "edge": "down", "at_ms": 900 }
        ] }"#;
        let script = ReplayScript::from_json(json).unwrap();
        let events = script.to_events().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], KeyTransitionEvent::up(KeyId(0), 60 * NANOS_PER_MS));
        assert_eq!(events[2].key, KeyId::BACKSPACE);
    }

    #[test]
    fn test_out_of_order_script_is_rejected() {
        let json = r#"{ "events": [
            { "key": "a", "edge": "down", "at_ms": 100 },
            { "key": "a", "edge": "up", "at_ms": 50 }
        ] }"#;
        let script = ReplayScript::from_json(json).unwrap();
        assert!(matches!(script.to_events(), Err(InputError::Script(_))));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let json = r#"{ "events": [ { "key": "f13", "edge": "down", "at_ms": 0 } ] }"#;
        let script = ReplayScript::from_json(json).unwrap();
        assert!(matches!(script.to_events(), Err(InputError::Script(_))));
    }

    #[test]
    fn test_generated_script_shape() {
        let profile = SpeedLevel::DEFAULT.profile();
        let script = script_for_text("a", &profile).unwrap();
        let at: Vec<u64> = script.events.iter().map(|e| e.at_ms).collect();
        // dot 60ms, gap 60ms, dash 180ms
        assert_eq!(at, vec![0, 60, 120, 300]);

        let spaced = script_for_text("e  e", &profile).unwrap();
        let second_down = spaced.events[2].at_ms;
        assert_eq!(second_down, 60 + 720 + 420 + 840);
    }

    #[test]
    fn test_generated_script_rejects_unknown_characters() {
        let profile = SpeedLevel::DEFAULT.profile();
        assert!(matches!(script_for_text("a#", &profile), Err(InputError::Script(_))));
    }

    #[test]
    fn test_dropping_guard_stops_playback() {
        let script = script_for_text("tt", &SpeedLevel::new(1).unwrap().profile()).unwrap();
        let source = Box::new(ReplaySource::new("test", &script).unwrap());
        let (tx, rx) = crossbeam_channel::unbounded();
        let guard = source.open(tx).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.edge, Edge::Down);
        drop(guard);
        // the player exits and drops its sender without sending the rest
        let rest: Vec<_> = rx.iter().collect();
        assert!(rest.len() < 3);
    }
}
