#[cfg(feature = "midi")]
pub mod midi;
pub mod replay;

use std::fmt;

use crossbeam_channel::Sender;
use log::info;
use serde::{Deserialize, Serialize};

use crate::cw::Timebase;
use crate::error::InputError;

/// Platform key code as reported by the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u32);

/// Names for the macOS virtual key codes the default keymap uses
const KEY_NAMES: &[(&str, u32)] = &[
    ("a", 0), ("s", 1), ("d", 2), ("f", 3), ("h", 4), ("g", 5), ("z", 6),
    ("x", 7), ("c", 8), ("v", 9), ("b", 11), ("q", 12), ("w", 13), ("e", 14),
    ("r", 15), ("y", 16), ("t", 17), ("1", 18), ("2", 19), ("3", 20), ("4", 21),
    ("6", 22), ("5", 23), ("9", 25), ("7", 26), ("8", 28), ("0", 29), ("o", 31),
    ("u", 32), ("i", 34), ("p", 35), ("l", 37), ("j", 38), ("k", 40), ("n", 45),
    ("m", 46), ("backspace", 51),
];

impl KeyId {
    pub const BACKSPACE: KeyId = KeyId(51);

    /// Resolve a key name (`"a"`, `"7"`, `"backspace"`) or a decimal code
    pub fn from_name(name: &str) -> Option<KeyId> {
        let lower = name.trim().to_ascii_lowercase();
        KEY_NAMES
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, code)| KeyId(*code))
            .or_else(|| lower.parse().ok().map(KeyId))
    }

    pub fn name(self) -> Option<&'static str> {
        KEY_NAMES
            .iter()
            .find(|(_, code)| *code == self.0)
            .map(|(n, _)| *n)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "#{}", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Down,
    Up,
}

/// One key transition from the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransitionEvent {
    pub key: KeyId,
    pub edge: Edge,
    /// Monotonic ticks in the source's timebase
    pub timestamp: u64,
}

impl KeyTransitionEvent {
    pub fn down(key: KeyId, timestamp: u64) -> Self {
        Self { key, edge: Edge::Down, timestamp }
    }

    pub fn up(key: KeyId, timestamp: u64) -> Self {
        Self { key, edge: Edge::Up, timestamp }
    }
}

/// What a key means to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Its press duration keys a dot or a dash
    Keying,
    /// Selects a speed level on press
    Speed(u8),
    /// Discards the pending codeword
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedKey {
    pub key: KeyId,
    pub level: u8,
}

/// Allow-list of keys the decoder reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMap {
    pub keying: Vec<KeyId>,
    pub speed: Vec<SpeedKey>,
    pub cancel: Option<KeyId>,
}

impl KeyMap {
    /// Roles for an arbitrary key. `None` means the key is not ours.
    pub fn role(&self, key: KeyId) -> Option<KeyRole> {
        if self.cancel == Some(key) {
            return Some(KeyRole::Cancel);
        }
        if let Some(speed) = self.speed.iter().find(|s| s.key == key) {
            return Some(KeyRole::Speed(speed.level));
        }
        self.keying.contains(&key).then_some(KeyRole::Keying)
    }

    /// Any of `keys` keys symbols; nothing else is mapped
    pub fn keying_only(keys: impl IntoIterator<Item = KeyId>) -> Self {
        Self {
            keying: keys.into_iter().collect(),
            speed: Vec::new(),
            cancel: None,
        }
    }
}

impl Default for KeyMap {
    /// Letter keys key symbols, digits 1-9 pick the speed, backspace cancels
    fn default() -> Self {
        let keying = KEY_NAMES
            .iter()
            .filter(|(name, _)| name.len() == 1 && name.chars().all(|c| c.is_ascii_lowercase()))
            .map(|(_, code)| KeyId(*code))
            .collect();
        let speed = KEY_NAMES
            .iter()
            .filter_map(|(name, code)| {
                let level = name.parse::<u8>().ok().filter(|l| (1..=9).contains(l))?;
                Some(SpeedKey { key: KeyId(*code), level })
            })
            .collect();
        Self {
            keying,
            speed,
            cancel: Some(KeyId::BACKSPACE),
        }
    }
}

/// Releases a capture when dropped, so the hook never outlives its user
pub struct CaptureGuard {
    name: String,
    release: Option<Box<dyn FnOnce()>>,
}

impl CaptureGuard {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            info!("[input] {} capture released", self.name);
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

/// Something that produces key transitions, e.g. a keyboard hook or a keyer
pub trait KeySource {
    fn name(&self) -> &str;

    /// Ratio for converting this source's timestamps
    fn timebase(&self) -> Timebase;

    /// Start delivering events. Capture stops when the guard is dropped;
    /// the source drops its sender when it has nothing more to deliver.
    fn open(self: Box<Self>, events: Sender<KeyTransitionEvent>) -> Result<CaptureGuard, InputError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_default_keymap_roles() {
        let keymap = KeyMap::default();
        assert_eq!(keymap.role(KeyId::from_name("a").unwrap()), Some(KeyRole::Keying));
        assert_eq!(keymap.role(KeyId::from_name("m").unwrap()), Some(KeyRole::Keying));
        assert_eq!(keymap.role(KeyId::from_name("3").unwrap()), Some(KeyRole::Speed(3)));
        assert_eq!(keymap.role(KeyId::BACKSPACE), Some(KeyRole::Cancel));
        // zero is named but not mapped
        assert_eq!(keymap.role(KeyId::from_name("0").unwrap()), None);
        assert_eq!(keymap.keying.len(), 26);
        assert_eq!(keymap.speed.len(), 9);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(KeyId::from_name("Backspace"), Some(KeyId(51)));
        assert_eq!(KeyId::from_name("120"), Some(KeyId(120)));
        assert_eq!(KeyId::from_name("nope"), None);
        assert_eq!(KeyId(25).to_string(), "9");
        assert_eq!(KeyId(99).to_string(), "#99");
    }

    #[test]
    fn test_capture_guard_releases_once() {
        let released = Rc::new(Cell::new(0));
        let counter = Rc::clone(&released);
        let guard = CaptureGuard::new("test", move || counter.set(counter.get() + 1));
        guard.release();
        assert_eq!(released.get(), 1);

        let counter = Rc::clone(&released);
        {
            let _guard = CaptureGuard::new("scoped", move || counter.set(counter.get() + 1));
        }
        assert_eq!(released.get(), 2);
    }
}
