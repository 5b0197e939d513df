use crossbeam_channel::Sender;
use log::{debug, info, warn};
use midir::{MidiInput, MidiOutput};

use super::{CaptureGuard, KeyId, KeyMap, KeySource, KeyTransitionEvent};
use crate::cw::Timebase;
use crate::error::InputError;

/// MIDI event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
}

/// Vail adapter MIDI constants
mod vail {
    /// Control Change 0: Mode Control
    /// Values 0-63: MIDI mode (sends Note events), 64-127: Keyboard mode (sends HID)
    pub const CC_MODE: u8 = 0x00;
    pub const MODE_MIDI: u8 = 0x00;
}

/// List available MIDI input devices
pub fn list_devices() -> Vec<String> {
    match MidiInput::new("Morse IME List") {
        Ok(midi_in) => midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect(),
        Err(_) => vec![],
    }
}

/// A MIDI keyer: each note is a key, note on/off are its edges
pub struct MidiSource {
    device: String,
    cancel_note: Option<u8>,
}

impl MidiSource {
    pub fn new(device: impl Into<String>, cancel_note: Option<u8>) -> Self {
        Self {
            device: device.into(),
            cancel_note,
        }
    }

    /// Every note keys symbols, except the configured cancel note
    pub fn keymap(&self) -> KeyMap {
        let keying = (0..=127u8)
            .filter(|note| Some(*note) != self.cancel_note)
            .map(|note| KeyId(u32::from(note)));
        KeyMap {
            cancel: self.cancel_note.map(|note| KeyId(u32::from(note))),
            ..KeyMap::keying_only(keying)
        }
    }
}

impl KeySource for MidiSource {
    fn name(&self) -> &str {
        &self.device
    }

    /// midir stamps messages in microseconds
    fn timebase(&self) -> Timebase {
        Timebase::MICROS
    }

    fn open(self: Box<Self>, events: Sender<KeyTransitionEvent>) -> Result<CaptureGuard, InputError> {
        let device = self.device;

        let midi_in = MidiInput::new("Morse IME Input")
            .map_err(|e| InputError::Midi(format!("Failed to create MIDI input: {}", e)))?;

        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == device).unwrap_or(false))
            .ok_or_else(|| InputError::Midi(format!("MIDI input device '{}' not found", device)))?;

        let input_connection = midi_in
            .connect(
                &in_port,
                "morse-ime-input",
                move |timestamp, message, _| match parse_midi_message(message) {
                    Some(MidiEvent::NoteOn { note, .. }) => {
                        let _ = events.send(KeyTransitionEvent::down(KeyId(u32::from(note)), timestamp));
                    }
                    Some(MidiEvent::NoteOff { note }) => {
                        let _ = events.send(KeyTransitionEvent::up(KeyId(u32::from(note)), timestamp));
                    }
                    Some(MidiEvent::ControlChange { controller, value }) => {
                        debug!("[midi] CC: controller={}, value={}", controller, value);
                    }
                    None => {}
                },
                (),
            )
            .map_err(|e| InputError::Midi(format!("Failed to connect MIDI input: {}", e)))?;

        // Switch a Vail adapter into MIDI mode so it sends notes instead of keystrokes
        let output_connection = MidiOutput::new("Morse IME Output")
            .ok()
            .and_then(|midi_out| {
                let port = midi_out
                    .ports()
                    .into_iter()
                    .find(|p| midi_out.port_name(p).map(|n| n == device).unwrap_or(false))?;
                midi_out.connect(&port, "morse-ime-output").ok()
            })
            .map(|mut conn| {
                let mode_switch = [0xB0, vail::CC_MODE, vail::MODE_MIDI];
                if let Err(e) = conn.send(&mode_switch) {
                    warn!("[midi] Failed to send MIDI mode switch: {}", e);
                }
                conn
            });
        if output_connection.is_none() {
            debug!("[midi] no MIDI output for '{}', input only", device);
        }

        info!("[midi] listening on '{}'", device);
        Ok(CaptureGuard::new(device, move || {
            drop(output_connection);
            let _ = input_connection.close();
        }))
    }
}

/// Parse raw MIDI bytes into a MidiEvent
fn parse_midi_message(message: &[u8]) -> Option<MidiEvent> {
    let status = *message.first()?;

    match status & 0xF0 {
        0x90 if message.len() >= 3 => {
            let note = message[1];
            let velocity = message[2];
            if velocity > 0 {
                Some(MidiEvent::NoteOn { note, velocity })
            } else {
                // Note On with velocity 0 is treated as Note Off
                Some(MidiEvent::NoteOff { note })
            }
        }
        0x80 if message.len() >= 2 => Some(MidiEvent::NoteOff { note: message[1] }),
        0xB0 if message.len() >= 3 => Some(MidiEvent::ControlChange {
            controller: message[1],
            value: message[2],
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyRole;

    #[test]
    fn test_parse_note_messages() {
        assert_eq!(
            parse_midi_message(&[0x90, 61, 100]),
            Some(MidiEvent::NoteOn { note: 61, velocity: 100 })
        );
        assert_eq!(parse_midi_message(&[0x91, 61, 0]), Some(MidiEvent::NoteOff { note: 61 }));
        assert_eq!(parse_midi_message(&[0x80, 62]), Some(MidiEvent::NoteOff { note: 62 }));
        assert_eq!(parse_midi_message(&[]), None);
        assert_eq!(parse_midi_message(&[0xF8]), None);
    }

    #[test]
    fn test_keymap_reserves_cancel_note() {
        let keymap = MidiSource::new("keyer", Some(0)).keymap();
        assert_eq!(keymap.role(KeyId(0)), Some(KeyRole::Cancel));
        assert_eq!(keymap.role(KeyId(61)), Some(KeyRole::Keying));
        assert_eq!(keymap.role(KeyId(128)), None);
    }
}
