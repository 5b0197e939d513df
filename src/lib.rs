//! Morse code keyboard input.
//!
//! Timed key presses are classified into dots and dashes, collected into
//! codewords and turned into characters and word spaces once the operator
//! pauses. The decoder itself ([`cw`]) is a pure state machine; capture
//! ([`input`]) and text output ([`sink`]) are pluggable capabilities, and
//! [`runtime`] ties them together on a single thread.

pub mod config;
pub mod cw;
pub mod error;
pub mod input;
pub mod runtime;
pub mod sink;

pub use config::Settings;
pub use cw::{CwEngine, SpeedLevel};
pub use error::{ConfigError, DecoderError, InputError, SinkError};
pub use runtime::{Runtime, RuntimeHandle};
pub use sink::{TextBuffer, TextSink};
