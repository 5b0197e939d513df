mod accumulator;
mod decoder;
mod scheduler;
mod table;
mod timing;

use log::{debug, info, warn};

pub use accumulator::{SymbolAccumulator, TranslationOutcome};
pub use decoder::{DecoderOptions, DecoderState, Effect, Input, KeyDisposition, Phase, Transition};
pub use scheduler::{ArmedDeadline, Boundary, BoundaryScheduler, DeadlineToken};
pub use table::{encode, translate, MAX_CODEWORD_LEN};
pub use timing::{
    classify, estimate_wpm_from_dit, press_duration, profile_for, SpeedLevel, SpeedProfile, Symbol,
    Timebase,
};

use crate::error::DecoderError;
use crate::input::{Edge, KeyMap, KeyRole, KeyTransitionEvent};
use crate::sink::TextSink;

/// CW Engine that feeds key transitions through the decoder and writes the
/// results to a text sink
pub struct CwEngine<S: TextSink> {
    state: DecoderState,
    keymap: KeyMap,
    sink: S,
}

/// What happened for one dispatched input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub disposition: KeyDisposition,
    pub effects: Vec<Effect>,
}

impl Dispatched {
    fn pass_through() -> Self {
        Self {
            disposition: KeyDisposition::PassThrough,
            effects: Vec::new(),
        }
    }

    pub fn speed_change(&self) -> Option<SpeedLevel> {
        self.effects.iter().find_map(|e| match e {
            Effect::SpeedChanged(level) => Some(*level),
            _ => None,
        })
    }

    pub fn decoded(&self) -> Option<char> {
        self.effects.iter().find_map(|e| match e {
            Effect::Decoded(ch) => Some(*ch),
            _ => None,
        })
    }
}

impl<S: TextSink> CwEngine<S> {
    pub fn new(sink: S, keymap: KeyMap, speed: SpeedLevel, options: DecoderOptions) -> Self {
        info!(
            "[cw] decoder ready at speed {} (~{:.0} wpm)",
            speed,
            speed.profile().estimate_wpm()
        );
        Self {
            state: DecoderState::new(speed, options),
            keymap,
            sink,
        }
    }

    /// Handle a key transition from the capture layer.
    ///
    /// Keys outside the keymap pass through untouched.
    pub fn handle_event(&mut self, event: &KeyTransitionEvent) -> Result<Dispatched, DecoderError> {
        let Some(role) = self.keymap.role(event.key) else {
            return Ok(Dispatched::pass_through());
        };

        let input = match event.edge {
            Edge::Down => Input::KeyDown {
                key: event.key,
                role,
                at: event.timestamp,
            },
            Edge::Up => {
                // only a keying release can append a symbol at the caret
                let caret = match role {
                    KeyRole::Keying => self.sink.selection_position().map_err(|err| {
                        warn!("[cw] could not read caret: {}", err);
                        DecoderError::from(err)
                    })?,
                    KeyRole::Speed(_) | KeyRole::Cancel => 0,
                };
                Input::KeyUp {
                    key: event.key,
                    role,
                    at: event.timestamp,
                    caret,
                }
            }
        };
        self.dispatch(input)
    }

    /// Deliver a deadline firing
    pub fn boundary_elapsed(&mut self, token: DeadlineToken) -> Result<Dispatched, DecoderError> {
        self.dispatch(Input::BoundaryElapsed(token))
    }

    /// Run one transition. The next state is committed only once the sink
    /// has accepted every request; otherwise the decoder is left as it was.
    pub fn dispatch(&mut self, input: Input) -> Result<Dispatched, DecoderError> {
        let Transition {
            next,
            effects,
            disposition,
        } = self.state.step(&input);

        for effect in &effects {
            if let Effect::Sink(request) = effect {
                if let Err(err) = self.sink.apply(request) {
                    warn!("[cw] sink rejected {:?}: {}", request, err);
                    return Err(err.into());
                }
            }
        }

        for effect in &effects {
            match effect {
                Effect::Report(err) => warn!("[cw] {}", err),
                Effect::SpeedChanged(level) => info!(
                    "[cw] speed level {} (~{:.0} wpm)",
                    level,
                    level.profile().estimate_wpm()
                ),
                Effect::Decoded(ch) => debug!("[cw] decoded {:?}", ch),
                _ => {}
            }
        }

        self.state = next;
        Ok(Dispatched {
            disposition,
            effects,
        })
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn speed(&self) -> SpeedLevel {
        self.state.speed()
    }

    /// Change speed from outside the key stream (e.g. a settings update)
    pub fn set_speed(&mut self, speed: SpeedLevel) {
        self.state.set_speed(speed);
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
