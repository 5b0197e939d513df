//! The decoding state machine.
//!
//! Everything mutable lives in one [`DecoderState`] value and every input is
//! handled by [`DecoderState::step`], which returns the next state together
//! with the effects the host has to carry out. Nothing here reads a clock or
//! touches the sink, so transitions can be replayed in tests without a live
//! event source.

use super::accumulator::{SymbolAccumulator, TranslationOutcome};
use super::scheduler::{ArmedDeadline, Boundary, BoundaryScheduler, DeadlineToken};
use super::timing::{classify, press_duration, SpeedLevel, SpeedProfile, Timebase};
use crate::error::DecoderError;
use crate::input::{KeyId, KeyRole};
use crate::sink::{SinkRequest, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `key` went down at `since` and has not been released
    Keying { key: KeyId, since: u64 },
    /// A codeword is waiting for the character boundary
    CharPending,
    /// A character was just written; waiting for the word boundary
    WordPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    KeyDown {
        key: KeyId,
        role: KeyRole,
        at: u64,
    },
    /// `caret` is the sink's insertion point when the key was released
    KeyUp {
        key: KeyId,
        role: KeyRole,
        at: u64,
        caret: usize,
    },
    BoundaryElapsed(DeadlineToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Sink(SinkRequest),
    Arm(ArmedDeadline),
    Disarm,
    SpeedChanged(SpeedLevel),
    Decoded(char),
    /// Non-fatal condition for the log
    Report(DecoderError),
}

/// Whether the host should still deliver the key to its default handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    Consumed,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderOptions {
    /// Arm the word boundary even after an unrecognised codeword, so garbled
    /// input is still followed by a space
    pub space_after_unrecognized: bool,
    /// Timebase of the event timestamps
    pub timebase: Timebase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DecoderState,
    pub effects: Vec<Effect>,
    pub disposition: KeyDisposition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderState {
    phase: Phase,
    speed: SpeedLevel,
    /// Set by a speed key's press so its release is not read as keying
    speed_guard: bool,
    accumulator: SymbolAccumulator,
    scheduler: BoundaryScheduler,
    options: DecoderOptions,
}

impl DecoderState {
    pub fn new(speed: SpeedLevel, options: DecoderOptions) -> Self {
        Self {
            phase: Phase::Idle,
            speed,
            speed_guard: false,
            accumulator: SymbolAccumulator::new(),
            scheduler: BoundaryScheduler::new(),
            options,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn speed(&self) -> SpeedLevel {
        self.speed
    }

    pub fn profile(&self) -> SpeedProfile {
        self.speed.profile()
    }

    pub fn speed_guard(&self) -> bool {
        self.speed_guard
    }

    pub fn pending_code(&self) -> &str {
        self.accumulator.code()
    }

    pub fn provisional_range(&self) -> Option<TextRange> {
        self.accumulator.range()
    }

    pub fn armed_deadline(&self) -> Option<ArmedDeadline> {
        self.scheduler.armed()
    }

    /// Compute the transition for one input without modifying `self`
    pub fn step(&self, input: &Input) -> Transition {
        let mut next = self.clone();
        let mut effects = Vec::new();
        let disposition = match *input {
            Input::KeyDown { key, role, at } => next.key_down(key, role, at, &mut effects),
            Input::KeyUp { key, role, at, caret } => next.key_up(key, role, at, caret, &mut effects),
            Input::BoundaryElapsed(token) => {
                next.boundary_elapsed(token, &mut effects);
                KeyDisposition::Consumed
            }
        };
        Transition {
            next,
            effects,
            disposition,
        }
    }

    /// Select a speed level directly, outside of key handling
    pub fn set_speed(&mut self, speed: SpeedLevel) {
        self.speed = speed;
    }

    fn key_down(&mut self, key: KeyId, role: KeyRole, at: u64, effects: &mut Vec<Effect>) -> KeyDisposition {
        // Any press pre-empts a boundary that is about to fire
        self.disarm(effects);

        match role {
            KeyRole::Speed(level) => {
                match SpeedLevel::new(level) {
                    Ok(speed) if speed != self.speed => {
                        self.speed = speed;
                        effects.push(Effect::SpeedChanged(speed));
                    }
                    Ok(_) => {}
                    Err(err) => effects.push(Effect::Report(err)),
                }
                self.speed_guard = true;
                KeyDisposition::Consumed
            }
            KeyRole::Cancel => {
                self.phase = Phase::Idle;
                match self.accumulator.cancel() {
                    Some(request) => {
                        effects.push(Effect::Sink(request));
                        KeyDisposition::Consumed
                    }
                    None => KeyDisposition::PassThrough,
                }
            }
            KeyRole::Keying => {
                self.speed_guard = false;
                match self.phase {
                    // auto-repeat while held keeps the original press time
                    Phase::Keying { key: held, .. } if held == key => {}
                    _ => self.phase = Phase::Keying { key, since: at },
                }
                KeyDisposition::Consumed
            }
        }
    }

    fn key_up(
        &mut self,
        key: KeyId,
        role: KeyRole,
        at: u64,
        caret: usize,
        effects: &mut Vec<Effect>,
    ) -> KeyDisposition {
        if role == KeyRole::Cancel {
            return KeyDisposition::PassThrough;
        }

        if self.speed_guard {
            self.speed_guard = false;
            if role == KeyRole::Keying && self.is_held(key) {
                // a press that straddled a speed change yields no symbol
                self.phase = if self.accumulator.is_empty() {
                    Phase::Idle
                } else {
                    Phase::CharPending
                };
            }
            self.rearm_pending(effects);
            return KeyDisposition::Consumed;
        }

        let Phase::Keying { key: held, since } = self.phase else {
            // release without a recorded press
            return KeyDisposition::Consumed;
        };
        if held != key {
            return KeyDisposition::Consumed;
        }

        let profile = self.profile();
        let duration = press_duration(since, at, self.options.timebase);
        let symbol = classify(duration, &profile);
        effects.push(Effect::Sink(self.accumulator.append(symbol, caret)));
        self.arm(profile.char_boundary, Boundary::Char, effects);
        self.phase = Phase::CharPending;
        KeyDisposition::Consumed
    }

    fn boundary_elapsed(&mut self, token: DeadlineToken, effects: &mut Vec<Effect>) {
        match self.scheduler.fire(token) {
            // superseded or cancelled
            None => {}
            Some(Boundary::Char) => {
                let (outcome, request) = self.accumulator.translate_and_clear();
                if let Some(request) = request {
                    effects.push(Effect::Sink(request));
                }
                match outcome {
                    TranslationOutcome::Success(ch) => {
                        effects.push(Effect::Decoded(ch));
                        self.arm_word_boundary(effects);
                    }
                    TranslationOutcome::Failure if self.options.space_after_unrecognized => {
                        self.arm_word_boundary(effects);
                    }
                    TranslationOutcome::Failure => self.phase = Phase::Idle,
                }
            }
            Some(Boundary::Word) => {
                effects.push(Effect::Sink(SinkRequest::insert(" ")));
                self.phase = Phase::Idle;
            }
        }
    }

    fn arm_word_boundary(&mut self, effects: &mut Vec<Effect>) {
        self.arm(self.profile().word_boundary, Boundary::Word, effects);
        self.phase = Phase::WordPending;
    }

    fn is_held(&self, key: KeyId) -> bool {
        matches!(self.phase, Phase::Keying { key: held, .. } if held == key)
    }

    /// Restore the deadline of a pending phase after a speed key interrupted it
    fn rearm_pending(&mut self, effects: &mut Vec<Effect>) {
        let profile = self.profile();
        match self.phase {
            Phase::CharPending => self.arm(profile.char_boundary, Boundary::Char, effects),
            Phase::WordPending => self.arm(profile.word_boundary, Boundary::Word, effects),
            Phase::Idle | Phase::Keying { .. } => {}
        }
    }

    fn arm(&mut self, after: std::time::Duration, boundary: Boundary, effects: &mut Vec<Effect>) {
        effects.push(Effect::Arm(self.scheduler.arm(after, boundary)));
    }

    fn disarm(&mut self, effects: &mut Vec<Effect>) {
        if self.scheduler.cancel() {
            effects.push(Effect::Disarm);
        }
    }
}

impl Default for DecoderState {
    fn default() -> Self {
        Self::new(SpeedLevel::DEFAULT, DecoderOptions::default())
    }
}
