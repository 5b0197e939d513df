use std::fmt;
use std::time::Duration;

use crate::error::DecoderError;

/// A single keyed element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Dot,
    Dash,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Dot => '.',
            Symbol::Dash => '-',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Symbol::Dot),
            '-' => Some(Symbol::Dash),
            _ => None,
        }
    }
}

/// Thresholds that drive decoding at one typing speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedProfile {
    /// Presses shorter than this are dots, anything else is a dash
    pub dit_threshold: Duration,
    /// Silence after the last press that ends the current character
    pub char_boundary: Duration,
    /// Silence after a decoded character that ends the word
    pub word_boundary: Duration,
}

impl SpeedProfile {
    const fn from_millis(dit: u64, char_gap: u64, word_gap: u64) -> Self {
        Self {
            dit_threshold: Duration::from_millis(dit),
            char_boundary: Duration::from_millis(char_gap),
            word_boundary: Duration::from_millis(word_gap),
        }
    }

    /// Nominal dot length at this speed.
    ///
    /// The dit threshold sits halfway between a dot (1 unit) and a dash
    /// (3 units), so one unit is half the threshold.
    pub fn dit_length(&self) -> Duration {
        self.dit_threshold / 2
    }

    /// Approximate sending speed in words per minute (PARIS standard)
    pub fn estimate_wpm(&self) -> f32 {
        estimate_wpm_from_dit(self.dit_length().as_secs_f32() * 1000.0)
    }
}

/// Per-level thresholds, slowest first. Each row keeps the 1 : 6 : 7 ratio
/// between dit threshold, character boundary and word boundary.
const SPEED_PROFILES: [SpeedProfile; 9] = [
    SpeedProfile::from_millis(200, 1200, 1400),
    SpeedProfile::from_millis(180, 1080, 1260),
    SpeedProfile::from_millis(160, 960, 1120),
    SpeedProfile::from_millis(140, 840, 980),
    SpeedProfile::from_millis(120, 720, 840),
    SpeedProfile::from_millis(100, 600, 700),
    SpeedProfile::from_millis(85, 510, 595),
    SpeedProfile::from_millis(70, 420, 490),
    SpeedProfile::from_millis(55, 330, 385),
];

/// User-selectable typing speed, 1 (slowest) to 9 (fastest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 9;
    pub const DEFAULT: SpeedLevel = SpeedLevel(5);

    pub fn new(level: u8) -> Result<Self, DecoderError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(DecoderError::InvalidSpeedLevel(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn profile(self) -> SpeedProfile {
        SPEED_PROFILES[usize::from(self.0 - Self::MIN)]
    }

    /// Every level, slowest first
    pub fn all() -> impl Iterator<Item = SpeedLevel> {
        (Self::MIN..=Self::MAX).map(SpeedLevel)
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for SpeedLevel {
    type Error = DecoderError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Look up the thresholds for a raw speed level
pub fn profile_for(level: u8) -> Result<SpeedProfile, DecoderError> {
    SpeedLevel::new(level).map(SpeedLevel::profile)
}

/// Classify a press duration. A press exactly at the threshold is a dash.
pub fn classify(duration: Duration, profile: &SpeedProfile) -> Symbol {
    if duration < profile.dit_threshold {
        Symbol::Dot
    } else {
        Symbol::Dash
    }
}

/// Ratio converting a source's monotonic ticks into nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub numer: u64,
    pub denom: u64,
}

impl Timebase {
    pub const NANOS: Timebase = Timebase { numer: 1, denom: 1 };
    pub const MICROS: Timebase = Timebase { numer: 1_000, denom: 1 };
    pub const MILLIS: Timebase = Timebase { numer: 1_000_000, denom: 1 };

    pub fn to_duration(self, ticks: u64) -> Duration {
        if self.denom == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(ticks) * u128::from(self.numer) / u128::from(self.denom);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::NANOS
    }
}

/// Time between a key's down and up timestamps. A release stamped before
/// its press counts as zero.
pub fn press_duration(down: u64, up: u64, timebase: Timebase) -> Duration {
    timebase.to_duration(up.saturating_sub(down))
}

/// Estimate WPM from a dit duration in milliseconds
///
/// Standard Morse timing: 1 word = 50 dit-lengths ("PARIS"),
/// so dit_ms = 1200 / wpm.
pub fn estimate_wpm_from_dit(dit_ms: f32) -> f32 {
    if dit_ms > 0.0 {
        1200.0 / dit_ms
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict_less_than() {
        for level in SpeedLevel::all() {
            let profile = level.profile();
            let t = profile.dit_threshold;
            assert_eq!(classify(t - Duration::from_nanos(1), &profile), Symbol::Dot);
            assert_eq!(classify(t, &profile), Symbol::Dash);
            assert_eq!(classify(t * 3, &profile), Symbol::Dash);
            assert_eq!(classify(Duration::ZERO, &profile), Symbol::Dot);
        }
    }

    #[test]
    fn test_higher_levels_are_faster() {
        let profiles: Vec<SpeedProfile> = SpeedLevel::all().map(SpeedLevel::profile).collect();
        for pair in profiles.windows(2) {
            assert!(pair[1].dit_threshold < pair[0].dit_threshold);
            assert!(pair[1].char_boundary < pair[0].char_boundary);
            assert!(pair[1].word_boundary < pair[0].word_boundary);
        }
    }

    #[test]
    fn test_boundaries_are_ordered_within_a_level() {
        for level in SpeedLevel::all() {
            let p = level.profile();
            assert!(p.dit_threshold < p.char_boundary);
            assert!(p.char_boundary < p.word_boundary);
        }
    }

    #[test]
    fn test_out_of_range_levels_are_rejected() {
        assert_eq!(profile_for(0), Err(DecoderError::InvalidSpeedLevel(0)));
        assert_eq!(profile_for(10), Err(DecoderError::InvalidSpeedLevel(10)));
        assert!(SpeedLevel::try_from(9).is_ok());
        assert_eq!(profile_for(5), Ok(SpeedLevel::DEFAULT.profile()));
    }

    #[test]
    fn test_nominal_level_is_about_20_wpm() {
        let wpm = SpeedLevel::DEFAULT.profile().estimate_wpm();
        assert!((wpm - 20.0).abs() < 0.1);
    }

    #[test]
    fn test_timebase_conversion() {
        assert_eq!(Timebase::NANOS.to_duration(1_500), Duration::from_nanos(1_500));
        assert_eq!(Timebase::MICROS.to_duration(250), Duration::from_micros(250));
        // mach-style 125/3 ratio
        let mach = Timebase { numer: 125, denom: 3 };
        assert_eq!(mach.to_duration(24_000_000), Duration::from_secs(1));
        assert_eq!(press_duration(10, 5, Timebase::MILLIS), Duration::ZERO);
        assert_eq!(press_duration(5, 105, Timebase::MILLIS), Duration::from_millis(100));
    }
}
