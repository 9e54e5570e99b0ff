//! Musical note divisions for tempo synced effect times.

// -------------------------------------------------------------------------------------------------

/// Tempo used when the host doesn't provide a valid tempo.
pub const DEFAULT_BPM: f64 = 120.0;

// -------------------------------------------------------------------------------------------------

/// Note divisions, relative to a quarter note beat.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::FromRepr,
    strum::VariantNames,
)]
#[repr(usize)]
pub enum NoteDivision {
    #[strum(serialize = "1/1")]
    Whole = 0,
    #[strum(serialize = "1/2")]
    Half,
    #[default]
    #[strum(serialize = "1/4")]
    Quarter,
    #[strum(serialize = "1/8")]
    Eighth,
    #[strum(serialize = "1/16")]
    Sixteenth,
    #[strum(serialize = "1/32")]
    ThirtySecond,
    #[strum(serialize = "1/4T")]
    QuarterTriplet,
    #[strum(serialize = "1/8T")]
    EighthTriplet,
    #[strum(serialize = "1/16T")]
    SixteenthTriplet,
    #[strum(serialize = "1/4D")]
    DottedQuarter,
    #[strum(serialize = "1/8D")]
    DottedEighth,
    #[strum(serialize = "1/16D")]
    DottedSixteenth,
}

impl NoteDivision {
    /// Length of the division in quarter note beats.
    pub const fn beats(&self) -> f64 {
        match self {
            Self::Whole => 4.0,
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
            Self::ThirtySecond => 0.125,
            Self::QuarterTriplet => 4.0 / 3.0,
            Self::EighthTriplet => 2.0 / 3.0,
            Self::SixteenthTriplet => 1.0 / 3.0,
            Self::DottedQuarter => 1.5,
            Self::DottedEighth => 0.75,
            Self::DottedSixteenth => 0.375,
        }
    }

    /// Look up a division by its table index, falling back to a quarter note for invalid ones.
    pub fn from_index(index: usize) -> Self {
        Self::from_repr(index).unwrap_or_default()
    }

    /// Length of the division in milliseconds at the given tempo.
    ///
    /// Missing, non finite or non positive tempos fall back to [`DEFAULT_BPM`].
    pub fn time_ms(&self, bpm: Option<f64>) -> f64 {
        let bpm = match bpm {
            Some(bpm) if bpm.is_finite() && bpm > 0.0 => bpm,
            _ => DEFAULT_BPM,
        };
        self.beats() * 60000.0 / bpm
    }
}

/// Length of the division with the given table index in milliseconds at the given tempo.
pub fn tempo_synced_time_ms(division_index: usize, bpm: Option<f64>) -> f64 {
    NoteDivision::from_index(division_index).time_ms(bpm)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn division_table() {
        assert_eq!(tempo_synced_time_ms(2, Some(120.0)), 500.0);
        assert_eq!(tempo_synced_time_ms(0, Some(120.0)), 2000.0);
        assert_eq!(tempo_synced_time_ms(3, Some(60.0)), 500.0);
        assert!((tempo_synced_time_ms(6, Some(120.0)) - 666.666_666).abs() < 1e-3);
        assert_eq!(tempo_synced_time_ms(11, Some(120.0)), 187.5);
        assert_eq!(NoteDivision::iter().count(), 12);
    }

    #[test]
    fn fallbacks() {
        assert_eq!(tempo_synced_time_ms(2, None), 500.0);
        assert_eq!(tempo_synced_time_ms(2, Some(0.0)), 500.0);
        assert_eq!(tempo_synced_time_ms(2, Some(-90.0)), 500.0);
        assert_eq!(tempo_synced_time_ms(2, Some(f64::NAN)), 500.0);
        assert_eq!(NoteDivision::from_index(12), NoteDivision::Quarter);
        assert_eq!(tempo_synced_time_ms(99, Some(120.0)), 500.0);
    }

    #[test]
    fn names() {
        assert_eq!(NoteDivision::DottedEighth.to_string(), "1/8D");
        assert_eq!(
            NoteDivision::from_str("1/16T").unwrap(),
            NoteDivision::SixteenthTriplet
        );
        assert_eq!(NoteDivision::from_index(9), NoteDivision::DottedQuarter);
    }
}
