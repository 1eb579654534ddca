use serde::Serialize;

/// Piper voice settings for one utterance.
///
/// Higher noise values give more expressive intonation and rhythm; the
/// length scale slows speech down for intelligibility. `pitch_shift_semitones`
/// is never passed to Piper, it is applied in post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SynthesisParameters {
    pub noise_scale: f32,
    pub noise_width: f32,
    pub length_scale: f32,
    pub pitch_shift_semitones: f32,
}

pub const STATEMENT: SynthesisParameters = SynthesisParameters {
    noise_scale: 0.55,
    noise_width: 0.70,
    length_scale: 1.15,
    pitch_shift_semitones: 0.0,
};

pub const QUESTION: SynthesisParameters = SynthesisParameters {
    noise_scale: 0.65,
    noise_width: 0.85,
    length_scale: 1.15,
    pitch_shift_semitones: 0.4,
};

pub fn select_parameters(is_question: bool) -> SynthesisParameters {
    if is_question { QUESTION } else { STATEMENT }
}

impl SynthesisParameters {
    /// Command-line flags understood by the Piper CLI.
    pub fn engine_args(&self) -> [String; 6] {
        [
            "--length-scale".to_string(),
            format!("{:.2}", self.length_scale),
            "--noise-scale".to_string(),
            format!("{:.2}", self.noise_scale),
            "--noise-w".to_string(),
            format!("{:.2}", self.noise_width),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_pure() {
        for q in [true, false] {
            let a = select_parameters(q);
            let b = select_parameters(q);
            assert_eq!(a.noise_scale.to_bits(), b.noise_scale.to_bits());
            assert_eq!(a.noise_width.to_bits(), b.noise_width.to_bits());
            assert_eq!(a.length_scale.to_bits(), b.length_scale.to_bits());
            assert_eq!(a.pitch_shift_semitones.to_bits(), b.pitch_shift_semitones.to_bits());
        }
    }

    #[test]
    fn only_questions_shift_pitch() {
        assert_eq!(select_parameters(false).pitch_shift_semitones, 0.0);
        assert_eq!(select_parameters(true).pitch_shift_semitones, 0.4);
        assert_eq!(select_parameters(true).length_scale, select_parameters(false).length_scale);
    }

    #[test]
    fn engine_args_are_fixed_precision() {
        assert_eq!(
            QUESTION.engine_args(),
            ["--length-scale", "1.15", "--noise-scale", "0.65", "--noise-w", "0.85"]
                .map(String::from)
        );
    }
}
