pub const SING_LOUDER_TIP: &str =
    "We couldn't hear you. Sing louder or move closer to the microphone.";
pub const CALIBRATION_TIP: &str =
    "Start with the Pitch Calibration Fundamentals lesson to lock in your reference notes.";
pub const SUSTAIN_TIP: &str =
    "Try the Sustained Notes & Breath Control lesson to keep long notes on pitch.";
pub const MICRO_PITCH_TIP: &str =
    "Polish your tuning with the Micro-Pitch Adjustment lesson.";
pub const COMPETITIVE_TIP: &str =
    "Outstanding performance! You're ready to take on Competitive Mode.";
pub const STEADINESS_TIP: &str =
    "Your pitch wandered a lot this time. Focus on holding notes steadier.";

/// Exactly one tip per score bracket; the table covers every score.
pub fn bracket_tip(accuracy_score: f64) -> &'static str {
    if accuracy_score < 65.0 {
        CALIBRATION_TIP
    } else if accuracy_score < 80.0 {
        SUSTAIN_TIP
    } else if accuracy_score < 90.0 {
        MICRO_PITCH_TIP
    } else {
        COMPETITIVE_TIP
    }
}
