/// Narrator voices offered by the speech endpoint
pub const AVAILABLE_VOICES: [&str; 9] = [
    "alloy", "echo", "fable", "onyx", "nova", "shimmer", "coral", "sage", "ash",
];

/// Voice used until the caller picks another
pub const DEFAULT_VOICE: &str = "nova";

/// Slowest narration speed accepted by the speech endpoint
pub const MIN_SPEED: f64 = 0.25;

/// Fastest narration speed accepted by the speech endpoint
pub const MAX_SPEED: f64 = 4.0;

/// Whether `voice` is one of [`AVAILABLE_VOICES`]
pub fn is_supported_voice(voice: &str) -> bool {
    AVAILABLE_VOICES.contains(&voice)
}

/// Whether `speed` is within the accepted narration range
pub fn is_supported_speed(speed: f64) -> bool {
    (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_voice_is_supported() {
        assert!(is_supported_voice(DEFAULT_VOICE));
    }

    #[test]
    fn unknown_voice_is_rejected() {
        assert!(!is_supported_voice("ballad"));
        assert!(!is_supported_voice("Nova"));
    }

    #[test]
    fn speed_bounds_are_inclusive() {
        assert!(is_supported_speed(0.25));
        assert!(is_supported_speed(4.0));
        assert!(!is_supported_speed(0.2));
        assert!(!is_supported_speed(4.5));
    }
}
