//! Audio API.

/// Audio support.
pub trait Support {
    /// Audio interface.
    type Audio: Audio;

    /// Gets the core's audio.
    #[must_use]
    fn audio(&self) -> &Self::Audio;

    /// Mutably gets the core's audio.
    #[must_use]
    fn audio_mut(&mut self) -> &mut Self::Audio;
}

/// Audio interface.
///
/// The mixer accumulates signed 16-bit stereo samples at the configured
/// host sample rate; a front end drains them at its own pace.
pub trait Audio {
    /// Drains and returns the queued stereo samples, interleaved
    /// `[left, right, left, right, ...]`.
    fn drain(&mut self) -> Vec<i16>;
}
