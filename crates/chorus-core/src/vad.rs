//! Voice activity detection.
//!
//! Consumes per-frame energy measures from the local capture stream and
//! derives a debounced speaking boolean. Speaking is declared the moment
//! energy crosses the threshold; silence only after energy has stayed
//! below it for the hold time, so brief pauses don't flicker.
//!
//! This is a pure state machine: the sampling loop lives in the driver,
//! which feeds `(energy, now)` pairs in and publishes the returned
//! transitions to the local roster entry. Only transitions are returned,
//! never steady-state readings.

use std::{ops::Sub, time::Duration};

/// Default energy threshold on normalized [0, 1] frame energy.
pub const DEFAULT_THRESHOLD: f32 = 0.01;

/// Default hold time before silence is declared.
pub const DEFAULT_HOLD: Duration = Duration::from_millis(300);

/// Detector tuning.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Energy level at or above which a frame counts as speech.
    pub threshold: f32,
    /// How long energy must stay below threshold before silence is
    /// declared.
    pub hold: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD, hold: DEFAULT_HOLD }
    }
}

/// Debounced speaking/silence detector.
///
/// Generic over `I` to support both real and virtual time, matching the
/// rest of the coordinator's state machines.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector<I = std::time::Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: VadConfig,
    speaking: bool,
    /// Start of the current below-threshold run. `None` while above
    /// threshold or already silent.
    below_since: Option<I>,
    muted: bool,
}

impl<I> VoiceActivityDetector<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// New detector in the silent state.
    pub fn new(config: VadConfig) -> Self {
        Self { config, speaking: false, below_since: None, muted: false }
    }

    /// Current debounced state.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Whether publishing is currently suppressed.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Feed one frame's energy measure.
    ///
    /// Returns `Some(speaking)` when the debounced state transitions and
    /// should be published, `None` otherwise. While muted, all frames are
    /// ignored.
    pub fn sample(&mut self, energy: f32, now: I) -> Option<bool> {
        if self.muted {
            return None;
        }

        if energy >= self.config.threshold {
            self.below_since = None;
            if self.speaking {
                return None;
            }
            self.speaking = true;
            return Some(true);
        }

        if !self.speaking {
            return None;
        }

        match self.below_since {
            None => {
                self.below_since = Some(now);
                None
            },
            Some(since) if now - since >= self.config.hold => {
                self.speaking = false;
                self.below_since = None;
                Some(false)
            },
            Some(_) => None,
        }
    }

    /// Set the mute flag.
    ///
    /// Muting forces silence: if we were speaking, the transition to
    /// silence is returned for publishing. While muted, `sample` is
    /// suppressed entirely. Unmuting publishes nothing; the next frames
    /// decide.
    pub fn set_muted(&mut self, muted: bool) -> Option<bool> {
        self.muted = muted;
        if muted {
            self.below_since = None;
            if self.speaking {
                self.speaking = false;
                return Some(false);
            }
        }
        None
    }

    /// Reset to silent.
    ///
    /// The session publishes one final `is_speaking = false` on stop
    /// regardless of detector state, so this only clears internals.
    pub fn stop(&mut self) {
        self.speaking = false;
        self.below_since = None;
    }
}
