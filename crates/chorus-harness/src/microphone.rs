//! Scripted capture source for VAD scenarios.

use std::time::Duration;

use crate::cluster::VoiceCluster;

/// A scripted sequence of capture frames.
///
/// Each frame advances the cluster's virtual clock before being fed, so
/// debounce windows elapse exactly as written.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMicrophone {
    frames: Vec<(Duration, f32)>,
}

impl ScriptedMicrophone {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame delivered `after` the previous one with the given
    /// energy.
    #[must_use]
    pub fn frame(mut self, after: Duration, energy: f32) -> Self {
        self.frames.push((after, energy));
        self
    }

    /// Feed the script into client `idx`.
    pub fn run(&self, cluster: &mut VoiceCluster, idx: usize) {
        for (after, energy) in &self.frames {
            cluster.env.advance(*after);
            cluster.audio_frame(idx, *energy);
        }
    }
}
