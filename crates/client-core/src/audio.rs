//! Call-progress audio cues
//!
//! Two cues exist: the ringtone played to the receiver of an incoming call
//! and the dial tone played to the caller while waiting for an answer. Each
//! can come from a configured audio asset (raw little-endian 16-bit PCM); if
//! no asset is configured or the file cannot be read, a tone is synthesized
//! instead so the cue is never silently missing.
//!
//! Playback goes through the [`AudioSink`] seam. The bundled [`NullSink`]
//! discards audio; a real client plugs in its platform output here.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::CallConfig;

/// Samples per second of synthesized cues and expected of asset files.
pub const SAMPLE_RATE: u32 = 8_000;

/// Which call-progress cue to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    /// Played to the receiver while an incoming call rings
    Ringtone,
    /// Played to the caller while the outgoing call is unanswered
    DialTone,
}

/// One looping cue: mono 16-bit PCM at [`SAMPLE_RATE`].
#[derive(Debug, Clone)]
pub struct AudioCue {
    pub kind: CueKind,
    pub sample_rate: u32,
    /// One period of the cue; the sink loops it until stopped
    pub samples: Arc<Vec<i16>>,
}

/// Platform audio output.
pub trait AudioSink: Send + Sync {
    /// Start looping `cue`, replacing any cue currently playing.
    fn start(&self, cue: AudioCue);

    /// Stop playback.
    fn stop(&self);
}

/// Sink that discards all audio. Used headless and in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&self, _cue: AudioCue) {}
    fn stop(&self) {}
}

/// Tone synthesis for when no audio asset is available.
pub mod synth {
    use super::SAMPLE_RATE;

    const AMPLITUDE: f64 = 0.3;

    fn append_tone(samples: &mut Vec<i16>, freq: f64, seconds: f64) {
        let count = (SAMPLE_RATE as f64 * seconds) as usize;
        let peak = AMPLITUDE * i16::MAX as f64;
        for n in 0..count {
            let t = n as f64 / SAMPLE_RATE as f64;
            let value = (2.0 * std::f64::consts::PI * freq * t).sin() * peak;
            samples.push(value as i16);
        }
    }

    fn append_silence(samples: &mut Vec<i16>, seconds: f64) {
        let count = (SAMPLE_RATE as f64 * seconds) as usize;
        samples.resize(samples.len() + count, 0);
    }

    /// One two-second ringtone period: a high beep in the first second and a
    /// lower beep in the second, each a half second of tone and a half
    /// second of silence.
    pub fn ringtone() -> Vec<i16> {
        let mut samples = Vec::new();
        append_tone(&mut samples, 880.0, 0.5);
        append_silence(&mut samples, 0.5);
        append_tone(&mut samples, 660.0, 0.5);
        append_silence(&mut samples, 0.5);
        samples
    }

    /// One three-second dial-tone period: a one-second 440 Hz tone followed
    /// by two seconds of silence.
    pub fn dial_tone() -> Vec<i16> {
        let mut samples = Vec::new();
        append_tone(&mut samples, 440.0, 1.0);
        append_silence(&mut samples, 2.0);
        samples
    }
}

/// Plays call-progress cues, preferring configured assets and falling back
/// to synthesized tones.
pub struct CuePlayer {
    sink: Arc<dyn AudioSink>,
    ringtone: Arc<Vec<i16>>,
    dial_tone: Arc<Vec<i16>>,
}

impl CuePlayer {
    /// Build a player from the configured assets, resolving each to either
    /// the loaded asset or a synthesized fallback up front.
    pub fn new(config: &CallConfig, sink: Arc<dyn AudioSink>) -> Self {
        let ringtone = load_or_synth(config.ringtone_asset.as_deref(), synth::ringtone);
        let dial_tone = load_or_synth(config.dial_tone_asset.as_deref(), synth::dial_tone);
        Self {
            sink,
            ringtone: Arc::new(ringtone),
            dial_tone: Arc::new(dial_tone),
        }
    }

    /// Start looping a cue, replacing whatever is playing.
    pub fn play(&self, kind: CueKind) {
        let samples = match kind {
            CueKind::Ringtone => self.ringtone.clone(),
            CueKind::DialTone => self.dial_tone.clone(),
        };
        self.sink.start(AudioCue {
            kind,
            sample_rate: SAMPLE_RATE,
            samples,
        });
    }

    /// Stop any playing cue.
    pub fn stop(&self) {
        self.sink.stop();
    }
}

fn load_or_synth(asset: Option<&Path>, fallback: fn() -> Vec<i16>) -> Vec<i16> {
    let Some(path) = asset else {
        return fallback();
    };
    match std::fs::read(path) {
        Ok(bytes) if bytes.len() >= 2 => bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
        Ok(_) => {
            warn!(path = %path.display(), "audio asset empty, synthesizing cue");
            fallback()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "audio asset unreadable, synthesizing cue");
            fallback()
        }
    }
}
