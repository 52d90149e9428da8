//! Audio routing from the active source into the encoder.
//!
//! One [`MixBus`] exists per render job. Each pass connects its source to
//! the bus and disconnects at pass end; the bus itself lives until the job
//! finishes, fails, or is cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::source::AudioChunk;

/// Output format of a mix bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixBusSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub gain: f32,
}

impl Default for MixBusSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            gain: 1.0,
        }
    }
}

/// Counts live audio graphs so leaks are observable.
#[derive(Debug, Clone, Default)]
pub struct AudioGraphRegistry {
    live: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl AudioGraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graphs created and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Graphs ever created through this registry.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Converts source audio into the bus format.
#[derive(Debug)]
pub struct MixBus {
    settings: MixBusSettings,
    registry: AudioGraphRegistry,
    connected: Option<String>,
    released: bool,
}

impl MixBus {
    pub fn new(settings: MixBusSettings, registry: &AudioGraphRegistry) -> Self {
        registry.acquire();
        tracing::debug!(
            sample_rate = settings.sample_rate,
            channels = settings.channels,
            "Audio graph created"
        );
        Self {
            settings,
            registry: registry.clone(),
            connected: None,
            released: false,
        }
    }

    pub fn settings(&self) -> MixBusSettings {
        self.settings
    }

    /// Route the source at `uri` into the bus, replacing any prior connection.
    pub fn connect(&mut self, uri: &str) {
        if let Some(prev) = self.connected.replace(uri.to_string()) {
            tracing::debug!(previous = %prev, "Replacing audio connection");
        }
    }

    pub fn disconnect(&mut self) {
        self.connected = None;
    }

    pub fn connected(&self) -> Option<&str> {
        self.connected.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Convert a chunk to interleaved samples at the bus rate and channel
    /// count. Nothing is produced while no source is connected.
    pub fn mix(&self, chunk: &AudioChunk) -> Vec<f32> {
        if self.released || self.connected.is_none() {
            return Vec::new();
        }
        let in_frames = chunk.frames();
        if in_frames == 0 || chunk.sample_rate == 0 {
            return Vec::new();
        }

        let in_ch = chunk.channels as usize;
        let out_ch = self.settings.channels.max(1) as usize;
        let ratio = self.settings.sample_rate as f64 / chunk.sample_rate as f64;
        let out_frames = (in_frames as f64 * ratio).round() as usize;

        let mut out = Vec::with_capacity(out_frames * out_ch);
        for i in 0..out_frames {
            // Linear interpolation between neighbouring input frames.
            let pos = i as f64 / ratio;
            let i0 = (pos.floor() as usize).min(in_frames - 1);
            let i1 = (i0 + 1).min(in_frames - 1);
            let t = (pos - i0 as f64) as f32;
            for c in 0..out_ch {
                let a = channel_sample(&chunk.samples, in_ch, out_ch, i0, c);
                let b = channel_sample(&chunk.samples, in_ch, out_ch, i1, c);
                let s = (a + (b - a) * t) * self.settings.gain;
                out.push(s.clamp(-1.0, 1.0));
            }
        }
        out
    }

    /// Tear down the graph. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.connected = None;
            self.registry.release();
            tracing::debug!("Audio graph released");
        }
    }
}

impl Drop for MixBus {
    fn drop(&mut self) {
        self.release();
    }
}

/// Sample for output channel `c`. Mono sources feed every channel, a mono
/// bus averages all source channels, and otherwise missing channels repeat
/// the last source channel.
fn channel_sample(samples: &[f32], in_ch: usize, out_ch: usize, frame: usize, c: usize) -> f32 {
    let src = &samples[frame * in_ch..(frame + 1) * in_ch];
    if out_ch == 1 && in_ch > 1 {
        src.iter().sum::<f32>() / in_ch as f32
    } else {
        src[c.min(in_ch - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(rate: u32, channels: u16, samples: Vec<f32>) -> AudioChunk {
        AudioChunk {
            pts_secs: 0.0,
            sample_rate: rate,
            channels,
            samples,
        }
    }

    #[test]
    fn registry_tracks_live_graphs() {
        let registry = AudioGraphRegistry::new();
        let mut bus = MixBus::new(MixBusSettings::default(), &registry);
        assert_eq!(registry.live(), 1);
        bus.release();
        bus.release();
        assert_eq!(registry.live(), 0);
        drop(bus);
        assert_eq!(registry.live(), 0);
        assert_eq!(registry.created(), 1);
    }

    #[test]
    fn drop_releases() {
        let registry = AudioGraphRegistry::new();
        {
            let _bus = MixBus::new(MixBusSettings::default(), &registry);
            assert_eq!(registry.live(), 1);
        }
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn disconnected_bus_is_silent() {
        let registry = AudioGraphRegistry::new();
        let bus = MixBus::new(MixBusSettings::default(), &registry);
        assert!(bus.mix(&chunk(48_000, 2, vec![0.5; 96])).is_empty());
    }

    #[test]
    fn mono_to_stereo_and_resample() {
        let registry = AudioGraphRegistry::new();
        let mut bus = MixBus::new(
            MixBusSettings {
                sample_rate: 48_000,
                channels: 2,
                gain: 1.0,
            },
            &registry,
        );
        bus.connect("synthetic://a");
        let out = bus.mix(&chunk(24_000, 1, vec![0.25; 240]));
        assert_eq!(out.len(), 480 * 2);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn gain_is_clamped() {
        let registry = AudioGraphRegistry::new();
        let mut bus = MixBus::new(
            MixBusSettings {
                sample_rate: 8_000,
                channels: 1,
                gain: 4.0,
            },
            &registry,
        );
        bus.connect("x");
        let out = bus.mix(&chunk(8_000, 1, vec![0.5, -0.5]));
        assert_eq!(out, vec![1.0, -1.0]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let registry = AudioGraphRegistry::new();
        let mut bus = MixBus::new(
            MixBusSettings {
                sample_rate: 8_000,
                channels: 1,
                gain: 1.0,
            },
            &registry,
        );
        bus.connect("x");
        assert_eq!(bus.mix(&chunk(8_000, 2, vec![1.0, 0.0, 0.5, 0.5])), vec![0.5, 0.5]);
    }
}
