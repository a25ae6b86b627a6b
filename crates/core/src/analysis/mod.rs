use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::SpectrumScale, AudioConfig, AudioProperty, Result};

const BYTE_MAX: f32 = 255.0;

/// One snapshot of spectral features, in the analyser's native scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrame {
    /// Mean magnitude over every frequency bin.
    pub average_volume: f32,
    pub low_power: f32,
    pub mid_power: f32,
    pub high_power: f32,
}

impl AudioFrame {
    pub fn feature(&self, feature: AudioFeature) -> f32 {
        match feature {
            AudioFeature::AverageVolume => self.average_volume,
            AudioFeature::LowPower => self.low_power,
            AudioFeature::MidPower => self.mid_power,
            AudioFeature::HighPower => self.high_power,
        }
    }

    /// Looks up a mapping's audio property. Unrecognized names have no value.
    pub fn get(&self, property: &AudioProperty) -> Option<f32> {
        property.feature().map(|feature| self.feature(feature))
    }
}

/// Names of the values carried by an [`AudioFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioFeature {
    AverageVolume,
    LowPower,
    MidPower,
    HighPower,
}

impl AudioFeature {
    pub const ALL: [AudioFeature; 4] = [
        AudioFeature::AverageVolume,
        AudioFeature::LowPower,
        AudioFeature::MidPower,
        AudioFeature::HighPower,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AverageVolume => "averageVolume",
            Self::LowPower => "lowPower",
            Self::MidPower => "midPower",
            Self::HighPower => "highPower",
        }
    }
}

impl fmt::Display for AudioFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a mono sample stream into [`AudioFrame`]s.
///
/// Samples are gathered into blocks of `block_size`. Each completed block
/// triggers one FFT over the most recent `fft_size` samples and produces one
/// frame. The engine is synchronous so the audio callback can drive it
/// directly and tests can feed it canned signals.
pub struct FeatureAnalyzer {
    config: AudioConfig,
    /// Last `fft_size` samples, oldest first.
    history: Vec<f32>,
    pending: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    frames_emitted: u64,
    fft: FftResources,
}

impl FeatureAnalyzer {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        config.validate()?;

        let size = config.fft_size;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            config: config.clone(),
            history: vec![0.0; size],
            pending: 0,
            window: (0..size).map(|index| hann_value(index, size)).collect(),
            smoothed: vec![0.0; size / 2],
            frames_emitted: 0,
            fft,
        })
    }

    /// Number of frequency bins averaged into each frame.
    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Appends samples and calls `emit` once for every block they complete,
    /// in order. Leftover samples wait for the next call. Returns the number
    /// of frames emitted.
    pub fn push_samples(
        &mut self,
        samples: &[f32],
        mut emit: impl FnMut(AudioFrame),
    ) -> Result<usize> {
        let block_size = self.config.block_size;
        let mut emitted = 0;
        let mut rest = samples;

        while !rest.is_empty() {
            let take = (block_size - self.pending).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.append_history(head);
            self.pending += take;
            rest = tail;

            if self.pending == block_size {
                self.pending = 0;
                let frame = self.analyze()?;
                emit(frame);
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// Clears the sample history and spectrum smoothing.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.pending = 0;
        self.frames_emitted = 0;
    }

    fn append_history(&mut self, samples: &[f32]) {
        let size = self.history.len();
        if samples.len() >= size {
            self.history
                .copy_from_slice(&samples[samples.len() - size..]);
            return;
        }
        self.history.rotate_left(samples.len());
        self.history[size - samples.len()..].copy_from_slice(samples);
    }

    fn analyze(&mut self) -> Result<AudioFrame> {
        let size = self.history.len();
        let fft = &mut self.fft;

        for ((input, sample), weight) in fft
            .input
            .iter_mut()
            .zip(&self.history)
            .zip(&self.window)
        {
            let sample = if sample.is_finite() { *sample } else { 0.0 };
            *input = sample * weight;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let smoothing = self.config.smoothing;
        let norm = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&fft.spectrum) {
            // Overflowing bins would otherwise stay non-finite through smoothing.
            let magnitude = bin.norm() * norm;
            let magnitude = if magnitude.is_finite() { magnitude } else { 0.0 };
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
        }

        let frame = self.frame_from_spectrum();
        self.frames_emitted += 1;
        tracing::trace!(frame = self.frames_emitted, ?frame, "analysed audio block");
        Ok(frame)
    }

    fn frame_from_spectrum(&self) -> AudioFrame {
        let bins = self.smoothed.len();
        let (first, second) = (bins / 3, 2 * bins / 3);
        let band = |range: &[f32]| mean(range.iter().map(|magnitude| self.scaled(*magnitude)));

        AudioFrame {
            average_volume: band(&self.smoothed),
            low_power: band(&self.smoothed[..first]),
            mid_power: band(&self.smoothed[first..second]),
            high_power: band(&self.smoothed[second..]),
        }
    }

    fn scaled(&self, magnitude: f32) -> f32 {
        match self.config.scale {
            SpectrumScale::Linear => magnitude,
            SpectrumScale::Decibel => {
                let min_db = self.config.min_decibels;
                let range = self.config.max_decibels - min_db;
                let db = 20.0 * magnitude.log10();
                (BYTE_MAX * (db - min_db) / range).clamp(0.0, BYTE_MAX)
            }
        }
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for FeatureAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureAnalyzer")
            .field("block_size", &self.config.block_size)
            .field("fft_size", &self.config.fft_size)
            .field("scale", &self.config.scale)
            .field("pending", &self.pending)
            .field("frames_emitted", &self.frames_emitted)
            .finish()
    }
}

fn mean(values: impl ExactSizeIterator<Item = f32>) -> f32 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    values.sum::<f32>() / len as f32
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(scale: SpectrumScale) -> FeatureAnalyzer {
        FeatureAnalyzer::new(&AudioConfig {
            scale,
            smoothing: 0.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn sine(frequency_hz: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency_hz * i as f32 / sample_rate).sin())
            .collect()
    }

    fn last_frame(analyzer: &mut FeatureAnalyzer, samples: &[f32]) -> AudioFrame {
        let mut last = None;
        analyzer
            .push_samples(samples, |frame| last = Some(frame))
            .unwrap();
        last.expect("at least one frame")
    }

    #[test]
    fn silence_produces_zero_features() {
        for scale in [SpectrumScale::Decibel, SpectrumScale::Linear] {
            let mut engine = analyzer(scale);
            let frame = last_frame(&mut engine, &[0.0; 1024]);
            assert_eq!(frame, AudioFrame::default());
        }
    }

    #[test]
    fn emits_one_frame_per_completed_block() {
        let mut engine = analyzer(SpectrumScale::Linear);
        let mut count = 0;

        assert_eq!(engine.push_samples(&[0.1; 1000], |_| count += 1).unwrap(), 1);
        assert_eq!(engine.push_samples(&[0.1; 23], |_| count += 1).unwrap(), 0);
        assert_eq!(engine.push_samples(&[0.1; 1], |_| count += 1).unwrap(), 1);
        assert_eq!(count, 2);
        assert_eq!(engine.frames_emitted(), 2);
    }

    #[test]
    fn low_tone_lands_in_low_band() {
        let mut engine = analyzer(SpectrumScale::Decibel);
        let frame = last_frame(&mut engine, &sine(440.0, 44_100.0, 2048));

        assert!(frame.low_power > frame.mid_power);
        assert!(frame.low_power > frame.high_power);
        assert!(frame.average_volume > 0.0);
    }

    #[test]
    fn high_tone_lands_in_high_band() {
        let mut engine = analyzer(SpectrumScale::Linear);
        let frame = last_frame(&mut engine, &sine(18_000.0, 44_100.0, 2048));

        assert!(frame.high_power > frame.low_power);
        assert!(frame.high_power > frame.mid_power);
    }

    #[test]
    fn average_is_mean_of_bands_weighted_by_width() {
        let mut engine = analyzer(SpectrumScale::Linear);
        let frame = last_frame(&mut engine, &sine(3_000.0, 44_100.0, 1024));

        let bins = engine.bin_count() as f32;
        let first = (engine.bin_count() / 3) as f32;
        let second = (2 * engine.bin_count() / 3) as f32;
        let weighted = (frame.low_power * first
            + frame.mid_power * (second - first)
            + frame.high_power * (bins - second))
            / bins;
        assert!((weighted - frame.average_volume).abs() < 1e-5);
    }

    #[test]
    fn decibel_scale_stays_within_byte_range() {
        let mut engine = analyzer(SpectrumScale::Decibel);
        let loud: Vec<f32> = (0..2048).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let frame = last_frame(&mut engine, &loud);

        for feature in AudioFeature::ALL {
            let value = frame.feature(feature);
            assert!((0.0..=255.0).contains(&value), "{feature} = {value}");
        }
    }

    #[test]
    fn smoothing_lags_behind_sudden_silence() {
        let mut engine = FeatureAnalyzer::new(&AudioConfig {
            scale: SpectrumScale::Linear,
            ..Default::default()
        })
        .unwrap();
        let loud = last_frame(&mut engine, &sine(440.0, 44_100.0, 4096));
        let after = last_frame(&mut engine, &[0.0; 1536]);

        assert!(after.average_volume > 0.0);
        assert!(after.average_volume < loud.average_volume);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut engine = analyzer(SpectrumScale::Linear);
        let mut samples = vec![0.0; 1024];
        samples[10] = f32::NAN;
        samples[20] = f32::INFINITY;
        let frame = last_frame(&mut engine, &samples);
        assert_eq!(frame, AudioFrame::default());
    }

    #[test]
    fn recovers_from_overflowing_samples() {
        let mut engine = FeatureAnalyzer::new(&AudioConfig::default()).unwrap();

        let frame = last_frame(&mut engine, &[f32::MAX; 1024]);
        for feature in AudioFeature::ALL {
            assert!(frame.feature(feature).is_finite(), "{feature}");
        }

        let frame = last_frame(&mut engine, &sine(440.0, 44_100.0, 4096));
        for feature in AudioFeature::ALL {
            assert!(frame.feature(feature).is_finite(), "{feature}");
        }
    }

    #[test]
    fn reset_clears_history() {
        let mut engine = analyzer(SpectrumScale::Linear);
        last_frame(&mut engine, &sine(440.0, 44_100.0, 1024));
        engine.reset();
        let frame = last_frame(&mut engine, &[0.0; 512]);
        assert_eq!(frame, AudioFrame::default());
    }

    #[test]
    fn frame_lookup_skips_unrecognized_properties() {
        let frame = AudioFrame {
            low_power: 55.0,
            ..Default::default()
        };
        assert_eq!(frame.get(&AudioFeature::LowPower.into()), Some(55.0));
        assert_eq!(
            frame.get(&AudioProperty::Unrecognized("bpm".to_string())),
            None
        );
    }

    #[test]
    fn features_round_trip_through_names() {
        for feature in AudioFeature::ALL {
            assert_eq!(AudioFeature::from_name(feature.as_str()), Some(feature));
        }
        assert_eq!(AudioFeature::from_name("lowpower"), None);
    }
}
