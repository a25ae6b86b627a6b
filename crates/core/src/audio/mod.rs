use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::{
    bus::{FrameBus, SubscriptionId},
    AudioConfig, AudioFrame, FeatureAnalyzer, Result, VisualiserError,
};

#[cfg(feature = "live-input")]
mod capture;

#[cfg(feature = "live-input")]
pub use capture::CpalBackend;

/// Device id that selects the host's default input.
pub const DEFAULT_DEVICE: &str = "default";

/// Receives mono `f32` samples from the audio callback.
pub type SampleSink = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// An input device offered by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDevice {
    pub id: String,
    pub is_default: bool,
}

/// A running capture stream. Dropping it stops the stream and releases the
/// device.
pub trait CaptureStream {
    fn sample_rate(&self) -> u32;
}

/// Platform audio input.
pub trait InputBackend {
    fn input_devices(&self) -> Result<Vec<InputDevice>>;

    /// Opens `device_id` and starts calling `sink` from the audio thread.
    fn open(&self, device_id: &str, sink: SampleSink) -> Result<Box<dyn CaptureStream>>;
}

struct ActiveCapture {
    device_id: String,
    /// Open while frames may be delivered. The callback holds a read guard
    /// for the duration of one publish.
    gate: Arc<RwLock<bool>>,
    stream: Box<dyn CaptureStream>,
}

/// Owns one live audio input and publishes an [`AudioFrame`] for every
/// analysed block.
pub struct FeatureExtractor<B: InputBackend> {
    backend: B,
    config: AudioConfig,
    bus: Arc<FrameBus>,
    active: Option<ActiveCapture>,
}

impl<B: InputBackend> FeatureExtractor<B> {
    pub fn new(backend: B, config: AudioConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            bus: Arc::new(FrameBus::new()),
            active: None,
        })
    }

    pub fn list_devices(&self) -> Result<Vec<InputDevice>> {
        self.backend.input_devices()
    }

    /// Starts capturing from `device_id`.
    ///
    /// Starting the device that is already running is a no-op. Starting a
    /// different one fails with [`VisualiserError::AlreadyRunning`] until
    /// [`stop`](Self::stop) is called.
    pub fn start(&mut self, device_id: &str) -> Result<()> {
        if let Some(active) = &self.active {
            if active.device_id == device_id {
                tracing::debug!(device = device_id, "audio input already running");
                return Ok(());
            }
            return Err(VisualiserError::AlreadyRunning {
                active: active.device_id.clone(),
                requested: device_id.to_string(),
            });
        }

        let mut analyzer = FeatureAnalyzer::new(&self.config)?;
        let gate = Arc::new(RwLock::new(true));
        let sink: SampleSink = {
            let gate = gate.clone();
            let bus = self.bus.clone();
            Box::new(move |samples: &[f32]| {
                let open = gate.read().unwrap_or_else(PoisonError::into_inner);
                if !*open {
                    return;
                }
                if let Err(err) = analyzer.push_samples(samples, |frame| bus.publish(frame)) {
                    tracing::error!(%err, "dropping audio block");
                }
            })
        };

        let stream = self.backend.open(device_id, sink)?;
        tracing::info!(
            device = device_id,
            sample_rate = stream.sample_rate(),
            block_size = self.config.block_size,
            fft_size = self.config.fft_size,
            "audio input started"
        );

        self.active = Some(ActiveCapture {
            device_id: device_id.to_string(),
            gate,
            stream,
        });
        Ok(())
    }

    /// Stops capturing and releases the device. Once this returns no further
    /// frame is published. Calling it while stopped does nothing.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        *active.gate.write().unwrap_or_else(PoisonError::into_inner) = false;
        drop(active.stream);
        tracing::info!(device = %active.device_id, "audio input stopped");
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_device(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.device_id.as_str())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AudioFrame) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Shared handle to the bus, for consumers that poll the latest frame.
    pub fn bus(&self) -> Arc<FrameBus> {
        self.bus.clone()
    }

    pub fn latest_frame(&self) -> Option<AudioFrame> {
        self.bus.latest()
    }
}

impl<B: InputBackend> Drop for FeatureExtractor<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: InputBackend> std::fmt::Debug for FeatureExtractor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("config", &self.config)
            .field("active_device", &self.active_device())
            .field("bus", &self.bus)
            .finish()
    }
}
