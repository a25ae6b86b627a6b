use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};

use super::{CaptureStream, InputBackend, InputDevice, SampleSink, DEFAULT_DEVICE};
use crate::{Result, VisualiserError};

/// [`InputBackend`] on top of the host's default `cpal` audio API.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn find_device(&self, device_id: &str) -> Result<Device> {
        if device_id.is_empty() || device_id == DEFAULT_DEVICE {
            return self
                .host
                .default_input_device()
                .ok_or_else(|| access_error(device_id, "no default input device"));
        }

        let devices = self
            .host
            .input_devices()
            .map_err(|err| access_error(device_id, err))?;
        for device in devices {
            if device.name().map(|name| name == device_id).unwrap_or(false) {
                return Ok(device);
            }
        }

        Err(access_error(device_id, "no input device with this name"))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("host", &self.host.id())
            .finish()
    }
}

impl InputBackend for CpalBackend {
    fn input_devices(&self) -> Result<Vec<InputDevice>> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|device| device.name().ok());
        let devices = self
            .host
            .input_devices()
            .map_err(|err| access_error("*", err))?;

        Ok(devices
            .filter_map(|device| device.name().ok())
            .map(|name| InputDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                id: name,
            })
            .collect())
    }

    fn open(&self, device_id: &str, sink: SampleSink) -> Result<Box<dyn CaptureStream>> {
        let device = self.find_device(device_id)?;
        let supported = device
            .default_input_config()
            .map_err(|err| access_error(device_id, err))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sink),
            other => {
                return Err(access_error(
                    device_id,
                    format!("unsupported sample format {other:?}"),
                ))
            }
        }
        .map_err(|err| access_error(device_id, err))?;

        stream.play().map_err(|err| access_error(device_id, err))?;

        Ok(Box::new(CpalStream {
            _stream: stream,
            sample_rate: config.sample_rate.0,
        }))
    }
}

struct CpalStream {
    _stream: Stream,
    sample_rate: u32,
}

impl CaptureStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut sink: SampleSink,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            downmix(data, channels, &mut mono);
            sink(&mono);
        },
        |err| tracing::error!(%err, "audio input stream error"),
        None,
    )
}

/// Averages interleaved channels into `out`.
fn downmix<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    out.extend(data.chunks(channels).map(|frame| {
        frame.iter().map(|&sample| sample.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
    }));
}

fn access_error(device: &str, reason: impl ToString) -> VisualiserError {
    VisualiserError::DeviceAccess {
        device: device.to_string(),
        reason: reason.to_string(),
    }
}
