// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use crate::audio::{mixer::AudioMixer, Device as AudioDevice};
use crate::config;

/// A small wrapper around a cpal::Device with a continuously running output stream fed
/// by a mixer.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The output stream, once started.
    output: Option<OutputManager>,
}

/// Owns the thread that keeps the cpal stream alive.
struct OutputManager {
    mixer: AudioMixer,
    running: Arc<AtomicBool>,
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// f32 callback: mix directly into the cpal buffer.
fn create_f32_callback(
    mixer: AudioMixer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let num_channels = mixer.num_channels() as usize;
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let frames = data.len() / num_channels;
        mixer.process_into_output(data, frames);
    }
}

/// Integer callback: mix into a scratch buffer and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mixer: AudioMixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let num_channels = mixer.num_channels() as usize;
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        if scratch.len() != data.len() {
            scratch.resize(data.len(), 0.0);
        }
        mixer.process_into_output(&mut scratch, data.len() / num_channels);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl OutputManager {
    /// Starts the output thread that creates and holds the cpal stream. The stream is not
    /// Send, so it lives entirely on that thread.
    fn start(
        device: cpal::Device,
        sample_format: cpal::SampleFormat,
        num_channels: u16,
        sample_rate: u32,
    ) -> OutputManager {
        let mixer = AudioMixer::new(num_channels, sample_rate);
        let running = Arc::new(AtomicBool::new(true));

        let output_thread = {
            let mixer = mixer.clone();
            let running = running.clone();
            thread::spawn(move || {
                let config = cpal::StreamConfig {
                    channels: num_channels,
                    sample_rate: sample_rate,
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => device.build_output_stream(
                        &config,
                        create_f32_callback(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    cpal::SampleFormat::I16 => device.build_output_stream(
                        &config,
                        create_converting_callback::<i16>(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    cpal::SampleFormat::I32 => device.build_output_stream(
                        &config,
                        create_converting_callback::<i32>(mixer),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    other => {
                        error!(format = ?other, "Unsupported output sample format");
                        return;
                    }
                };

                match stream_result {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            error!("Failed to start CPAL stream: {}", e);
                            return;
                        }
                        info!("CPAL output stream started successfully");

                        // Keep the stream alive until the device is dropped.
                        while running.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(100));
                        }
                    }
                    Err(e) => {
                        error!("Failed to create CPAL stream: {}", e);
                    }
                }
            })
        };

        OutputManager {
            mixer,
            running,
            output_thread: Mutex::new(Some(output_thread)),
        }
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices with at least one output channel.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        output: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device and starts its output stream.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "audio device (cpal)");
        let _enter = span.enter();

        let name = config.device();
        let mut device = Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| format!("no device found with name {}", name))?;

        let num_channels = config.channels();
        if device.max_channels < num_channels {
            return Err(format!(
                "{} channels requested, audio device {} only has {}",
                num_channels, device.name, device.max_channels
            )
            .into());
        }

        let sample_format = device.device.default_output_config()?.sample_format();
        info!(
            device = device.name,
            channels = num_channels,
            sample_rate = config.sample_rate(),
            format = ?sample_format,
            "Starting output stream."
        );
        device.output = Some(OutputManager::start(
            device.device.clone(),
            sample_format,
            num_channels,
            config.sample_rate(),
        ));

        Ok(device)
    }
}

impl AudioDevice for Device {
    fn mixer(&self) -> AudioMixer {
        match &self.output {
            Some(output) => output.mixer.clone(),
            // Listed but never opened. Nothing will drain this mixer.
            None => AudioMixer::new(self.max_channels, 0),
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
