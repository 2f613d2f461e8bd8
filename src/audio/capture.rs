//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device, captures audio at its native
//! sample rate, resamples to 48 kHz mono f32, and forwards 960-sample frames
//! (20 ms, one Opus frame) to the transport's encoder task.
//!
//! The cpal `Stream` is not `Send`, so a dedicated thread builds and owns it;
//! the thread exits when the handle's stop flag is set. Stopping is therefore
//! a flag store — it never blocks and never fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::SessionError;

/// Sample rate the transport encoder expects.
const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Frame size in samples (20 ms at 48 kHz). Matches the Opus frame the
/// encoder produces.
const FRAME_SAMPLES: usize = 960;

/// List available input device names.
pub fn list_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// Running capture: setting the stop flag releases the microphone.
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Release the microphone. Idempotent, non-blocking.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Resolved info about the audio input we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Map a device/stream failure onto the session error taxonomy so the
/// controller can surface a specific user-facing reason.
fn classify_capture_error(detail: String) -> SessionError {
    let lower = detail.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        SessionError::MicPermissionDenied(detail)
    } else {
        SessionError::MicUnavailable(detail)
    }
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, SessionError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| classify_capture_error(format!("Failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                SessionError::MicUnavailable(format!("Input device not found: {name}"))
            })?
    } else {
        host.default_input_device()
            .ok_or(SessionError::NoInputDevice)?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| classify_capture_error(format!("Failed to get input config: {e}")))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input device config (will resample to {}Hz mono if needed)",
        TARGET_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Simple linear resampler from `from_rate` to `to_rate`.
/// Operates on mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Build and start the stream. Runs on the capture thread so the `!Send`
/// stream never crosses threads.
fn build_stream(
    device_name: Option<&str>,
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<Stream, SessionError> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;
    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    // Accumulator for building full frames before sending.
    let mut frame_buf: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };

                frame_buf.extend_from_slice(&resampled);
                while frame_buf.len() >= FRAME_SAMPLES {
                    let frame: Vec<f32> = frame_buf.drain(..FRAME_SAMPLES).collect();
                    // Never block the audio callback: drop frames if the
                    // encoder falls behind.
                    if frames.try_send(frame).is_err() {
                        debug!("Encoder behind; dropping a capture frame");
                    }
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None, // no timeout
        )
        .map_err(|e| classify_capture_error(format!("Failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| classify_capture_error(format!("Failed to start input stream: {e}")))?;

    info!("Audio capture started");
    Ok(stream)
}

/// Start audio capture on a dedicated thread.
///
/// 48 kHz mono frames of 960 samples are sent on `frames`. The returned
/// handle releases the microphone when stopped. `device_name` of `None` uses
/// the system default input.
pub async fn start_capture(
    device_name: Option<String>,
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<CaptureHandle, SessionError> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = stop.clone();
    let (result_tx, result_rx) = std::sync::mpsc::channel::<Result<(), SessionError>>();

    std::thread::Builder::new()
        .name("mic-capture".into())
        .spawn(move || match build_stream(device_name.as_deref(), frames) {
            Ok(stream) => {
                let _ = result_tx.send(Ok(()));
                // Keep the !Send stream alive on this thread until stopped.
                while !stop_for_thread.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
                debug!("Capture thread exiting");
            }
            Err(e) => {
                let _ = result_tx.send(Err(e));
            }
        })
        .map_err(|e| SessionError::MicUnavailable(format!("Failed to spawn capture thread: {e}")))?;

    // The build result arrives quickly; recv off the async runtime.
    let result = tokio::task::spawn_blocking(move || result_rx.recv())
        .await
        .map_err(|e| SessionError::MicUnavailable(format!("Capture thread panicked: {e}")))?
        .map_err(|_| SessionError::MicUnavailable("Capture thread exited early".into()))?;

    result.map(|()| CaptureHandle { stop })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_passthrough_at_equal_rates() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 48_000, 48_000), input);
    }

    #[test]
    fn test_resample_halves_length_at_double_rate() {
        let input = vec![0.0; 960];
        let out = resample_linear(&input, 96_000, 48_000);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn test_downmix_stereo_averages_channels() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_permission_errors_classified() {
        match classify_capture_error("Access denied by user".into()) {
            SessionError::MicPermissionDenied(_) => {}
            other => panic!("expected permission error, got {:?}", other),
        }
        match classify_capture_error("device is busy".into()) {
            SessionError::MicUnavailable(_) => {}
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_handle_stop_is_idempotent() {
        let handle = CaptureHandle {
            stop: Arc::new(AtomicBool::new(false)),
        };
        handle.stop();
        handle.stop();
        assert!(handle.stop.load(Ordering::Acquire));
    }
}
