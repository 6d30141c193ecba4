// Converts driver-native capture frames into protocol-ready PCM.
//
// The pipeline is: linear-interpolation resample to the target rate,
// clamp/scale float samples to 16-bit signed integers, then gate frames
// whose peak amplitude stays below the silence threshold so pure silence
// is never transmitted.

use tracing::debug;

use super::{CapturedFrame, PcmFrame};

/// Configuration for the resampler and silence gate.
#[derive(Debug, Clone)]
pub struct ResamplerConfig {
    /// Output sample rate expected by the transcription backend
    pub target_sample_rate: u32,
    /// A frame is dropped when its peak absolute amplitude (on the i16
    /// scale) does not exceed this value
    pub silence_threshold: u16,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            silence_threshold: 40,
        }
    }
}

/// Resample a mono float frame from `native_rate` to `target_rate` by
/// linear interpolation.
///
/// For input length `L` the output length is `round(L * target / native)`.
/// The endpoints are carried over exactly: `out[0] == in[0]` and
/// `out[N-1] == in[L-1]`. Interior samples blend the two nearest source
/// samples by the fractional source index.
pub fn resample_linear(input: &[f32], native_rate: u32, target_rate: u32) -> Vec<f32> {
    if native_rate == target_rate || input.len() < 2 {
        return input.to_vec();
    }

    let target_len =
        ((input.len() as f64) * (target_rate as f64) / (native_rate as f64)).round() as usize;
    if target_len < 2 {
        return input.first().copied().into_iter().collect();
    }

    let mut output = vec![0.0f32; target_len];
    output[0] = input[0];
    output[target_len - 1] = input[input.len() - 1];

    let spring = (input.len() - 1) as f64 / (target_len - 1) as f64;
    for i in 1..target_len - 1 {
        let index = i as f64 * spring;
        let left = index.floor() as usize;
        let right = index.ceil() as usize;
        let fraction = (index - left as f64) as f32;
        output[i] = input[left] + (input[right] - input[left]) * fraction;
    }

    output
}

/// Clamp float samples to [-1, 1] and scale to the 16-bit integer range.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 0x8000 as f32) as i16
            } else {
                (s * 0x7FFF as f32) as i16
            }
        })
        .collect()
}

/// Per-frame converter sitting between the capture stream and the stream
/// client. Owns no cross-frame state; every frame is independent.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    config: ResamplerConfig,
}

impl FrameProcessor {
    pub fn new(config: ResamplerConfig) -> Self {
        Self { config }
    }

    /// Resample, convert and gate one captured frame.
    ///
    /// Returns `None` when the frame is gated (silence). The gate only
    /// suppresses transmission; backend keep-alive is the stream client's
    /// concern and runs on its own timer.
    pub fn process(&self, frame: &CapturedFrame) -> Option<PcmFrame> {
        let resampled = resample_linear(
            &frame.samples,
            frame.sample_rate,
            self.config.target_sample_rate,
        );
        let pcm = PcmFrame {
            samples: to_pcm16(&resampled),
            sample_rate: self.config.target_sample_rate,
        };

        let peak = pcm.peak_amplitude();
        if peak <= self.config.silence_threshold {
            debug!(
                "Silent frame gated: {} samples, peak amplitude {}",
                pcm.samples.len(),
                peak
            );
            return None;
        }

        Some(pcm)
    }
}
