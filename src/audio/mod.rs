pub mod resampler;

pub use resampler::{resample_linear, to_pcm16, FrameProcessor, ResamplerConfig};

/// A block of raw audio as delivered by the UI driver's capture stream:
/// single-channel floating-point samples at the driver's native rate.
/// Consumed once by the resampler and discarded.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
}

/// A protocol-ready frame: 16-bit signed PCM, mono, at the negotiated rate.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmFrame {
    /// Raw little-endian bytes as the streaming socket expects them.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Peak absolute amplitude, used by the silence gate.
    pub fn peak_amplitude(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}
