// Tests for the resampler and silence gate.

use meeting_attendant::audio::{resample_linear, to_pcm16, CapturedFrame, FrameProcessor, ResamplerConfig};

fn ramp(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| -1.0 + 2.0 * i as f32 / (len - 1) as f32)
        .collect()
}

#[test]
fn test_48k_to_16k_ramp_length_and_endpoints() {
    let input = ramp(480);
    let output = resample_linear(&input, 48_000, 16_000);

    assert_eq!(output.len(), 160);
    assert_eq!(output[0], input[0]);
    assert_eq!(output[output.len() - 1], input[input.len() - 1]);
}

#[test]
fn test_output_length_is_rounded() {
    let input = vec![0.0f32; 100];
    let output = resample_linear(&input, 44_100, 16_000);

    // round(100 * 16000 / 44100) = round(36.28) = 36
    assert_eq!(output.len(), 36);
}

#[test]
fn test_ramp_stays_monotonic() {
    let input = ramp(480);
    let output = resample_linear(&input, 48_000, 16_000);

    for window in output.windows(2) {
        assert!(window[1] >= window[0]);
    }
}

#[test]
fn test_single_sample_input_passes_through() {
    let output = resample_linear(&[0.25], 48_000, 16_000);
    assert_eq!(output, vec![0.25]);
}

#[test]
fn test_pcm_conversion_full_scale() {
    assert_eq!(to_pcm16(&[-1.0, 0.0, 1.0]), vec![-32768, 0, 32767]);
    // Out-of-range floats clamp instead of wrapping
    assert_eq!(to_pcm16(&[-3.0, 3.0]), vec![-32768, 32767]);
}

#[test]
fn test_gate_drops_silent_frame() {
    let processor = FrameProcessor::new(ResamplerConfig::default());
    let frame = CapturedFrame {
        samples: vec![0.0; 480],
        sample_rate: 48_000,
    };

    assert!(processor.process(&frame).is_none());
}

#[test]
fn test_gate_passes_audible_frame() {
    let processor = FrameProcessor::new(ResamplerConfig::default());
    let frame = CapturedFrame {
        samples: vec![0.5; 480],
        sample_rate: 48_000,
    };

    let pcm = processor.process(&frame).expect("audible frame should pass");
    assert_eq!(pcm.sample_rate, 16_000);
    assert_eq!(pcm.samples.len(), 160);
}

#[test]
fn test_gate_threshold_is_exclusive() {
    // 0.5 scales to exactly 16383; a peak equal to the threshold is
    // still considered silence, one below the threshold lets it through.
    let frame = CapturedFrame {
        samples: vec![0.5; 160],
        sample_rate: 16_000,
    };

    let at_threshold = FrameProcessor::new(ResamplerConfig {
        target_sample_rate: 16_000,
        silence_threshold: 16_383,
    });
    assert!(at_threshold.process(&frame).is_none());

    let below_threshold = FrameProcessor::new(ResamplerConfig {
        target_sample_rate: 16_000,
        silence_threshold: 16_382,
    });
    assert!(below_threshold.process(&frame).is_some());
}
