/// Low-light enhancement applied before detection
use crate::options::AnalysisOptions;
use image::RgbImage;
use std::borrow::Cow;

/// Lowest and highest channel value across the whole frame
pub fn intensity_range(frame: &RgbImage) -> Option<(u8, u8)> {
    let raw = frame.as_raw();
    let min = raw.iter().copied().min()?;
    let max = raw.iter().copied().max()?;
    Some((min, max))
}

/// Return the frame the detectors should see.
///
/// Flat frames (intensity spread at or below the configured limit) get
/// per-channel auto-levels followed by gamma correction; everything else,
/// and every frame when enhancement is disabled, passes through untouched.
/// Deterministic: equal input buffers give equal output buffers.
pub fn prepare_frame<'a>(frame: &'a RgbImage, options: &AnalysisOptions) -> Cow<'a, RgbImage> {
    if !options.enhance_low_light {
        return Cow::Borrowed(frame);
    }

    let Some((min, max)) = intensity_range(frame) else {
        return Cow::Borrowed(frame);
    };

    if max - min > options.tuning.low_light_spread || max == min {
        return Cow::Borrowed(frame);
    }

    tracing::debug!(min, max, "applying low-light enhancement");
    Cow::Owned(auto_levels_gamma(frame, options.tuning.low_light_gamma))
}

fn auto_levels_gamma(frame: &RgbImage, gamma: f32) -> RgbImage {
    let luts: [[u8; 256]; 3] = std::array::from_fn(|channel| {
        let (lo, hi) = channel_range(frame, channel);
        build_lut(lo, hi, gamma)
    });

    let mut out = frame.clone();
    for pixel in out.pixels_mut() {
        for (channel, value) in pixel.0.iter_mut().enumerate() {
            *value = luts[channel][usize::from(*value)];
        }
    }
    out
}

fn channel_range(frame: &RgbImage, channel: usize) -> (u8, u8) {
    frame
        .pixels()
        .map(|p| p.0[channel])
        .fold((u8::MAX, u8::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn build_lut(lo: u8, hi: u8, gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let span = f32::from(hi.saturating_sub(lo));
    for (value, slot) in lut.iter_mut().enumerate() {
        let v = value as f32;
        let leveled = if span > 0.0 {
            ((v - f32::from(lo)) / span).clamp(0.0, 1.0)
        } else {
            v / 255.0
        };
        *slot = (leveled.powf(gamma) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}
