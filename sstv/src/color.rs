//! ITU-601 colorspace conversion and the luminance/sub-carrier mapping.
//!
//! The color-difference matrices follow the studio-swing coefficients used
//! on the air: Y lives in 16..=235, R-Y/B-Y are centered on 128.

use crate::{
    LUMINANCE_HIGH_TONE,
    LUMINANCE_LOW_TONE,
};

/// Hz per luminance step: (2300 - 1500) / 255.
pub const HZ_PER_LUMINANCE: f64 = 3.1372549;

pub fn rgb_to_y([r, g, b]: [u8; 3]) -> f64 {
    16.0 + 0.003906 * (65.738 * r as f64 + 129.057 * g as f64 + 25.064 * b as f64)
}

pub fn rgb_to_ry([r, g, b]: [u8; 3]) -> f64 {
    128.0 + 0.003906 * (112.439 * r as f64 - 94.154 * g as f64 - 18.285 * b as f64)
}

pub fn rgb_to_by([r, g, b]: [u8; 3]) -> f64 {
    128.0 + 0.003906 * (-37.945 * r as f64 - 74.494 * g as f64 + 112.439 * b as f64)
}

/// Monochrome luminance for the FAX modes.
pub fn rgb_to_mono([r, g, b]: [u8; 3]) -> f64 {
    0.3 * r as f64 + 0.59 * g as f64 + 0.11 * b as f64
}

/// Inverse of the Y/R-Y/B-Y matrices above.
pub fn yuv_to_rgb(y: f64, ry: f64, by: f64) -> [u8; 3] {
    let y = 1.164 * (y - 16.0);
    let ry = ry - 128.0;
    let by = by - 128.0;

    let r = y + 1.596 * ry;
    let g = y - 0.813 * ry - 0.391 * by;
    let b = y + 2.018 * by;

    [clamp_byte(r), clamp_byte(g), clamp_byte(b)]
}

/// Maps a luminance value in 0..=255 onto the 1500..2300 Hz sub-carrier.
#[inline]
pub fn luminance_to_frequency(value: f64) -> f64 {
    LUMINANCE_LOW_TONE + value * HZ_PER_LUMINANCE
}

/// Inverse mapping; out-of-band estimates clamp to the byte range.
#[inline]
pub fn frequency_to_luminance(frequency: f64) -> u8 {
    clamp_byte((frequency - LUMINANCE_LOW_TONE) / HZ_PER_LUMINANCE)
}

#[inline]
fn clamp_byte(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
