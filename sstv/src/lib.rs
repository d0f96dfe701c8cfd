//! Bidirectional codec for Slow-Scan Television (SSTV).
//!
//! The encoder turns an RGB frame into a phase-continuous audio tone
//! sequence (calibration header, VIS code, scanlines); the decoder runs a
//! sliding-window spectral analysis over PCM input and reconstructs the
//! image from the per-pixel instantaneous-frequency track.
//!
//! # References
//!
//! - <http://lionel.cordesses.free.fr/gpages/sstv.html>
//! - <http://www.barberdsp.com/downloads/Dayton%20Paper.pdf>
//! - <https://www.sstv-handbook.com/download/sstv-handbook.pdf>

pub mod color;
pub mod decoder;
pub mod encoder;
pub mod image;
pub mod modes;
pub mod scan;
pub mod sink;
pub mod source;
pub mod spectrum;
pub mod tone;
pub mod util;

pub use crate::{
    decoder::{
        Decoded,
        SignalError,
        SstvDecoder,
    },
    encoder::{
        EncodeError,
        SstvEncoder,
    },
    image::ImageBuffer,
    modes::{
        Family,
        ModeSpecification,
        VisCode,
    },
    source::GetSampleRate,
};

// All tone frequencies in Hz, all durations in milliseconds.

pub const LEADER_TONE: f64 = 1900.0;
pub const LEADER_TIME: f64 = 300.0;

pub const LEADER_BREAK_TIME: f64 = 10.0;

pub const VIS_BIT_TIME: f64 = 30.0;
pub const VIS_LOW_TONE: f64 = 1300.0;
pub const VIS_HIGH_TONE: f64 = 1100.0;

// sync, leader break, vis start/stop
pub const SYNC_TONE: f64 = 1200.0;

pub const PORCH_TONE: f64 = 1500.0;

pub const LUMINANCE_LOW_TONE: f64 = 1500.0;
pub const LUMINANCE_HIGH_TONE: f64 = 2300.0;

pub const VOX_TONES: [f64; 8] = [
    1900.0, 1500.0, 1900.0, 1500.0, 2300.0, 1500.0, 2300.0, 1500.0,
];
pub const VOX_TONE_TIME: f64 = 100.0;

pub const FAX_HEADER_CYCLES: u32 = 1220;
pub const FAX_HEADER_TONE_TIME: f64 = 2.05;
pub const FAX_PHASING_LINES: u32 = 20;

/// Default sample rate for both pipelines when the container doesn't dictate
/// one.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
