//! Per-family scanline scheduling.
//!
//! [`scan_line`] turns one image line (a row pair for PD) into the exact
//! sequence of sync pulses, porches, separators and pixel tones that goes on
//! the air. The encoder plays the sequence through the tone generator; the
//! decoder walks the same sequence to know where every segment of a line
//! lives in time, so the two sides can never disagree about the script.

use crate::{
    PORCH_TONE,
    SYNC_TONE,
    image::Channel,
    modes::{
        Family,
        ModeSpecification,
    },
};

pub const ROBOT_SEPARATOR_TIME: f64 = 4.5;
pub const ROBOT_EVEN_SEPARATOR_TONE: f64 = 1500.0;
pub const ROBOT_ODD_SEPARATOR_TONE: f64 = 2300.0;
pub const ROBOT_CHROMA_PORCH_TONE: f64 = 1900.0;
pub const ROBOT_CHROMA_PORCH_TIME: f64 = 1.5;
// Robot 72 runs its B-Y porch at the plain porch tone
pub const ROBOT_ODD_CHROMA_PORCH_TONE: f64 = 1500.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScanElement {
    /// Line sync pulse at 1200 Hz, `mode.sync_time` long.
    Sync,
    /// Porch at 1500 Hz, `mode.porch_time` long.
    Porch,
    /// Fixed tone with explicit frequency and duration (Robot separators and
    /// chroma porches).
    Separator { tone: f64, time: f64 },
    /// One pixel dwell of the given plane.
    Pixel { x: u32, y: u32, channel: Channel },
}

impl ScanElement {
    /// Duration in milliseconds.
    pub fn duration(&self, mode: &ModeSpecification) -> f64 {
        match self {
            ScanElement::Sync => mode.sync_time,
            ScanElement::Porch => mode.porch_time,
            ScanElement::Separator { time, .. } => *time,
            ScanElement::Pixel { channel, .. } => mode.plane_time(channel.is_chroma()),
        }
    }

    /// Frequency for the non-pixel elements.
    pub fn fixed_tone(&self) -> Option<f64> {
        match self {
            ScanElement::Sync => Some(SYNC_TONE),
            ScanElement::Porch => Some(PORCH_TONE),
            ScanElement::Separator { tone, .. } => Some(*tone),
            ScanElement::Pixel { .. } => None,
        }
    }
}

fn push_plane(out: &mut Vec<ScanElement>, mode: &ModeSpecification, y: u32, channel: Channel) {
    for x in 0..mode.width {
        out.push(ScanElement::Pixel { x, y, channel });
    }
}

/// Scan sequence for the line starting at image row `y`.
///
/// For PD modes `y` must be even; the sequence covers rows `y` and `y + 1`.
pub fn scan_line(mode: &ModeSpecification, y: u32) -> Vec<ScanElement> {
    let mut out = Vec::new();

    match mode.family {
        Family::Martin => {
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            for channel in [Channel::Green, Channel::Blue, Channel::Red] {
                push_plane(&mut out, mode, y, channel);
                out.push(ScanElement::Porch);
            }
        }
        Family::Scottie => {
            // the sync is a one-shot at the start of the transmission, then
            // rides between the B and R planes of every line
            if y == 0 {
                out.push(ScanElement::Sync);
            }
            out.push(ScanElement::Porch);
            push_plane(&mut out, mode, y, Channel::Green);
            out.push(ScanElement::Porch);
            push_plane(&mut out, mode, y, Channel::Blue);
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            push_plane(&mut out, mode, y, Channel::Red);
        }
        Family::Wrasse => {
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            for channel in [Channel::Red, Channel::Green, Channel::Blue] {
                push_plane(&mut out, mode, y, channel);
            }
        }
        Family::Pasokon => {
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            for channel in [Channel::Red, Channel::Green, Channel::Blue] {
                push_plane(&mut out, mode, y, channel);
                out.push(ScanElement::Porch);
            }
        }
        Family::Robot => {
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            push_plane(&mut out, mode, y, Channel::Luma);
            let full_color = mode.vis_code == ModeSpecification::R72.vis_code;
            if full_color {
                out.push(ScanElement::Separator {
                    tone: ROBOT_EVEN_SEPARATOR_TONE,
                    time: ROBOT_SEPARATOR_TIME,
                });
                out.push(ScanElement::Separator {
                    tone: ROBOT_CHROMA_PORCH_TONE,
                    time: ROBOT_CHROMA_PORCH_TIME,
                });
                push_plane(&mut out, mode, y, Channel::ChromaRed);
                out.push(ScanElement::Separator {
                    tone: ROBOT_ODD_SEPARATOR_TONE,
                    time: ROBOT_SEPARATOR_TIME,
                });
                out.push(ScanElement::Separator {
                    tone: ROBOT_ODD_CHROMA_PORCH_TONE,
                    time: ROBOT_CHROMA_PORCH_TIME,
                });
                push_plane(&mut out, mode, y, Channel::ChromaBlue);
            }
            else if y % 2 == 0 {
                out.push(ScanElement::Separator {
                    tone: ROBOT_EVEN_SEPARATOR_TONE,
                    time: ROBOT_SEPARATOR_TIME,
                });
                out.push(ScanElement::Separator {
                    tone: ROBOT_CHROMA_PORCH_TONE,
                    time: ROBOT_CHROMA_PORCH_TIME,
                });
                push_plane(&mut out, mode, y, Channel::ChromaRed);
            }
            else {
                out.push(ScanElement::Separator {
                    tone: ROBOT_ODD_SEPARATOR_TONE,
                    time: ROBOT_SEPARATOR_TIME,
                });
                out.push(ScanElement::Separator {
                    tone: ROBOT_CHROMA_PORCH_TONE,
                    time: ROBOT_CHROMA_PORCH_TIME,
                });
                push_plane(&mut out, mode, y, Channel::ChromaBlue);
            }
        }
        Family::Pd => {
            debug_assert!(y % 2 == 0);
            out.push(ScanElement::Sync);
            out.push(ScanElement::Porch);
            push_plane(&mut out, mode, y, Channel::Luma);
            // chroma is shared by the pair; the encoder averages both rows
            push_plane(&mut out, mode, y, Channel::ChromaRed);
            push_plane(&mut out, mode, y, Channel::ChromaBlue);
            push_plane(&mut out, mode, y + 1, Channel::Luma);
        }
        Family::Fax => {
            out.push(ScanElement::Sync);
            push_plane(&mut out, mode, y, Channel::Mono);
        }
    }

    out
}

/// Duration of one scheduled line in milliseconds.
pub fn line_duration(mode: &ModeSpecification, y: u32) -> f64 {
    scan_line(mode, y)
        .iter()
        .map(|element| element.duration(mode))
        .sum()
}
