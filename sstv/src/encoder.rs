//! Frame assembly: header, VIS and scanline emission.

use crate::{
    FAX_HEADER_CYCLES,
    FAX_HEADER_TONE_TIME,
    FAX_PHASING_LINES,
    LEADER_BREAK_TIME,
    LEADER_TIME,
    LEADER_TONE,
    LUMINANCE_HIGH_TONE,
    PORCH_TONE,
    SYNC_TONE,
    VIS_BIT_TIME,
    VIS_HIGH_TONE,
    VIS_LOW_TONE,
    VOX_TONE_TIME,
    VOX_TONES,
    color::luminance_to_frequency,
    image::{
        Channel,
        FrameBuffer,
    },
    modes::{
        Family,
        ModeSpecification,
    },
    scan::{
        ScanElement,
        scan_line,
    },
    sink::WriteSamples,
    tone::ToneGenerator,
};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError<S> {
    #[error(
        "frame is {frame_width}x{frame_height} but {mode} needs at least {mode_width}x{mode_height}"
    )]
    SizeMismatch {
        mode: &'static str,
        mode_width: u32,
        mode_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("sink error")]
    Sink(#[source] S),
}

/// Assembles one complete SSTV transmission into a PCM sink.
#[derive(Debug)]
pub struct SstvEncoder<W> {
    pub(crate) tone: ToneGenerator<W>,
    mode: &'static ModeSpecification,
    vox: bool,
}

impl<W> SstvEncoder<W>
where
    W: WriteSamples,
{
    pub fn new(mode: &'static ModeSpecification, sink: W, sample_rate: f64) -> Self {
        Self {
            tone: ToneGenerator::new(sink, sample_rate),
            mode,
            vox: false,
        }
    }

    /// Prefix the transmission with the VOX wake-up tones.
    pub fn with_vox(mut self) -> Self {
        self.vox = true;
        self
    }

    #[inline]
    pub fn mode(&self) -> &'static ModeSpecification {
        self.mode
    }

    #[inline]
    pub fn samples_emitted(&self) -> u64 {
        self.tone.samples_emitted()
    }

    /// Finalizes the sink without emitting anything further. Useful when the
    /// transmission is assembled piecewise from the `write_*` methods.
    pub fn finish(self) -> Result<W, EncodeError<W::Error>> {
        self.tone.finish().map_err(EncodeError::Sink)
    }

    /// Emits the whole transmission and finalizes the sink.
    pub fn encode<F>(mut self, frame: &F) -> Result<W, EncodeError<W::Error>>
    where
        F: FrameBuffer,
    {
        self.check_dimensions(frame)?;

        if self.vox {
            self.write_vox_intro().map_err(EncodeError::Sink)?;
        }

        if self.mode.family == Family::Fax {
            self.write_fax_header().map_err(EncodeError::Sink)?;
            self.write_fax_phasing().map_err(EncodeError::Sink)?;
        }
        else {
            self.write_calibration_header().map_err(EncodeError::Sink)?;
            self.write_vis().map_err(EncodeError::Sink)?;
        }

        let step = self.mode.rows_per_line() as usize;
        for y in (0..self.mode.height).step_by(step) {
            self.write_line(frame, y).map_err(EncodeError::Sink)?;
        }

        tracing::debug!(
            mode = self.mode.name,
            samples = self.tone.samples_emitted(),
            seconds = self.tone.clock(),
            "transmission complete"
        );

        self.tone.finish().map_err(EncodeError::Sink)
    }

    fn check_dimensions<F>(&self, frame: &F) -> Result<(), EncodeError<W::Error>>
    where
        F: FrameBuffer,
    {
        let mode = self.mode;
        if frame.width() < mode.width || frame.height() < mode.height {
            return Err(EncodeError::SizeMismatch {
                mode: mode.name,
                mode_width: mode.width,
                mode_height: mode.height,
                frame_width: frame.width(),
                frame_height: frame.height(),
            });
        }
        if frame.width() > mode.width || frame.height() > mode.height {
            tracing::warn!(
                frame_width = frame.width(),
                frame_height = frame.height(),
                mode = mode.name,
                "frame larger than mode geometry, cropping to the top-left corner"
            );
        }
        Ok(())
    }

    pub fn write_vox_intro(&mut self) -> Result<(), W::Error> {
        for tone in VOX_TONES {
            self.tone.emit(tone, VOX_TONE_TIME)?;
        }
        Ok(())
    }

    /// Leader / break / leader calibration header.
    pub fn write_calibration_header(&mut self) -> Result<(), W::Error> {
        self.tone.emit(LEADER_TONE, LEADER_TIME)?;
        self.tone.emit(SYNC_TONE, LEADER_BREAK_TIME)?;
        self.tone.emit(LEADER_TONE, LEADER_TIME)?;
        Ok(())
    }

    /// Start bit, seven data bits LSB first, even parity, stop bit.
    pub fn write_vis(&mut self) -> Result<(), W::Error> {
        let vis_code = self.mode.vis_code;
        self.tone.emit(SYNC_TONE, VIS_BIT_TIME)?;
        for bit in 0..7 {
            let tone = if vis_code.bit(bit) {
                VIS_HIGH_TONE
            }
            else {
                VIS_LOW_TONE
            };
            self.tone.emit(tone, VIS_BIT_TIME)?;
        }
        let parity_tone = if vis_code.parity_bit() {
            VIS_HIGH_TONE
        }
        else {
            VIS_LOW_TONE
        };
        self.tone.emit(parity_tone, VIS_BIT_TIME)?;
        self.tone.emit(SYNC_TONE, VIS_BIT_TIME)?;
        Ok(())
    }

    /// FAX start signal: 1220 alternations of the white and black tones.
    pub fn write_fax_header(&mut self) -> Result<(), W::Error> {
        for _ in 0..FAX_HEADER_CYCLES {
            self.tone
                .emit(LUMINANCE_HIGH_TONE, FAX_HEADER_TONE_TIME)?;
            self.tone.emit(PORCH_TONE, FAX_HEADER_TONE_TIME)?;
        }
        Ok(())
    }

    /// Phasing interval: twenty all-white lines.
    pub fn write_fax_phasing(&mut self) -> Result<(), W::Error> {
        for _ in 0..FAX_PHASING_LINES {
            self.tone.emit(SYNC_TONE, self.mode.sync_time)?;
            for _ in 0..self.mode.width {
                self.tone
                    .emit(LUMINANCE_HIGH_TONE, self.mode.pixel_time)?;
            }
        }
        Ok(())
    }

    pub fn write_line<F>(&mut self, frame: &F, y: u32) -> Result<(), W::Error>
    where
        F: FrameBuffer,
    {
        for element in scan_line(self.mode, y) {
            let duration = element.duration(self.mode);
            match element {
                ScanElement::Pixel { x, y, channel } => {
                    let value = self.plane_value(frame, x, y, channel);
                    self.tone.emit(luminance_to_frequency(value), duration)?;
                }
                _ => {
                    let tone = element.fixed_tone().expect("non-pixel elements carry a tone");
                    self.tone.emit(tone, duration)?;
                }
            }
        }
        Ok(())
    }

    fn plane_value<F>(&self, frame: &F, x: u32, y: u32, channel: Channel) -> f64
    where
        F: FrameBuffer,
    {
        // PD chrominance is shared by the row pair, so average both rows
        if self.mode.family == Family::Pd && channel.is_chroma() {
            let first = channel.value(frame, x, y);
            let second = channel.value(frame, x, y + 1);
            0.5 * (first + second)
        }
        else {
            channel.value(frame, x, y)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::SstvEncoder;
    use crate::{
        image::ImageBuffer,
        modes::ModeSpecification,
        spectrum::Goertzel,
        tone::AMPLITUDE,
    };

    const SAMPLE_RATE: f64 = 44100.0;

    fn solid_frame(mode: &ModeSpecification, rgb: [u8; 3]) -> ImageBuffer {
        let mut frame = ImageBuffer::new(mode.width, mode.height);
        for row in 0..mode.height {
            for col in 0..mode.width {
                frame.put(row, col, rgb);
            }
        }
        frame
    }

    fn normalized(samples: &[i16]) -> Vec<f64> {
        samples.iter().map(|s| *s as f64 / AMPLITUDE).collect()
    }

    #[test]
    fn martin_m1_starts_with_the_leader() {
        let mode = &ModeSpecification::M1;
        let frame = solid_frame(mode, [0, 0, 0]);
        let encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        let samples = encoder.encode(&frame).unwrap();

        // 300 ms of 1900 Hz
        for (i, sample) in samples.iter().enumerate().take(13230) {
            let expected = AMPLITUDE * (TAU * 1900.0 * i as f64 / SAMPLE_RATE).sin();
            assert!(
                (*sample as f64 - expected).abs() <= 2.0,
                "sample {i}: {sample} vs {expected}"
            );
        }
    }

    #[test]
    fn martin_m1_total_duration() {
        let mode = &ModeSpecification::M1;
        let frame = solid_frame(mode, [0, 0, 0]);
        let encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        let samples = encoder.encode(&frame).unwrap();

        // 0.610 s header + 0.300 s VIS + 256 lines of 446.446 ms
        let expected_ms = 610.0 + 300.0 + 256.0 * 446.446;
        let expected = (SAMPLE_RATE * expected_ms / 1000.0).round() as usize;
        assert_eq!(samples.len(), expected);
    }

    #[test]
    fn white_row_pixels_sit_at_2300_hz() {
        let mode = &ModeSpecification::M1;
        let frame = solid_frame(mode, [255, 255, 255]);
        let encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        let samples = normalized(&encoder.encode(&frame).unwrap());

        // first green pixel run of the first line
        let offset_ms = 610.0 + 300.0 + mode.sync_time + mode.porch_time;
        let start = (SAMPLE_RATE * offset_ms / 1000.0).round() as usize;
        let length = (SAMPLE_RATE * 320.0 * mode.pixel_time / 1000.0) as usize;
        let segment = &samples[start..start + length];

        let white = Goertzel::new(2300.0, SAMPLE_RATE).power(segment);
        let black = Goertzel::new(1500.0, SAMPLE_RATE).power(segment);
        assert!(white > 0.5, "white power {white}");
        assert!(black < 0.05, "black power {black}");
    }

    #[test]
    fn scottie_parity_bit_is_low_tone() {
        // VIS 60 has four ones, so even parity keeps the bit at 1300 Hz
        let mode = &ModeSpecification::S1;
        let mut encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        encoder.write_vis().unwrap();
        let samples = normalized(&encoder.tone.finish().unwrap());

        let bit = (SAMPLE_RATE * 0.030).round() as usize;
        let parity = &samples[8 * bit..9 * bit];
        let low = Goertzel::new(1300.0, SAMPLE_RATE).power(parity);
        let high = Goertzel::new(1100.0, SAMPLE_RATE).power(parity);
        assert!(low > high, "low {low} vs high {high}");
    }

    #[test]
    fn fax_header_duration() {
        let mode = &ModeSpecification::FAX480;
        let mut encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        encoder.write_fax_header().unwrap();
        let samples = encoder.tone.finish().unwrap();

        // 1220 pairs of 2.05 ms tones
        let expected = (SAMPLE_RATE * 1220.0 * 4.1 / 1000.0).round() as usize;
        assert_eq!(samples.len(), expected);
    }

    #[test]
    fn undersized_frame_is_rejected() {
        let mode = &ModeSpecification::M1;
        let frame = ImageBuffer::new(100, 100);
        let encoder = SstvEncoder::new(mode, Vec::new(), SAMPLE_RATE);
        assert!(matches!(
            encoder.encode(&frame),
            Err(super::EncodeError::SizeMismatch { .. })
        ));
    }
}
