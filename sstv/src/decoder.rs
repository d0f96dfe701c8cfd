//! Reception: protocol state machine and pixel reconstruction.
//!
//! The parser moves strictly forward through the stream:
//! silence -> non-silence -> calibration leader -> VIS -> image body. Pixel
//! slots are read off the same scan sequences the encoder plays, so timing
//! lives in one place.

use crate::{
    LEADER_BREAK_TIME,
    LEADER_TIME,
    LEADER_TONE,
    LUMINANCE_HIGH_TONE,
    SYNC_TONE,
    VIS_BIT_TIME,
    VIS_HIGH_TONE,
    VIS_LOW_TONE,
    color::{
        frequency_to_luminance,
        yuv_to_rgb,
    },
    image::{
        Channel,
        ImageBuffer,
    },
    modes::{
        ColorFormat,
        Family,
        ModeSpecification,
    },
    scan::{
        ScanElement,
        line_duration,
        scan_line,
    },
    source::ReadSamples,
    spectrum::{
        FrequencyTrack,
        Goertzel,
        GoertzelBank,
        PeakScanner,
    },
    tone::AMPLITUDE,
};

#[derive(Clone, Copy, Debug)]
pub struct DecoderConfig {
    /// Peak-FFT window over the image body.
    pub image_window: usize,
    pub image_hop: usize,
    /// Goertzel-bank window for header/VIS classification.
    pub header_window: usize,
    pub header_hop: usize,
    /// Silence-detection window.
    pub silence_window: usize,
    pub silence_hop: usize,
    /// Normalized 1900 Hz power that counts as signal.
    pub silence_threshold: f64,
    /// How far past non-silence the leader may start before giving up.
    pub leader_scan_seconds: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            image_window: 512,
            image_hop: 128,
            header_window: 64,
            header_hop: 32,
            silence_window: 32,
            silence_hop: 16,
            silence_threshold: 0.05,
            leader_scan_seconds: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisReport {
    pub code: u8,
    pub parity_ok: bool,
}

#[derive(Clone, Debug)]
pub struct Decoded {
    pub mode: &'static ModeSpecification,
    /// Absent for the FAX modes, which carry no VIS block.
    pub vis: Option<VisReport>,
    pub image: ImageBuffer,
    pub lines_decoded: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("no signal detected")]
    NoSignal,
    #[error("no calibration leader within {scanned_ms:.0} ms of signal start")]
    NoLeader { scanned_ms: f64 },
    #[error("VIS code {code} does not match a registered mode")]
    UnknownVis { code: u8 },
    #[error("sync lost at line {line}")]
    SyncLost { line: u32, partial: Box<Decoded> },
}

/// Everything below this is sync-band: the VIS bit tones and the sync pulse
/// itself. The next protocol tone up is 1500 Hz.
const SYNC_BAND_LIMIT: f64 = 1400.0;

/// One demodulated run of a protocol tone.
#[derive(Clone, Copy, Debug)]
struct ToneRun {
    tone: f64,
    start: usize,
    len: usize,
}

impl ToneRun {
    #[inline]
    fn end(&self) -> usize {
        self.start + self.len
    }
}

pub struct SstvDecoder {
    samples: Vec<f64>,
    sample_rate: f64,
    config: DecoderConfig,
}

impl SstvDecoder {
    /// Drains `source` into memory. The source's sample rate (for WAV, the
    /// container header) becomes the analysis rate.
    pub fn from_source<S>(source: &mut S) -> Result<Self, S::Error>
    where
        S: ReadSamples,
    {
        let mut pcm = Vec::new();
        source.read_to_end(&mut pcm)?;
        Ok(Self::from_samples(&pcm, source.sample_rate()))
    }

    pub fn from_samples(pcm: &[i16], sample_rate: f64) -> Self {
        let samples = pcm.iter().map(|s| *s as f64 / AMPLITUDE).collect();
        Self {
            samples,
            sample_rate,
            config: DecoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    fn ms_to_samples(&self, ms: f64) -> f64 {
        ms / 1000.0 * self.sample_rate
    }

    /// Runs the full reception: non-silence, leader, VIS, image body.
    pub fn decode(&self) -> Result<Decoded, SignalError> {
        let start = self
            .find_signal_start(LEADER_TONE)
            .ok_or(SignalError::NoSignal)?;
        tracing::debug!(start, "signal starts");

        let vis_start = self.find_leader(start)?;
        let (vis, image_start) = self.read_vis(vis_start);
        tracing::debug!(code = vis.code, parity_ok = vis.parity_ok, "VIS read");

        let mode = ModeSpecification::from_vis(crate::VisCode::new(vis.code))
            .ok_or(SignalError::UnknownVis { code: vis.code })?;
        if !vis.parity_ok {
            tracing::warn!(
                code = vis.code,
                mode = mode.name,
                "VIS parity mismatch, continuing with the decoded code"
            );
        }

        let (image, lines_decoded, sync_lost) = self.read_image(mode, image_start as f64);
        let decoded = Decoded {
            mode,
            vis: Some(vis),
            image,
            lines_decoded,
        };
        match sync_lost {
            Some(line) => {
                Err(SignalError::SyncLost {
                    line,
                    partial: Box::new(decoded),
                })
            }
            None => Ok(decoded),
        }
    }

    /// Decodes with the mode fixed up front. This is the only entry for the
    /// FAX modes, which have no VIS to dispatch on.
    pub fn decode_as(&self, mode: &'static ModeSpecification) -> Result<Decoded, SignalError> {
        if mode.family != Family::Fax {
            let decoded = self.decode()?;
            if decoded.mode.vis_code != mode.vis_code {
                tracing::warn!(
                    requested = mode.name,
                    received = decoded.mode.name,
                    "received VIS disagrees with the requested mode"
                );
            }
            return Ok(decoded);
        }

        let start = self
            .find_signal_start(LUMINANCE_HIGH_TONE)
            .ok_or(SignalError::NoSignal)?;
        let image_start = self.find_fax_phasing_end(start)?;

        let (image, lines_decoded, sync_lost) = self.read_image(mode, image_start);
        let decoded = Decoded {
            mode,
            vis: None,
            image,
            lines_decoded,
        };
        match sync_lost {
            Some(line) => {
                Err(SignalError::SyncLost {
                    line,
                    partial: Box::new(decoded),
                })
            }
            None => Ok(decoded),
        }
    }

    /// Cheap first pass: a short Goertzel probe against the tone that opens
    /// the transmission. Returns one window before the first hit.
    fn find_signal_start(&self, frequency: f64) -> Option<usize> {
        let window = self.config.silence_window;
        let hop = self.config.silence_hop;
        let probe = Goertzel::new(frequency, self.sample_rate);

        let mut position = 0;
        while position + window <= self.samples.len() {
            if probe.power(&self.samples[position..position + window]) > self.config.silence_threshold
            {
                return Some(position.saturating_sub(window));
            }
            position += hop;
        }
        None
    }

    /// Goertzel-bank classification of consecutive header windows, merged
    /// into tone runs. The 100 Hz-spaced low tones (1100/1200/1300) cannot
    /// be told apart at header window lengths, so they collapse into the
    /// sync tone; nothing in the header or image body sits between them and
    /// 1500 Hz.
    fn tone_runs(&self, start: usize, end: usize) -> Vec<ToneRun> {
        let window = self.config.header_window;
        let hop = self.config.header_hop;
        let bank = GoertzelBank::protocol(self.sample_rate);
        let end = end.min(self.samples.len());

        let mut runs: Vec<ToneRun> = Vec::new();
        let mut position = start;
        while position + window <= end {
            let tone = bank.classify(&self.samples[position..position + window]);
            let tone = if tone < SYNC_BAND_LIMIT { SYNC_TONE } else { tone };
            match runs.last_mut() {
                Some(run) if run.tone == tone => run.len += hop,
                _ => {
                    runs.push(ToneRun {
                        tone,
                        start: position,
                        len: hop,
                    })
                }
            }
            position += hop;
        }
        runs
    }

    /// Finds the 1900/1200/1900 calibration template and returns the sample
    /// position where the VIS start bit begins. A VOX prelude is skipped
    /// naturally: its 1900 Hz tones are far shorter than the leader.
    fn find_leader(&self, start: usize) -> Result<usize, SignalError> {
        let scan_ms = self.config.leader_scan_seconds * 1000.0;
        let scan_end = start
            + self.ms_to_samples(scan_ms + 2.0 * LEADER_TIME + LEADER_BREAK_TIME + 100.0) as usize;
        let runs = self.tone_runs(start, scan_end);

        // ignore blips from windows that straddle tone boundaries
        let significant = 3 * self.config.header_hop;
        let runs: Vec<ToneRun> = runs.into_iter().filter(|run| run.len >= significant).collect();

        let in_range = |run: &ToneRun, tone: f64, low_ms: f64, high_ms: f64| {
            run.tone == tone
                && (run.len as f64) >= self.ms_to_samples(low_ms)
                && (run.len as f64) <= self.ms_to_samples(high_ms)
        };
        let max_gap = 6 * self.config.header_hop;

        for window in runs.windows(3) {
            let [leader1, brk, leader2] = window
            else {
                unreachable!()
            };

            if !in_range(leader1, LEADER_TONE, 0.6 * LEADER_TIME, 1.4 * LEADER_TIME)
                || !in_range(brk, SYNC_TONE, 4.0, 25.0)
                || !in_range(leader2, LEADER_TONE, 0.6 * LEADER_TIME, 1.4 * LEADER_TIME)
                || brk.start.saturating_sub(leader1.end()) > max_gap
                || leader2.start.saturating_sub(brk.end()) > max_gap
            {
                continue;
            }
            if (leader1.start - start) as f64 > self.ms_to_samples(scan_ms) {
                break;
            }

            // anchor on the VIS start bit when it is already visible
            let vis_start = runs
                .iter()
                .find(|run| {
                    run.tone == SYNC_TONE
                        && run.start >= leader2.end().saturating_sub(max_gap)
                        && run.start <= leader2.end() + max_gap
                })
                .map(|run| run.start)
                .unwrap_or_else(|| leader2.end());

            tracing::debug!(vis_start, "leader matched");
            return Ok(vis_start);
        }

        Err(SignalError::NoLeader { scanned_ms: scan_ms })
    }

    /// Reads the ten 30 ms VIS slots: start bit, seven data bits LSB first,
    /// even parity, stop bit. Each slot is decided by majority vote over its
    /// sub-windows.
    fn read_vis(&self, vis_start: usize) -> (VisReport, usize) {
        let bit_len = self.ms_to_samples(VIS_BIT_TIME);
        let bank = GoertzelBank::protocol(self.sample_rate);

        let mut slots = [0.0f64; 10];
        for (i, slot) in slots.iter_mut().enumerate() {
            // classify the middle of the slot, clear of the bit edges
            let from = vis_start as f64 + (i as f64 + 0.2) * bit_len;
            let to = vis_start as f64 + (i as f64 + 0.8) * bit_len;
            let from = (from as usize).min(self.samples.len());
            let to = (to as usize).min(self.samples.len());
            if from < to {
                *slot = self.modal_tone(&bank, from, to);
            }
        }

        if slots[0] != SYNC_TONE || slots[9] != SYNC_TONE {
            tracing::warn!(start = slots[0], stop = slots[9], "VIS framing bits off");
        }

        let mut code = 0u8;
        for bit in 0..7 {
            if slots[1 + bit] == VIS_HIGH_TONE {
                code |= 1 << bit;
            }
            else if slots[1 + bit] != VIS_LOW_TONE {
                tracing::warn!(bit, tone = slots[1 + bit], "ambiguous VIS bit");
            }
        }

        let parity_expected = code.count_ones() % 2 == 1;
        let parity_received = slots[8] == VIS_HIGH_TONE;
        let report = VisReport {
            code,
            parity_ok: parity_expected == parity_received,
        };

        let image_start = vis_start + (10.0 * bit_len).round() as usize;
        (report, image_start)
    }

    /// Modal tone of a slot: cut it into a few sub-windows, let each cast a
    /// vote against the Goertzel bank, and take the tone with the most
    /// votes. The sub-windows stay long enough that the 100 Hz-spaced VIS
    /// bit tones resolve cleanly.
    fn modal_tone(&self, bank: &GoertzelBank, from: usize, to: usize) -> f64 {
        let num_votes = 3;
        let step = ((to - from) / num_votes).max(1);

        let mut tallies: Vec<(f64, u32)> = Vec::new();
        for vote in 0..num_votes {
            let start = from + vote * step;
            // the last sub-window absorbs the division remainder
            let end = if vote + 1 == num_votes {
                to
            }
            else {
                from + (vote + 1) * step
            };
            if start >= end {
                break;
            }
            let tone = bank.classify(&self.samples[start..end]);
            match tallies.iter_mut().find(|(candidate, _)| *candidate == tone) {
                Some((_, votes)) => *votes += 1,
                None => tallies.push((tone, 1)),
            }
        }

        tallies
            .iter()
            .max_by_key(|(_, votes)| *votes)
            .map(|(tone, _)| *tone)
            .expect("slot is non-empty")
    }

    /// Skips the FAX alternation header and the twenty phasing lines,
    /// returning the position of the first image line.
    fn find_fax_phasing_end(&self, start: usize) -> Result<f64, SignalError> {
        let mode = &ModeSpecification::FAX480;
        // the first 1200 Hz run after the alternating header is the first
        // phasing sync
        let scan_end = start + self.ms_to_samples(1220.0 * 4.1 + 1000.0) as usize;
        let runs = self.tone_runs(start, scan_end);
        let significant = 3 * self.config.header_hop;

        let phasing_start = runs
            .iter()
            .find(|run| run.tone == SYNC_TONE && run.len >= significant)
            .map(|run| run.start)
            .ok_or(SignalError::NoLeader {
                scanned_ms: 1220.0 * 4.1,
            })?;

        let phasing_line = self.ms_to_samples(line_duration(mode, 0));
        Ok(phasing_start as f64 + crate::FAX_PHASING_LINES as f64 * phasing_line)
    }

    /// Locates the actual sync pulse near `expected` and returns the sample
    /// position of its trailing edge.
    fn detect_sync(&self, expected: f64, mode: &ModeSpecification) -> Option<f64> {
        let sync_len = self.ms_to_samples(mode.sync_time);
        let pad = 1.5 * sync_len;
        let from = (expected - pad).max(0.0) as usize;
        let to = ((expected + sync_len + pad) as usize).min(self.samples.len());

        // small blocks keep the edge estimate tight even for the 20 ms PD
        // sync; larger ones buy nothing but resolution loss
        let block = ((sync_len / 4.0) as usize).clamp(32, 64);
        let hop = block / 2;
        let bank = GoertzelBank::protocol(self.sample_rate);

        // longest contiguous 1200 Hz stretch in the search region
        let mut best: Option<(usize, usize)> = None;
        let mut current: Option<(usize, usize)> = None;
        let mut position = from;
        while position + block <= to {
            let is_sync =
                bank.classify(&self.samples[position..position + block]) < SYNC_BAND_LIMIT;
            if is_sync {
                current = match current {
                    Some((run_start, _)) => Some((run_start, position + block)),
                    None => Some((position, position + block)),
                };
                if current.map(|(s, e)| e - s) > best.map(|(s, e)| e - s) {
                    best = current;
                }
            }
            else {
                current = None;
            }
            position += hop;
        }

        let (run_start, run_end) = best?;
        if (run_end - run_start) as f64 >= 0.5 * sync_len {
            Some(run_end as f64)
        }
        else {
            None
        }
    }

    fn read_image(
        &self,
        mode: &'static ModeSpecification,
        image_start: f64,
    ) -> (ImageBuffer, u32, Option<u32>) {
        let mut image = ImageBuffer::new(mode.width, mode.height);

        let total_ms: f64 = (0..mode.height)
            .step_by(mode.rows_per_line() as usize)
            .map(|y| line_duration(mode, y))
            .sum();
        let track_end =
            ((image_start + self.ms_to_samples(total_ms)) as usize + self.config.image_window)
                .min(self.samples.len());

        let mut scanner = PeakScanner::new(self.sample_rate, self.config.image_window);
        let track = FrequencyTrack::build(
            &mut scanner,
            &self.samples,
            image_start as usize..track_end,
            self.config.image_hop,
        );

        let width = mode.width as usize;
        let mut scratch = Vec::new();
        let mut planes = PlaneScratch::new(width);
        let mut robot_pending: Option<(Vec<u8>, Vec<u8>)> = None;

        let pixel_len = self.ms_to_samples(mode.pixel_time);
        // one pixel dwell, floored at the sync probe's own resolution so
        // quantization noise doesn't trigger spurious re-syncs
        let resync_threshold = pixel_len.max(64.0);

        let mut cursor = image_start;
        let mut lines_decoded = 0u32;
        let mut missed_syncs = 0u32;

        let mut y = 0;
        while y < mode.height {
            let elements = scan_line(mode, y);
            let line_len = self.ms_to_samples(line_duration(mode, y));
            // one analysis window of slack: the last line legitimately ends
            // within rounding distance of the stream end
            let limit = self.samples.len() as f64 + self.config.image_window as f64;
            if cursor + line_len > limit {
                tracing::warn!(line = y, "stream ends before the image does");
                break;
            }

            planes.clear();
            let mut lost = false;
            for element in &elements {
                let duration = self.ms_to_samples(element.duration(mode));
                match element {
                    ScanElement::Sync => {
                        match self.detect_sync(cursor, mode) {
                            Some(detected_end) => {
                                missed_syncs = 0;
                                let scheduled_end = cursor + duration;
                                if (detected_end - scheduled_end).abs() > resync_threshold {
                                    tracing::debug!(
                                        line = y,
                                        offset = detected_end - scheduled_end,
                                        "re-synchronized to the detected pulse"
                                    );
                                    cursor = detected_end;
                                }
                                else {
                                    cursor = scheduled_end;
                                }
                            }
                            None => {
                                missed_syncs += 1;
                                tracing::warn!(line = y, missed_syncs, "sync pulse not found");
                                if missed_syncs > 1 {
                                    lost = true;
                                    break;
                                }
                                cursor += duration;
                            }
                        }
                    }
                    ScanElement::Porch | ScanElement::Separator { .. } => {
                        cursor += duration;
                    }
                    ScanElement::Pixel { x, y: row, channel } => {
                        let frequency =
                            track.median_between(cursor, cursor + duration, &mut scratch);
                        let value = frequency_to_luminance(frequency);
                        planes.store(*channel, *row - y, *x, value);
                        cursor += duration;
                    }
                }
            }

            if lost {
                return (image, lines_decoded, Some(y));
            }

            self.commit_line(mode, y, &planes, &mut robot_pending, &mut image);
            lines_decoded += mode.rows_per_line();
            y += mode.rows_per_line();
        }

        (image, lines_decoded, None)
    }

    fn commit_line(
        &self,
        mode: &ModeSpecification,
        y: u32,
        planes: &PlaneScratch,
        robot_pending: &mut Option<(Vec<u8>, Vec<u8>)>,
        image: &mut ImageBuffer,
    ) {
        let width = mode.width;
        match mode.color_format {
            ColorFormat::Gbr | ColorFormat::Rgb => {
                for x in 0..width {
                    let i = x as usize;
                    image.put(y, x, [planes.red[i], planes.green[i], planes.blue[i]]);
                }
            }
            ColorFormat::Mono => {
                for x in 0..width {
                    let v = planes.mono[x as usize];
                    image.put(y, x, [v, v, v]);
                }
            }
            ColorFormat::Yuv => {
                match mode.family {
                    Family::Pd => {
                        for x in 0..width {
                            let i = x as usize;
                            let cr = planes.chroma_red[i] as f64;
                            let cb = planes.chroma_blue[i] as f64;
                            image.put(y, x, yuv_to_rgb(planes.luma[i] as f64, cr, cb));
                            image.put(y + 1, x, yuv_to_rgb(planes.luma2[i] as f64, cr, cb));
                        }
                    }
                    Family::Robot if mode.vis_code == ModeSpecification::R36.vis_code => {
                        if y % 2 == 0 {
                            // hold the even line until its B-Y arrives
                            *robot_pending =
                                Some((planes.luma.clone(), planes.chroma_red.clone()));
                        }
                        else {
                            let (even_luma, chroma_red) =
                                robot_pending.take().unwrap_or_else(|| {
                                    (vec![0; width as usize], vec![128; width as usize])
                                });
                            for x in 0..width {
                                let i = x as usize;
                                let cr = chroma_red[i] as f64;
                                let cb = planes.chroma_blue[i] as f64;
                                image.put(y - 1, x, yuv_to_rgb(even_luma[i] as f64, cr, cb));
                                image.put(y, x, yuv_to_rgb(planes.luma[i] as f64, cr, cb));
                            }
                        }
                    }
                    _ => {
                        // Robot 72 carries all three planes per line
                        for x in 0..width {
                            let i = x as usize;
                            image.put(
                                y,
                                x,
                                yuv_to_rgb(
                                    planes.luma[i] as f64,
                                    planes.chroma_red[i] as f64,
                                    planes.chroma_blue[i] as f64,
                                ),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Per-line plane buffers. `luma2` holds the second row of a PD pair.
struct PlaneScratch {
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
    luma: Vec<u8>,
    luma2: Vec<u8>,
    chroma_red: Vec<u8>,
    chroma_blue: Vec<u8>,
    mono: Vec<u8>,
}

impl PlaneScratch {
    fn new(width: usize) -> Self {
        Self {
            red: vec![0; width],
            green: vec![0; width],
            blue: vec![0; width],
            luma: vec![0; width],
            luma2: vec![0; width],
            chroma_red: vec![128; width],
            chroma_blue: vec![128; width],
            mono: vec![0; width],
        }
    }

    fn clear(&mut self) {
        self.red.fill(0);
        self.green.fill(0);
        self.blue.fill(0);
        self.luma.fill(0);
        self.luma2.fill(0);
        self.chroma_red.fill(128);
        self.chroma_blue.fill(128);
        self.mono.fill(0);
    }

    fn store(&mut self, channel: Channel, row_offset: u32, x: u32, value: u8) {
        let i = x as usize;
        match channel {
            Channel::Red => self.red[i] = value,
            Channel::Green => self.green[i] = value,
            Channel::Blue => self.blue[i] = value,
            Channel::Luma if row_offset == 0 => self.luma[i] = value,
            Channel::Luma => self.luma2[i] = value,
            Channel::ChromaRed => self.chroma_red[i] = value,
            Channel::ChromaBlue => self.chroma_blue[i] = value,
            Channel::Mono => self.mono[i] = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{
        Rng,
        SeedableRng,
        rngs::SmallRng,
    };

    use super::{
        SignalError,
        SstvDecoder,
    };
    use crate::{
        encoder::SstvEncoder,
        modes::{
            Family,
            ModeSpecification,
        },
        tone::ToneGenerator,
    };

    fn header_and_vis(mode: &'static ModeSpecification, sample_rate: f64) -> Vec<i16> {
        let mut encoder = SstvEncoder::new(mode, Vec::new(), sample_rate);
        encoder.write_calibration_header().unwrap();
        encoder.write_vis().unwrap();
        // trailing porch so the last bit has a clean edge
        encoder.tone.emit(crate::PORCH_TONE, 100.0).unwrap();
        encoder.tone.finish().unwrap()
    }

    #[test]
    fn vis_round_trip_for_every_mode_and_rate() {
        for mode in ModeSpecification::ALL {
            if mode.family == Family::Fax {
                continue;
            }
            for sample_rate in [22050.0, 44100.0, 48000.0] {
                let pcm = header_and_vis(mode, sample_rate);
                let decoder = SstvDecoder::from_samples(&pcm, sample_rate);

                let start = decoder.find_signal_start(crate::LEADER_TONE).unwrap();
                let vis_start = decoder.find_leader(start).unwrap();
                let (vis, _) = decoder.read_vis(vis_start);

                assert_eq!(
                    vis.code,
                    mode.vis_code.value(),
                    "{} at {sample_rate} Hz",
                    mode.name
                );
                assert!(vis.parity_ok, "{} at {sample_rate} Hz", mode.name);
            }
        }
    }

    #[test]
    fn vis_survives_a_vox_intro() {
        let mode = &ModeSpecification::M2;
        let mut encoder = SstvEncoder::new(mode, Vec::new(), 44100.0);
        encoder.write_vox_intro().unwrap();
        encoder.write_calibration_header().unwrap();
        encoder.write_vis().unwrap();
        let pcm = encoder.tone.finish().unwrap();

        let decoder = SstvDecoder::from_samples(&pcm, 44100.0);
        let start = decoder.find_signal_start(crate::LEADER_TONE).unwrap();
        let vis_start = decoder.find_leader(start).unwrap();
        let (vis, _) = decoder.read_vis(vis_start);
        assert_eq!(vis.code, mode.vis_code.value());
    }

    #[test]
    fn vis_survives_additive_noise() {
        let mode = &ModeSpecification::S1;
        let pcm = header_and_vis(mode, 44100.0);

        let mut rng = SmallRng::seed_from_u64(0x5_5_7_1);
        let noisy: Vec<i16> = pcm
            .iter()
            .map(|s| {
                let noise: f64 = rng.gen_range(-0.05..0.05) * 32767.0;
                (*s as f64 + noise).clamp(-32767.0, 32767.0) as i16
            })
            .collect();

        let decoder = SstvDecoder::from_samples(&noisy, 44100.0);
        let start = decoder.find_signal_start(crate::LEADER_TONE).unwrap();
        let vis_start = decoder.find_leader(start).unwrap();
        let (vis, _) = decoder.read_vis(vis_start);
        assert_eq!(vis.code, mode.vis_code.value());
        assert!(vis.parity_ok);
    }

    #[test]
    fn bad_parity_is_reported_not_fatal() {
        let sample_rate = 44100.0;
        let mut tone = ToneGenerator::new(Vec::new(), sample_rate);
        tone.emit(crate::LEADER_TONE, crate::LEADER_TIME).unwrap();
        tone.emit(crate::SYNC_TONE, crate::LEADER_BREAK_TIME).unwrap();
        tone.emit(crate::LEADER_TONE, crate::LEADER_TIME).unwrap();
        // VIS 60 with the parity bit deliberately inverted
        tone.emit(crate::SYNC_TONE, crate::VIS_BIT_TIME).unwrap();
        for bit in 0..7u8 {
            let tone_hz = if (60 >> bit) & 1 != 0 {
                crate::VIS_HIGH_TONE
            }
            else {
                crate::VIS_LOW_TONE
            };
            tone.emit(tone_hz, crate::VIS_BIT_TIME).unwrap();
        }
        tone.emit(crate::VIS_HIGH_TONE, crate::VIS_BIT_TIME).unwrap();
        tone.emit(crate::SYNC_TONE, crate::VIS_BIT_TIME).unwrap();
        let pcm = tone.finish().unwrap();

        let decoder = SstvDecoder::from_samples(&pcm, sample_rate);
        let start = decoder.find_signal_start(crate::LEADER_TONE).unwrap();
        let vis_start = decoder.find_leader(start).unwrap();
        let (vis, _) = decoder.read_vis(vis_start);
        assert_eq!(vis.code, 60);
        assert!(!vis.parity_ok);
    }

    #[test]
    fn silence_only_is_no_signal() {
        let decoder = SstvDecoder::from_samples(&vec![0i16; 44100], 44100.0);
        assert!(matches!(decoder.decode(), Err(SignalError::NoSignal)));
    }

    #[test]
    fn missing_leader_is_reported() {
        // plenty of 1900 Hz energy but never the leader template
        let mut tone = ToneGenerator::new(Vec::new(), 44100.0);
        for _ in 0..40 {
            tone.emit(1900.0, 50.0).unwrap();
            tone.emit(1500.0, 50.0).unwrap();
        }
        let pcm = tone.finish().unwrap();
        let decoder = SstvDecoder::from_samples(&pcm, 44100.0);
        assert!(matches!(decoder.decode(), Err(SignalError::NoLeader { .. })));
    }
}
