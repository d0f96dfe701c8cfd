//! Windowed spectral analysis: FFT peak scans and Goertzel probes.

use std::{
    f64::consts::{
        PI,
        TAU,
    },
    fmt::Debug,
    ops::Range,
    sync::Arc,
};

use num_complex::Complex;
use num_traits::Zero;
use rustfft::FftPlanner;

use crate::util::median_in_place;

/// The fixed tones the protocol machinery has to tell apart.
pub const PROTOCOL_TONES: [f64; 6] = [1100.0, 1200.0, 1300.0, 1500.0, 1900.0, 2300.0];

/// Estimates above this are treated as aliases and reflected down.
pub const FOLD_ABOVE: f64 = 3000.0;

fn hann_window(size: usize) -> Vec<f64> {
    let n = (size - 1) as f64;
    (0..size)
        .map(|i| (PI * i as f64 / n).sin().powi(2))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    Boxcar,
    Hann,
}

impl Window {
    fn to_vec(&self, size: usize) -> Vec<f64> {
        match self {
            Window::Boxcar => vec![1.0; size],
            Window::Hann => hann_window(size),
        }
    }
}

pub struct Fft {
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    window: Vec<f64>,
    fft: Arc<dyn rustfft::Fft<f64>>,
    size: usize,
}

impl Fft {
    pub fn new(size: usize, window: Window) -> Self {
        assert!(size > 0);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            buffer: vec![Complex::zero(); size],
            scratch: vec![Complex::zero(); fft.get_inplace_scratch_len()],
            window: window.to_vec(size),
            fft,
            size,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Windows `samples` in place and returns the complex spectrum. Short
    /// input is zero-padded.
    pub fn forward(&mut self, samples: &[f64]) -> &[Complex<f64>] {
        assert!(samples.len() <= self.size);

        for i in 0..self.size {
            let x = samples.get(i).copied().unwrap_or(0.0);
            self.buffer[i] = Complex::new(self.window[i] * x, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        &self.buffer
    }
}

impl Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Dominant-frequency estimate for one analysis window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralFrame {
    /// First sample covered by the window.
    pub start: usize,
    pub frequency: f64,
    pub magnitude: f64,
}

/// Peak-frequency estimator: Hann window, FFT, log-magnitude argmax,
/// parabolic refinement over the three bins around the peak.
#[derive(Debug)]
pub struct PeakScanner {
    fft: Fft,
    sample_rate: f64,
    magnitudes: Vec<f64>,
}

impl PeakScanner {
    pub fn new(sample_rate: f64, size: usize) -> Self {
        Self {
            fft: Fft::new(size, Window::Hann),
            sample_rate,
            magnitudes: vec![0.0; size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.fft.size()
    }

    pub fn scan(&mut self, samples: &[f64], start: usize) -> SpectralFrame {
        let size = self.fft.size();
        let spectrum = self.fft.forward(samples);

        for (magnitude, bin) in self.magnitudes.iter_mut().zip(spectrum) {
            *magnitude = (bin.norm() + 1e-12).ln();
        }

        // skip DC; a real input's spectrum is symmetric, so a mirror pick is
        // handled by the alias fold below
        let mut peak_bin = 1;
        for bin in 2..size {
            if self.magnitudes[bin] > self.magnitudes[peak_bin] {
                peak_bin = bin;
            }
        }

        let frequency = self.interpolate(peak_bin);
        SpectralFrame {
            start,
            frequency: fold_alias(frequency, self.sample_rate),
            magnitude: self.magnitudes[peak_bin].exp(),
        }
    }

    /// <https://ccrma.stanford.edu/~jos/sasp/Quadratic_Interpolation_Spectral_Peaks.html>
    fn interpolate(&self, bin: usize) -> f64 {
        let size = self.fft.size();
        let bin_width = self.sample_rate / size as f64;

        if bin == 0 || bin + 1 >= size {
            return bin as f64 * bin_width;
        }

        let p = self.magnitudes[bin - 1];
        let c = self.magnitudes[bin];
        let n = self.magnitudes[bin + 1];

        // only refine an actual local peak
        if c > p && c > n {
            let d = 0.5 * (p - n) / (p - 2.0 * c + n);
            (bin as f64 + d) * bin_width
        }
        else {
            bin as f64 * bin_width
        }
    }
}

/// Reflects estimates above the audio band back down: a low sample rate
/// aliases the mirror image of the sub-carrier into the upper bins.
#[inline]
pub fn fold_alias(frequency: f64, sample_rate: f64) -> f64 {
    if frequency > FOLD_ABOVE {
        (frequency - sample_rate).abs()
    }
    else {
        frequency
    }
}

/// Single-tone DFT probe.
#[derive(Clone, Copy, Debug)]
pub struct Goertzel {
    frequency: f64,
    coefficient: f64,
}

impl Goertzel {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        Self {
            frequency,
            coefficient: 2.0 * (TAU * frequency / sample_rate).cos(),
        }
    }

    #[inline]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Normalized power of the probe tone: a full-scale sinusoid at the probe
    /// frequency comes out near 1.0.
    pub fn power(&self, samples: &[f64]) -> f64 {
        let mut s1 = 0.0;
        let mut s2 = 0.0;
        for &x in samples {
            let s0 = x + self.coefficient * s1 - s2;
            s2 = s1;
            s1 = s0;
        }
        let power = s1 * s1 + s2 * s2 - self.coefficient * s1 * s2;
        let half = samples.len() as f64 / 2.0;
        power / (half * half)
    }
}

/// Bank of Goertzel probes that classifies a window against the known
/// protocol tones.
#[derive(Clone, Debug)]
pub struct GoertzelBank {
    probes: Vec<Goertzel>,
}

impl GoertzelBank {
    pub fn new(frequencies: &[f64], sample_rate: f64) -> Self {
        Self {
            probes: frequencies
                .iter()
                .map(|frequency| Goertzel::new(*frequency, sample_rate))
                .collect(),
        }
    }

    #[inline]
    pub fn protocol(sample_rate: f64) -> Self {
        Self::new(&PROTOCOL_TONES, sample_rate)
    }

    /// Probe tone with the strongest response.
    pub fn classify(&self, samples: &[f64]) -> f64 {
        self.probes
            .iter()
            .map(|probe| (probe.frequency(), probe.power(samples)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(frequency, _)| frequency)
            .expect("bank has at least one probe")
    }
}

/// Peak-FFT estimates at a fixed hop over a region of the stream, indexable
/// by sample position.
#[derive(Debug)]
pub struct FrequencyTrack {
    start: usize,
    hop: usize,
    window: usize,
    frequencies: Vec<f64>,
}

impl FrequencyTrack {
    pub fn build(
        scanner: &mut PeakScanner,
        samples: &[f64],
        range: Range<usize>,
        hop: usize,
    ) -> Self {
        let window = scanner.size();
        let start = range.start.min(samples.len());
        let end = range.end.min(samples.len());

        let mut frequencies = Vec::new();
        let mut position = start;
        while position < end {
            let slice_end = (position + window).min(samples.len());
            let frame = scanner.scan(&samples[position..slice_end], position);
            frequencies.push(frame.frequency);
            position += hop;
        }

        Self {
            start,
            hop,
            window,
            frequencies,
        }
    }

    /// Estimate for the window whose center is nearest to `position`.
    pub fn frequency_at(&self, position: f64) -> f64 {
        assert!(!self.frequencies.is_empty());
        let center_offset = (self.window / 2) as f64;
        let index = ((position - self.start as f64 - center_offset) / self.hop as f64).round();
        let index = (index.max(0.0) as usize).min(self.frequencies.len() - 1);
        self.frequencies[index]
    }

    /// Median estimate over the windows centered inside `[a, b)`; falls back
    /// to the window nearest the slot center when the slot is narrower than
    /// the hop.
    pub fn median_between(&self, a: f64, b: f64, scratch: &mut Vec<f64>) -> f64 {
        scratch.clear();
        let center_offset = (self.window / 2) as f64;
        let first = (((a - self.start as f64 - center_offset) / self.hop as f64).ceil()).max(0.0)
            as usize;
        for index in first..self.frequencies.len() {
            let center = self.start as f64 + (index * self.hop) as f64 + center_offset;
            if center >= b {
                break;
            }
            scratch.push(self.frequencies[index]);
        }

        if scratch.is_empty() {
            self.frequency_at(0.5 * (a + b))
        }
        else {
            median_in_place(scratch)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::{
        FrequencyTrack,
        Goertzel,
        GoertzelBank,
        PeakScanner,
        fold_alias,
    };

    const SAMPLE_RATE: f64 = 44100.0;

    fn sine(frequency: f64, num_samples: usize) -> Vec<f64> {
        (0..num_samples)
            .map(|i| (TAU * frequency * i as f64 / SAMPLE_RATE).sin())
            .collect()
    }

    #[test]
    fn peak_at_1500_hz() {
        let samples = sine(1500.0, 512);
        let mut scanner = PeakScanner::new(SAMPLE_RATE, 512);
        let frame = scanner.scan(&samples, 0);
        assert!(
            (1499.5..=1500.5).contains(&frame.frequency),
            "estimated {}",
            frame.frequency
        );
    }

    #[test]
    fn peak_localization_within_half_bin() {
        let size = 512;
        let tolerance = 0.5 * SAMPLE_RATE / size as f64;
        let mut scanner = PeakScanner::new(SAMPLE_RATE, size);
        for frequency in [400.0, 1100.0, 1234.5, 1900.0, 2300.0, 2999.0] {
            let samples = sine(frequency, size);
            let frame = scanner.scan(&samples, 0);
            assert!(
                (frame.frequency - frequency).abs() <= tolerance,
                "{frequency} Hz estimated as {}",
                frame.frequency
            );
        }
    }

    #[test]
    fn alias_folding() {
        assert_eq!(fold_alias(1500.0, SAMPLE_RATE), 1500.0);
        assert_eq!(fold_alias(SAMPLE_RATE - 1500.0, SAMPLE_RATE), 1500.0);
        assert_eq!(fold_alias(2999.0, SAMPLE_RATE), 2999.0);
    }

    #[test]
    fn goertzel_detects_its_tone() {
        let probe = Goertzel::new(1900.0, SAMPLE_RATE);
        let on = probe.power(&sine(1900.0, 256));
        let off = probe.power(&sine(1200.0, 256));
        assert!(on > 0.5, "on-tone power {on}");
        assert!(off < 0.05, "off-tone power {off}");
    }

    #[test]
    fn bank_classifies_protocol_tones() {
        let bank = GoertzelBank::protocol(SAMPLE_RATE);
        for frequency in super::PROTOCOL_TONES {
            let samples = sine(frequency, 1024);
            assert_eq!(bank.classify(&samples), frequency);
        }
    }

    #[test]
    fn track_median_over_slot() {
        let samples = sine(2300.0, 8192);
        let mut scanner = PeakScanner::new(SAMPLE_RATE, 512);
        let track = FrequencyTrack::build(&mut scanner, &samples, 0..8192, 128);
        let mut scratch = Vec::new();
        let estimate = track.median_between(1000.0, 5000.0, &mut scratch);
        assert!((estimate - 2300.0).abs() < 5.0, "estimated {estimate}");
        // slot narrower than the hop falls back to the nearest window
        let narrow = track.median_between(4000.0, 4010.0, &mut scratch);
        assert!((narrow - 2300.0).abs() < 5.0, "estimated {narrow}");
    }
}
