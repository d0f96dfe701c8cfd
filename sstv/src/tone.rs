//! Phase-continuous tone synthesis.

use std::f64::consts::TAU;

use crate::sink::WriteSamples;

pub const AMPLITUDE: f64 = 32767.0;

/// Sample-accurate sinusoid generator.
///
/// Tone boundaries are scheduled against a cumulative clock rather than by
/// rounding each duration on its own: every call extends the clock by its
/// duration and emits exactly `round(clock * sample_rate) - emitted` samples,
/// so the stream never drifts more than one sample period from the script no
/// matter how many sub-millisecond tones it is built from. The phase
/// accumulator carries over between tones, which keeps the waveform free of
/// steps at frequency changes.
#[derive(Debug)]
pub struct ToneGenerator<W> {
    sink: W,
    sample_rate: f64,
    phase: f64,
    clock: f64,
    samples_emitted: u64,
    scratch: Vec<i16>,
}

impl<W> ToneGenerator<W>
where
    W: WriteSamples,
{
    pub fn new(sink: W, sample_rate: f64) -> Self {
        Self {
            sink,
            sample_rate,
            phase: 0.0,
            clock: 0.0,
            samples_emitted: 0,
            scratch: Vec::with_capacity(0x1000),
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted
    }

    /// Seconds of audio scheduled so far.
    #[inline]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Appends `duration_ms` of a `frequency` Hz tone.
    pub fn emit(&mut self, frequency: f64, duration_ms: f64) -> Result<(), W::Error> {
        self.clock += duration_ms / 1000.0;
        let end_sample = (self.clock * self.sample_rate).round() as u64;
        let step = TAU * frequency / self.sample_rate;

        self.scratch.clear();
        for _ in self.samples_emitted..end_sample {
            let sample = (AMPLITUDE * self.phase.sin())
                .round()
                .clamp(-AMPLITUDE, AMPLITUDE) as i16;
            self.scratch.push(sample);
            self.phase = (self.phase + step) % TAU;
        }

        self.sink.write_samples(&self.scratch)?;
        self.samples_emitted = end_sample;
        Ok(())
    }

    /// Finalizes the sink and hands it back.
    pub fn finish(mut self) -> Result<W, W::Error> {
        self.sink.finish()?;
        Ok(self.sink)
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::{
        AMPLITUDE,
        ToneGenerator,
    };

    const SAMPLE_RATE: f64 = 44100.0;

    #[test]
    fn duration_is_drift_free() {
        let mut tone = ToneGenerator::new(Vec::new(), SAMPLE_RATE);
        // 1000 awkward sub-millisecond tones
        for i in 0..1000 {
            tone.emit(1500.0 + (i % 256) as f64, 0.4576).unwrap();
        }
        let expected = (SAMPLE_RATE * 1000.0 * 0.4576 / 1000.0).round() as u64;
        assert_eq!(tone.samples_emitted(), expected);
        let sink = tone.finish().unwrap();
        assert_eq!(sink.len() as u64, expected);
    }

    #[test]
    fn per_call_boundary_error_below_one_sample() {
        let mut tone = ToneGenerator::new(Vec::new(), SAMPLE_RATE);
        let mut scheduled_ms = 0.0;
        for duration in [0.1, 0.3, 4.862, 0.572, 30.0, 2.05, 0.18125] {
            tone.emit(1900.0, duration).unwrap();
            scheduled_ms += duration;
            let scheduled_samples = SAMPLE_RATE * scheduled_ms / 1000.0;
            let error = (tone.samples_emitted() as f64 - scheduled_samples).abs();
            assert!(error <= 0.5 + 1e-9, "error {error} after {scheduled_ms} ms");
        }
    }

    #[test]
    fn phase_is_continuous_across_tones() {
        let mut tone = ToneGenerator::new(Vec::new(), SAMPLE_RATE);
        tone.emit(1900.0, 10.0).unwrap();
        tone.emit(1200.0, 10.0).unwrap();
        let samples = tone.finish().unwrap();

        // largest step a pure tone can take between adjacent samples
        let max_step = AMPLITUDE * TAU * 1900.0 / SAMPLE_RATE;
        for pair in samples.windows(2) {
            let delta = (pair[1] as f64 - pair[0] as f64).abs();
            assert!(delta <= max_step * 1.01, "discontinuity of {delta}");
        }
    }

    #[test]
    fn first_samples_follow_the_sine() {
        let mut tone = ToneGenerator::new(Vec::new(), SAMPLE_RATE);
        tone.emit(1900.0, 5.0).unwrap();
        let samples = tone.finish().unwrap();
        for (i, sample) in samples.iter().enumerate().take(50) {
            let expected = AMPLITUDE * (TAU * 1900.0 * i as f64 / SAMPLE_RATE).sin();
            assert!(
                (*sample as f64 - expected).abs() <= 1.0,
                "sample {i}: {sample} vs {expected}"
            );
        }
    }

    #[test]
    fn amplitude_bounded() {
        let mut tone = ToneGenerator::new(Vec::new(), SAMPLE_RATE);
        tone.emit(2300.0, 50.0).unwrap();
        let samples = tone.finish().unwrap();
        assert!(samples.iter().any(|s| *s > 30000));
        assert!(samples.iter().any(|s| *s < -30000));
    }
}
