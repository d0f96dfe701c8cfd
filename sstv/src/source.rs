//! PCM sample sources feeding the decoder.

use std::{
    fs::File,
    io::{
        BufReader,
        Read,
    },
    path::Path,
};

pub trait GetSampleRate {
    fn sample_rate(&self) -> f64;
}

/// Producer of signed 16-bit mono PCM. A read of zero samples is end of
/// stream.
pub trait ReadSamples: GetSampleRate {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_samples(&mut self, buffer: &mut [i16]) -> Result<usize, Self::Error>;

    fn read_to_end(&mut self, out: &mut Vec<i16>) -> Result<(), Self::Error> {
        let mut buffer = [0i16; 0x1000];
        loop {
            let n = self.read_samples(&mut buffer)?;
            if n == 0 {
                return Ok(());
            }
            out.extend_from_slice(&buffer[..n]);
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("wav source error")]
pub enum WavSourceError {
    Hound(#[from] hound::Error),
    UnexpectedChannelCount { channels: u16 },
    UnexpectedBitsPerSample { bits_per_sample: u16 },
    UnexpectedSampleFormat,
}

/// WAV container source. The container's sample rate wins over whatever the
/// caller assumed.
pub struct WavSource<R> {
    inner: hound::WavReader<R>,
    spec: hound::WavSpec,
}

impl<R> WavSource<R>
where
    R: Read,
{
    pub fn new(inner: hound::WavReader<R>) -> Result<Self, WavSourceError> {
        let spec = inner.spec();
        if spec.channels != 1 {
            return Err(WavSourceError::UnexpectedChannelCount {
                channels: spec.channels,
            });
        }
        if spec.bits_per_sample != 16 {
            return Err(WavSourceError::UnexpectedBitsPerSample {
                bits_per_sample: spec.bits_per_sample,
            });
        }
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(WavSourceError::UnexpectedSampleFormat);
        }
        Ok(Self { inner, spec })
    }

    #[inline]
    pub fn from_reader(reader: R) -> Result<Self, WavSourceError> {
        Self::new(hound::WavReader::new(reader)?)
    }
}

impl WavSource<BufReader<File>> {
    #[inline]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WavSourceError> {
        Self::new(hound::WavReader::open(path)?)
    }
}

impl<R> GetSampleRate for WavSource<R> {
    #[inline]
    fn sample_rate(&self) -> f64 {
        self.spec.sample_rate as f64
    }
}

impl<R> ReadSamples for WavSource<R>
where
    R: Read,
{
    type Error = WavSourceError;

    fn read_samples(&mut self, buffer: &mut [i16]) -> Result<usize, Self::Error> {
        let mut samples = self.inner.samples::<i16>();
        let mut n = 0;
        while n < buffer.len() {
            let Some(sample) = samples.next().transpose()?
            else {
                break;
            };
            buffer[n] = sample;
            n += 1;
        }
        Ok(n)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("raw source error")]
pub struct RawSourceError(#[from] std::io::Error);

/// Headerless little-endian PCM16 source at a caller-declared sample rate.
#[derive(Debug)]
pub struct RawSource<R> {
    reader: R,
    sample_rate: f64,
}

impl<R> RawSource<R>
where
    R: Read,
{
    pub fn new(reader: R, sample_rate: f64) -> Self {
        Self {
            reader,
            sample_rate,
        }
    }
}

impl<R> GetSampleRate for RawSource<R> {
    #[inline]
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl<R> ReadSamples for RawSource<R>
where
    R: Read,
{
    type Error = RawSourceError;

    fn read_samples(&mut self, buffer: &mut [i16]) -> Result<usize, Self::Error> {
        let mut n = 0;
        let mut bytes = [0u8; 2];
        while n < buffer.len() {
            match self.reader.read(&mut bytes[..1])? {
                0 => break,
                _ => {}
            }
            self.reader.read_exact(&mut bytes[1..])?;
            buffer[n] = i16::from_le_bytes(bytes);
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{
        RawSource,
        ReadSamples,
    };

    #[test]
    fn raw_source_rejects_truncated_sample() {
        let bytes = vec![0x02, 0x01, 0xfe];
        let mut source = RawSource::new(Cursor::new(bytes), 8000.0);
        let mut out = Vec::new();
        assert!(source.read_to_end(&mut out).is_err());
    }

    #[test]
    fn raw_source_round_trip() {
        let bytes = vec![0x02, 0x01, 0xfe, 0xff];
        let mut source = RawSource::new(Cursor::new(bytes), 8000.0);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0x0102, -2]);
    }
}
