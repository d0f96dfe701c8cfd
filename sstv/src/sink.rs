//! PCM sample sinks fed by the encoder.

use std::{
    convert::Infallible,
    fs::File,
    io::{
        BufWriter,
        Seek,
        Write,
    },
    path::Path,
};

/// Consumer of signed 16-bit mono PCM.
pub trait WriteSamples {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_samples(&mut self, samples: &[i16]) -> Result<(), Self::Error>;

    /// Flushes buffered data and finalizes any container framing. Called once
    /// when the transmission is complete.
    fn finish(&mut self) -> Result<(), Self::Error>;
}

impl WriteSamples for Vec<i16> {
    type Error = Infallible;

    #[inline]
    fn write_samples(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        self.extend_from_slice(samples);
        Ok(())
    }

    #[inline]
    fn finish(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("wav sink error")]
pub enum WavSinkError {
    Hound(#[from] hound::Error),
    Closed,
}

/// WAV container sink (RIFF/WAVE, PCM, one channel, 16 bit).
pub struct WavSink<W>
where
    W: Write + Seek,
{
    inner: Option<hound::WavWriter<W>>,
}

impl<W> WavSink<W>
where
    W: Write + Seek,
{
    pub fn from_writer(writer: W, sample_rate: f64) -> Result<Self, WavSinkError> {
        Ok(Self {
            inner: Some(hound::WavWriter::new(writer, wav_spec(sample_rate))?),
        })
    }

    #[inline]
    fn writer_mut(&mut self) -> Result<&mut hound::WavWriter<W>, WavSinkError> {
        self.inner.as_mut().ok_or(WavSinkError::Closed)
    }
}

impl WavSink<BufWriter<File>> {
    pub fn from_path(path: impl AsRef<Path>, sample_rate: f64) -> Result<Self, WavSinkError> {
        Ok(Self {
            inner: Some(hound::WavWriter::create(path, wav_spec(sample_rate))?),
        })
    }
}

impl<W> WriteSamples for WavSink<W>
where
    W: Write + Seek,
{
    type Error = WavSinkError;

    fn write_samples(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        let writer = self.writer_mut()?;
        for sample in samples {
            writer.write_sample(*sample)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        if let Some(writer) = self.inner.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

fn wav_spec(sample_rate: f64) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

#[derive(Debug, thiserror::Error)]
#[error("raw sink error")]
pub struct RawSinkError(#[from] std::io::Error);

/// Headerless little-endian PCM16 sink.
#[derive(Debug)]
pub struct RawSink<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W> RawSink<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::new(),
        }
    }
}

impl<W> WriteSamples for RawSink<W>
where
    W: Write,
{
    type Error = RawSinkError;

    fn write_samples(&mut self, samples: &[i16]) -> Result<(), Self::Error> {
        self.buffer.clear();
        self.buffer.reserve(samples.len() * 2);
        for sample in samples {
            self.buffer.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer.write_all(&self.buffer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()?;
        Ok(())
    }
}
