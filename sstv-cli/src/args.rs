use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(version, about = "Slow-scan television encoder/decoder")]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Encode an image into an SSTV audio transmission.
    Encode {
        /// Input image (PNG, JPEG or BMP).
        image: PathBuf,

        /// Encoding family: Martin, Scottie, Wrasse, Pasokon, PD, Robot, FAX.
        #[clap(long)]
        encoding: String,

        /// Mode key within the family, e.g. M1, S2, SC2-120, PD90, 36.
        #[clap(long)]
        mode: String,

        /// Output sample rate in Hz.
        #[clap(long, default_value = "44100")]
        sr: u32,

        /// Write headerless PCM16-LE instead of a WAV container.
        #[clap(long)]
        raw: bool,

        /// Emit the VOX wake-up tones before the calibration header.
        #[clap(long)]
        vox: bool,

        /// Output audio path.
        #[clap(long)]
        out: PathBuf,
    },

    /// Decode an SSTV recording back into an image.
    Decode {
        /// Input audio (WAV, or raw PCM16-LE with --raw).
        input: PathBuf,

        /// Sample rate of raw input. WAV input carries its own rate, which
        /// wins.
        #[clap(long, default_value = "44100")]
        sr: u32,

        /// Treat the input as headerless PCM16-LE.
        #[clap(long)]
        raw: bool,

        /// Force an encoding family instead of dispatching on the VIS code.
        /// Required for FAX, which carries no VIS.
        #[clap(long)]
        encoding: Option<String>,

        /// Force a mode key within the forced family.
        #[clap(long)]
        mode: Option<String>,

        /// Output image path; the format follows the extension.
        #[clap(long)]
        out: PathBuf,
    },

    /// List every supported encoding and mode.
    List,
}
