pub mod args;

use std::{
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
    path::PathBuf,
    process::exit,
};

use clap::Parser;
use color_eyre::eyre::Error;
use image::ImageReader;
use sstv::{
    Family,
    ModeSpecification,
    SignalError,
    SstvDecoder,
    SstvEncoder,
    encoder::EncodeError,
    image::FrameBuffer,
    sink::{
        RawSink,
        WavSink,
        WriteSamples,
    },
    source::{
        RawSource,
        WavSource,
    },
};
use tracing_subscriber::EnvFilter;

use crate::args::{
    Args,
    Command,
};

fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!(?args);

    match args.command {
        Command::Encode {
            image,
            encoding,
            mode,
            sr,
            raw,
            vox,
            out,
        } => encode(&image, &encoding, &mode, sr as f64, raw, vox, &out),
        Command::Decode {
            input,
            sr,
            raw,
            encoding,
            mode,
            out,
        } => {
            decode(
                &input,
                sr as f64,
                raw,
                encoding.as_deref(),
                mode.as_deref(),
                &out,
            )
        }
        Command::List => {
            list();
            Ok(())
        }
    }
}

/// Exit 1: the mode table has no such entry.
fn resolve_mode(encoding: &str, key: &str) -> &'static ModeSpecification {
    let family = match encoding.parse::<Family>() {
        Ok(family) => family,
        Err(error) => {
            eprintln!("{error}");
            exit(1);
        }
    };
    match ModeSpecification::from_key(family, key) {
        Some(mode) => mode,
        None => {
            eprintln!("unknown mode {key} for encoding {}", family.name());
            exit(1);
        }
    }
}

fn encode(
    image: &PathBuf,
    encoding: &str,
    mode: &str,
    sample_rate: f64,
    raw: bool,
    vox: bool,
    out: &PathBuf,
) -> Result<(), Error> {
    let mode = resolve_mode(encoding, mode);
    let frame = ImageReader::open(image)?.decode()?.into_rgb8();
    tracing::info!(
        mode = mode.name,
        width = frame.width(),
        height = frame.height(),
        sample_rate,
        "encoding"
    );

    if raw {
        let sink = RawSink::new(BufWriter::new(File::create(out)?));
        encode_frame(mode, sink, sample_rate, vox, &frame)?;
    }
    else {
        let sink = WavSink::from_path(out, sample_rate)?;
        encode_frame(mode, sink, sample_rate, vox, &frame)?;
    }

    tracing::info!(path = %out.display(), "wrote transmission");
    Ok(())
}

fn encode_frame<W, F>(
    mode: &'static ModeSpecification,
    sink: W,
    sample_rate: f64,
    vox: bool,
    frame: &F,
) -> Result<(), Error>
where
    W: WriteSamples,
    F: FrameBuffer,
{
    let mut encoder = SstvEncoder::new(mode, sink, sample_rate);
    if vox {
        encoder = encoder.with_vox();
    }
    match encoder.encode(frame) {
        Ok(_) => Ok(()),
        // exit 3: the image doesn't fit the mode geometry
        Err(error @ EncodeError::SizeMismatch { .. }) => {
            eprintln!("{error}");
            exit(3);
        }
        Err(EncodeError::Sink(error)) => Err(error.into()),
    }
}

fn decode(
    input: &PathBuf,
    sample_rate: f64,
    raw: bool,
    encoding: Option<&str>,
    mode: Option<&str>,
    out: &PathBuf,
) -> Result<(), Error> {
    let decoder = if raw {
        let mut source = RawSource::new(BufReader::new(File::open(input)?), sample_rate);
        SstvDecoder::from_source(&mut source)?
    }
    else {
        let mut source = WavSource::from_path(input)?;
        SstvDecoder::from_source(&mut source)?
    };
    tracing::info!(sample_rate = decoder.sample_rate(), "analyzing");

    let forced = encoding.map(|encoding| {
        // FAX has a single mode, so the key may be omitted
        let key = mode.unwrap_or("FAX480");
        resolve_mode(encoding, key)
    });

    let result = match forced {
        Some(mode) => decoder.decode_as(mode),
        None => decoder.decode(),
    };

    let decoded = match result {
        Ok(decoded) => decoded,
        Err(SignalError::SyncLost { line, partial }) => {
            // keep what was decoded, but still fail the run
            eprintln!("sync lost at line {line}; writing the partial image");
            partial.image.into_rgb_image().save(out)?;
            exit(1);
        }
        Err(error) => {
            eprintln!("{error}");
            exit(1);
        }
    };

    if let Some(vis) = &decoded.vis {
        if !vis.parity_ok {
            tracing::warn!(code = vis.code, "VIS parity mismatch");
        }
    }
    tracing::info!(
        mode = decoded.mode.name,
        lines = decoded.lines_decoded,
        "decoded"
    );

    decoded.image.into_rgb_image().save(out)?;
    tracing::info!(path = %out.display(), "wrote image");
    Ok(())
}

fn list() {
    for family in Family::ALL {
        println!("{}:", family.name());
        for mode in ModeSpecification::ALL {
            if mode.family == family {
                println!(
                    "    {:<8} {}x{} (VIS {})",
                    mode.short_name, mode.width, mode.height, mode.vis_code
                );
            }
        }
    }
}
