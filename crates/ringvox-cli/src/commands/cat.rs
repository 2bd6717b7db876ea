//! Decode an audio file to PCM.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use ringvox_core::PcmSource;
use ringvox_io::{open_file, write_raw, write_wav};

/// Output container for decoded PCM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// RIFF WAV with a header
    #[default]
    Wav,
    /// Headerless little-endian PCM
    Raw,
}

/// Decode an audio file.
#[derive(Args)]
pub struct CatArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Wav)]
    pub format: OutputFormat,

    /// Start decoding at this time in seconds
    #[arg(long)]
    pub seek: Option<f64>,
}

/// Run the cat command.
pub fn run(args: CatArgs) -> anyhow::Result<()> {
    let mut source = open_file(&args.input)?;
    let format = source.format();

    if let Some(secs) = args.seek {
        if secs < 0.0 || secs.is_nan() {
            anyhow::bail!("--seek must be a non-negative time, got {secs}");
        }
        source.seek_to_sample(format.secs_to_frames(secs))?;
    }

    println!("Input:  {} ({format})", args.input.display());

    let frames = match args.format {
        OutputFormat::Wav => write_wav(&args.output, source.as_mut())?,
        OutputFormat::Raw => {
            let mut out = BufWriter::new(File::create(&args.output)?);
            format.bytes_to_frames(write_raw(&mut out, source.as_mut())?)
        }
    };

    println!(
        "Output: {} ({frames} frames, {:.3}s)",
        args.output.display(),
        format.frames_to_secs(frames)
    );
    Ok(())
}
