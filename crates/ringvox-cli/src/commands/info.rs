//! Display audio file metadata.

use std::path::PathBuf;

use clap::Args;
use ringvox_core::PcmSource;
use ringvox_io::open_file;

use super::common::format_bytes;

/// Display audio file information.
#[derive(Args)]
pub struct InfoArgs {
    /// Audio files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    for (i, path) in args.files.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let source = open_file(path)?;
        let format = source.format();

        println!("File:        {}", path.display());
        println!("Format:      {}-bit PCM", format.bits_per_sample);
        println!("Channels:    {}", format.channels);
        println!("Sample Rate: {} Hz", format.rate);
        println!(
            "Duration:    {:.3}s ({} frames)",
            source.duration(),
            source.sample_duration()
        );
        println!("PCM Size:    {}", format_bytes(source.total_bytes()));

        let file_size = std::fs::metadata(path)?.len();
        println!("File Size:   {}", format_bytes(file_size));
    }
    Ok(())
}
