//! h5j: inspect H5J containers and reassemble their channels into a stack.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use h5j_core::{
    resolve_bit_depth, CalibrationConvention, ContainerStore, DisplayHint, FrameDecoder,
    CHANNELS_PATH,
};
use h5j_io::ffmpeg::{FFMPEG_ENV, FFPROBE_ENV};
use h5j_io::{write_stack_hdf5, FfmpegConfig, FfmpegDecoder, H5jReader, StackWriteOptions};
use h5j_stack::{AssemblyConfig, MismatchPolicy};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    H5jIo(#[from] h5j_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] h5j_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where voxel spacing and unit are read from.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Convention {
    /// Root `voxel_size` when present, channel-group scalars otherwise
    Auto,
    /// Root `voxel_size` array and `unit`
    Root,
    /// `spcx`/`spcy`/`spcz` and `unit` on the channel group
    ChannelGroup,
}

impl From<Convention> for CalibrationConvention {
    fn from(value: Convention) -> Self {
        match value {
            Convention::Auto => Self::Auto,
            Convention::Root => Self::RootVoxelSize,
            Convention::ChannelGroup => Self::ChannelGroup,
        }
    }
}

/// Locations of the external decoder binaries.
#[derive(Args, Debug)]
struct DecoderArgs {
    /// ffmpeg binary
    #[arg(long, env = FFMPEG_ENV)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe binary
    #[arg(long, env = FFPROBE_ENV)]
    ffprobe: Option<PathBuf>,
}

impl DecoderArgs {
    fn decoder(&self) -> FfmpegDecoder {
        let mut config = FfmpegConfig::default();
        if let Some(path) = &self.ffmpeg {
            config = config.with_ffmpeg(path);
        }
        if let Some(path) = &self.ffprobe {
            config = config.with_ffprobe(path);
        }
        FfmpegDecoder::new(config)
    }
}

/// Reader for H5J multi-channel volumetric containers.
#[derive(Parser)]
#[command(name = "h5j")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show geometry, calibration and channels of an H5J file
    Info {
        /// Input H5J file
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Probe channel 0 for bit depth and display range
        #[arg(long)]
        probe: bool,

        /// Calibration attribute layout
        #[arg(long, value_enum, default_value = "auto")]
        convention: Convention,

        #[command(flatten)]
        decoder: DecoderArgs,
    },

    /// List channel ids in stack order
    Channels {
        /// Input H5J file
        input: PathBuf,
    },

    /// Decode and reassemble the stack, writing it to HDF5
    Extract {
        /// Input H5J file
        input: PathBuf,

        /// Output HDF5 file
        #[arg(short, long)]
        output: PathBuf,

        /// Extract a single channel by id instead of the whole stack
        #[arg(long)]
        channel: Option<String>,

        /// Abort when a channel's depth differs from channel 0
        #[arg(long)]
        fail_on_mismatch: bool,

        /// Decode worker threads (default: all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Decode channels one at a time
        #[arg(long)]
        sequential: bool,

        /// Calibration attribute layout
        #[arg(long, value_enum, default_value = "auto")]
        convention: Convention,

        /// Deflate level for the output dataset (0 disables compression)
        #[arg(long, default_value = "1")]
        compression: u8,

        #[command(flatten)]
        decoder: DecoderArgs,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info {
            input,
            json,
            probe,
            convention,
            decoder,
        } => {
            let reader = H5jReader::open(&input)?.with_config(
                AssemblyConfig::default().with_convention(convention.into()),
            );
            let attrs = reader.attributes()?;
            let channels = reader.channel_names()?;

            let probed = match (probe, channels.first()) {
                (true, Some(first)) => {
                    let decoder = decoder.decoder();
                    let blob = reader
                        .store()
                        .read_opaque(&format!("{CHANNELS_PATH}/{first}"))?;
                    let format = decoder.probe(first, &blob)?;
                    let bit_depth = resolve_bit_depth(&format);
                    Some((format, bit_depth, DisplayHint::for_stack(channels.len(), bit_depth)))
                }
                _ => None,
            };

            if json {
                let mut report = json!({
                    "file": input.display().to_string(),
                    "attributes": attrs,
                    "channels": channels,
                });
                if let Some((format, bit_depth, display)) = &probed {
                    report["pixel_format"] = json!(format.as_str());
                    report["bit_depth"] = json!(bit_depth.bits());
                    report["display"] = serde_json::to_value(display)?;
                }
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("File: {}", input.display());
            match attrs.declared_size() {
                Some((width, height)) => println!("Size: {} x {}", width, height),
                None => println!("Size: (from decoded frames)"),
            }
            println!("Padding: right {}, bottom {}", attrs.pad_right, attrs.pad_bottom);
            let [x, y, z] = attrs.voxel_spacing;
            println!(
                "Voxel spacing: {} x {} x {} {}",
                x,
                y,
                z,
                attrs.unit.as_deref().unwrap_or("(no unit)")
            );
            if let Some((format, bit_depth, display)) = &probed {
                println!("Pixel format: {} ({}-bit)", format, bit_depth.bits());
                println!(
                    "Display: {:?}, range {} - {}",
                    display.mode, display.range.0, display.range.1
                );
            }
            println!("Channels: {}", channels.len());
            for id in &channels {
                println!("  {}", id);
            }
        }

        Commands::Channels { input } => {
            for id in H5jReader::open(&input)?.channel_names()? {
                println!("{}", id);
            }
        }

        Commands::Extract {
            input,
            output,
            channel,
            fail_on_mismatch,
            threads,
            sequential,
            convention,
            compression,
            decoder,
        } => {
            let policy = if fail_on_mismatch {
                MismatchPolicy::Fail
            } else {
                MismatchPolicy::Truncate
            };
            let config = AssemblyConfig::default()
                .with_mismatch_policy(policy)
                .with_parallel(!sequential)
                .with_threads(threads.unwrap_or(0))
                .with_convention(convention.into());

            let decoder = decoder.decoder();
            decoder.check_available()?;
            let reader = H5jReader::open(&input)?.with_config(config);

            let start = Instant::now();
            let assembled = match &channel {
                Some(id) => reader.extract_channel(id, &decoder)?,
                None => reader.load_stack(&decoder)?,
            };
            for warning in &assembled.warnings {
                eprintln!("warning: {}", warning);
            }

            let options = StackWriteOptions {
                compression: (compression > 0).then_some(compression),
                ..StackWriteOptions::default()
            };
            write_stack_hdf5(&output, &assembled, &options)?;

            let stack = &assembled.stack;
            println!(
                "Wrote {} channel(s) x {} slices of {} x {} ({}-bit) to {} in {:.2?}",
                stack.channels(),
                stack.depth(),
                stack.width(),
                stack.height(),
                stack.bit_depth().bits(),
                output.display(),
                start.elapsed()
            );
        }
    }

    Ok(())
}
