use clap::{Parser, Subcommand};
use hound::WavSpec;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use thiserror::Error;
use wavebridge_core::resample::downmix_to_mono;
use wavebridge_core::{AudioLevel, Bridge, ProtocolId, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME};

#[derive(Parser)]
#[command(name = "wavebridge")]
#[command(about = "Send and receive short text messages over sound")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text to a WAV audio file
    Encode {
        /// Message to transmit
        #[arg(value_name = "TEXT")]
        text: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Protocol id or name (see `wavebridge protocols`)
        #[arg(short, long, default_value = "audible-fast", value_parser = parse_protocol)]
        protocol: i32,

        /// Output volume, 0-100
        #[arg(short, long, default_value_t = DEFAULT_VOLUME)]
        volume: f32,

        /// Output sample rate in Hz
        #[arg(short, long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
    },

    /// Decode every message found in a WAV audio file
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Feed the decoder this many samples at a time (0 = whole file in one call)
        #[arg(short, long, default_value_t = 4096)]
        chunk: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report RMS and peak level of a WAV audio file
    Level {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported protocols
    Protocols {
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("Unsupported WAV format: {bits} bit {format:?}")]
    UnsupportedFormat { bits: u16, format: hound::SampleFormat },

    #[error("No transmission found in {0}")]
    NothingDecoded(String),
}

#[derive(Serialize)]
struct DecodedMessage {
    text: String,
    /// Input sample position at which the message completed
    end_sample: usize,
}

#[derive(Serialize)]
struct DecodeReport {
    sample_rate: u32,
    samples: usize,
    messages: Vec<DecodedMessage>,
}

#[derive(Serialize)]
struct ProtocolInfo {
    id: i32,
    name: &'static str,
    family: String,
    frames_per_symbol: usize,
}

#[derive(Serialize)]
struct LevelReport {
    rms: f32,
    peak: f32,
}

fn parse_protocol(value: &str) -> Result<i32, String> {
    if let Ok(id) = value.parse::<i32>() {
        return Ok(id);
    }
    ProtocolId::ALL
        .iter()
        .find(|p| p.name().eq_ignore_ascii_case(value))
        .map(|p| p.id())
        .ok_or_else(|| CliError::UnknownProtocol(value.to_string()).to_string())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Encode {
            text,
            output,
            protocol,
            volume,
            sample_rate,
        } => encode_command(&text, &output, protocol, volume, sample_rate)?,
        Commands::Decode { input, chunk, json } => decode_command(&input, chunk, json)?,
        Commands::Level { input, json } => level_command(&input, json)?,
        Commands::Protocols { json } => protocols_command(json)?,
    }

    Ok(())
}

fn encode_command(
    text: &str,
    output_path: &PathBuf,
    protocol: i32,
    volume: f32,
    sample_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge: Bridge = Bridge::new();
    let handle = bridge.initialize(sample_rate as i32)?;
    let samples = bridge.encode(handle.to_raw(), text, protocol, volume)?;
    bridge.destroy(handle.to_raw());
    println!("Encoded {} bytes to {} audio samples", text.len(), samples.len());

    // 16-bit PCM, mono
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let file = File::create(output_path)?;
    let mut writer = hound::WavWriter::new(file, spec)?;
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;

    println!("Wrote {}", output_path.display());
    Ok(())
}

/// Read a WAV file as mono f32 samples plus its sample rate
fn read_wav(input_path: &PathBuf) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let file = File::open(input_path)?;
    let mut reader = hound::WavReader::new(file)?;
    let spec = reader.spec();
    debug!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8_388_608.0))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => return Err(CliError::UnsupportedFormat { bits, format }.into()),
    };

    Ok((downmix_to_mono(&interleaved, spec.channels as usize), spec.sample_rate))
}

fn decode_command(input_path: &PathBuf, chunk: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, sample_rate) = read_wav(input_path)?;
    info!("Decoding {} samples at {} Hz", samples.len(), sample_rate);

    // Analyse on the file's own tone grid
    let bridge: Bridge = Bridge::new();
    let handle = bridge.initialize(sample_rate as i32)?.to_raw();

    let chunk = if chunk == 0 { samples.len().max(1) } else { chunk };
    let mut messages = Vec::new();
    let mut consumed = 0;
    for block in samples.chunks(chunk) {
        consumed += block.len();
        if let Some(text) = bridge.decode(handle, block)? {
            messages.push(DecodedMessage {
                text,
                end_sample: consumed,
            });
        }
    }

    // Each call yields at most one message; drain the ones already buffered
    while let Some(text) = bridge.decode(handle, &[0.0])? {
        messages.push(DecodedMessage {
            text,
            end_sample: samples.len(),
        });
    }
    bridge.destroy(handle);

    if json {
        let report = DecodeReport {
            sample_rate,
            samples: samples.len(),
            messages,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if messages.is_empty() {
        return Err(CliError::NothingDecoded(input_path.display().to_string()).into());
    }
    for message in &messages {
        println!("{}", message.text);
    }
    Ok(())
}

fn level_command(input_path: &PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, _) = read_wav(input_path)?;
    let level = AudioLevel::measure(&samples);

    if json {
        let report = LevelReport {
            rms: level.rms,
            peak: level.peak,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("rms {:.4}  peak {:.4}", level.rms, level.peak);
    }
    Ok(())
}

fn protocols_command(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let protocols: Vec<ProtocolInfo> = ProtocolId::ALL
        .iter()
        .map(|p| ProtocolInfo {
            id: p.id(),
            name: p.name(),
            family: format!("{:?}", p.family()).to_lowercase(),
            frames_per_symbol: p.frames_per_symbol(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&protocols)?);
    } else {
        for p in &protocols {
            println!("{}  {:<20} {} frames/symbol", p.id, p.name, p.frames_per_symbol);
        }
    }
    Ok(())
}
