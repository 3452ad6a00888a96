//! microfrontend - runs raw PCM16 audio through a feature session.
//!
//! Input is mono little-endian 16-bit PCM. Every completed frame is written
//! as one JSON line:
//!
//! ```text
//! {"frame":0,"features":[0.0, ...]}
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use giztoy_microfrontend::{FeatureSession, FrontendConfig};

#[derive(Parser)]
#[command(name = "microfrontend")]
#[command(about = "Extract microWakeWord spectrogram features from PCM16 audio")]
#[command(version)]
struct Cli {
    /// Raw PCM16 input file ("-" for stdin)
    #[arg(default_value = "-")]
    input: String,

    /// Input sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 16000)]
    sample_rate: i32,

    /// Hop between frames in milliseconds
    #[arg(short = 's', long = "step-ms", default_value_t = 10)]
    step_ms: i32,

    /// Samples fed per call, to mimic streaming capture
    #[arg(long, default_value_t = 160)]
    chunk: usize,

    /// Print the engine configuration as YAML and exit
    #[arg(long)]
    dump_config: bool,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Serialize)]
struct FrameLine<'a> {
    frame: usize,
    features: &'a [f32],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }

    if cli.dump_config {
        let step = u32::try_from(cli.step_ms).context("step must be positive")?;
        let yaml = serde_yaml::to_string(&FrontendConfig::micro_wake_word(step))?;
        print!("{yaml}");
        return Ok(());
    }

    if cli.chunk == 0 {
        bail!("--chunk must be positive");
    }

    let samples = read_pcm16(&cli.input)?;
    let mut session = FeatureSession::new(cli.sample_rate, cli.step_ms)?;
    info!(
        samples = samples.len(),
        window = session.engine().window_size(),
        step = session.engine().step_size(),
        "processing"
    );

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {path}"))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut frame = 0;
    for chunk in samples.chunks(cli.chunk) {
        for features in session.process_samples(chunk) {
            serde_json::to_writer(
                &mut out,
                &FrameLine {
                    frame,
                    features: &features,
                },
            )?;
            writeln!(out)?;
            frame += 1;
        }
    }
    out.flush()?;

    info!(frames = frame, "done");
    Ok(())
}

fn read_pcm16(input: &str) -> Result<Vec<i16>> {
    let mut bytes = Vec::new();
    if input == "-" {
        io::stdin().read_to_end(&mut bytes)?;
    } else {
        File::open(input)
            .with_context(|| format!("open {input}"))?
            .read_to_end(&mut bytes)?;
    }
    if bytes.len() % 2 != 0 {
        debug!(len = bytes.len(), "dropping trailing odd byte");
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}
