//! codecgate-probe
//!
//! Reads the parameter sets of an H.264/H.265 elementary stream (or takes
//! them as hex on the command line), runs them through a [`ModuleGate`] and
//! prints the outcome as JSON on stdout. Logs go to stderr.
//!
//! Exit status is 1 when the outcome carries an error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use codecgate::{CodecError, GateConfig, ModuleGate, OutcomeRecord, ParameterSets, ParseError};
use codecgate_params::nal::{self, Codec};
use tracing_subscriber::EnvFilter;

/// Inspect H.264/H.265 parameter sets.
#[derive(Parser, Debug)]
#[command(name = "codecgate-probe", version, about)]
struct Cli {
    /// Gate configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON outcome.
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read an Annex B elementary stream and parse its first parameter sets.
    Stream {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = CodecArg::Auto)]
        codec: CodecArg,
    },
    /// Parse parameter sets given as hex (NAL header included, no start code).
    Sets {
        #[arg(long)]
        sps: String,

        #[arg(long)]
        pps: String,

        /// Selects H.265 when present.
        #[arg(long)]
        vps: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CodecArg {
    Auto,
    H264,
    H265,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Start loading before any input is read.
    let gate = ModuleGate::from_config(&config);

    let prepared = match &cli.command {
        Command::Stream { file, codec } => sets_from_stream(file, *codec).await?,
        Command::Sets { sps, pps, vps } => Ok(sets_from_hex(sps, pps, vps.as_deref())?),
    };
    let outcome = match prepared {
        Ok(sets) => gate.parse(sets).await,
        Err(e) => Err(CodecError::Parse(e)),
    };

    match &outcome {
        Ok(desc) => tracing::info!(
            codec = %desc.codec,
            width = desc.coded_width,
            height = desc.coded_height,
            record_len = desc.description.len(),
            "parameter sets parsed"
        ),
        Err(e) => tracing::warn!(error = %e, "parameter sets could not be parsed"),
    }

    let record = OutcomeRecord::from(outcome);
    let json = if cli.pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    println!("{json}");

    Ok(if record.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GateConfig> {
    let Some(path) = path else {
        return Ok(GateConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    GateConfig::from_toml_str(&text).map_err(anyhow::Error::msg)
}

/// Read `file` and collect its parameter sets. The outer error is I/O, the
/// inner one a stream that has no usable parameter sets.
async fn sets_from_stream(
    file: &Path,
    codec: CodecArg,
) -> anyhow::Result<Result<ParameterSets, ParseError>> {
    let stream = Bytes::from(
        tokio::fs::read(file)
            .await
            .with_context(|| format!("reading stream {}", file.display()))?,
    );

    let codec = match codec {
        CodecArg::H264 => Codec::H264,
        CodecArg::H265 => Codec::H265,
        CodecArg::Auto => match nal::detect_codec(&stream) {
            Some(codec) => codec,
            None => return Ok(Err(ParseError::Missing { unit: "SPS" })),
        },
    };

    let census = nal::census(&stream, codec);
    tracing::info!(
        file = %file.display(),
        %codec,
        bytes = stream.len(),
        units = census.units,
        parameter_sets = census.parameter_sets,
        keyframes = census.keyframes,
        slices = census.slices,
        "stream scanned"
    );

    Ok(nal::collect_parameter_sets(&stream, codec))
}

fn sets_from_hex(sps: &str, pps: &str, vps: Option<&str>) -> anyhow::Result<ParameterSets> {
    let sps = decode_hex("sps", sps)?;
    let pps = decode_hex("pps", pps)?;
    Ok(match vps {
        Some(vps) => ParameterSets::hevc(decode_hex("vps", vps)?, sps, pps),
        None => ParameterSets::avc(sps, pps),
    })
}

/// Accepts `0x` prefixes and any whitespace or `:` separators.
fn decode_hex(name: &str, input: &str) -> anyhow::Result<Vec<u8>> {
    let input = input.trim();
    let input = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).with_context(|| format!("--{name} is not valid hex"))
}
