use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_relay::voice::{self, ContainerFormat, decode_to_target_pcm, wrap_pcm_as_wav};
use beacon_relay::{ApiServerBuilder, Config, DebugRecorder, OutcomeStatus, Pipeline, ServiceInfo};

/// Beacon Relay - voice relay between small devices and AI providers
#[derive(Parser)]
#[command(name = "beacon-relay", version, about)]
struct Cli {
    /// Persona file (.json or .toml); omit for the built-in persona
    #[arg(short, long, env = "BEACON_PERSONA")]
    persona: Option<PathBuf>,

    /// Port to listen on (overrides `BEACON_PORT`)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the device endpoint (default)
    Serve,
    /// Speak a reply to typed text and save the device PCM
    Say {
        /// What the user said
        text: String,
        /// Output file; a `.wav` extension writes a WAV container
        #[arg(short, long, default_value = "reply.pcm")]
        output: PathBuf,
    },
    /// Transcribe a WAV file
    Transcribe {
        /// WAV file to transcribe
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_relay=info",
        1 => "info,beacon_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.persona.as_deref())?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Say { text, output } => say(&config, &text, &output).await,
        Command::Transcribe { path } => transcribe(&config, &path).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let recorder = DebugRecorder::from_config(&config.debug);
    if let Some(recorder) = &recorder {
        tracing::info!(dir = %recorder.dir().display(), "debug audio enabled");
    }

    tracing::info!(
        persona = %config.persona.id(),
        port = config.api_server.port,
        "starting beacon relay"
    );

    ApiServerBuilder::new(pipeline, ServiceInfo::from_config(config))
        .server_config(&config.api_server)
        .debug_recorder(recorder)
        .build()
        .run()
        .await?;

    Ok(())
}

async fn say(config: &Config, text: &str, output: &Path) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let outcome = pipeline.respond_to_text(text).await?;

    if let Some(spoken) = &outcome.trace.spoken {
        println!("Reply: {spoken}");
    }

    let audio = match (outcome.status, outcome.audio) {
        (OutcomeStatus::Failed, _) | (_, None) => {
            let reason = outcome.trace.error.unwrap_or_else(|| "no audio produced".to_string());
            anyhow::bail!("speech synthesis failed: {reason}");
        }
        (status, Some(audio)) => {
            if status != OutcomeStatus::Ok {
                println!("Status: {status}");
            }
            audio
        }
    };

    let bytes = if output.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wav")) {
        wrap_pcm_as_wav(&audio)
    } else {
        audio.as_bytes().to_vec()
    };
    std::fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Wrote {} ms of audio to {}",
        audio.duration_ms(),
        output.display()
    );
    Ok(())
}

async fn transcribe(config: &Config, path: &Path) -> anyhow::Result<()> {
    let wav = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let audio = decode_to_target_pcm(&wav, ContainerFormat::Wav)?;

    let stt = voice::stt::from_config(config)?;
    let result = stt.transcribe(&audio).await;

    match result.text() {
        Some(text) => println!("{text}"),
        None => println!("(no speech recognized)"),
    }
    Ok(())
}
