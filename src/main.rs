use std::process::ExitCode;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use voice_agent::agent::ChatClient;
use voice_agent::conversation::{Collaborators, ConversationLoop, LoopSettings, stdin_lines};
use voice_agent::voice::{AudioCapture, AudioPlayback, SpeechToText, TextToSpeech, list_devices};
use voice_agent::{Config, Error};

/// Voice Agent - talk to an AI assistant through your microphone
#[derive(Parser)]
#[command(name = "voice-agent", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check the API key and list audio devices
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Command::Check) => check(),
        None => run().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log directives for a `-v` count
///
/// Dependencies stay at `warn` until `-vv` so their chatter does not
/// interleave with the conversation on the console.
const fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,voice_agent=info",
        1 => "warn,voice_agent=debug",
        2 => "debug",
        _ => "trace",
    }
}

#[allow(clippy::future_not_send)]
async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let http = reqwest::Client::builder()
        .timeout(config.api.request_timeout)
        .build()?;
    let key = config.api.key.expose_secret().to_string();

    let transcriber = SpeechToText::new(
        http.clone(),
        key.clone(),
        &config.api.base_url,
        config.models.transcription.clone(),
    )?;
    let responder = ChatClient::new(
        http.clone(),
        key.clone(),
        &config.api.base_url,
        config.models.chat.clone(),
        config.chat,
    )?;
    let synthesizer = TextToSpeech::new(
        http,
        key,
        &config.api.base_url,
        config.models.synthesis.clone(),
        config.voice.voice.clone(),
        config.voice.speed,
    )?;

    // Both devices are opened once and held for the whole session
    let capture = AudioCapture::new(&config.audio)?;
    let playback = AudioPlayback::new(config.voice.playback_sample_rate, config.audio.chunk_size)?;

    tracing::info!(
        chat_model = %config.models.chat,
        capture_rate = capture.sample_rate(),
        "voice agent ready"
    );

    let mut session = ConversationLoop::new(
        config.system_prompt.clone(),
        LoopSettings::from_config(&config),
        Collaborators {
            source: Box::new(capture),
            sink: Box::new(playback),
            transcriber: Box::new(transcriber),
            responder: Box::new(responder),
            synthesizer: Box::new(synthesizer),
        },
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = std::io::stdout();
    session.run(stdin_lines(), &mut stdout, shutdown).await;

    Ok(())
}

/// Report whether a conversation could start on this machine
fn check() -> anyhow::Result<()> {
    let credential = match Config::load() {
        Ok(config) => {
            println!("API key: present");
            println!("Endpoint: {}", config.api.base_url);
            true
        }
        Err(Error::Config(msg)) => {
            println!("Configuration: {msg}");
            false
        }
        Err(e) => return Err(e.into()),
    };

    let devices = list_devices()?;

    println!("\nInput devices:");
    for name in &devices.inputs {
        println!("  - {name}");
    }
    println!("Default input: {}", devices.default_input.as_deref().unwrap_or("(none)"));

    println!("\nOutput devices:");
    for name in &devices.outputs {
        println!("  - {name}");
    }
    println!("Default output: {}", devices.default_output.as_deref().unwrap_or("(none)"));

    if credential && devices.is_usable() {
        println!("\nReady to talk.");
        Ok(())
    } else {
        anyhow::bail!("voice agent is not ready to run")
    }
}
