use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use avatar_speech::chat::{ChatSession, OpenAiChat};
use avatar_speech::config::SynthesisBackend;
use avatar_speech::speech::{
    ConsoleViewer, PlaybackSequencer, Screenplay, SpeakCallbacks, SpeechPipeline, Synthesizer,
    TextToSpeech, Viewer,
};
use avatar_speech::Config;

/// Avatar Speech - streaming speech playback for talking avatar assistants
#[derive(Parser)]
#[command(name = "avatar-speech", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Animate lines without synthesizing speech
    #[arg(long, global = true)]
    muted: bool,

    /// Synthesis backend (koeiromap, coqui)
    #[arg(long, global = true)]
    backend: Option<SynthesisBackend>,

    /// Synthesis endpoint or server root
    #[arg(long, global = true)]
    synth_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the avatar from the terminal (default)
    Chat,
    /// Speak a text sentence by sentence
    Say {
        /// Text to speak; `[emotion]` tags are honored
        text: String,
        /// Play this local audio file instead of calling the synthesis backend
        #[arg(long)]
        audio: Option<PathBuf>,
    },
    /// Speak the welcome line
    Intro,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Write the synthesized audio to this file instead of playing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,avatar_speech=info",
        1 => "info,avatar_speech=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(config).await,
        Command::Say { text, audio } => say(config, &text, audio).await,
        Command::Intro => intro(config).await,
        Command::TestTts { text, output } => test_tts(&config, &text, output).await,
    }
}

/// Load config and apply CLI overrides (flags > env > toml > default)
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load()?;

    if let Some(backend) = cli.backend
        && backend != config.synthesis.backend
    {
        // Follow the backend's default endpoint unless one was chosen explicitly
        if config.synthesis.url == config.synthesis.backend.default_url() {
            config.synthesis.url = backend.default_url().to_string();
        }
        config.synthesis.backend = backend;
    }
    if let Some(url) = &cli.synth_url {
        config.synthesis.url.clone_from(url);
    }
    if cli.muted {
        config.muted = true;
    }

    tracing::debug!(
        backend = %config.synthesis.backend,
        url = %config.synthesis.url,
        muted = config.muted,
        "configuration loaded"
    );

    Ok(config)
}

fn build_viewer(config: &Config) -> Box<dyn Viewer> {
    #[cfg(feature = "speaker")]
    match avatar_speech::speech::SpeakerViewer::new(config.pipeline.chars_per_second) {
        Ok(viewer) => return Box::new(viewer),
        Err(e) => tracing::warn!(error = %e, "audio output unavailable, printing lines instead"),
    }

    Box::new(ConsoleViewer::new(config.pipeline.chars_per_second))
}

fn build_pipeline(config: &Config) -> anyhow::Result<SpeechPipeline> {
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(TextToSpeech::from_config(&config.synthesis)?);
    let sequencer = PlaybackSequencer::from_boxed(build_viewer(config));

    let mut pipeline =
        SpeechPipeline::with_sequencer(synthesizer, sequencer, config.pipeline.scheduler());
    pipeline.set_muted(config.muted);
    Ok(pipeline)
}

async fn chat(config: Config) -> anyhow::Result<()> {
    let backend = Arc::new(OpenAiChat::from_config(&config.chat)?);
    let pipeline = build_pipeline(&config)?;

    tracing::info!(
        model = backend.model(),
        url = %config.chat.url,
        backend = %config.synthesis.backend,
        "starting chat"
    );

    let mut session = ChatSession::new(
        backend,
        pipeline,
        config.chat.system_prompt.clone(),
        config.voice,
    );
    session.introduce().await?;
    session.idle().await;

    println!("Type a message (/mute, /unmute, /reset, /quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.log_mut().reset();
                println!("Chat log cleared");
                continue;
            }
            "/mute" => {
                session.pipeline_mut().set_muted(true);
                continue;
            }
            "/unmute" => {
                session.pipeline_mut().set_muted(false);
                continue;
            }
            _ => {}
        }

        if let Err(e) = session.send(line).await {
            tracing::error!(error = %e, "chat turn failed");
        }
        session.idle().await;
    }

    session.shutdown().await;
    Ok(())
}

async fn say(config: Config, text: &str, audio: Option<PathBuf>) -> anyhow::Result<()> {
    let mut pipeline = build_pipeline(&config)?;

    match audio {
        Some(path) => {
            let screenplay = Screenplay::from_text(text, config.voice);
            pipeline
                .speak_local(path, screenplay, SpeakCallbacks::none())
                .await?;
        }
        None => {
            let lines = pipeline.speak_text(text, config.voice).await?;
            tracing::info!(lines, "text queued");
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

async fn intro(config: Config) -> anyhow::Result<()> {
    let mut pipeline = build_pipeline(&config)?;
    let screenplay = Screenplay::from_text(avatar_speech::chat::INTRODUCTION, config.voice);
    pipeline.speak(screenplay, SpeakCallbacks::none()).await?;
    pipeline.shutdown().await;
    Ok(())
}

async fn test_tts(config: &Config, text: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.synthesis)?;
    let screenplay = Screenplay::from_text(text, config.voice);
    let talk = screenplay.talk();

    println!(
        "Synthesizing speech via {} at {} (style {}, expression {})...",
        tts.name(),
        tts.endpoint(),
        talk.style,
        screenplay.expression(),
    );
    let audio = tts.synthesize(talk).await?;
    println!("Got {} bytes of {:?} audio", audio.len(), audio.format());

    if let Some(path) = output {
        tokio::fs::write(&path, audio.as_bytes()).await?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    println!("Playing audio...");
    let sequencer = PlaybackSequencer::from_boxed(build_viewer(config));
    sequencer.play(Some(&audio), &screenplay).await;

    println!("Done!");
    Ok(())
}
