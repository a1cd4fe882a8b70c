use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use narrator::voice::{CommandVoice, DevicePlayback, Engine};
use narrator::{
    Config, EventChannel, HttpBackend, Passage, PlaybackQueue, QueueEvent, QueueState,
    SettingsStore, Synthesize, SynthesisClient, UserSettings, passages_from_text,
};

/// Speed change applied by `+` and `-`
const SPEED_STEP: f64 = 0.1;

/// Narrate - read text files aloud
#[derive(Parser)]
#[command(name = "narrate", version, about)]
struct Cli {
    /// Synthesis engine URL (overrides config)
    #[arg(long, env = "NARRATOR_BACKEND_URL")]
    backend_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read text files aloud, one chapter per file
    Read {
        /// Text files; passages are separated by blank lines
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Passage of the first chapter to start from (1-based)
        #[arg(long, default_value = "1")]
        start: usize,
        /// Speaker UUID, or `system:<name>` for a system voice
        #[arg(long)]
        speaker: Option<String>,
        /// Speech rate multiplier
        #[arg(long)]
        speed: Option<f64>,
    },
    /// List the synthesis engine's speakers
    Speakers {
        /// Bypass the cached list
        #[arg(long)]
        reload: bool,
    },
    /// Synthesize text into a WAV file
    Synth {
        /// Text to synthesize
        text: String,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
        /// Speaker UUID
        #[arg(long)]
        speaker: Option<String>,
        /// Speaker style
        #[arg(long)]
        style: Option<i64>,
    },
    /// Show or update persisted settings
    Settings {
        /// Speaker UUID, or `system:<name>` for a system voice
        #[arg(long)]
        speaker: Option<String>,
        /// Speaker style
        #[arg(long)]
        style: Option<i64>,
        /// Speech rate multiplier
        #[arg(long)]
        speed: Option<f64>,
        /// Volume multiplier
        #[arg(long)]
        volume: Option<f64>,
        /// Pitch offset
        #[arg(long, allow_hyphen_values = true)]
        pitch: Option<f64>,
        /// `g N` starts playing the passage it jumps to
        #[arg(long)]
        click_to_seek: Option<bool>,
        /// Continue with the next file when a chapter ends
        #[arg(long)]
        auto_next_chapter: Option<bool>,
        /// Print the text of each passage as it starts
        #[arg(long)]
        auto_scroll: Option<bool>,
    },
}

/// Toggle updates from `narrate settings`
struct Toggles {
    click_to_seek: Option<bool>,
    auto_next_chapter: Option<bool>,
    auto_scroll: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,narrator=info",
        1 => "info,narrator=debug",
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
    let mut config = Config::load()?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Read {
            files,
            start,
            speaker,
            speed,
        } => cmd_read(&config, &files, start, speaker, speed).await,
        Command::Speakers { reload } => cmd_speakers(&config, reload).await,
        Command::Synth {
            text,
            output,
            speaker,
            style,
        } => cmd_synth(&config, &text, &output, speaker, style).await,
        Command::Settings {
            speaker,
            style,
            speed,
            volume,
            pitch,
            click_to_seek,
            auto_next_chapter,
            auto_scroll,
        } => cmd_settings(
            &config,
            speaker,
            style,
            speed,
            volume,
            pitch,
            &Toggles {
                click_to_seek,
                auto_next_chapter,
                auto_scroll,
            },
        ),
    }
}

/// Passages of one chapter file
fn read_chapter(file: &Path) -> anyhow::Result<Vec<Passage>> {
    let text = std::fs::read_to_string(file)?;
    let passages = passages_from_text(&text);
    if passages.is_empty() {
        anyhow::bail!("nothing to read in {}", file.display());
    }
    Ok(passages)
}

/// Narrate chapter files in order, taking playback commands from stdin
async fn cmd_read(
    config: &Config,
    files: &[PathBuf],
    start: usize,
    speaker: Option<String>,
    speed: Option<f64>,
) -> anyhow::Result<()> {
    let mut chapters = files.iter();
    let Some(first) = chapters.next() else {
        anyhow::bail!("no file to read");
    };
    let passages = read_chapter(first)?;
    let mut total = passages.len();

    let store = SettingsStore::new(&config.settings_path);
    let mut settings = store.load();
    if let Some(speaker) = speaker {
        settings.voice.speaker_uuid = speaker;
    }
    if let Some(speed) = speed {
        settings.voice.speed_scale = speed;
    }

    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);
    let synthesizer = Arc::new(SynthesisClient::new(backend, config.max_chunk_chars));
    let sink = Arc::new(DevicePlayback::new()?);
    let (events, mut rx) = EventChannel::new();

    let mut builder = PlaybackQueue::builder(synthesizer, sink)
        .observer(Arc::new(events))
        .config(config.queue.clone());
    match CommandVoice::detect() {
        Ok(voice) => builder = builder.system_voice(Arc::new(voice)),
        Err(e) => tracing::debug!(error = %e, "no system voice available"),
    }
    let queue = builder.build();

    queue.load(passages, settings.voice.clone());
    if start > 1 {
        queue.seek_to(start - 1);
    }
    spawn_play(&queue);

    println!("Reading {} ({total} passages)", first.display());
    println!("Commands: p pause, r resume or play, n next, b back, g N go to, s stop, +/- speed, q quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                if !report(&event, total, &settings) {
                    continue;
                }
                let next = if settings.auto_next_chapter { chapters.next() } else { None };
                let Some(file) = next else {
                    println!("finished");
                    break;
                };
                let passages = read_chapter(file)?;
                total = passages.len();
                println!("Reading {} ({total} passages)", file.display());
                queue.load(passages, settings.voice.clone());
                spawn_play(&queue);
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !handle_command(line.trim(), &queue, &store, &mut settings) {
                        queue.stop();
                        break;
                    }
                }
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                queue.stop();
                break;
            }
        }
    }

    Ok(())
}

fn spawn_play(queue: &PlaybackQueue) {
    let queue = queue.clone();
    tokio::spawn(async move { queue.play().await });
}

/// Apply one stdin command; `false` means quit
fn handle_command(
    line: &str,
    queue: &PlaybackQueue,
    store: &SettingsStore,
    settings: &mut UserSettings,
) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("p") => queue.pause(),
        Some("r") if queue.state() == QueueState::Idle => spawn_play(queue),
        Some("r") => queue.resume(),
        Some("s") => queue.stop(),
        Some("n") => {
            queue.seek_to(queue.index() + 1);
            spawn_play(queue);
        }
        Some("b") => {
            queue.seek_to(queue.index().saturating_sub(1));
            spawn_play(queue);
        }
        Some("g") => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n >= 1 => {
                queue.seek_to(n - 1);
                if settings.click_to_seek {
                    spawn_play(queue);
                } else {
                    println!("at passage {}, r to play", queue.index() + 1);
                }
            }
            _ => println!("usage: g <passage number>"),
        },
        Some(sign @ ("+" | "-")) => {
            let delta = if sign == "+" { SPEED_STEP } else { -SPEED_STEP };
            settings.voice.speed_scale = (settings.voice.speed_scale + delta).clamp(0.5, 2.0);
            println!("speed {:.1}", settings.voice.speed_scale);
            if let Err(e) = store.save(settings) {
                tracing::warn!(error = %e, "failed to save settings");
            }
            queue.update_params(settings.voice.clone());
        }
        Some("q") => return false,
        Some(other) => println!("unknown command: {other}"),
        None => {}
    }
    true
}

/// Print a queue event; `true` once the chapter is over
fn report(event: &QueueEvent, total: usize, settings: &UserSettings) -> bool {
    match event {
        QueueEvent::PassageStarted(passage) if settings.auto_scroll => {
            println!("[{}/{total}] {}", passage.index + 1, preview(passage));
        }
        QueueEvent::PassageStarted(passage) => println!("[{}/{total}]", passage.index + 1),
        QueueEvent::EntryError { passage, message } => {
            eprintln!("passage {} failed: {message}", passage.index + 1);
        }
        QueueEvent::StateChanged(QueueState::Paused) => println!("paused"),
        QueueEvent::QueueEnded => return true,
        QueueEvent::PassageEnded(_) | QueueEvent::StateChanged(_) => {}
    }
    false
}

fn preview(passage: &Passage) -> String {
    const PREVIEW_CHARS: usize = 60;

    let first_line = passage.text.lines().next().unwrap_or_default();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}

/// List speakers and their styles
async fn cmd_speakers(config: &Config, reload: bool) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend_url)?;
    let speakers = if reload {
        backend.reload_speakers().await?
    } else {
        backend.speakers().await?
    };

    for speaker in &speakers {
        println!("{} ({})", speaker.speaker_name, speaker.speaker_uuid);
        for style in &speaker.styles {
            println!("  {:>4}  {}", style.style_id, style.style_name);
        }
    }

    match CommandVoice::detect() {
        Ok(_) => println!("system voice available (use --speaker system:<name>)"),
        Err(e) => tracing::debug!(error = %e, "no system voice available"),
    }

    Ok(())
}

/// Synthesize text to a WAV file
async fn cmd_synth(
    config: &Config,
    text: &str,
    output: &Path,
    speaker: Option<String>,
    style: Option<i64>,
) -> anyhow::Result<()> {
    let mut params = SettingsStore::new(&config.settings_path).load().voice;
    if let Some(speaker) = speaker {
        params.speaker_uuid = speaker;
    }
    if let Some(style) = style {
        params.style_id = style;
    }
    if params.engine() == Engine::SystemVoice {
        anyhow::bail!("system voices play directly and cannot be written to a file");
    }

    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);
    let client = SynthesisClient::new(backend, config.max_chunk_chars);
    let wav = client.synthesize(&params, text).await?;
    std::fs::write(output, &wav)?;

    println!("Wrote {} bytes to {}", wav.len(), output.display());
    Ok(())
}

/// Show or update persisted settings
fn cmd_settings(
    config: &Config,
    speaker: Option<String>,
    style: Option<i64>,
    speed: Option<f64>,
    volume: Option<f64>,
    pitch: Option<f64>,
    toggles: &Toggles,
) -> anyhow::Result<()> {
    let store = SettingsStore::new(&config.settings_path);
    let mut settings = store.load();
    let before = settings.clone();

    if let Some(speaker) = speaker {
        settings.voice.speaker_uuid = speaker;
    }
    if let Some(style) = style {
        settings.voice.style_id = style;
    }
    if let Some(speed) = speed {
        settings.voice.speed_scale = speed;
    }
    if let Some(volume) = volume {
        settings.voice.volume_scale = volume;
    }
    if let Some(pitch) = pitch {
        settings.voice.pitch_scale = pitch;
    }
    if let Some(on) = toggles.click_to_seek {
        settings.click_to_seek = on;
    }
    if let Some(on) = toggles.auto_next_chapter {
        settings.auto_next_chapter = on;
    }
    if let Some(on) = toggles.auto_scroll {
        settings.auto_scroll = on;
    }

    if settings != before {
        store.save(&settings)?;
        println!("Saved {}", store.path().display());
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
