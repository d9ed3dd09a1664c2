mod completion;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use visio_contracts::chat::{help_text, parse_intent, Intent};
use visio_contracts::config::Settings;
use visio_contracts::events::EventWriter;
use visio_contracts::models::{AspectRatio, HistoryItem, ImageRef, UploadedImage};
use visio_contracts::preview::ImagePreview;
use visio_contracts::store::{FileStorage, KeyValueStorage, MemoryStorage, PersistentStore};
use visio_contracts::suggest::{suggestions, SUGGESTION_KEYWORDS};
use visio_engine::{
    GenerationFailure, ImageGenerationClient, ImageGenerator, SessionController, SubmitOutcome,
    SubmitRejected, ValidationError, UNEXPECTED_ERROR_FALLBACK,
};

use crate::completion::PromptHelper;

#[derive(Debug, Parser)]
#[command(name = "visio", version, about = "Prompt-driven image generation with quota and history")]
struct Cli {
    /// Directory holding state.json (overrides config and VISIO_STATE_DIR).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Path to a visio.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Render placeholder images locally instead of calling the API.
    #[arg(long, global = true)]
    dryrun: bool,
    /// Append session events as JSONL to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Keep quota and history in memory only; nothing is written to disk.
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive prompt session (default).
    Chat,
    /// Generate once and exit.
    Generate(GenerateArgs),
    /// List past generations, most recent first.
    History,
    /// Show the current plan and remaining generations.
    Quota,
    /// Redeem a coupon code.
    Coupon(CouponArgs),
    /// Save a gallery image to disk.
    Download(DownloadArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    images: u8,
    #[arg(long, default_value = "1:1")]
    aspect: AspectRatio,
    /// Source image to edit instead of generating from scratch.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Directory to save the generated images into.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CouponArgs {
    code: String,
}

#[derive(Debug, Parser)]
struct DownloadArgs {
    /// 1-based gallery position, newest first.
    index: usize,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

enum ChatFlow {
    Continue,
    Quit,
}

const PROGRESS_TICK: Duration = Duration::from_millis(250);
const PROGRESS_DOT_EVERY: u32 = 4;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("visio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    tracing::debug!(
        state = %settings.state_path().display(),
        dryrun = settings.dryrun,
        ephemeral = cli.ephemeral,
        "settings resolved"
    );
    let command = cli.command.unwrap_or(Command::Chat);
    let events = cli.events.as_deref();

    if cli.ephemeral {
        let store = PersistentStore::new(MemoryStorage::new());
        dispatch(command, &settings, with_events(SessionController::load(store), events))
    } else {
        dispatch(command, &settings, open_session(&settings, events))
    }
}

fn dispatch<S: KeyValueStorage>(
    command: Command,
    settings: &Settings,
    mut session: SessionController<S>,
) -> Result<i32> {
    match command {
        Command::Chat => {
            let client = ImageGenerationClient::from_settings(settings);
            run_chat(&mut session, &client)?;
            Ok(0)
        }
        Command::Generate(args) => {
            let client = ImageGenerationClient::from_settings(settings);
            run_generate(&mut session, &client, &args)
        }
        Command::History => {
            print_history(session.history());
            Ok(0)
        }
        Command::Quota => {
            print_quota(&session);
            Ok(0)
        }
        Command::Coupon(args) => match session.redeem_coupon(&args.code) {
            Ok(_) => {
                println!("Coupon applied. {}", session.quota().status_line());
                Ok(0)
            }
            Err(err) => {
                println!("{err}");
                Ok(1)
            }
        },
        Command::Download(args) => {
            let path = download_gallery_image(&session, args.index, &args.out)?;
            println!("Saved {}", path.display());
            Ok(0)
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.state_dir.as_ref() {
        settings.state_dir = dir.clone();
    }
    if cli.dryrun {
        settings.dryrun = true;
    }
    Ok(settings)
}

fn open_session(settings: &Settings, events: Option<&Path>) -> SessionController<FileStorage> {
    let store = PersistentStore::new(FileStorage::new(settings.state_path()));
    with_events(SessionController::load(store), events)
}

fn with_events<S: KeyValueStorage>(
    session: SessionController<S>,
    events: Option<&Path>,
) -> SessionController<S> {
    match events {
        Some(path) => session.with_events(EventWriter::new(path, Uuid::new_v4().to_string())),
        None => session,
    }
}

fn run_generate<S: KeyValueStorage>(
    session: &mut SessionController<S>,
    generator: &dyn ImageGenerator,
    args: &GenerateArgs,
) -> Result<i32> {
    session.set_prompt(&args.prompt);
    session.set_image_count(args.images);
    session.set_aspect_ratio(args.aspect);
    if let Some(path) = args.image.as_deref() {
        session.attach_image(UploadedImage::from_path(path)?);
    }

    match generate_with_progress(session, generator) {
        SubmitOutcome::Succeeded(item) => {
            print_generated(&item);
            if let Some(dir) = args.out.as_deref() {
                for image in &item.images {
                    let path = ImagePreview::open(image)?.download(dir)?;
                    println!("Saved {}", path.display());
                }
            }
            Ok(0)
        }
        SubmitOutcome::Failed(message) => {
            eprintln!("{message}");
            Ok(1)
        }
        SubmitOutcome::Rejected(rejected) => {
            eprintln!("{rejected}");
            Ok(2)
        }
    }
}

fn generate_with_progress<S: KeyValueStorage>(
    session: &mut SessionController<S>,
    generator: &dyn ImageGenerator,
) -> SubmitOutcome {
    let prompt = session.prompt().to_string();
    let config = *session.config();
    let image = session.uploaded_image().cloned();
    let pending = match session.begin(&prompt, config, image) {
        Ok(pending) => pending,
        Err(rejected) => return SubmitOutcome::Rejected(rejected),
    };

    print!("Generating your masterpiece... please wait.");
    let _ = io::stdout().flush();
    let outcome = thread::scope(|scope| {
        let worker = scope.spawn(|| pending.run(generator));
        let mut ticks = 0u32;
        while !worker.is_finished() {
            thread::sleep(PROGRESS_TICK);
            ticks += 1;
            if ticks % PROGRESS_DOT_EVERY == 0 {
                print!(".");
                let _ = io::stdout().flush();
            }
        }
        worker
            .join()
            .unwrap_or_else(|_| Err(GenerationFailure::new(UNEXPECTED_ERROR_FALLBACK)))
    });
    println!();
    session.finish(pending, outcome)
}

fn run_chat<S: KeyValueStorage>(
    session: &mut SessionController<S>,
    generator: &dyn ImageGenerator,
) -> Result<()> {
    let mut editor: Editor<PromptHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(PromptHelper));

    println!("visio chat started. Type /help for commands, Tab to complete keywords.");
    print_quota(session);

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("Type /quit to exit.");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let intent = parse_intent(&line);
        if intent == Intent::Noop {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());
        if let ChatFlow::Quit = handle_intent(session, generator, intent) {
            break;
        }
    }
    Ok(())
}

fn handle_intent<S: KeyValueStorage>(
    session: &mut SessionController<S>,
    generator: &dyn ImageGenerator,
    intent: Intent,
) -> ChatFlow {
    match intent {
        Intent::Noop => {}
        Intent::Generate { prompt } => {
            session.set_prompt(&prompt);
            match generate_with_progress(session, generator) {
                SubmitOutcome::Succeeded(item) => {
                    print_generated(&item);
                    println!("{}", session.quota().status_line());
                }
                SubmitOutcome::Failed(message) => println!("{message}"),
                SubmitOutcome::Rejected(rejected) => {
                    let message = rejection_message(&rejected);
                    if !message.is_empty() {
                        println!("{message}");
                    }
                }
            }
        }
        Intent::SetImageCount(count) => {
            session.set_image_count(count);
            println!("Images per prompt: {}", session.config().number_of_images);
            if session.uploaded_image().is_some() {
                println!("An image is attached; edits always return one image.");
            }
        }
        Intent::SetAspectRatio(ratio) => {
            session.set_aspect_ratio(ratio);
            println!("Aspect ratio: {ratio}");
        }
        Intent::Attach(path) => match UploadedImage::from_path(&path) {
            Ok(image) => {
                println!(
                    "Attached {} ({}). Your next prompt edits this image.",
                    path.display(),
                    image.mime_type
                );
                session.attach_image(image);
            }
            Err(err) => println!("Attach failed: {err:#}"),
        },
        Intent::Detach => match session.detach_image() {
            Some(_) => println!("Removed the attached image."),
            None => println!("No image attached."),
        },
        Intent::Coupon(code) => match session.redeem_coupon(&code) {
            Ok(_) => println!("Coupon applied. {}", session.quota().status_line()),
            Err(err) => println!("{err}"),
        },
        Intent::Quota => print_quota(session),
        Intent::History => print_history(session.history()),
        Intent::SelectHistory(position) => {
            let restored = session
                .select_history_item(position - 1)
                .map(|item| item.prompt.clone());
            match restored {
                Some(prompt) => {
                    println!("Restored prompt: {prompt}");
                    if let Some(image) = session.uploaded_image() {
                        println!("Restored source image ({}).", image.mime_type);
                    }
                }
                None => println!("No history item {position}."),
            }
        }
        Intent::Gallery => print_gallery(&session.gallery()),
        Intent::Preview(position) => match gallery_image(session, position).and_then(ImagePreview::open) {
            Ok(preview) => println!("#{position}: {}", preview.describe()),
            Err(err) => println!("Preview failed: {err:#}"),
        },
        Intent::Download { index, dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            match download_gallery_image(session, index, &dir) {
                Ok(path) => println!("Saved {}", path.display()),
                Err(err) => println!("Download failed: {err:#}"),
            }
        }
        Intent::Suggest(text) => {
            let found = suggestions(&text, SUGGESTION_KEYWORDS);
            if found.is_empty() {
                println!("No suggestions.");
            } else {
                println!("Suggestions: {}", found.join(", "));
            }
        }
        Intent::Help => print!("{}", help_text()),
        Intent::Quit => return ChatFlow::Quit,
        Intent::Invalid { command, message } => println!("/{command}: {message}"),
        Intent::Unknown { command } => {
            println!("Unknown command /{command}. Type /help for commands.")
        }
    }
    ChatFlow::Continue
}

fn rejection_message(rejected: &SubmitRejected) -> String {
    match rejected {
        SubmitRejected::Invalid(ValidationError::EmptyPrompt) => String::new(),
        other => other.to_string(),
    }
}

fn print_generated(item: &HistoryItem) {
    println!("Generated {} image(s) for \"{}\":", item.images.len(), item.prompt);
    for (idx, image) in item.images.iter().enumerate() {
        println!("  #{} {}", idx + 1, describe_image(image));
    }
    println!("Use /preview N or /download N [DIR] to view or save them.");
}

fn print_quota<S: KeyValueStorage>(session: &SessionController<S>) {
    println!("{}", session.quota().status_line());
    if session.quota().is_exhausted() {
        println!("{}", session.quota().limit_reached_message());
    }
}

fn print_history(history: &[HistoryItem]) {
    if history.is_empty() {
        println!("No history yet.");
        return;
    }
    for (idx, item) in history.iter().enumerate() {
        let edit = if item.source_image.is_some() { ", edit" } else { "" };
        println!(
            "{:>3}. {} ({} image(s), {}{edit})",
            idx + 1,
            item.prompt,
            item.images.len(),
            item.config.aspect_ratio
        );
    }
}

fn print_gallery(images: &[&ImageRef]) {
    if images.is_empty() {
        println!("Your gallery is empty.");
        return;
    }
    for (idx, image) in images.iter().enumerate() {
        println!("{:>3}. {}", idx + 1, describe_image(image));
    }
}

fn describe_image(image: &ImageRef) -> String {
    ImagePreview::open(image)
        .map(|preview| preview.describe())
        .unwrap_or_else(|_| "unreadable image".to_string())
}

fn gallery_image<'a, S: KeyValueStorage>(
    session: &'a SessionController<S>,
    position: usize,
) -> Result<&'a ImageRef> {
    let gallery = session.gallery();
    let Some(image) = position.checked_sub(1).and_then(|idx| gallery.get(idx).copied()) else {
        bail!("no gallery image {position} ({} available)", gallery.len());
    };
    Ok(image)
}

fn download_gallery_image<S: KeyValueStorage>(
    session: &SessionController<S>,
    position: usize,
    dir: &Path,
) -> Result<PathBuf> {
    ImagePreview::open(gallery_image(session, position)?)?.download(dir)
}
