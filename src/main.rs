use std::fs::File;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, enable_raw_mode},
};
use log::{LevelFilter, error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config as LogConfig, WriteLogger};

use nuber::config::Config;
use nuber::epub_provider::EpubProvider;
use nuber::event_source::KeyboardEventSource;
use nuber::overlay::compositor;
use nuber::panic_handler::{self, TerminalGuard};
use nuber::paths;
use nuber::reader_session::{ReaderSession, SessionContext};
use nuber::session_store::SessionStore;

/// Terminal EPUB reader
#[derive(Debug, Parser)]
#[command(name = "nuber", version, about)]
struct Args {
    /// EPUB file to open
    book: PathBuf,

    /// Read config.toml from this directory
    #[arg(short = 'c', long)]
    config_dir: Option<PathBuf>,
}

fn init_logging() {
    let file = paths::resolve_log_path().and_then(|path| {
        File::create(&path).with_context(|| format!("Failed to create log file {path:?}"))
    });
    match file {
        Ok(file) => {
            if let Err(e) = WriteLogger::init(LevelFilter::Debug, LogConfig::default(), file) {
                eprintln!("Logging disabled: {e}");
            }
        }
        Err(e) => eprintln!("Logging disabled: {e:#}"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    panic_handler::initialize_panic_handler();

    info!("Starting nuber");

    let book_path = args
        .book
        .canonicalize()
        .with_context(|| format!("Cannot open {:?}", args.book))?;

    let config = Config::load(args.config_dir.as_deref());
    let store = SessionStore::new(paths::state_file(config.cache_dir.as_deref())?);
    let book = EpubProvider::open(&book_path)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            warn!("Failed to install signal handler: {e}");
        }
    }

    enable_raw_mode()?;
    let _guard = TerminalGuard;
    execute!(stdout(), EnterAlternateScreen)?;

    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut ctx = SessionContext::new(terminal, compositor::spawn_default());

    let result = ReaderSession::new(
        Box::new(book),
        &book_path,
        store,
        config.keymaps(),
        ctx.size()?,
    )
    .map(|session| session.with_shutdown_flag(shutdown))
    .and_then(|mut session| session.run(&mut ctx, &mut KeyboardEventSource));

    if let Err(e) = &result {
        error!("Session failed: {e:?}");
    }
    info!("Shutting down nuber");
    result
}
