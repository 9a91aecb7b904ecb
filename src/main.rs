use std::fs::File;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, enable_raw_mode},
};
use log::{error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use docview::decode::default_decoder;
use docview::event_source::KeyboardEventSource;
use docview::panic_handler::{initialize_panic_handler, restore_terminal};
use docview::settings::{InitialZoom, Notice, ZoomKeyword, load_settings_deferred};
use docview::source::{ByteSource, DocumentId, FileByteSource, HttpByteSource};
use docview::{App, Viewer, run_app};

#[derive(Parser, Debug)]
#[command(name = "docview", version, about = "Terminal document viewer")]
struct Cli {
    /// Document id to fetch from the document service
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    document: Option<String>,

    /// Open a local file instead of fetching
    #[arg(long)]
    file: Option<PathBuf>,

    /// Document service base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Value sent in the X-Api-Key header
    #[arg(long)]
    api_key: Option<String>,

    /// Page to open at (1-based)
    #[arg(long)]
    page: Option<usize>,

    /// Initial zoom factor (1.0 = 100%)
    #[arg(long, conflicts_with = "fit_width")]
    zoom: Option<f32>,

    /// Start in fit-to-width mode
    #[arg(long)]
    fit_width: bool,

    /// Settings file (default: <config dir>/docview/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut settings, notices) = load_settings_deferred(cli.config.as_deref());
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    let (level, level_notice): (LevelFilter, _) = settings.resolve_log_level();
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&settings.log_file)
            .with_context(|| format!("cannot create log file {:?}", settings.log_file))?,
    )?;
    notices.iter().chain(level_notice.as_ref()).for_each(Notice::emit);

    settings.apply_env_overrides(|name| std::env::var(name).ok());
    if let Some(base) = cli.api_base {
        settings.api_base = base;
    }
    if let Some(key) = cli.api_key {
        settings.api_key = Some(key);
    }
    if let Some(zoom) = cli.zoom {
        settings.initial_zoom = InitialZoom::Scale(zoom);
    }
    if cli.fit_width {
        settings.initial_zoom = InitialZoom::Mode(ZoomKeyword::FitWidth);
    }

    info!("Starting docview {}", env!("CARGO_PKG_VERSION"));

    let (source, document): (Arc<dyn ByteSource>, DocumentId) = match (cli.file, cli.document) {
        (Some(path), _) => (
            Arc::new(FileByteSource::new()),
            DocumentId::new(path.to_string_lossy()),
        ),
        (None, Some(id)) => {
            info!("Using document service at {}", settings.api_base);
            (
                Arc::new(HttpByteSource::new(
                    settings.api_base.clone(),
                    settings.api_key.clone(),
                )),
                DocumentId::new(id),
            )
        }
        (None, None) => anyhow::bail!("no document given"),
    };

    let mut options = settings.viewer_options();
    options.start_page = cli.page;
    let mut viewer = Viewer::new(default_decoder(), options);
    viewer.open(source, document);

    initialize_panic_handler();
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(viewer);
    let res = run_app(&mut terminal, &mut app, &mut KeyboardEventSource);

    app.viewer_mut().teardown();
    restore_terminal();

    if let Err(err) = res {
        error!("Application error: {err:?}");
        println!("{err:?}");
    }

    info!("Shutting down docview");
    Ok(())
}
