use crate::assets;
use crate::config::{load_settings, Cli, Settings};
use crate::driver::{Flow, FrameDriver, FramePacer};
use crate::melody::Melody;
use crate::term::{self, Terminal};
use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use std::{fs::File, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

/// The terminal owns stdout, so tracing only goes to a file when asked.
fn init_tracing(path: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

pub(crate) fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let mut settings = cli.config.as_deref().map(load_settings).unwrap_or_default();
    cli.apply(&mut settings);
    let seed = settings.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, images = %settings.images.display(), "starting");

    // Nothing to show is fatal before the screen is taken over.
    assets::list_images(&settings.images)?;

    let (term_w, term_h) = term::pixel_size()?;
    let width = settings.canvas_width.unwrap_or(term_w);
    let height = settings.canvas_height.unwrap_or(term_h);
    let cfg = settings.choreography(width, height)?;
    tracing::info!(
        width = cfg.width,
        height = cfg.height,
        cols = cfg.cols,
        rows = cfg.rows,
        "canvas"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("melody")
        .enable_time()
        .build()
        .context("cannot start melody runtime")?;

    let terminal = Terminal::begin(cfg.width, cfg.height)?;
    let mut driver = FrameDriver::new(
        terminal,
        FramePacer::new(settings.frame_time()),
        StdRng::seed_from_u64(seed),
        cfg,
        settings.melody.then(|| runtime.handle().clone()),
    );

    let outcome = cycles(&mut driver, &settings, cli.once);
    let mut terminal = driver.into_canvas();
    terminal.end()?;
    runtime.shutdown_background();
    outcome
}

fn cycles(
    driver: &mut FrameDriver<Terminal, FramePacer, StdRng>,
    settings: &Settings,
    once: bool,
) -> anyhow::Result<()> {
    let cfg = *driver.choreography();
    loop {
        let path = assets::choose_image(&settings.images, driver.rng_mut())?;
        let loaded = assets::load_image(&path, cfg.cols, cfg.rows)?;
        tracing::info!(image = %loaded.path.display(), "next image");
        let melody = settings
            .melody
            .then(|| Melody::from_digest(loaded.digest, cfg.show_duration()));

        if driver.run_cycle(loaded.grid, melody)? == Flow::Quit || once {
            return Ok(());
        }
    }
}
