use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use lectern::panic_handler;
use lectern::pdf::{
    Decoder, DirectorySink, DocumentLoader, HttpFetcher, NullObserver, PageRenderer, RenderScale,
};
use lectern::settings::Settings;

#[derive(Parser)]
#[command(
    name = "lectern",
    version,
    about = "Fetch a PDF and render every page to a watermarked PNG"
)]
struct Cli {
    /// Document URL, absolute or relative to --base-url
    url: String,

    /// Output directory for page-NNN.png and manifest.json
    #[arg(short, long, default_value = "pages")]
    out: PathBuf,

    /// Render scale (0.5 - 5.0); chosen from the viewport width when omitted
    #[arg(long)]
    scale: Option<f32>,

    /// Viewport width used to pick the initial scale
    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    /// Origin of the hosting page, used for the proxy and relative URLs
    #[arg(long)]
    base_url: Option<String>,

    /// Settings file (defaults to <config dir>/lectern/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse()
        .map_err(|_| format!("unknown log level {raw:?}"))
}

fn init_logging(cli: &Cli) -> Result<()> {
    match &cli.log_file {
        Some(path) => WriteLogger::init(
            cli.log_level,
            Config::default(),
            File::create(path).with_context(|| format!("creating log file {}", path.display()))?,
        )?,
        None => TermLogger::init(
            cli.log_level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

#[cfg(feature = "pdf")]
fn decoder() -> Result<Box<dyn Decoder>> {
    Ok(Box::new(lectern::pdf::MupdfDecoder))
}

#[cfg(not(feature = "pdf"))]
fn decoder() -> Result<Box<dyn Decoder>> {
    anyhow::bail!("built without the `pdf` feature, no document decoder available")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    panic_handler::initialize_panic_handler();

    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if cli.base_url.is_some() {
        settings.base_url = cli.base_url.clone();
    }

    let fetcher = HttpFetcher::new().context("building HTTP client")?;
    let loader = DocumentLoader::new(settings.loader_config()?, Box::new(fetcher), decoder()?);

    let handle = loader.load(&cli.url)?;
    info!("opened {} ({} pages)", handle.origin(), handle.page_count());

    let scale = match cli.scale {
        Some(scale) => RenderScale::new(scale),
        None => settings.scale_policy().initial_scale(cli.viewport_width),
    };

    let mut sink = DirectorySink::create(&cli.out)
        .with_context(|| format!("creating output directory {}", cli.out.display()))?;
    let renderer = PageRenderer::new(settings.watermark.clone());
    let summary = renderer.render_all(&handle, scale, &mut sink, &mut NullObserver);
    handle.destroy();

    if let Some(error) = summary.error {
        anyhow::bail!(error);
    }
    let manifest = sink.finish()?;

    println!(
        "rendered {}/{} pages at {} into {}",
        summary.rendered,
        summary.page_count,
        summary.scale,
        cli.out.display()
    );
    if !summary.failed_pages.is_empty() {
        println!("failed pages: {:?}", summary.failed_pages);
    }
    info!("manifest written to {}", manifest.display());
    Ok(())
}
