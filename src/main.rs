use anyhow::{Context, Result};
use clap::Parser;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use geochart::backend::FileBackend;
use geochart::chart::{ChartController, RenderOutcome};
use geochart::config::PageConfig;
use geochart::dispatch::ChartListener;
use geochart::page::{ChartPage, LoadOutcome, Page, Selector, SelectorPage};
use geochart::selection::ChartType;
use geochart::store::{FileStore, KeyValueStore, MemoryStore};
use geochart::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "geochart")]
#[command(about = "Chart the properties of a GeoJSON feature collection", long_about = None)]
struct Args {
    /// GeoJSON file (plain or double-encoded JSON)
    #[arg(long)]
    data: PathBuf,

    /// Attribute to chart (X axis for bar charts)
    #[arg(long)]
    key: Option<String>,

    /// Numeric attribute for the bar chart Y axis
    #[arg(long)]
    y: Option<String>,

    /// Chart type: doughnut or bar
    #[arg(long)]
    chart: Option<String>,

    /// JSON file holding the persisted selection; in-memory when omitted
    #[arg(long)]
    store: Option<PathBuf>,

    /// Directory charts are written to
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Output format: png, svg or json
    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// URL query of the page, e.g. "?file_id=3"
    #[arg(long, default_value = "")]
    query: String,

    /// Canvas id to draw on
    #[arg(long)]
    target: Option<String>,

    /// Show percentages in doughnut tooltips and legend
    #[arg(long)]
    percentages: bool,

    /// Treat empty strings, zero and false as missing values
    #[arg(long)]
    falsy_missing: bool,

    /// Layer ids offered by the layer selector (comma separated)
    #[arg(long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Switch to another layer
    #[arg(long)]
    layer: Option<String>,

    /// Drive both canvases from the broadcast attribute selector
    #[arg(long)]
    broadcast: bool,

    /// Page configuration (element ids, storage keys, renderer options)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let payload = fs::read_to_string(&args.data)
        .with_context(|| format!("Failed to read {}", args.data.display()))?;
    let page = build_page(&args, &config, payload);

    let store: Box<dyn KeyValueStore> = match &args.store {
        Some(path) => Box::new(FileStore::open(path)),
        None => Box::new(MemoryStore::new()),
    };

    if args.broadcast {
        run_broadcast(&args, config, page, store)
    } else {
        run_direct(&args, config, page, store)
    }
}

/// Config file first, then command-line overrides.
fn load_config(args: &Args) -> Result<PageConfig> {
    let mut config = match &args.config {
        Some(path) => PageConfig::load(path)?,
        None => PageConfig::default(),
    };

    if let Some(target) = &args.target {
        config.elements.canvas = target.clone();
    }
    if let Some(format) = &args.format {
        config.render.format = format.parse::<OutputFormat>()?;
    }
    if let Some(width) = args.width {
        config.render.width = width;
    }
    if let Some(height) = args.height {
        config.render.height = height;
    }
    config.renderer.percentages |= args.percentages;
    config.renderer.falsy_as_missing |= args.falsy_missing;
    Ok(config)
}

fn build_page(args: &Args, config: &PageConfig, payload: String) -> Page {
    let ids = &config.elements;
    let mut page = Page::new()
        .with_query(args.query.clone())
        .with_data(&ids.data, payload)
        .with_select(&ids.key_selector, Selector::new())
        .with_canvas(&ids.canvas)
        .with_placeholder(&ids.placeholder);

    if args.broadcast {
        page = page.with_canvas(&ids.secondary_canvas);
    } else {
        page = page
            .with_select(&ids.y_selector, Selector::new())
            .with_select(&ids.chart_type_selector, Selector::new());
    }
    if !args.layers.is_empty() {
        page = page.with_select(&ids.layer_selector, Selector::with_options(args.layers.clone()));
    }
    page
}

fn controller(args: &Args, config: &PageConfig) -> ChartController<FileBackend> {
    ChartController::new(
        FileBackend::new(&args.out, config.render.clone()),
        config.renderer.clone(),
    )
}

fn run_direct(
    args: &Args,
    config: PageConfig,
    page: Page,
    store: Box<dyn KeyValueStore>,
) -> Result<()> {
    let canvas = config.elements.canvas.clone();
    let controller = controller(args, &config);
    let mut chart_page = ChartPage::new(page, store, controller, config);

    if !report_load(chart_page.load()?) {
        return Ok(());
    }

    if let Some(layer) = &args.layer {
        let url = chart_page.on_layer_change(layer)?;
        println!("navigate: {}", url);
        return Ok(());
    }

    let mut outcome = None;
    if let Some(key) = &args.key {
        outcome = Some(chart_page.on_key_change(key)?);
    }
    if let Some(y) = &args.y {
        outcome = Some(chart_page.on_y_change(y)?);
    }
    if let Some(chart) = &args.chart {
        let chart_type: ChartType = chart.parse()?;
        outcome = Some(chart_page.on_chart_type_change(chart_type)?);
    }
    if let Some(RenderOutcome::Skipped(reason)) = outcome {
        println!("skipped: {:?}", reason);
    }

    match chart_page.controller().instance(&canvas) {
        Some(file) => report_file(&file.path),
        None => println!("nothing rendered"),
    }
    Ok(())
}

fn run_broadcast(
    args: &Args,
    config: PageConfig,
    page: Page,
    store: Box<dyn KeyValueStore>,
) -> Result<()> {
    let page = Rc::new(RefCell::new(page));
    let listeners: Vec<_> = [&config.elements.canvas, &config.elements.secondary_canvas]
        .into_iter()
        .map(|target| {
            Rc::new(RefCell::new(ChartListener::new(
                Rc::clone(&page),
                target.clone(),
                controller(args, &config),
            )))
        })
        .collect();

    let mut selector_page = SelectorPage::new(page, store, config);
    for listener in &listeners {
        selector_page.subscribe(listener.clone());
    }

    if !report_load(selector_page.load()?) {
        return Ok(());
    }
    if let Some(key) = &args.key {
        selector_page.on_key_change(key);
    }

    let mut rendered = false;
    for listener in &listeners {
        let listener = listener.borrow();
        if let Some(file) = listener.controller().instance(listener.target()) {
            report_file(&file.path);
            rendered = true;
        }
    }
    if !rendered {
        println!("nothing rendered");
    }
    Ok(())
}

/// Print the load outcome; `false` when there is nothing more to do.
fn report_load(outcome: LoadOutcome) -> bool {
    match outcome {
        LoadOutcome::Redirected(url) => {
            println!("redirect: {}", url);
            false
        }
        LoadOutcome::NoData | LoadOutcome::Invalid => {
            println!("no data");
            false
        }
        LoadOutcome::Empty => {
            println!("no features");
            false
        }
        LoadOutcome::Ready { .. } => true,
    }
}

fn report_file(path: &Path) {
    println!("rendered: {}", path.display());
}
