use anyhow::{Context, Result, bail};
use ccm_style::breaks::{Method, compute_breaks, separate_equal_breaks};
use ccm_style::models::{Dataset, MissingPolicy, extract_series};
use ccm_style::{Controller, DataClient, MapConfig, SelectionState, SelectionUpdate};
use ccm_style::{legend, stats, storage, viz};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "ccm",
    version,
    about = "Classify map data and build choropleth paint styles, legends and previews"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute class breaks for one property of a data file.
    Breaks(BreaksArgs),
    /// Write the paint document for all layers of a map.
    Style(StyleArgs),
    /// Print or draw the legend of the active layer.
    Legend(LegendArgs),
    /// Export the active layer's features with their value, class and color.
    Classify(ClassifyArgs),
    /// Draw a preview of the active layer (.svg or .png).
    Render(RenderArgs),
    /// Print summary statistics for the active layer's indicators.
    Stats(MapArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Quantile,
    Jenks,
    EqualInterval,
}

impl From<MethodArg> for Method {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Quantile => Method::Quantile,
            MethodArg::Jenks => Method::Jenks,
            MethodArg::EqualInterval => Method::EqualInterval,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutFormat {
    Csv,
    Json,
}

#[derive(Args, Debug)]
struct BreaksArgs {
    /// GeoJSON or JSON data file.
    #[arg(short, long)]
    input: PathBuf,
    /// Property to classify.
    #[arg(short, long)]
    property: String,
    #[arg(short = 'k', long, default_value_t = 5)]
    classes: usize,
    #[arg(short, long, value_enum, default_value_t = MethodArg::Quantile)]
    method: MethodArg,
    /// Count missing values as zero instead of skipping them.
    #[arg(long, default_value_t = false)]
    missing_as_zero: bool,
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Map configuration JSON file (overrides --preset).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Built-in map: capacity, ihme or vents.
    #[arg(long, default_value = "capacity")]
    preset: String,
    /// Directory or base URL that data paths are relative to.
    #[arg(long, default_value = ".")]
    source: String,
    /// Runtime config published with the data (e.g. data/ihme-config.json).
    #[arg(long)]
    runtime: Option<String>,
    /// Local data file for a layer, as LAYER=PATH. Repeatable.
    #[arg(long = "layer", value_parser = parse_layer_override)]
    layers: Vec<(String, PathBuf)>,
    #[arg(long)]
    indicator: Option<String>,
    #[arg(long)]
    aggregation: Option<String>,
    /// Per-capita basis id, or "none" for totals.
    #[arg(long)]
    per_capita: Option<String>,
    #[arg(long)]
    bound: Option<String>,
    /// Date (YYYY-MM-DD) to show on dated maps.
    #[arg(long)]
    date: Option<String>,
}

#[derive(Args, Debug)]
struct StyleArgs {
    #[command(flatten)]
    map: MapArgs,
    /// Write the paint document here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LegendArgs {
    #[command(flatten)]
    map: MapArgs,
    /// Draw the legend to this file (.svg or .png).
    #[arg(long)]
    out: Option<PathBuf>,
    /// TrueType/OpenType font used for labels.
    #[arg(long)]
    font: Option<PathBuf>,
    #[arg(long, default_value_t = 360)]
    width: u32,
    #[arg(long, default_value_t = 240)]
    height: u32,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    #[command(flatten)]
    map: MapArgs,
    #[arg(long)]
    out: PathBuf,
    /// Output format. If omitted, inferred from --out extension.
    #[arg(long, value_enum)]
    format: Option<OutFormat>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    map: MapArgs,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 1000)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
    /// Zoom level used for circle radii.
    #[arg(long, default_value_t = 3.0)]
    zoom: f64,
}

fn parse_layer_override(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((layer, path)) if !layer.is_empty() && !path.is_empty() => {
            Ok((layer.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected LAYER=PATH, got '{}'", s)),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => {
            let s = format!("{:.4}", x);
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        _ => "NA".to_string(),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Breaks(args) => cmd_breaks(args),
        Command::Style(args) => cmd_style(args),
        Command::Legend(args) => cmd_legend(args),
        Command::Classify(args) => cmd_classify(args),
        Command::Render(args) => cmd_render(args),
        Command::Stats(args) => cmd_stats(args),
    }
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Dataset::from_json_str(&s).with_context(|| format!("parse {}", path.display()))
}

fn cmd_breaks(args: BreaksArgs) -> Result<()> {
    let ds = read_dataset(&args.input)?;
    let policy = if args.missing_as_zero {
        MissingPolicy::Zero
    } else {
        MissingPolicy::Skip
    };
    let series = extract_series(ds.features.iter().map(|f| f.value(&args.property)), policy);
    let breaks = compute_breaks(&series, args.classes, args.method.into())?;
    let breaks = separate_equal_breaks(&breaks);
    println!("{}", serde_json::to_string(&breaks)?);
    Ok(())
}

/// Build the controller for the selection given on the command line and load the
/// active layer's breaks and data.
fn open_map(args: &MapArgs) -> Result<Controller> {
    let mut config = match &args.config {
        Some(path) => MapConfig::from_path(path)?,
        None => MapConfig::preset(&args.preset)
            .with_context(|| format!("unknown preset '{}' (try capacity, ihme, vents)", args.preset))?,
    };
    let client = DataClient::from_location(&args.source)?;
    if let Some(path) = &args.runtime {
        config = config.with_runtime(client.fetch_runtime_config(path)?);
    }

    let today = chrono::Local::now().date_naive();
    let mut selection = SelectionState::initial(&config, today)?;
    let date_index = match &args.date {
        Some(d) => Some(
            config
                .dates
                .iter()
                .position(|x| x == d)
                .with_context(|| format!("date {} is not in the configured dates", d))?,
        ),
        None => None,
    };
    let update = SelectionUpdate {
        indicator: args.indicator.clone(),
        aggregation: args.aggregation.clone(),
        per_capita: args.per_capita.as_deref().map(|p| match p {
            "none" => None,
            id => Some(id.to_string()),
        }),
        bound_level: args.bound.clone(),
        date_index,
    };
    selection = selection.apply(&update);

    let mut map = Controller::new(config, selection)?;
    let layer = map.selection().aggregation.clone();
    let aggregation = map.config().aggregation(&layer)?.clone();

    if let Some(url) = &aggregation.breaks_url {
        match client.fetch_breaks(url) {
            Ok(table) => map.load_breaks(&layer, table)?,
            Err(e) => log::warn!("no precomputed breaks for '{}': {:#}", layer, e),
        }
    }

    let local = args.layers.iter().find(|(id, _)| *id == layer);
    let dataset = match (local, &aggregation.data_url) {
        (Some((_, path)), _) => Some(read_dataset(path)?),
        (None, Some(url)) => Some(client.fetch_dataset(url)?),
        (None, None) => None,
    };
    if let Some(ds) = dataset {
        map.load_layer(&layer, ds)?;
    }
    Ok(map)
}

fn cmd_style(args: StyleArgs) -> Result<()> {
    let map = open_map(&args.map)?;
    let doc = storage::paint_document(map.styles());
    match &args.out {
        Some(path) => {
            storage::save_json(&doc, path)?;
            eprintln!("Wrote paint styles to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&doc)?),
    }
    Ok(())
}

fn cmd_legend(args: LegendArgs) -> Result<()> {
    let map = open_map(&args.map)?;
    let Some(legend) = map.legend() else {
        bail!(
            "layer '{}' has nothing to show for this selection",
            map.selection().aggregation
        );
    };
    match &args.out {
        Some(path) => {
            if let Some(font) = &args.font {
                let bytes = std::fs::read(font).with_context(|| format!("read {}", font.display()))?;
                viz::register_label_font(bytes)?;
            }
            viz::render_legend(&legend, path, args.width, args.height)?;
            eprintln!("Wrote legend to {}", path.display());
        }
        None => {
            println!("{}", legend.title);
            for e in &legend.entries {
                println!("{}  {}", e.color, e.label);
            }
            println!("{}  No data", legend.no_data);
        }
    }
    Ok(())
}

fn cmd_classify(args: ClassifyArgs) -> Result<()> {
    let map = open_map(&args.map)?;
    let layer = &map.selection().aggregation;
    let aggregation = map.config().aggregation(layer)?;
    let Some(ds) = map.dataset(layer) else {
        bail!("no data loaded for layer '{}' (pass --layer {}=PATH)", layer, layer);
    };
    let style = map.style(layer).context("layer has no style")?;
    let rows = storage::classify_features(&ds.features, style, aggregation);

    let fmt = match args.format {
        Some(OutFormat::Csv) => "csv",
        Some(OutFormat::Json) => "json",
        None => args.out.extension().and_then(|e| e.to_str()).unwrap_or("csv"),
    }
    .to_ascii_lowercase();
    match fmt.as_str() {
        "csv" => storage::save_csv(&rows, &args.out)?,
        "json" => storage::save_json(&rows, &args.out)?,
        other => bail!("unsupported format: {}", other),
    }
    eprintln!("Saved {} rows to {}", rows.len(), args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> Result<()> {
    let map = open_map(&args.map)?;
    let layer = &map.selection().aggregation;
    let Some(ds) = map.dataset(layer) else {
        bail!("no data loaded for layer '{}' (pass --layer {}=PATH)", layer, layer);
    };
    let style = map.style(layer).context("layer has no style")?;
    viz::render_map(&ds.features, style, &args.out, args.width, args.height, args.zoom)?;
    eprintln!("Wrote preview to {}", args.out.display());
    Ok(())
}

fn cmd_stats(args: MapArgs) -> Result<()> {
    let map = open_map(&args)?;
    let layer = &map.selection().aggregation;
    let Some(ds) = map.dataset(layer) else {
        bail!("no data loaded for layer '{}' (pass --layer {}=PATH)", layer, layer);
    };
    if let Some(style) = map.style(layer).and_then(|s| s.resolved()) {
        let values = ds.features.iter().map(|f| style.source.value_of(f));
        let s = stats::summarize(&style.source.property, values);
        let as_percent = style.display_as_percent;
        println!(
            "{}  count={} missing={}  min={} max={} mean={} median={}",
            style.title,
            s.count,
            s.missing,
            legend::format_number(s.min.into(), as_percent),
            legend::format_number(s.max.into(), as_percent),
            legend::format_number(s.mean.into(), as_percent),
            legend::format_number(s.median.into(), as_percent),
        );
        let counts = stats::class_counts(map.style(layer).context("layer has no style")?, &ds.features);
        for (class, (n, entry)) in counts
            .iter()
            .zip(map.legend().map(|l| l.entries).unwrap_or_default())
            .enumerate()
        {
            println!("  class {}  {:>6}  {}", class, n, entry.label);
        }
    }

    let properties: Vec<String> = map
        .config()
        .indicators
        .iter()
        .map(|i| i.property_name().to_string())
        .collect();
    for s in stats::grouped_summary(&ds.features, &properties) {
        if s.count == 0 && s.missing == ds.len() {
            continue;
        }
        println!(
            "{}  count={} missing={}  min={} max={} mean={} median={}",
            s.property,
            s.count,
            s.missing,
            fmt_opt(s.min),
            fmt_opt(s.max),
            fmt_opt(s.mean),
            fmt_opt(s.median)
        );
    }
    Ok(())
}
