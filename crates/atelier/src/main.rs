//! atelier: command-line front end for the carousel composer.
//!
//! Each subcommand runs one stage of the post composer on local files, so
//! the pipeline can be exercised and tuned without the storefront UI.
//!
//! # Usage
//!
//! ```text
//! atelier compress photo.jpg -o upload.jpg
//! atelier compose upload.jpg -o slide-1.jpg --zoom 1.2 --offset-y -40
//! atelier card upload.jpg -o card.jpg --background gradient --top '#fde68a' --bottom '#f59e0b'
//! atelier cache put photo.jpg
//! atelier carousel photo.jpg --preset gallery --out-dir post/
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use atelier_io::{
    ApiClient, BlobCache, CacheKey, CarouselComposer, Config, HandleRegistry, ImageRef, Resolved,
};
use atelier_pipeline::{
    Action, Background, Border, CardAspect, CardOptions, CompressOptions, Composition, Frame,
    ResampleFilter, Rgb, ScenePreset, SourceImage, SourceOrigin, ViewTransform, compose,
    compose_card, compress, normalize_bytes, normalize_data_url,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Instagram carousel composer for the artist storefront.
#[derive(Parser)]
#[command(name = "atelier", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shrink an image for upload.
    Compress(CompressArgs),
    /// Frame an image on the 1080×1350 canvas.
    Compose(ComposeArgs),
    /// Letterbox an image (or a `data:` URL file) onto the canvas.
    Normalize(NormalizeArgs),
    /// Render the framed card layout.
    Card(CardArgs),
    /// Inspect or modify the local blob cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Build both carousel slides, staging slide 2 remotely.
    Carousel(CarouselArgs),
}

#[derive(Args)]
struct CompressArgs {
    /// Input image (PNG, JPEG, BMP, WebP).
    input: PathBuf,

    /// Where to write the result.
    #[arg(short, long)]
    output: PathBuf,

    /// Bound on either axis (default from config).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_dimension: Option<u32>,

    /// JPEG quality as a fraction, e.g. 0.82 (default from config).
    #[arg(long)]
    quality: Option<f32>,

    /// Resampling filter.
    #[arg(long, value_enum, default_value_t = Filter::CatmullRom)]
    filter: Filter,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic Catmull-Rom.
    CatmullRom,
    /// Gaussian (smooth).
    Gaussian,
    /// Lanczos with 3 lobes (sharpest).
    Lanczos3,
}

impl From<Filter> for ResampleFilter {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Zoom and pan for one slide. Out-of-range values are clamped.
#[derive(Args, Clone, Copy)]
struct ViewArgs {
    /// Zoom factor (0.6 to 1.6).
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,

    /// Horizontal offset in canvas pixels (-300 to 300).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_x: f64,

    /// Vertical offset in canvas pixels (-300 to 300).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_y: f64,
}

impl ViewArgs {
    fn transform(self) -> ViewTransform {
        ViewTransform::IDENTITY
            .with_zoom(self.zoom)
            .with_offset_x(self.offset_x)
            .with_offset_y(self.offset_y)
    }
}

#[derive(Args)]
struct ComposeArgs {
    /// Input image.
    input: PathBuf,

    /// Where to write the slide (`.png` for PNG, JPEG otherwise).
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args)]
struct NormalizeArgs {
    /// Input image, or a text file holding a `data:` URL.
    input: PathBuf,

    /// Where to write the slide (`.png` for PNG, JPEG otherwise).
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackgroundKind {
    /// Blurred artwork.
    Blur,
    /// Flat colour from `--color`.
    Solid,
    /// Mean colour of the artwork.
    Average,
    /// Vertical gradient from `--top` to `--bottom`.
    Gradient,
}

#[derive(Clone, Copy, ValueEnum)]
enum AspectKind {
    /// Fill the safe area.
    Post,
    /// Follow the artwork.
    Image,
}

#[derive(Args)]
struct CardArgs {
    /// Input image.
    input: PathBuf,

    /// Where to write the JPEG.
    #[arg(short, long)]
    output: PathBuf,

    /// Full card options as JSON; other layout flags are ignored.
    #[arg(long)]
    options_json: Option<String>,

    /// Canvas backdrop.
    #[arg(long, value_enum, default_value_t = BackgroundKind::Blur)]
    background: BackgroundKind,

    /// Solid backdrop colour (`#rrggbb`).
    #[arg(long)]
    color: Option<Rgb>,

    /// Gradient top colour.
    #[arg(long)]
    top: Option<Rgb>,

    /// Gradient bottom colour.
    #[arg(long)]
    bottom: Option<Rgb>,

    /// Draw the bare image without the rounded frame.
    #[arg(long)]
    no_frame: bool,

    /// Frame colour.
    #[arg(long)]
    frame_color: Option<Rgb>,

    /// Border stroke width; omit for no border.
    #[arg(long)]
    border: Option<f32>,

    /// Skip the drop shadow.
    #[arg(long)]
    no_shadow: bool,

    /// Clockwise tilt in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    tilt: f32,

    /// Card scale.
    #[arg(long, default_value_t = 1.0)]
    zoom: f32,

    /// Card shape.
    #[arg(long, value_enum, default_value_t = AspectKind::Post)]
    aspect: AspectKind,

    /// Vertical bias of the artwork, -1 (top) to 1 (bottom).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_y: f32,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Compress (unless `--raw`) and store an image, printing its key.
    Put {
        /// Image to store.
        input: PathBuf,
        /// Store the bytes as they are.
        #[arg(long)]
        raw: bool,
    },
    /// Write the bytes stored under a key.
    Get {
        /// Cache key.
        key: String,
        /// Where to write them.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove a key (missing keys are fine).
    Delete {
        /// Cache key.
        key: String,
    },
    /// List keys and sizes.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show how a key would be displayed.
    Resolve {
        /// Cache key.
        key: String,
        /// Public URL to use when the key is missing.
        #[arg(long)]
        fallback_url: Option<String>,
    },
}

#[derive(Args)]
struct CarouselArgs {
    /// Image file, `http(s)://` URL, or cache key with `--cached`.
    source: String,

    /// Treat `source` as a cache key.
    #[arg(long)]
    cached: bool,

    /// Public URL of the artwork (sent with the request, and the cache
    /// fallback).
    #[arg(long)]
    image_url: Option<String>,

    /// Staging preset.
    #[arg(long, default_value_t = ScenePreset::Easel)]
    preset: ScenePreset,

    /// Extra prompt for the staging model.
    #[arg(long)]
    prompt: Option<String>,

    #[command(flatten)]
    view: ViewArgs,

    /// Slide 2 zoom.
    #[arg(long)]
    staged_zoom: Option<f64>,

    /// Slide 2 horizontal offset.
    #[arg(long, allow_negative_numbers = true)]
    staged_offset_x: Option<f64>,

    /// Slide 2 vertical offset.
    #[arg(long, allow_negative_numbers = true)]
    staged_offset_y: Option<f64>,

    /// Directory for `slide-1.jpg` and `slide-2.jpg`.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "atelier=debug" } else { "atelier=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(?config, "configuration");

    match cli.command {
        Command::Compress(args) => run_compress(&config, &args),
        Command::Compose(args) => run_compose(&config, &args),
        Command::Normalize(args) => run_normalize(&config, &args),
        Command::Card(args) => run_card(&args),
        Command::Cache(command) => run_cache(&config, command).await,
        Command::Carousel(args) => run_carousel(&config, args).await,
    }
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    eprintln!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn compress_options(config: &Config, args: &CompressArgs) -> CompressOptions {
    let mut options = config.compress_options();
    if let Some(max) = args.max_dimension {
        options.max_dimension = max;
    }
    if let Some(q) = args.quality {
        options.quality = atelier_pipeline::Quality::from_fraction(q);
    }
    options.filter = args.filter.into();
    options
}

fn run_compress(config: &Config, args: &CompressArgs) -> anyhow::Result<()> {
    let bytes = read(&args.input)?;
    let options = compress_options(config, args);
    let out = compress(&bytes, &options).context("compressing")?;
    eprintln!(
        "{} -> {} ({:?}, {} filter, quality {})",
        out.original_dimensions,
        out.dimensions,
        out.outcome,
        options.filter,
        options.quality.get(),
    );
    write(&args.output, &out.bytes)
}

fn decode_file(path: &Path) -> anyhow::Result<SourceImage> {
    let bytes = read(path)?;
    SourceImage::decode(&bytes, SourceOrigin::Picked)
        .with_context(|| format!("decoding {}", path.display()))
}

/// Write PNG for a `.png` path, JPEG otherwise.
fn write_composition(path: &Path, composition: &Composition, config: &Config) -> anyhow::Result<()> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    let bytes = if is_png {
        composition.encode_png().context("encoding PNG")?
    } else {
        composition
            .encode_jpeg(config.output_quality())
            .context("encoding JPEG")?
    };
    write(path, &bytes)
}

fn run_compose(config: &Config, args: &ComposeArgs) -> anyhow::Result<()> {
    let source = decode_file(&args.input)?;
    let view = args.view.transform();
    let slide = compose(&source, view).context("composing")?;
    eprintln!(
        "{} at zoom {:.2}, offset ({:.0}, {:.0}) -> {}",
        source.dimensions(),
        view.zoom,
        view.offset_x,
        view.offset_y,
        slide.dimensions(),
    );
    write_composition(&args.output, &slide, config)
}

fn run_normalize(config: &Config, args: &NormalizeArgs) -> anyhow::Result<()> {
    let bytes = read(&args.input)?;
    let normalized = if bytes.starts_with(b"data:") {
        let text = String::from_utf8(bytes).context("data URL is not UTF-8")?;
        normalize_data_url(text.trim())
    } else {
        normalize_bytes(&bytes)
    }
    .context("normalizing")?;
    write_composition(&args.output, &normalized, config)
}

fn card_options(args: &CardArgs) -> anyhow::Result<CardOptions> {
    if let Some(json) = &args.options_json {
        return serde_json::from_str(json).context("parsing --options-json");
    }

    let background = match args.background {
        BackgroundKind::Blur => Background::Blur,
        BackgroundKind::Average => Background::Average,
        BackgroundKind::Solid => args
            .color
            .map_or(Background::Average, |color| Background::Solid { color }),
        BackgroundKind::Gradient => match (args.top, args.bottom) {
            (Some(top), Some(bottom)) => Background::Gradient { top, bottom },
            _ => bail!("--background gradient needs both --top and --bottom"),
        },
    };
    let frame = (!args.no_frame).then(|| Frame {
        color: args.frame_color.unwrap_or(Rgb::WHITE),
        ..Frame::default()
    });
    let border = args.border.map(|width| Border {
        width,
        ..Border::default()
    });

    Ok(CardOptions {
        background,
        frame,
        border,
        shadow: !args.no_shadow,
        tilt_degrees: args.tilt,
        zoom: args.zoom,
        card_aspect: match args.aspect {
            AspectKind::Post => CardAspect::Post,
            AspectKind::Image => CardAspect::Image,
        },
        image_offset_y: args.offset_y.clamp(-1.0, 1.0),
        ..CardOptions::default()
    })
}

fn run_card(args: &CardArgs) -> anyhow::Result<()> {
    let options = card_options(args)?;
    let source = decode_file(&args.input)?;
    let card = compose_card(&source, &options).context("composing card")?;
    let jpeg = card.encode_jpeg(options.quality).context("encoding JPEG")?;
    write(&args.output, &jpeg)
}

fn cache_location(config: &Config) -> anyhow::Result<PathBuf> {
    config
        .cache_path()
        .context("no data directory; set cache_path or ATELIER_CACHE_PATH")
}

/// Open the cache, degrading to `None` when it is unavailable.
async fn try_open_cache(config: &Config) -> Option<BlobCache> {
    let path = config.cache_path()?;
    match BlobCache::open(&path).await {
        Ok(cache) => Some(cache),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "continuing without blob cache");
            None
        }
    }
}

async fn run_cache(config: &Config, command: CacheCommand) -> anyhow::Result<()> {
    let path = cache_location(config)?;
    let cache = BlobCache::open(&path)
        .await
        .with_context(|| format!("opening cache at {}", path.display()))?;

    match command {
        CacheCommand::Put { input, raw } => {
            let bytes = read(&input)?;
            let bytes = if raw {
                bytes
            } else {
                let out = compress(&bytes, &config.compress_options()).context("compressing")?;
                eprintln!("{} -> {} ({:?})", out.original_dimensions, out.dimensions, out.outcome);
                out.bytes
            };
            let key = cache.store(bytes).await?;
            println!("{key}");
        }
        CacheCommand::Get { key, output } => {
            let key = CacheKey::from(key);
            let bytes = cache
                .get(&key)
                .await?
                .with_context(|| format!("no entry for key {key}"))?;
            write(&output, &bytes)?;
        }
        CacheCommand::Delete { key } => {
            cache.delete(&CacheKey::from(key)).await?;
        }
        CacheCommand::List { json } => {
            let keys = cache.keys().await?;
            if json {
                let entries: Vec<_> = keys
                    .iter()
                    .map(|(key, len)| serde_json::json!({ "key": key.as_str(), "bytes": len }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (key, len) in &keys {
                    println!("{key}\t{len}");
                }
                eprintln!("{} entries in {}", keys.len(), path.display());
            }
        }
        CacheCommand::Resolve { key, fallback_url } => {
            let reference = ImageRef::Cached {
                key: CacheKey::from(key),
                fallback_url,
            };
            match reference.resolve(Some(&cache)).await? {
                Resolved::Bytes { bytes, key } => println!("cached {key} ({} bytes)", bytes.len()),
                Resolved::Url(url) => println!("url {url}"),
            }
        }
    }
    Ok(())
}

async fn load_carousel_source(
    config: &Config,
    args: &CarouselArgs,
    client: &ApiClient,
    cache: Option<&BlobCache>,
) -> anyhow::Result<SourceImage> {
    let reference = if args.cached {
        ImageRef::Cached {
            key: CacheKey::from(args.source.as_str()),
            fallback_url: args.image_url.clone(),
        }
    } else if args.source.starts_with("http://") || args.source.starts_with("https://") {
        ImageRef::Url(args.source.clone())
    } else {
        let bytes = read(Path::new(&args.source))?;
        let compressed = compress(&bytes, &config.compress_options()).context("compressing")?;
        eprintln!(
            "Picked {} -> {}",
            compressed.original_dimensions, compressed.dimensions
        );
        if let Some(cache) = cache {
            match cache.store(compressed.bytes.clone()).await {
                Ok(key) => eprintln!("Cached as {key}"),
                Err(err) => tracing::warn!(%err, "could not cache picked image"),
            }
        }
        return SourceImage::decode(&compressed.bytes, SourceOrigin::Picked)
            .context("decoding picked image");
    };
    Ok(reference.load(cache, client).await?)
}

async fn run_carousel(config: &Config, args: CarouselArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(config).context("building HTTP client")?;
    let cache = try_open_cache(config).await;
    let source = load_carousel_source(config, &args, &client, cache.as_ref()).await?;
    eprintln!("Source {} from {:?}", source.dimensions(), source.origin());

    let registry = HandleRegistry::new();
    eprintln!("Staging via {}", client.stage_endpoint());
    let mut composer = CarouselComposer::open(source, client, registry, config).await?;
    composer.set_image_url(args.image_url.clone());
    composer.dispatch(Action::SelectPreset(args.preset)).await?;
    if let Some(prompt) = &args.prompt {
        composer.dispatch(Action::SetExtraPrompt(prompt.clone())).await?;
    }
    apply_view(&mut composer, args.view.transform()).await?;

    composer.generate().await?;
    let staged = ViewTransform::IDENTITY
        .with_zoom(args.staged_zoom.unwrap_or(1.0))
        .with_offset_x(args.staged_offset_x.unwrap_or(0.0))
        .with_offset_y(args.staged_offset_y.unwrap_or(0.0));
    apply_view(&mut composer, staged).await?;

    let [first, second] = composer.finalize().await?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    write(&args.out_dir.join("slide-1.jpg"), &first)?;
    write(&args.out_dir.join("slide-2.jpg"), &second)?;
    Ok(())
}

/// Drive the active slide's sliders to `view`.
async fn apply_view<B: atelier_io::StagingBackend + 'static>(
    composer: &mut CarouselComposer<B>,
    view: ViewTransform,
) -> anyhow::Result<()> {
    composer.dispatch(Action::SetZoom(view.zoom)).await?;
    composer.dispatch(Action::SetOffsetX(view.offset_x)).await?;
    composer.dispatch(Action::SetOffsetY(view.offset_y)).await?;
    Ok(())
}
