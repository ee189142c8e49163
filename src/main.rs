use anyhow::{bail, Context, Result};
use clap::Parser;
use clickmask::contour::MASK_THRESHOLD;
use clickmask::embedding::{EmbeddingConfig, EmbeddingSource, FileEmbeddingSource, HttpEmbeddingClient};
use clickmask::segmentation::{self, Preprocessor};
use clickmask::{Click, Editor, EditorConfig, EditorError, LogNotifier, Point};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to segment
    #[arg(long)]
    image: PathBuf,

    /// Path to the prompt decoder (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Embedding service URL; the image is POSTed here
    #[arg(long, conflicts_with = "embedding", required_unless_present = "embedding")]
    endpoint: Option<String>,

    /// Precomputed embedding: raw little-endian f32 [1,256,64,64]
    #[arg(long)]
    embedding: Option<PathBuf>,

    /// Positive click as X,Y in image pixels (repeatable, applied in order)
    #[arg(long = "click", value_parser = parse_point)]
    clicks: Vec<Point>,

    /// Interpret clicks as canvas coordinates of the fitted viewport
    #[arg(long)]
    canvas_clicks: bool,

    /// Undo this many clicks after all clicks are applied
    #[arg(long, default_value_t = 0)]
    undo: usize,

    /// Lasso polygons to clip the cutout with, one per line as "x,y x,y ..."
    #[arg(long)]
    lasso: Option<PathBuf>,

    /// Write the cutout (foreground on transparent) as PNG
    #[arg(long)]
    cutout: Option<PathBuf>,

    /// Write the thresholded mask (Upload resolution) as a grayscale PNG
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Write the traced outline as an SVG document
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Simplify the outline with this tolerance in pixels
    #[arg(long, default_value_t = 0.0)]
    simplify: f64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in '{s}': {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in '{s}': {e}"))?;
    Ok(Point::new(x, y))
}

fn read_lassos(path: &Path) -> Result<Vec<Vec<Point>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lasso file {}", path.display()))?;

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|pair| parse_point(pair).map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("clickmask starting");

    let embeddings: Arc<dyn EmbeddingSource> = match (&args.endpoint, &args.embedding) {
        (Some(endpoint), _) => {
            tracing::info!("Embedding service: {}", endpoint);
            Arc::new(
                HttpEmbeddingClient::new(EmbeddingConfig::new(endpoint.as_str()))
                    .context("Failed to create embedding client")?,
            )
        }
        (None, Some(path)) => {
            tracing::info!("Embedding file: {}", path.display());
            Arc::new(FileEmbeddingSource::new(path))
        }
        (None, None) => bail!("either --endpoint or --embedding is required"),
    };

    tracing::info!("Loading prompt decoder from {}", args.model.display());
    let model = segmentation::create_default_model(&args.model)
        .context("Failed to load prompt decoder")?;
    tracing::info!("Prompt decoder '{}' loaded", model.name());

    let config = EditorConfig {
        simplify_tolerance: args.simplify,
        ..EditorConfig::default()
    };
    let mut editor = Editor::new(model, embeddings, Box::new(LogNotifier), config);

    let start = Instant::now();
    editor.open_image(&args.image)?;
    editor
        .settle()
        .await
        .context("Failed to obtain image embedding")?;
    tracing::info!("Embedding ready in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    for point in &args.clicks {
        let start = Instant::now();
        if args.canvas_clicks {
            editor.add_canvas_click(*point)?;
        } else {
            editor.add_click(Click::from(*point))?;
        }

        match editor.settle().await {
            Ok(()) => tracing::info!(
                "Click ({:.1}, {:.1}) applied in {:.1}ms, {} contour(s)",
                point.x,
                point.y,
                start.elapsed().as_secs_f64() * 1000.0,
                editor.traced().map(|t| t.len()).unwrap_or(0)
            ),
            // A failed click is rolled back; the rest still apply
            Err(err @ EditorError::InferenceFailed { .. }) => tracing::warn!("{}", err),
            Err(err) => return Err(err.into()),
        }
    }

    for _ in 0..args.undo {
        editor.undo()?;
    }
    editor.settle().await?;

    let Some(traced) = editor.traced() else {
        tracing::warn!("No mask to export");
        return Ok(());
    };
    for contour in traced.iter() {
        tracing::debug!(
            "{} with {} corners, area {:.1}",
            if contour.is_hole() { "Hole" } else { "Boundary" },
            contour.len(),
            contour.signed_area().abs()
        );
    }

    if let Some(path) = &args.svg {
        let (width, height) = editor
            .image()
            .map(|image| (image.width(), image.height()))
            .unwrap_or_default();
        std::fs::write(path, traced.to_svg_document(width, height))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Outline written to {}", path.display());
    }

    if let (Some(path), Some(mask)) = (&args.mask, editor.current_mask()) {
        Preprocessor::mask_to_gray(mask, MASK_THRESHOLD)
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Mask written to {}", path.display());
    }

    if let Some(path) = &args.cutout {
        let rendered = match &args.lasso {
            Some(lasso) => {
                let lassos = read_lassos(lasso)?;
                match editor.clip(&lassos) {
                    Some(clipped) => clipped,
                    None => {
                        tracing::warn!("Lasso unusable, writing unclipped cutout");
                        editor.rendered().context("No cutout available")?
                    }
                }
            }
            None => editor.rendered().context("No cutout available")?,
        };
        rendered
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Cutout written to {}", path.display());
    }

    Ok(())
}
