// Example runner: segment the top-left square of an image and write the boundary
// overlay next to it.
//
// Usage: region_segmenter <input_image> [output_png]
// Environment: SEG_ORDER (grid side = 2^SEG_ORDER), SEG_THRESHOLD, RUST_LOG.

use anyhow::Context;
use log::info;
use region_segmenter::core_modules::utils::image_helper;
use region_segmenter::pipeline::{SegmentationConfig, SegmentationPipeline};
use std::env;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: region_segmenter <input_image> [output_png]");
        return Ok(());
    }
    let input_path = &args[1];
    let output_path = args.get(2).cloned().unwrap_or_else(|| "segmented.png".to_string());

    let mut config = SegmentationConfig::default();
    if let Ok(order) = env::var("SEG_ORDER") {
        config.order = order.parse().context("SEG_ORDER must be an integer")?;
    }
    if let Ok(threshold) = env::var("SEG_THRESHOLD") {
        config.threshold = threshold.parse().context("SEG_THRESHOLD must be a number")?;
    }

    // --- 2. Segmentation ---
    let pipeline = SegmentationPipeline::new(config)?;
    let grid = image_helper::load_grid(input_path, pipeline.config().order)
        .with_context(|| format!("reading {input_path}"))?;
    let segmentation = pipeline.segment(grid)?;

    // --- 3. Overlay ---
    let overlay = segmentation.overlay()?;
    image_helper::save_overlay(&output_path, &overlay)
        .with_context(|| format!("writing {output_path}"))?;

    info!(
        "{} segments written to {output_path}",
        segmentation.segment_count()
    );
    Ok(())
}
