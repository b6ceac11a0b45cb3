// Codec glue between the `image` crate and the engine: decoding a raster into a
// `PixelGrid`, and painting / encoding the boundary overlay of a finished run.

use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::overlay::boundary_mask;
use crate::core_modules::pixel_grid::{Channel, MAX_ORDER, PixelGrid};
use crate::core_modules::segmentation_index::SegmentationIndex;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, Rgb, RgbImage};
use std::path::Path;

pub const RGB_BANDS: usize = 3;

/// Sentinel color painted over boundary pixels.
pub const BOUNDARY_COLOR: [Channel; RGB_BANDS] = [0, 0, 255];

/// Reads the top-left `2^order x 2^order` region of `image` as RGB.
pub fn grid_from_image(image: &DynamicImage, order: u32) -> Result<PixelGrid> {
    if order > MAX_ORDER {
        return Err(SegmentationError::InvalidConfig(format!(
            "grid order {order} exceeds the supported maximum of {MAX_ORDER}"
        )));
    }
    let side = 1u32 << order;
    let rgb = image.to_rgb8();
    if rgb.width() < side || rgb.height() < side {
        return Err(SegmentationError::InvalidInput(format!(
            "a {}x{} image cannot cover a {side}x{side} grid",
            rgb.width(),
            rgb.height()
        )));
    }

    PixelGrid::from_fn(order, RGB_BANDS, |coordinate| {
        rgb.get_pixel(coordinate.x, coordinate.y).0.to_vec()
    })
}

/// Decodes the file at `path` and reads it into a grid.
pub fn load_grid<P: AsRef<Path>>(path: P, order: u32) -> Result<PixelGrid> {
    let image = image::open(path)?;
    grid_from_image(&image, order)
}

/// Original colors with every boundary pixel painted `BOUNDARY_COLOR`.
pub fn render_overlay(index: &SegmentationIndex) -> Result<RgbImage> {
    let grid = index.grid();
    if grid.bands() != RGB_BANDS {
        return Err(SegmentationError::InvalidInput(format!(
            "overlay needs {RGB_BANDS} color bands, grid has {}",
            grid.bands()
        )));
    }

    let mask = boundary_mask(index);
    let mut overlay = RgbImage::new(grid.side(), grid.side());
    for (pixel, is_boundary) in mask.into_iter().enumerate() {
        let coordinate = grid.coordinate_of(pixel);
        let color = if is_boundary {
            BOUNDARY_COLOR
        } else {
            let source = grid.color_at(coordinate)?;
            [source[0], source[1], source[2]]
        };
        overlay.put_pixel(coordinate.x, coordinate.y, Rgb(color));
    }
    Ok(overlay)
}

/// Writes `overlay` as a PNG file.
pub fn save_overlay<P: AsRef<Path>>(path: P, overlay: &RgbImage) -> Result<()> {
    let output = std::fs::File::create(path).map_err(image::ImageError::IoError)?;
    let encoder = PngEncoder::new(output);
    encoder.write_image(
        overlay.as_raw(),
        overlay.width(),
        overlay.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(())
}
