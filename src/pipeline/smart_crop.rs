//! Crop region selection.
//!
//! Fixed anchors place the crop window against an edge, a corner or the
//! center. The `smart` strategy slides the window over a grid of candidate
//! positions and keeps the one whose luminance histogram has the highest
//! Shannon entropy, i.e. the most visual information.

use image::{DynamicImage, GrayImage};

use crate::transform::Gravity;

/// Maximum candidate positions along each axis for the entropy search.
const SEARCH_STEPS: u32 = 8;

/// Upper bound on sampled pixels per axis inside one window.
const SAMPLES_PER_AXIS: u32 = 64;

/// Top-left corner of a `width x height` window inside the image.
///
/// `width`/`height` must not exceed the image dimensions.
pub fn crop_origin(image: &DynamicImage, width: u32, height: u32, gravity: Gravity) -> (u32, u32) {
    let dx = image.width().saturating_sub(width);
    let dy = image.height().saturating_sub(height);

    match gravity {
        Gravity::Center => (dx / 2, dy / 2),
        Gravity::North => (dx / 2, 0),
        Gravity::South => (dx / 2, dy),
        Gravity::East => (dx, dy / 2),
        Gravity::West => (0, dy / 2),
        Gravity::Northeast => (dx, 0),
        Gravity::Northwest => (0, 0),
        Gravity::Southeast => (dx, dy),
        Gravity::Southwest => (0, dy),
        Gravity::Smart => entropy_origin(&image.to_luma8(), width, height),
    }
}

/// Window position with the highest entropy. Ties keep the centered window.
fn entropy_origin(gray: &GrayImage, width: u32, height: u32) -> (u32, u32) {
    let dx = gray.width().saturating_sub(width);
    let dy = gray.height().saturating_sub(height);
    if dx == 0 && dy == 0 {
        return (0, 0);
    }

    let centered = (dx / 2, dy / 2);
    let mut best = centered;
    let mut best_score = window_entropy(gray, centered.0, centered.1, width, height);

    for y in candidates(dy) {
        for x in candidates(dx) {
            let score = window_entropy(gray, x, y, width, height);
            if score > best_score {
                best_score = score;
                best = (x, y);
            }
        }
    }

    best
}

/// Evenly spaced offsets in `0..=slack`, always including both ends.
fn candidates(slack: u32) -> Vec<u32> {
    let steps = SEARCH_STEPS.min(slack);
    if steps == 0 {
        return vec![0];
    }
    (0..=steps)
        .map(|i| (u64::from(slack) * u64::from(i) / u64::from(steps)) as u32)
        .collect()
}

/// Shannon entropy (bits) of the luminance histogram of a window.
fn window_entropy(gray: &GrayImage, x0: u32, y0: u32, width: u32, height: u32) -> f64 {
    let step_x = (width / SAMPLES_PER_AXIS).max(1);
    let step_y = (height / SAMPLES_PER_AXIS).max(1);

    let mut histogram = [0u32; 256];
    let mut total = 0u32;

    for y in (y0..y0 + height).step_by(step_y as usize) {
        for x in (x0..x0 + width).step_by(step_x as usize) {
            histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
            total += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = f64::from(count) / total;
            -p * p.log2()
        })
        .sum()
}
