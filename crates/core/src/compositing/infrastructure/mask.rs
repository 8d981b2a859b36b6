//! Feathered blend mask from a convex face hull.

use super::delaunay::orient;
use super::gaussian;

/// Scales a polygon about its vertex mean.
pub fn expand(polygon: &[(f64, f64)], factor: f64) -> Vec<(f64, f64)> {
    if polygon.is_empty() {
        return Vec::new();
    }
    let n = polygon.len() as f64;
    let (cx, cy) = polygon
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x / n, ay + y / n));
    polygon
        .iter()
        .map(|&(x, y)| (cx + (x - cx) * factor, cy + (y - cy) * factor))
        .collect()
}

pub fn polygon_area(polygon: &[(f64, f64)]) -> f64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let (x1, y1) = polygon[i];
            let (x2, y2) = polygon[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum::<f64>()
        .abs()
        / 2.0
}

/// Rasterizes a counter-clockwise convex polygon into a `width x height`
/// mask whose top-left pixel sits at `origin`. Inside is 1.0.
pub fn hull_mask(hull: &[(f64, f64)], origin: (f64, f64), width: usize, height: usize) -> Vec<f32> {
    let mut mask = vec![0.0f32; width * height];
    if hull.len() < 3 {
        return mask;
    }
    for y in 0..height {
        for x in 0..width {
            let p = (origin.0 + x as f64, origin.1 + y as f64);
            let inside = (0..hull.len()).all(|i| orient(hull[i], hull[(i + 1) % hull.len()], p) >= 0.0);
            if inside {
                mask[y * width + x] = 1.0;
            }
        }
    }
    mask
}

/// Odd blur size for feathering: radius `ratio * sqrt(area)`, at least 1.
pub fn feather_kernel_size(hull: &[(f64, f64)], ratio: f64) -> usize {
    let radius = (ratio * polygon_area(hull).sqrt()).round().max(1.0) as usize;
    radius * 2 + 1
}

pub fn feather(mask: &mut [f32], width: usize, height: usize, kernel_size: usize) {
    gaussian::blur(mask, width, height, 1, kernel_size);
}
