//! Landmark-driven face compositor.
//!
//! The source face crop is warped onto the destination landmarks, optionally
//! colour-matched to the destination, and alpha-blended through a feathered
//! mask built from the destination landmark hull. All work happens inside the
//! hull's bounding rectangle.
use crate::compositing::domain::face_compositor::{
    CompositeError, CompositeOptions, FaceCompositor, WarpMode,
};
use crate::detection::domain::face_landmarks::{convex_hull, FaceLandmarks};
use crate::detection::domain::face_region::{BoundingBox, FaceRegion};
use crate::shared::frame::Frame;

use super::affine::Affine;
use super::delaunay;
use super::gaussian;
use super::mask;

const DEFAULT_HULL_EXPANSION: f64 = 1.5;
const DEFAULT_FEATHER_RATIO: f64 = 0.08;

/// Colour-correction blur width as a fraction of the eye distance.
const COLOR_BLUR_FRACTION: f64 = 0.75;
const MIN_COLOR_BLUR: usize = 3;
const MAX_COLOR_BLUR: usize = 101;

pub struct LandmarkCompositor {
    hull_expansion: f64,
    feather_ratio: f64,
}

impl LandmarkCompositor {
    pub fn new() -> Self {
        Self::with_mask(DEFAULT_HULL_EXPANSION, DEFAULT_FEATHER_RATIO)
    }

    /// `hull_expansion` scales the landmark hull about its centre;
    /// `feather_ratio` sets the mask softness relative to the hull size.
    pub fn with_mask(hull_expansion: f64, feather_ratio: f64) -> Self {
        Self {
            hull_expansion,
            feather_ratio,
        }
    }
}

impl Default for LandmarkCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceCompositor for LandmarkCompositor {
    fn composite(
        &self,
        source: &FaceRegion,
        destination: &FaceRegion,
        mut dest_frame: Frame,
        options: &CompositeOptions,
    ) -> Result<Frame, CompositeError> {
        let count = source.landmark_count();
        if count != destination.landmark_count() {
            return Err(CompositeError::LandmarkCountMismatch {
                source_count: count,
                destination_count: destination.landmark_count(),
            });
        }
        if count < 3 {
            return Err(CompositeError::DegenerateLandmarks(format!(
                "{count} landmarks, at least 3 required"
            )));
        }
        let face = source.face_image();
        if face.width() == 0 || face.height() == 0 {
            return Err(CompositeError::EmptyFace);
        }
        for channels in [face.channels(), dest_frame.channels()] {
            if channels != 3 {
                return Err(CompositeError::UnsupportedFormat { channels });
            }
        }

        let hull = convex_hull(destination.landmarks().points());
        if hull.len() < 3 {
            return Err(CompositeError::DegenerateLandmarks(
                "destination landmarks are collinear".into(),
            ));
        }
        let hull = mask::expand(&hull, self.hull_expansion);

        let warp = match options.warp_mode {
            WarpMode::TwoD => Warp::similarity(&source.local_landmarks(), destination.landmarks())?,
            WarpMode::ThreeD => Warp::piecewise(source, destination)?,
        };

        let roi = Roi::covering(&hull, dest_frame.width(), dest_frame.height())
            .ok_or(CompositeError::OutsideFrame)?;

        let background = roi.extract(&dest_frame);
        let (mut warped, coverage) = render(face, &warp, roi, &background);

        let mut alpha = mask::hull_mask(&hull, (roi.x as f64, roi.y as f64), roi.w, roi.h);
        for (a, covered) in alpha.iter_mut().zip(&coverage) {
            if !covered {
                *a = 0.0;
            }
        }
        mask::feather(
            &mut alpha,
            roi.w,
            roi.h,
            mask::feather_kernel_size(&hull, self.feather_ratio),
        );

        if options.correct_color {
            let blur = color_blur_size(destination.landmarks(), destination.bounds());
            correct_colors(&background, &mut warped, roi, blur);
        }

        roi.blend(&mut dest_frame, &warped, &background, &alpha);
        Ok(dest_frame)
    }
}

/// Maps destination frame coordinates back to source crop coordinates.
enum Warp {
    Global(Affine),
    Piecewise(Vec<([(f64, f64); 3], Affine)>),
}

impl Warp {
    fn similarity(source: &FaceLandmarks, destination: &FaceLandmarks) -> Result<Warp, CompositeError> {
        Affine::similarity(destination.points(), source.points())
            .map(Warp::Global)
            .ok_or_else(|| CompositeError::DegenerateLandmarks("no similarity fit".into()))
    }

    /// Triangulates the destination landmarks plus the destination box
    /// corners; the box corners pair with the source crop corners.
    fn piecewise(source: &FaceRegion, destination: &FaceRegion) -> Result<Warp, CompositeError> {
        let mut src_points = source.local_landmarks().points().to_vec();
        let (ox, oy) = source.origin();
        src_points.extend(corners(source.bounds()).map(|(x, y)| (x - ox as f64, y - oy as f64)));

        let mut dst_points = destination.landmarks().points().to_vec();
        dst_points.extend(corners(destination.bounds()));

        let pieces: Vec<_> = delaunay::triangulate(&dst_points)
            .into_iter()
            .filter_map(|[a, b, c]| {
                let dst = [dst_points[a], dst_points[b], dst_points[c]];
                let src = [src_points[a], src_points[b], src_points[c]];
                Affine::from_triangles(dst, src).map(|map| (dst, map))
            })
            .collect();

        if pieces.is_empty() {
            return Err(CompositeError::DegenerateLandmarks(
                "destination landmarks cannot be triangulated".into(),
            ));
        }
        Ok(Warp::Piecewise(pieces))
    }

    fn source_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Warp::Global(map) => Some(map.apply(x, y)),
            Warp::Piecewise(pieces) => pieces
                .iter()
                .find(|(tri, _)| delaunay::triangle_contains(tri, (x, y)))
                .map(|(_, map)| map.apply(x, y)),
        }
    }
}

fn corners(b: &BoundingBox) -> [(f64, f64); 4] {
    [(b.x1, b.y1), (b.x2, b.y1), (b.x2, b.y2), (b.x1, b.y2)]
}

/// Pixel rectangle of the destination frame being edited.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Roi {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl Roi {
    fn covering(points: &[(f64, f64)], frame_w: u32, frame_h: u32) -> Option<Roi> {
        let (min_x, min_y, max_x, max_y) = points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(ax, ay, bx, by), &(x, y)| (ax.min(x), ay.min(y), bx.max(x), by.max(y)),
        );
        let x0 = min_x.floor().clamp(0.0, frame_w as f64) as usize;
        let y0 = min_y.floor().clamp(0.0, frame_h as f64) as usize;
        let x1 = (max_x.ceil() + 1.0).clamp(0.0, frame_w as f64) as usize;
        let y1 = (max_y.ceil() + 1.0).clamp(0.0, frame_h as f64) as usize;
        (x1 > x0 && y1 > y0).then_some(Roi {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        })
    }

    fn extract(&self, frame: &Frame) -> Vec<f32> {
        let stride = frame.width() as usize * 3;
        let data = frame.data();
        let mut out = Vec::with_capacity(self.w * self.h * 3);
        for row in 0..self.h {
            let start = (self.y + row) * stride + self.x * 3;
            out.extend(data[start..start + self.w * 3].iter().map(|&v| v as f32));
        }
        out
    }

    fn blend(&self, frame: &mut Frame, fg: &[f32], bg: &[f32], alpha: &[f32]) {
        let stride = frame.width() as usize * 3;
        let data = frame.data_mut();
        for row in 0..self.h {
            for col in 0..self.w {
                let i = row * self.w + col;
                let a = alpha[i].clamp(0.0, 1.0);
                let dst = (self.y + row) * stride + (self.x + col) * 3;
                for c in 0..3 {
                    let v = a * fg[i * 3 + c] + (1.0 - a) * bg[i * 3 + c];
                    data[dst + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Warps the source face into the ROI. Pixels the warp does not reach keep
/// the background value and are reported as uncovered.
fn render(face: &Frame, warp: &Warp, roi: Roi, background: &[f32]) -> (Vec<f32>, Vec<bool>) {
    let mut warped = background.to_vec();
    let mut coverage = vec![false; roi.w * roi.h];
    for row in 0..roi.h {
        for col in 0..roi.w {
            let x = (roi.x + col) as f64;
            let y = (roi.y + row) as f64;
            let Some((sx, sy)) = warp.source_point(x, y) else {
                continue;
            };
            if let Some(px) = sample_bilinear(face, sx, sy) {
                let i = row * roi.w + col;
                warped[i * 3..i * 3 + 3].copy_from_slice(&px);
                coverage[i] = true;
            }
        }
    }
    (warped, coverage)
}

fn sample_bilinear(img: &Frame, x: f64, y: f64) -> Option<[f32; 3]> {
    let w = img.width() as f64;
    let h = img.height() as f64;
    if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return None;
    }
    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let p00 = img.pixel(x0, y0);
    let p10 = img.pixel(x1, y0);
    let p01 = img.pixel(x0, y1);
    let p11 = img.pixel(x1, y1);

    let mut out = [0.0f32; 3];
    for (c, v) in out.iter_mut().enumerate() {
        *v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
    }
    Some(out)
}

/// Odd blur width from the eye distance, falling back to the face box.
fn color_blur_size(landmarks: &FaceLandmarks, bounds: &BoundingBox) -> usize {
    let reference = landmarks
        .eye_distance()
        .unwrap_or_else(|| bounds.width().max(bounds.height()) / 2.0);
    let size = (COLOR_BLUR_FRACTION * reference) as usize;
    let size = if size % 2 == 0 { size + 1 } else { size };
    size.clamp(MIN_COLOR_BLUR, MAX_COLOR_BLUR)
}

/// Scales `warped` by the ratio of the blurred destination to the blurred
/// warped face, carrying the destination's low-frequency colour over.
fn correct_colors(background: &[f32], warped: &mut [f32], roi: Roi, blur: usize) {
    let mut dst_blur = background.to_vec();
    gaussian::blur(&mut dst_blur, roi.w, roi.h, 3, blur);
    let mut src_blur = warped.to_vec();
    gaussian::blur(&mut src_blur, roi.w, roi.h, 3, blur);

    for ((v, &d), &s) in warped.iter_mut().zip(&dst_blur).zip(&src_blur) {
        // Avoid division blow-up on near-black areas.
        let s = if s <= 1.0 { s + 128.0 } else { s };
        *v = (*v * d / s).clamp(0.0, 255.0);
    }
}
