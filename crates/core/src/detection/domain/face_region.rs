use crate::shared::frame::Frame;

use super::face_landmarks::FaceLandmarks;

/// Axis-aligned box in frame coordinates, `(x1, y1)` top-left inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = BoundingBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Clamps to `[0, width] x [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as f64;
        let h = height as f64;
        BoundingBox::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }
}

/// A located face: landmarks, bounding shape and the cropped face pixels.
///
/// Only valid for the frame it was located in.
#[derive(Clone, Debug)]
pub struct FaceRegion {
    landmarks: FaceLandmarks,
    bounds: BoundingBox,
    face_image: Frame,
    origin: (u32, u32),
    confidence: f64,
}

impl FaceRegion {
    /// Crops `bounds` (clamped to the frame) out of `frame`.
    ///
    /// Returns `None` when the clamped box contains no pixels.
    pub fn from_frame(
        frame: &Frame,
        landmarks: FaceLandmarks,
        bounds: BoundingBox,
        confidence: f64,
    ) -> Option<FaceRegion> {
        let clamped = bounds.clamped(frame.width(), frame.height());
        let x = clamped.x1.floor() as u32;
        let y = clamped.y1.floor() as u32;
        let w = (clamped.x2.ceil() as u32).saturating_sub(x);
        let h = (clamped.y2.ceil() as u32).saturating_sub(y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(FaceRegion {
            landmarks,
            bounds: clamped,
            face_image: frame.crop(x, y, w, h),
            origin: (x, y),
            confidence,
        })
    }

    pub fn landmarks(&self) -> &FaceLandmarks {
        &self.landmarks
    }

    pub fn landmark_count(&self) -> usize {
        self.landmarks.landmark_count()
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn face_image(&self) -> &Frame {
        &self.face_image
    }

    /// Top-left corner of `face_image` in frame coordinates.
    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Convex hull of the landmarks in frame coordinates.
    pub fn shape(&self) -> Vec<(f64, f64)> {
        self.landmarks.convex_hull()
    }

    /// Landmarks relative to `face_image`.
    pub fn local_landmarks(&self) -> FaceLandmarks {
        self.landmarks
            .translated(self.origin.0 as f64, self.origin.1 as f64)
    }
}
