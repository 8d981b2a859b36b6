//! Face locator backed by a YOLO face+keypoint model on ONNX Runtime.
//!
//! Letterboxes the frame, runs inference, filters by confidence, applies
//! greedy NMS and selects one face by policy. Only detections whose five
//! keypoints are all visible are eligible, since the compositor needs the
//! complete landmark set.
use std::path::Path;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::face_locator::{FaceLocator, LocateOutcome, LocatorError};
use crate::detection::domain::face_region::{BoundingBox, FaceRegion};
use crate::shared::constants::LANDMARK_COUNT;
use crate::shared::frame::Frame;

/// Model input resolution used when the graph has a dynamic shape.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.45;

/// Values per detection row after the box and score: x, y, conf per keypoint.
const KEYPOINT_VALUES: usize = LANDMARK_COUNT * 3;

const KEYPOINT_CONF_THRESH: f64 = 0.5;

pub struct OnnxFaceLocator {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceLocator {
    /// Loads the model. The input resolution is read from the NCHW input
    /// shape when it is static.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "Loaded face model {} (input {input_size}x{input_size})",
            model_path.display()
        );

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, LocatorError> {
        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| LocatorError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| LocatorError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(LocatorError::InvalidOutput("model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| LocatorError::InvalidOutput(e.to_string()))?;

        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(LocatorError::InvalidOutput(format!(
                "expected a rank 3 output, got {shape:?}"
            )));
        }
        // Either [1, features, detections] or [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor
            .as_slice()
            .ok_or_else(|| LocatorError::InvalidOutput("output is not contiguous".into()))?;

        let mut detections = Vec::new();
        let mut row = vec![0.0f32; num_feats];
        for i in 0..num_dets {
            for (f, value) in row.iter_mut().enumerate() {
                *value = if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                };
            }
            if let Some(det) = parse_row(&row, self.confidence, &letterbox) {
                detections.push(det);
            }
        }
        Ok(detections)
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, frame: &Frame, prefer_largest: bool) -> Result<LocateOutcome, LocatorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(LocateOutcome::NotFound);
        }

        let kept = landmarked_candidates(self.infer(frame)?);

        let Some(best) = select(&kept, prefer_largest) else {
            return Ok(LocateOutcome::NotFound);
        };
        let Some(keypoints) = best.keypoints.clone() else {
            return Ok(LocateOutcome::NotFound);
        };

        Ok(
            match FaceRegion::from_frame(
                frame,
                FaceLandmarks::new(keypoints),
                best.bbox,
                best.confidence,
            ) {
                Some(region) => LocateOutcome::Found(region),
                None => LocateOutcome::NotFound,
            },
        )
    }
}

fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

/// Mapping from letterboxed model coordinates back to the frame.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resizes the frame into a `target_size` square, preserving aspect ratio,
/// padded with YOLO grey. Returns the NCHW float tensor.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let grey = 114.0f32 / 255.0;
    let size = target_size as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), grey);

    let src = frame.as_ndarray();
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    for y in 0..new_h as usize {
        let sy = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let sx = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        },
    )
}

#[derive(Clone, Debug)]
struct RawDetection {
    bbox: BoundingBox,
    confidence: f64,
    /// Present only when every keypoint is confidently visible.
    keypoints: Option<Vec<(f64, f64)>>,
}

/// Parses `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn parse_row(row: &[f32], min_confidence: f64, letterbox: &Letterbox) -> Option<RawDetection> {
    if row.len() < 5 {
        return None;
    }
    let confidence = row[4] as f64;
    if confidence < min_confidence {
        return None;
    }

    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

    let keypoints = if row.len() >= 5 + KEYPOINT_VALUES {
        (0..LANDMARK_COUNT)
            .map(|k| {
                let base = 5 + k * 3;
                (row[base + 2] as f64 >= KEYPOINT_CONF_THRESH)
                    .then(|| letterbox.to_frame(row[base] as f64, row[base + 1] as f64))
            })
            .collect::<Option<Vec<_>>>()
    } else {
        None
    };

    Some(RawDetection {
        bbox: BoundingBox::new(x1, y1, x2, y2),
        confidence,
        keypoints,
    })
}

/// Drops detections without a usable landmark set, then runs NMS on the
/// rest so a landmark-less box cannot suppress a usable one.
fn landmarked_candidates(detections: Vec<RawDetection>) -> Vec<RawDetection> {
    let mut landmarked: Vec<RawDetection> = detections
        .into_iter()
        .filter(|d| d.keypoints.is_some())
        .collect();
    nms(&mut landmarked, NMS_IOU_THRESH)
}

/// Greedy NMS: highest confidence first, suppress overlaps above `iou_thresh`.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

/// Picks one landmarked detection: largest box or highest confidence.
fn select(dets: &[RawDetection], prefer_largest: bool) -> Option<&RawDetection> {
    let eligible = dets.iter().filter(|d| d.keypoints.is_some());
    if prefer_largest {
        eligible.max_by(|a, b| {
            a.bbox
                .area()
                .partial_cmp(&b.bbox.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    } else {
        eligible.max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
