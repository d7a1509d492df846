use crate::core::config::DetectionConfig;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::BBox;
use crate::services::onnx_builder;
use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, trace};

/// Thresholds handed to the detection backend on every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_agnostic: bool,
    pub max_detections: usize,
}

impl From<&DetectionConfig> for DetectParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            class_agnostic: config.class_agnostic,
            max_detections: config.max_detections,
        }
    }
}

/// A single scored rectangle from a backend, in page pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
}

/// Object detection capability
pub trait DetectorBackend: Send {
    fn detect(&self, image: &DynamicImage, params: &DetectParams) -> Result<Vec<Detection>>;
}

/// Produces bubble rectangles for a page.
///
/// An empty result is a valid outcome (textless page), not an error.
pub struct BubbleDetector {
    backend: Box<dyn DetectorBackend>,
    params: DetectParams,
}

impl BubbleDetector {
    pub fn new(backend: Box<dyn DetectorBackend>, params: DetectParams) -> Self {
        Self { backend, params }
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    pub fn detect(&self, image: &DynamicImage) -> DetectionResult<Vec<BBox>> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImageSize { width, height });
        }

        let start = Instant::now();
        let detections = self
            .backend
            .detect(image, &self.params)
            .map_err(DetectionError::Backend)?;

        let boxes: Vec<BBox> = detections
            .into_iter()
            .take(self.params.max_detections)
            .map(|d| d.bbox.clamp_to(width, height))
            .filter(|b| !b.is_empty())
            .collect();

        debug!(
            "✓ Detected {} bubbles in {:.2}ms",
            boxes.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(boxes)
    }
}

/// YOLO-style detector: one input image tensor, one `[1, 4 + classes, N]` output
/// with centre/size boxes in input-pixel coordinates.
pub struct OnnxDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
}

impl OnnxDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let session = onnx_builder::build_session(&config.detector_model_path, config.onnx_threads)?;
        let input_name = onnx_builder::input_name(&session, 0)?;
        let output_name = onnx_builder::output_name(&session, 0)?;

        debug!(
            "Detector model: input='{}', output='{}', size={}",
            input_name, output_name, config.input_size
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size: config.input_size,
        })
    }

    fn preprocess_image(&self, img: &DynamicImage) -> Array4<f32> {
        let target = self.input_size;
        trace!("Preprocessing image: {}x{} → {}x{}", img.width(), img.height(), target, target);

        let resized = img.resize_exact(target, target, image::imageops::FilterType::Triangle);
        let rgb_img = resized.to_rgb8();

        let size = target as usize;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        array
    }
}

impl DetectorBackend for OnnxDetector {
    fn detect(&self, image: &DynamicImage, params: &DetectParams) -> Result<Vec<Detection>> {
        let tensor = self.preprocess_image(image);
        let input = Value::from_array(tensor)?;

        let inference_start = Instant::now();
        let (dims, data) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
            let (shape, data) = outputs[self.output_name.as_str()]
                .try_extract_tensor::<f32>()
                .context("Detector output is not an f32 tensor")?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            (dims, data.to_vec())
        };
        debug!(
            "✓ Inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        let candidates = decode_predictions(&data, &dims, scale_x, scale_y, params.confidence_threshold)?;

        Ok(non_max_suppression(
            candidates,
            params.iou_threshold,
            params.class_agnostic,
            params.max_detections,
        ))
    }
}

/// Turn raw YOLO output into scored boxes above `confidence_threshold`.
///
/// Accepts both `[1, 4 + C, N]` and the transposed `[1, N, 4 + C]` layout.
pub fn decode_predictions(
    data: &[f32],
    dims: &[usize],
    scale_x: f32,
    scale_y: f32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let (rows, cols) = match dims {
        [1, a, b] => (*a, *b),
        [a, b] => (*a, *b),
        _ => anyhow::bail!("Unexpected detector output shape: {:?}", dims),
    };
    if data.len() < rows * cols {
        anyhow::bail!("Detector output has {} values, expected {}", data.len(), rows * cols);
    }

    // Fewer attributes than candidates in any real export
    let channels_first = rows <= cols;
    let (attributes, candidates) = if channels_first { (rows, cols) } else { (cols, rows) };
    if attributes < 5 {
        anyhow::bail!("Detector output has {} attributes per box, need at least 5", attributes);
    }

    let value = |attr: usize, idx: usize| {
        if channels_first {
            data[attr * candidates + idx]
        } else {
            data[idx * attributes + attr]
        }
    };

    let mut detections = Vec::new();
    for i in 0..candidates {
        let (class_id, confidence) = (4..attributes)
            .map(|attr| (attr - 4, value(attr, i)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (value(0, i), value(1, i), value(2, i), value(3, i));
        let bbox = BBox::new(
            ((cx - w / 2.0) * scale_x).round() as i32,
            ((cy - h / 2.0) * scale_y).round() as i32,
            ((cx + w / 2.0) * scale_x).round() as i32,
            ((cy + h / 2.0) * scale_y).round() as i32,
        );
        if !bbox.is_empty() {
            detections.push(Detection { bbox, confidence, class_id });
        }
    }

    trace!("Raw detections above threshold: {}", detections.len());
    Ok(detections)
}

/// Greedy NMS, highest confidence first. Output is sorted by confidence
/// and capped at `max_detections`.
pub fn non_max_suppression(
    detections: Vec<Detection>,
    iou_threshold: f32,
    class_agnostic: bool,
    max_detections: usize,
) -> Vec<Detection> {
    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep.len() >= max_detections {
            break;
        }
        let suppressed = keep.iter().any(|kept| {
            (class_agnostic || kept.class_id == candidate.class_id)
                && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }

    debug!("NMS: kept {} detections", keep.len());
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32, class_id: usize) -> Detection {
        Detection {
            bbox: BBox::new(x1, y1, x2, y2),
            confidence,
            class_id,
        }
    }

    struct FixedBackend(Vec<Detection>);

    impl DetectorBackend for FixedBackend {
        fn detect(&self, _image: &DynamicImage, _params: &DetectParams) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn params(max_detections: usize) -> DetectParams {
        DetectParams {
            confidence_threshold: 0.15,
            iou_threshold: 0.7,
            class_agnostic: true,
            max_detections,
        }
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let detections = vec![
            det(0, 0, 100, 100, 0.6, 0),
            det(2, 2, 100, 100, 0.9, 1),
            det(200, 200, 260, 260, 0.4, 0),
        ];

        let agnostic = non_max_suppression(detections.clone(), 0.7, true, 50);
        assert_eq!(agnostic.len(), 2);
        assert_eq!(agnostic[0].confidence, 0.9);

        // Different classes survive when suppression is per class
        let per_class = non_max_suppression(detections, 0.7, false, 50);
        assert_eq!(per_class.len(), 3);
    }

    #[test]
    fn test_nms_caps_detections() {
        let detections: Vec<Detection> = (0..10)
            .map(|i| det(i * 20, 0, i * 20 + 10, 10, 0.5 + i as f32 * 0.01, 0))
            .collect();
        let kept = non_max_suppression(detections, 0.7, true, 3);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].bbox.x1, 180);
    }

    #[test]
    fn test_decode_channels_first() {
        // Two candidates, one class: [cx, cy, w, h, score] per column
        let data = vec![
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            10.0, 4.0, // h
            0.9, 0.1, // score
        ];
        let boxes = decode_predictions(&data, &[1, 5, 2], 2.0, 1.0, 0.15).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].bbox, BBox::new(80, 45, 120, 55));
        assert_eq!(boxes[0].class_id, 0);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_predictions(&[0.0; 8], &[1, 2, 2, 2], 1.0, 1.0, 0.1).is_err());
    }

    #[test]
    fn test_detector_clamps_and_drops_outside_boxes() {
        let detector = BubbleDetector::new(
            Box::new(FixedBackend(vec![
                det(-10, 5, 40, 30, 0.9, 0),
                det(500, 500, 600, 600, 0.8, 0),
            ])),
            params(50),
        );
        let page = DynamicImage::ImageRgb8(RgbImage::new(100, 100));

        let boxes = detector.detect(&page).unwrap();
        assert_eq!(boxes, vec![BBox::new(0, 5, 40, 30)]);
    }

    #[test]
    fn test_detector_empty_page_is_not_an_error() {
        let detector = BubbleDetector::new(Box::new(FixedBackend(vec![])), params(50));
        let page = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        assert!(detector.detect(&page).unwrap().is_empty());
    }

    #[test]
    fn test_detector_rejects_zero_sized_image() {
        let detector = BubbleDetector::new(Box::new(FixedBackend(vec![])), params(50));
        let page = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            detector.detect(&page),
            Err(DetectionError::InvalidImageSize { .. })
        ));
    }
}
