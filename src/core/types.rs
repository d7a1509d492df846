// Shared data model for the page translation pipeline

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page pixel coordinates (`x1 < x2`, `y1 < y2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i32 {
        self.width().max(0) * self.height().max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Clip to `[0, width) x [0, height)`
    pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
        let (w, h) = (width as i32, height as i32);
        BBox {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Intersection over union
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = ((x2 - x1) * (y2 - y1)) as f32;
        let union = self.area() as f32 + other.area() as f32 - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A detected text region with its recognized and translated text.
/// Lives for one page only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bubble {
    pub bbox: BBox,
    pub original_text: String,
    pub translated_text: String,
}

/// One row of the translation memory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationEntry {
    pub id: i64,
    pub source_text: String,
    pub translated_text: String,
    /// 0 = unreviewed machine output, > 0 = human-reviewed
    pub quality_score: i64,
    /// UTC, set by the store on insert
    pub created_at: NaiveDateTime,
}

impl TranslationEntry {
    pub fn is_reviewed(&self) -> bool {
        self.quality_score > 0
    }
}

/// What happened to a single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PageOutcome {
    /// Bubbles were found, translated and re-rendered
    Translated { bubbles: usize },
    /// No bubbles: the source file was copied through unchanged
    CopiedUnchanged,
}

/// Progress report emitted after each page of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    /// `completed / total`, 0.0..=1.0
    pub fraction: f32,
    /// Number of rows currently in the translation memory
    pub memory_entries: usize,
}

/// Batch result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub translated: usize,
    pub copied: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.translated + self.copied + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 0, 15, 10);
        let c = BBox::new(20, 20, 30, 30);

        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_clamp_to_page() {
        let clipped = BBox::new(-5, 10, 120, 90).clamp_to(100, 80);
        assert_eq!(clipped, BBox::new(0, 10, 100, 80));
        assert!(BBox::new(150, 0, 200, 10).clamp_to(100, 80).is_empty());
    }
}
