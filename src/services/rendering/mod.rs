pub mod layout;
pub mod painter;
pub mod text_removal;

pub use layout::{fit_text, wrap_words, TextLayout};
pub use painter::{CosmicTextPainter, TextPainter};

use crate::core::config::RenderingConfig;
use crate::core::errors::RenderingResult;
use crate::core::types::Bubble;
use crate::services::font_manager::FontFace;
use image::{Rgb, RgbImage};
use tracing::{debug, info, warn};

/// Translated text is always drawn in black
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Sizing rules for the text drawing phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub start_font_size: u32,
    pub min_font_size: u32,
    pub padding: u32,
    pub inpaint_radius: f64,
}

impl From<&RenderingConfig> for TextStyle {
    fn from(config: &RenderingConfig) -> Self {
        Self {
            start_font_size: config.default_font_size + 2,
            min_font_size: config.min_font_size,
            padding: config.text_padding,
            inpaint_radius: config.inpaint_radius,
        }
    }
}

/// Erases the original lettering and draws translations in its place
pub struct PageRenderer {
    painter: Box<dyn TextPainter>,
    style: TextStyle,
}

impl PageRenderer {
    pub fn new(painter: Box<dyn TextPainter>, style: TextStyle) -> Self {
        Self { painter, style }
    }

    /// Load the font from `config` and build a cosmic-text backed renderer
    pub fn from_config(config: &RenderingConfig) -> RenderingResult<Self> {
        let face = FontFace::load(&config.font_path)?;
        info!("✓ Renderer initialized with {}", face.family());
        Ok(Self::new(Box::new(CosmicTextPainter::new(face)), config.into()))
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Produce a new page with every bubble's text removed and each
    /// non-empty translation drawn centred in its bubble.
    pub fn render(&mut self, page: &RgbImage, bubbles: &[Bubble]) -> RenderingResult<RgbImage> {
        if bubbles.is_empty() {
            return Ok(page.clone());
        }

        let boxes: Vec<_> = bubbles.iter().map(|b| b.bbox).collect();
        let mut canvas = text_removal::remove_text(page, &boxes, self.style.inpaint_radius)?;

        for bubble in bubbles.iter().filter(|b| !b.translated_text.trim().is_empty()) {
            self.draw_bubble(&mut canvas, bubble);
        }

        Ok(canvas)
    }

    fn draw_bubble(&mut self, canvas: &mut RgbImage, bubble: &Bubble) {
        let (area_w, area_h) = layout::draw_area(&bubble.bbox, self.style.padding);
        let text_layout = layout::fit_text(
            self.painter.as_mut(),
            &bubble.translated_text,
            area_w,
            area_h,
            self.style.start_font_size,
            self.style.min_font_size,
        );

        if text_layout.fits {
            debug!(
                "Bubble {:?}: {} line(s) at {}px",
                bubble.bbox,
                text_layout.lines.len(),
                text_layout.font_size
            );
        } else {
            warn!(
                "Text overflows bubble {:?} even at {}px: '{}'",
                bubble.bbox, text_layout.font_size, bubble.translated_text
            );
        }

        let size = text_layout.font_size as f32;
        let origins = layout::line_origins(&text_layout, &bubble.bbox);
        for (line, (x, y)) in text_layout.lines.iter().zip(origins) {
            self.painter.draw_line(canvas, line, size, x, y, TEXT_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::layout::tests::MonoPainter;
    use super::*;
    use crate::core::types::BBox;

    fn style() -> TextStyle {
        TextStyle {
            start_font_size: 30,
            min_font_size: 8,
            padding: 15,
            inpaint_radius: 5.0,
        }
    }

    fn bubble(bbox: BBox, text: &str) -> Bubble {
        Bubble {
            bbox,
            original_text: "原文".to_string(),
            translated_text: text.to_string(),
        }
    }

    #[test]
    fn test_no_bubbles_returns_identical_page() {
        let mut renderer = PageRenderer::new(Box::new(MonoPainter), style());
        let mut page = RgbImage::from_pixel(40, 30, Rgb([200, 180, 160]));
        page.put_pixel(3, 4, Rgb([1, 2, 3]));

        assert_eq!(renderer.render(&page, &[]).unwrap(), page);
    }

    #[test]
    fn test_translation_drawn_inside_bubble() {
        let mut renderer = PageRenderer::new(Box::new(MonoPainter), style());
        let page = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let bbox = BBox::new(50, 50, 150, 120);

        let out = renderer.render(&page, &[bubble(bbox, "Hi there")]).unwrap();

        let inked: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == TEXT_COLOR)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!inked.is_empty());
        assert!(inked
            .iter()
            .all(|&(x, y)| (50..150).contains(&(x as i32)) && (50..120).contains(&(y as i32))));
    }

    #[test]
    fn test_empty_translation_is_only_erased() {
        let mut renderer = PageRenderer::new(Box::new(MonoPainter), style());
        let page = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));

        let out = renderer
            .render(&page, &[bubble(BBox::new(10, 10, 90, 90), "  ")])
            .unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn test_tiny_bubble_still_renders_at_floor() {
        let mut renderer = PageRenderer::new(Box::new(MonoPainter), style());
        let page = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));

        let out = renderer
            .render(&page, &[bubble(BBox::new(40, 40, 48, 48), "much too long for this")])
            .unwrap();
        assert!(out.pixels().any(|p| *p == TEXT_COLOR));
    }

    #[test]
    fn test_style_from_config_starts_two_above_default() {
        let config = RenderingConfig {
            font_path: "fonts/mangat.ttf".into(),
            default_font_size: 28,
            min_font_size: 8,
            text_padding: 15,
            inpaint_radius: 5.0,
        };
        let style = TextStyle::from(&config);
        assert_eq!(style.start_font_size, 30);
        assert_eq!(style.min_font_size, 8);
    }
}
