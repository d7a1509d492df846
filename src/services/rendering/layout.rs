// Word wrap and font-size fitting for bubble text

use super::painter::TextPainter;
use crate::core::types::BBox;

/// A wrapped block of text at one font size
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub font_size: u32,
    pub lines: Vec<String>,
    pub line_widths: Vec<f32>,
    pub line_height: f32,
    /// Widest line
    pub width: f32,
    pub height: f32,
    /// Whether the block fits the draw area; false for the floor-size fallback
    pub fits: bool,
}

/// Greedily pack words onto lines no wider than `max_width`.
///
/// Words are never split: a word wider than `max_width` gets a line of its
/// own. Whitespace-only input produces no lines.
pub fn wrap_words(painter: &mut dyn TextPainter, text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{} {}", current, word);
        if painter.line_width(&candidate, size) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wrap and measure `text` at a single size
pub fn layout_at(painter: &mut dyn TextPainter, text: &str, size: u32, max_width: f32) -> TextLayout {
    let size_px = size as f32;
    let lines = wrap_words(painter, text, size_px, max_width);
    let line_widths: Vec<f32> = lines.iter().map(|line| painter.line_width(line, size_px)).collect();
    let line_height = painter.line_height(size_px);

    TextLayout {
        font_size: size,
        width: line_widths.iter().copied().fold(0.0, f32::max),
        height: line_height * lines.len() as f32,
        lines,
        line_widths,
        line_height,
        fits: false,
    }
}

/// Largest size in `floor..=start` whose wrapped block fits strictly inside
/// `area_width` x `area_height`.
///
/// Sizes are tried from `start` downwards. When none fit, the floor-size
/// layout is returned with `fits == false` instead of failing.
pub fn fit_text(
    painter: &mut dyn TextPainter,
    text: &str,
    area_width: f32,
    area_height: f32,
    start: u32,
    floor: u32,
) -> TextLayout {
    let floor = floor.max(1);
    let start = start.max(floor);

    for size in (floor..=start).rev() {
        let mut layout = layout_at(painter, text, size, area_width);
        if layout.width < area_width && layout.height < area_height {
            layout.fits = true;
            return layout;
        }
        if size == floor {
            return layout;
        }
    }

    // Unreachable in practice: the range always contains `floor`
    layout_at(painter, text, floor, area_width)
}

/// Area available for text inside `bbox` after removing `padding` in total
/// from each axis. Never collapses below 1px.
pub fn draw_area(bbox: &BBox, padding: u32) -> (f32, f32) {
    let padding = padding as i32;
    (
        (bbox.width() - padding).max(1) as f32,
        (bbox.height() - padding).max(1) as f32,
    )
}

/// Top-left corner of each line: the block is centred in `bbox` and each
/// line is centred within the block.
pub fn line_origins(layout: &TextLayout, bbox: &BBox) -> Vec<(i32, i32)> {
    let block_x = bbox.x1 as f32 + (bbox.width() as f32 - layout.width) / 2.0;
    let block_y = bbox.y1 as f32 + (bbox.height() as f32 - layout.height) / 2.0;

    layout
        .line_widths
        .iter()
        .enumerate()
        .map(|(i, line_width)| {
            let x = block_x + (layout.width - line_width) / 2.0;
            let y = block_y + i as f32 * layout.line_height;
            (x.floor() as i32, y.floor() as i32)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Every character is `size * 0.5` px wide
    pub(crate) struct MonoPainter;

    impl TextPainter for MonoPainter {
        fn line_width(&mut self, text: &str, size: f32) -> f32 {
            text.chars().count() as f32 * size * 0.5
        }

        fn draw_line(&mut self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>) {
            // Fill the line box so tests can see where text went
            let w = self.line_width(text, size) as i32;
            let h = self.line_height(size) as i32;
            for py in y.max(0)..(y + h).min(canvas.height() as i32) {
                for px in x.max(0)..(x + w).min(canvas.width() as i32) {
                    canvas.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }

    #[test]
    fn test_wrap_packs_greedily() {
        // size 10 → 5px per char
        let lines = wrap_words(&mut MonoPainter, "aa bb cc dd", 10.0, 25.0);
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn test_wrap_never_splits_words() {
        let text = "a extraordinarily b";
        let lines = wrap_words(&mut MonoPainter, text, 10.0, 20.0);

        assert_eq!(lines, vec!["a", "extraordinarily", "b"]);
        let rejoined: Vec<&str> = lines.iter().flat_map(|l| l.split(' ')).collect();
        assert_eq!(rejoined, text.split(' ').collect::<Vec<_>>());
    }

    #[test]
    fn test_wrap_long_first_word_has_no_empty_line() {
        let lines = wrap_words(&mut MonoPainter, "supercalifragilistic ok", 10.0, 10.0);
        assert_eq!(lines, vec!["supercalifragilistic", "ok"]);
        assert!(wrap_words(&mut MonoPainter, "   ", 10.0, 10.0).is_empty());
    }

    #[test]
    fn test_fit_picks_largest_size_that_fits() {
        // "hello" = 5 chars → 2.5 * size wide, 1.2 * size tall on one line
        let layout = fit_text(&mut MonoPainter, "hello", 60.0, 100.0, 30, 8);

        assert!(layout.fits);
        assert_eq!(layout.font_size, 23);
        assert!(layout.width < 60.0);
        assert_eq!(layout.lines, vec!["hello"]);
    }

    #[test]
    fn test_fit_starts_at_start_size() {
        let layout = fit_text(&mut MonoPainter, "hi", 500.0, 500.0, 30, 8);
        assert!(layout.fits);
        assert_eq!(layout.font_size, 30);
    }

    #[test]
    fn test_fit_falls_back_to_floor() {
        let layout = fit_text(&mut MonoPainter, "far too much text here", 5.0, 5.0, 30, 8);

        assert!(!layout.fits);
        assert_eq!(layout.font_size, 8);
        assert!(!layout.lines.is_empty());
    }

    #[test]
    fn test_fit_never_goes_below_floor() {
        for area in [1.0, 10.0, 40.0, 80.0] {
            let layout = fit_text(&mut MonoPainter, "some words to fit somewhere", area, area, 30, 8);
            assert!(layout.font_size >= 8);
        }
    }

    #[test]
    fn test_draw_area_subtracts_padding() {
        assert_eq!(draw_area(&BBox::new(0, 0, 100, 60), 15), (85.0, 45.0));
        assert_eq!(draw_area(&BBox::new(0, 0, 10, 10), 15), (1.0, 1.0));
    }

    #[test]
    fn test_lines_centred_in_bbox() {
        let layout = layout_at(&mut MonoPainter, "aaaa bb", 10, 20.0);
        assert_eq!(layout.lines, vec!["aaaa", "bb"]);

        let origins = line_origins(&layout, &BBox::new(100, 100, 140, 140));
        // Block is 20 x 24: x from 110, y from 108; "bb" is 10 wide → x 115
        assert_eq!(origins, vec![(110, 108), (115, 120)]);
    }
}
