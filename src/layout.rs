use serde::Serialize;

use crate::font::{FontRegistry, Weight};
use crate::markup::{Alignment, QuoteLine, ResolvedStyle, SizeTier};

pub const SMALL_TIER_RATIO: f32 = 0.8;
pub const LINE_PITCH: f32 = 1.6;
/// Overflowing text never shrinks below this share of its nominal size.
pub const MIN_SHRINK_RATIO: f32 = 0.6;
pub const ELLIPSIS: &str = "…";
/// Weight quotation lines and divider captions are drawn at.
pub const QUOTE_WEIGHT: Weight = Weight::Regular;

const DIVIDER_MIN_FONT_SIZE: f32 = 8.0;
const DIVIDER_RULE_SPAN: f32 = 0.75;

/// Placement of one quotation line inside the quotation block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineGeometry {
    /// Left edge of the line's region relative to the block.
    pub region_x: f32,
    /// Text start relative to the region.
    pub origin_x: f32,
    pub region_width: f32,
    pub draw_width: f32,
    pub font_size: f32,
    pub text: String,
}

impl LineGeometry {
    pub fn x(&self) -> f32 {
        self.region_x + self.origin_x
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedText {
    pub text: String,
    pub font_size: f32,
    pub width: f32,
}

pub fn tier_font_size(tier: SizeTier, normal_size: f32) -> f32 {
    match tier {
        SizeTier::Normal => normal_size,
        SizeTier::Small => (normal_size * SMALL_TIER_RATIO).floor(),
    }
}

/// Fits `text` drawn at `weight` into `max_width`: shrink proportionally
/// down to `MIN_SHRINK_RATIO`, then truncate with an ellipsis. The returned
/// width is the measured width of the returned text and never exceeds
/// `max_width`.
pub fn fit_text(
    text: &str,
    font_size: f32,
    max_width: f32,
    weight: Weight,
    fonts: &FontRegistry,
) -> FittedText {
    let max_width = max_width.max(0.0);
    let measured = fonts.measure(text, font_size, weight);
    if measured <= max_width {
        return FittedText {
            text: text.to_string(),
            font_size,
            width: measured,
        };
    }

    let floor = font_size * MIN_SHRINK_RATIO;
    let mut shrunk = (font_size * max_width / measured).max(floor);
    let mut width = fonts.measure(text, shrunk, weight);
    // Proportional sizing can land a rounding error above the limit.
    if width > max_width && shrunk > floor {
        shrunk = (shrunk * 0.999).max(floor);
        width = fonts.measure(text, shrunk, weight);
    }
    if width <= max_width {
        return FittedText {
            text: text.to_string(),
            font_size: shrunk,
            width,
        };
    }

    truncate(text, shrunk, max_width, weight, fonts)
}

/// Longest prefix of `text` that fits with a trailing ellipsis, found in one
/// pass over the character advances.
fn truncate(
    text: &str,
    font_size: f32,
    max_width: f32,
    weight: Weight,
    fonts: &FontRegistry,
) -> FittedText {
    let ellipsis = fonts.measure(ELLIPSIS, font_size, weight);
    if ellipsis > max_width {
        return FittedText {
            text: String::new(),
            font_size,
            width: 0.0,
        };
    }

    // (byte end, width) of each prefix ending on a non-whitespace char.
    let mut cut = (0, 0.0);
    let mut used = 0.0;
    for ((idx, ch), advance) in text.char_indices().zip(fonts.advances(text, font_size, weight)) {
        used += advance;
        if used + ellipsis > max_width {
            break;
        }
        if !ch.is_whitespace() {
            cut = (idx + ch.len_utf8(), used);
        }
    }

    let (end, head_width) = cut;
    FittedText {
        text: format!("{}{}", &text[..end], ELLIPSIS),
        font_size,
        width: head_width + ellipsis,
    }
}

/// Computes where a styled line is drawn inside a block of width `block_width`.
pub fn layout_line(
    text: &str,
    style: &ResolvedStyle,
    block_width: f32,
    normal_size: f32,
    fonts: &FontRegistry,
) -> LineGeometry {
    let region_width = (block_width * style.width_fraction).max(0.0);
    let font_size = tier_font_size(style.size_tier, normal_size);
    let fitted = fit_text(text.trim(), font_size, region_width, QUOTE_WEIGHT, fonts);
    let slack = (region_width - fitted.width).max(0.0);

    let region_x = match style.alignment {
        Alignment::Default | Alignment::Left => 0.0,
        Alignment::Center => (block_width - region_width) / 2.0,
        Alignment::Right => block_width - region_width,
    };
    let origin_x = match style.alignment {
        Alignment::Default | Alignment::Left => 0.0,
        Alignment::Center => slack / 2.0,
        Alignment::Right => slack,
    };

    LineGeometry {
        region_x,
        origin_x,
        region_width,
        draw_width: fitted.width,
        font_size: fitted.font_size,
        text: fitted.text,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlacedLine {
    Text {
        y: f32,
        geometry: LineGeometry,
    },
    Divider {
        /// Vertical centre of the caption and rules.
        mid_y: f32,
        caption: FittedText,
        caption_x: f32,
        rule_start: f32,
        rule_end: f32,
    },
    Spacer {
        y: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteBlock {
    pub lines: Vec<PlacedLine>,
    pub height: f32,
}

/// Stacks quotation lines top to bottom. `y` values are relative to the
/// block top and mark the top of each line box.
pub fn layout_block(
    lines: &[QuoteLine],
    block_width: f32,
    normal_size: f32,
    fonts: &FontRegistry,
) -> QuoteBlock {
    let normal_height = fonts.glyph_height('高', normal_size, QUOTE_WEIGHT);
    let mut placed = Vec::with_capacity(lines.len());
    let mut cursor = 0.0;

    for line in lines {
        let text = line.display_text.trim();
        if line.is_divider() {
            let padding = normal_height * 0.25;
            if text.is_empty() {
                placed.push(PlacedLine::Spacer {
                    y: cursor,
                    height: padding,
                });
                cursor += padding;
                continue;
            }
            let caption_size = (normal_size / 1.5).floor().max(DIVIDER_MIN_FONT_SIZE);
            let caption_height = fonts.glyph_height('H', caption_size, QUOTE_WEIGHT);
            let caption = fit_text(text, caption_size, block_width * 0.5, QUOTE_WEIGHT, fonts);
            let center = block_width / 2.0;
            let half_span = block_width * 0.5 * DIVIDER_RULE_SPAN;
            placed.push(PlacedLine::Divider {
                mid_y: cursor + padding + caption_height / 2.0,
                caption_x: center - caption.width / 2.0,
                caption,
                rule_start: center - half_span,
                rule_end: center + half_span,
            });
            cursor += padding * 2.0 + caption_height;
            continue;
        }

        if text.is_empty() {
            let height = normal_height * LINE_PITCH;
            placed.push(PlacedLine::Spacer { y: cursor, height });
            cursor += height;
            continue;
        }

        let style = line.style();
        let geometry = layout_line(text, &style, block_width, normal_size, fonts);
        let pitch = fonts.glyph_height('高', tier_font_size(style.size_tier, normal_size), QUOTE_WEIGHT)
            * LINE_PITCH;
        placed.push(PlacedLine::Text {
            y: cursor,
            geometry,
        });
        cursor += pitch;
    }

    QuoteBlock {
        lines: placed,
        height: cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{resolve_style, tokenize, Tag};

    const W: f32 = 600.0;
    const SIZE: f32 = 34.0;

    fn geometry(line: &str) -> LineGeometry {
        let fonts = FontRegistry::estimated();
        let parsed = &tokenize(line)[0];
        layout_line(&parsed.display_text, &parsed.style(), W, SIZE, &fonts)
    }

    #[test]
    fn default_and_left_start_at_block_edge() {
        let plain = geometry("Plain text");
        assert_eq!(plain.x(), 0.0);
        assert_eq!(plain.region_width, W);
        let left = geometry("[:-]Hello");
        assert_eq!(left.x(), 0.0);
        assert_eq!(left.region_width, W * 0.8);
    }

    #[test]
    fn right_alignment_touches_region_edge() {
        let right = geometry("[-:]World");
        assert!((right.origin_x + right.draw_width - right.region_width).abs() < 1e-3);
        assert!((right.x() + right.draw_width - W).abs() < 1e-3);
    }

    #[test]
    fn centered_region_is_centered_in_block() {
        let center = geometry("[:-:]Echo");
        assert!((center.region_x - W * 0.1).abs() < 1e-3);
        let left_gap = center.x();
        let right_gap = W - (center.x() + center.draw_width);
        assert!((left_gap - right_gap).abs() < 1e-3);
    }

    #[test]
    fn small_tier_uses_reduced_font() {
        assert_eq!(geometry("[:_:]Echo").font_size, 27.0);
        assert_eq!(geometry("[:-:]Echo").font_size, SIZE);
        assert_eq!(tier_font_size(SizeTier::Small, 40.0), 32.0);
    }

    #[test]
    fn draw_width_stays_inside_region() {
        let long = "a very long line of text that will never fit ".repeat(8);
        for prefix in ["", "[:-]", "[-:]", "[:-:]", "[:_]", "[_:]", "[:_:]"] {
            let geo = geometry(&format!("{prefix}{long}"));
            assert!(geo.draw_width >= 0.0);
            assert!(geo.draw_width <= geo.region_width + 1e-3, "{prefix}");
            assert!(geo.origin_x >= 0.0);
        }
    }

    #[test]
    fn mild_overflow_shrinks_font() {
        let fonts = FontRegistry::estimated();
        let text = "0123456789";
        let natural = fonts.measure(text, SIZE, QUOTE_WEIGHT);
        let fitted = fit_text(text, SIZE, natural * 0.8, QUOTE_WEIGHT, &fonts);
        assert_eq!(fitted.text, text);
        assert!(fitted.font_size < SIZE);
        assert!(fitted.font_size >= SIZE * MIN_SHRINK_RATIO);
        assert!(fitted.width <= natural * 0.8);
    }

    #[test]
    fn heavy_overflow_truncates_with_ellipsis() {
        let fonts = FontRegistry::estimated();
        let text = "0123456789".repeat(10);
        let natural = fonts.measure(&text, SIZE, QUOTE_WEIGHT);
        let fitted = fit_text(&text, SIZE, natural * 0.2, QUOTE_WEIGHT, &fonts);
        assert!(fitted.text.ends_with(ELLIPSIS));
        assert!(fitted.text.starts_with("0123"));
        assert_eq!(fitted.font_size, SIZE * MIN_SHRINK_RATIO);
        assert!(fitted.width <= natural * 0.2);
    }

    #[test]
    fn truncation_drops_trailing_whitespace_before_ellipsis() {
        let fonts = FontRegistry::estimated();
        let text = "ab cd ef gh ij kl mn op qr st uv wx yz ".repeat(4);
        for share in [0.1, 0.15, 0.2, 0.25, 0.3] {
            let max = fonts.measure(&text, SIZE, QUOTE_WEIGHT) * share;
            let fitted = fit_text(&text, SIZE, max, QUOTE_WEIGHT, &fonts);
            let head = fitted.text.trim_end_matches(ELLIPSIS);
            assert_eq!(head, head.trim_end(), "{share}");
            assert!(fitted.width <= max);
        }
    }

    #[test]
    fn reported_width_is_the_drawn_width() {
        let fonts = FontRegistry::estimated();
        let text = "Wandering Through Midnight Avenues";
        let natural = fonts.measure(text, SIZE, Weight::Semibold);
        for step in 1..40 {
            let max = natural * (1.0 - step as f32 * 0.02);
            let fitted = fit_text(text, SIZE, max, Weight::Semibold, &fonts);
            let drawn = fonts.measure(&fitted.text, fitted.font_size, Weight::Semibold);
            assert!(fitted.width <= max, "{max}");
            assert!((fitted.width - drawn).abs() < 1e-3, "{max}");
        }
    }

    #[test]
    fn heavier_weight_is_fitted_at_its_own_width() {
        let fonts = FontRegistry::estimated();
        let text = "Wandering Through Midnight Avenues";
        let regular = fonts.measure(text, 44.0, Weight::Regular);
        assert_eq!(fit_text(text, 44.0, regular, Weight::Regular, &fonts).font_size, 44.0);

        let fitted = fit_text(text, 44.0, regular, Weight::Semibold, &fonts);
        assert!(fitted.font_size < 44.0);
        assert!(fonts.measure(&fitted.text, fitted.font_size, Weight::Semibold) <= regular);
    }

    #[test]
    fn very_long_line_truncates_without_caching_candidates() {
        let fonts = FontRegistry::estimated();
        let text = "a".repeat(200_000);
        let fitted = fit_text(&text, SIZE, 480.0, QUOTE_WEIGHT, &fonts);
        assert!(fitted.text.ends_with(ELLIPSIS));
        assert!(fitted.width <= 480.0);
        assert!(fitted.text.chars().count() < 100);
        assert!(fonts.cached_widths() <= 4);
    }

    #[test]
    fn zero_width_region_draws_nothing() {
        let fonts = FontRegistry::estimated();
        let fitted = fit_text("abc", SIZE, 0.0, QUOTE_WEIGHT, &fonts);
        assert_eq!(fitted.text, "");
        assert_eq!(fitted.width, 0.0);
    }

    #[test]
    fn block_stacks_lines_in_order() {
        let fonts = FontRegistry::estimated();
        let lines = tokenize("[:-]Hello\n\n[-:]World\n[-]Chorus\n[-]");
        let block = layout_block(&lines, W, SIZE, &fonts);
        assert_eq!(block.lines.len(), 5);
        let mut last = -1.0;
        for line in &block.lines {
            let y = match line {
                PlacedLine::Text { y, .. } | PlacedLine::Spacer { y, .. } => *y,
                PlacedLine::Divider { mid_y, .. } => *mid_y,
            };
            assert!(y > last);
            last = y;
        }
        assert!(matches!(block.lines[1], PlacedLine::Spacer { .. }));
        assert!(matches!(block.lines[3], PlacedLine::Divider { .. }));
        assert!(block.height > 0.0);
    }

    #[test]
    fn styles_follow_resolver() {
        let tag = Tag::Align {
            alignment: Alignment::Right,
            tier: SizeTier::Small,
        };
        let fonts = FontRegistry::estimated();
        let geo = layout_line("x", &resolve_style(Some(&tag)), W, SIZE, &fonts);
        assert_eq!(geo.region_width, W * 0.8);
        assert_eq!(geo.font_size, 27.0);
    }
}
