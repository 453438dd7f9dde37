//! Card composition: measures the card, then paints its layers back to front
//! into one SVG document and rasterises it.

mod background;
pub mod color;
mod qr;
mod svg;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Serialize;
use time::Date;
use tracing::{debug, info};

use crate::font::{FontRegistry, Weight};
use crate::layout::{fit_text, layout_block, FittedText, PlacedLine, QuoteBlock, QUOTE_WEIGHT};
use crate::markup::{tokenize, unescape_entities};
use crate::Mode;
use background::Surface;
use color::Rgb;
use svg::TextRun;

pub use svg::encode_png;

pub const CANVAS_WIDTH: u32 = 1000;
const MARGIN_TOP: f32 = 40.0;
const MARGIN_SIDE: f32 = 40.0;
const MARGIN_BOTTOM: f32 = 90.0;
const CARD_W: f32 = CANVAS_WIDTH as f32 - MARGIN_SIDE * 2.0;
const INNER_PAD: f32 = 40.0;
const CONTENT_LEFT_X: f32 = MARGIN_SIDE + INNER_PAD;
const CONTENT_RIGHT_X: f32 = MARGIN_SIDE + CARD_W - INNER_PAD;
const MAX_TEXT_W: f32 = CARD_W - INNER_PAD * 2.0;
const CARD_RADIUS: f32 = 40.0;
const COVER_RADIUS: f32 = 30.0;

const TITLE_SIZE: f32 = 44.0;
const ARTIST_SIZE: f32 = 26.0;
const DAY_SIZE: f32 = 90.0;
const MONTH_SIZE: f32 = 40.0;
pub const QUOTE_SIZE: f32 = 34.0;
const CAPTION_SIZE: f32 = 26.0;
const DECO_SIZE: f32 = 100.0;
const FOOTER_SIZE: f32 = 32.0;
const WATERMARK_SIZE: f32 = 22.0;

const CODE_SIZE: f32 = 120.0;
const CODE_GAP: f32 = 20.0;
const DATE_COLUMN: f32 = 240.0;
const SECTION_GAP: f32 = 30.0;
const WASH_STOPS: usize = 24;

const HEADER_WEIGHT: Weight = Weight::Semibold;

/// Layers in paint order. A card commits each present layer exactly once,
/// in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LayerKind {
    Background,
    Overlay,
    Cover,
    Metadata,
    Date,
    Quotation,
    Code,
}

impl LayerKind {
    fn id(self) -> &'static str {
        match self {
            LayerKind::Background => "background",
            LayerKind::Overlay => "overlay",
            LayerKind::Cover => "cover",
            LayerKind::Metadata => "metadata",
            LayerKind::Date => "date",
            LayerKind::Quotation => "quotation",
            LayerKind::Code => "code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub content: String,
    pub source: Option<String>,
}

/// Everything the card shows, fully resolved.
pub struct CardContent {
    pub title: String,
    pub artist: String,
    pub cover: RgbImage,
    pub date: Date,
    pub quote: Option<Quote>,
    pub code_url: Option<String>,
}

pub struct CardStyle {
    pub mode: Mode,
    pub inner_blurred: bool,
    pub show_code: bool,
    pub card_only: bool,
    pub footer_caption: String,
    pub watermark: Vec<String>,
}

impl CardStyle {
    fn shows_middle(&self) -> bool {
        !self.card_only && self.mode != Mode::Card
    }
}

/// The flattened card and the layers it was built from.
#[derive(Debug)]
pub struct Card {
    pub image: RgbImage,
    pub svg: String,
    pub layers: Vec<LayerKind>,
}

impl Card {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_layer(&self, kind: LayerKind) -> bool {
        self.layers.contains(&kind)
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

struct MiddleLayout {
    sep_y: f32,
    top: f32,
    height: f32,
    quote_x: f32,
    block: QuoteBlock,
}

struct CardLayout {
    height: u32,
    card_h: f32,
    header_top: f32,
    title: FittedText,
    title_h: f32,
    artist: FittedText,
    show_code: bool,
    middle: Option<MiddleLayout>,
}

impl CardLayout {
    fn measure(content: &CardContent, style: &CardStyle, fonts: &FontRegistry) -> Self {
        let show_code = style.show_code && content.code_url.is_some();
        let mut text_w = MAX_TEXT_W;
        if show_code {
            text_w -= CODE_SIZE + CODE_GAP;
        }

        let title = fit_text(content.title.trim(), TITLE_SIZE, text_w, HEADER_WEIGHT, fonts);
        let artist = fit_text(content.artist.trim(), ARTIST_SIZE, text_w, HEADER_WEIGHT, fonts);
        let title_h = fonts.glyph_height('高', title.font_size, HEADER_WEIGHT);
        let artist_h = fonts.glyph_height('高', artist.font_size, HEADER_WEIGHT);
        let text_block_h = title_h * 1.3 + 15.0 + artist_h * 1.5;
        let header_h = if show_code {
            text_block_h.max(CODE_SIZE)
        } else {
            text_block_h
        };

        let cover_size = MAX_TEXT_W;
        let header_top = MARGIN_TOP + INNER_PAD + cover_size + SECTION_GAP;
        let daily = style.mode == Mode::Daily;

        let (header_section_h, footer_h, middle) = if style.shows_middle() {
            let quote_x = CONTENT_LEFT_X + if daily { DATE_COLUMN } else { 0.0 };
            let quote_w = CONTENT_RIGHT_X - quote_x;
            let lines = content
                .quote
                .as_ref()
                .map(|quote| tokenize(&unescape_entities(&quote.content)))
                .unwrap_or_default();
            let block = layout_block(&lines, quote_w, QUOTE_SIZE, fonts);
            let padded = block.height + if daily { 70.0 } else { 30.0 };
            let sep_y = header_top + header_h + SECTION_GAP;
            let middle = MiddleLayout {
                sep_y,
                top: sep_y + 40.0,
                height: padded.max(200.0),
                quote_x,
                block,
            };
            let footer_h = if daily { 20.0 + 20.0 + 32.0 + 25.0 } else { 0.0 };
            (header_h + SECTION_GAP + 4.0 + 40.0, footer_h, Some(middle))
        } else {
            (header_h, 60.0, None)
        };

        let mut card_h = INNER_PAD + cover_size + header_section_h + footer_h;
        if let Some(middle) = &middle {
            card_h += SECTION_GAP + middle.height;
        }
        let height = (card_h + MARGIN_TOP + MARGIN_BOTTOM).ceil() as u32;

        Self {
            height,
            card_h,
            header_top,
            title,
            title_h,
            artist,
            show_code,
            middle,
        }
    }
}

/// Collects layer fragments and refuses out-of-order or repeated layers.
struct Composer {
    width: u32,
    height: u32,
    defs: String,
    layers: Vec<(LayerKind, String)>,
}

impl Composer {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            defs: String::new(),
            layers: Vec::new(),
        }
    }

    fn define(&mut self, fragment: &str) {
        self.defs.push_str(fragment);
    }

    fn commit(&mut self, kind: LayerKind, body: String) -> Result<()> {
        if let Some((last, _)) = self.layers.last() {
            if *last >= kind {
                return Err(anyhow!(
                    "layer {} committed after {}",
                    kind.id(),
                    last.id()
                ));
            }
        }
        debug!("layer committed: {}", kind.id());
        self.layers.push((kind, body));
        Ok(())
    }

    fn document(&self) -> String {
        let mut doc = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        if !self.defs.is_empty() {
            doc.push_str("<defs>");
            doc.push_str(&self.defs);
            doc.push_str("</defs>");
        }
        for (kind, body) in &self.layers {
            doc.push_str(&format!(r#"<g id="{}">"#, kind.id()));
            doc.push_str(body);
            doc.push_str("</g>");
        }
        doc.push_str("</svg>");
        doc
    }

    fn flatten(self, fonts: &FontRegistry) -> Result<Card> {
        let document = self.document();
        let rendered = svg::rasterize(&document, fonts)?;
        Ok(Card {
            image: svg::flatten(&rendered),
            svg: document,
            layers: self.layers.into_iter().map(|(kind, _)| kind).collect(),
        })
    }
}

pub fn compose(content: &CardContent, style: &CardStyle, fonts: &FontRegistry) -> Result<Card> {
    let layout = CardLayout::measure(content, style, fonts);
    let width = CANVAS_WIDTH;
    let height = layout.height;
    info!("composing card {}x{}", width, height);

    let theme = color::average_color(&content.cover);
    debug!("theme color {}", color::hex(theme));
    let backdrop = background::backdrop(&content.cover, width, height);
    let surface = Surface {
        backdrop: &backdrop,
        card_y: MARGIN_TOP as u32,
        card_h: layout.card_h as u32,
        inner_blurred: style.inner_blurred,
    };
    let mut composer = Composer::new(width, height);

    composer.commit(
        LayerKind::Background,
        svg::image(
            &svg::png_data_uri(&backdrop)?,
            0.0,
            0.0,
            width as f32,
            height as f32,
            None,
        ),
    )?;

    composer.define(&svg::rounded_clip(
        "card-clip",
        MARGIN_SIDE,
        MARGIN_TOP,
        CARD_W,
        layout.card_h,
        CARD_RADIUS,
    ));
    let overlay = if style.inner_blurred {
        build_wash(&mut composer, &backdrop, layout.card_h)?
    } else {
        format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}" fill="{fill}"/>"#,
            x = MARGIN_SIDE,
            y = MARGIN_TOP,
            w = CARD_W,
            h = layout.card_h,
            r = CARD_RADIUS,
            fill = color::hex(color::CARD_WHITE)
        )
    };
    composer.commit(LayerKind::Overlay, overlay)?;

    let cover_size = MAX_TEXT_W;
    let cover_y = MARGIN_TOP + INNER_PAD;
    let thumbnail = background::fit(&content.cover, cover_size as u32, cover_size as u32);
    composer.define(&svg::rounded_clip(
        "cover-clip",
        CONTENT_LEFT_X,
        cover_y,
        cover_size,
        cover_size,
        COVER_RADIUS,
    ));
    composer.commit(
        LayerKind::Cover,
        svg::image(
            &svg::png_data_uri(&thumbnail)?,
            CONTENT_LEFT_X,
            cover_y,
            cover_size,
            cover_size,
            Some("cover-clip"),
        ),
    )?;

    composer.commit(
        LayerKind::Metadata,
        metadata_layer(&layout, style, &surface, fonts),
    )?;

    if let Some(middle) = &layout.middle {
        if style.mode == Mode::Daily {
            composer.commit(
                LayerKind::Date,
                date_layer(content.date, middle, theme, &surface, fonts),
            )?;
        }
        if let Some(quote) = &content.quote {
            composer.commit(
                LayerKind::Quotation,
                quotation_layer(quote, middle, style, theme, &surface, fonts),
            )?;
        }
    }

    if layout.show_code {
        if let Some(url) = &content.code_url {
            let x = CONTENT_RIGHT_X - CODE_SIZE;
            let y = layout.header_top;
            let under = surface.sample(x, y, CODE_SIZE, CODE_SIZE);
            let fill = color::safe_code_color(theme, under);
            let glyph = qr::CodeGlyph::encode(url)?;
            composer.commit(LayerKind::Code, glyph.to_svg(x, y, CODE_SIZE, fill))?;
        }
    }

    composer.flatten(fonts)
}

fn build_wash(composer: &mut Composer, backdrop: &RgbImage, card_h: f32) -> Result<String> {
    let inner = background::inner_backdrop(
        backdrop,
        MARGIN_SIDE as u32,
        MARGIN_TOP as u32,
        CARD_W as u32,
        (card_h as u32).min(backdrop.height().saturating_sub(MARGIN_TOP as u32)),
    );
    let mut gradient = format!(
        r#"<linearGradient id="wash" gradientUnits="userSpaceOnUse" x1="0" y1="{top}" x2="0" y2="{bottom}">"#,
        top = MARGIN_TOP,
        bottom = MARGIN_TOP + card_h
    );
    for step in 0..=WASH_STOPS {
        let offset = step as f32 / WASH_STOPS as f32;
        gradient.push_str(&format!(
            r#"<stop offset="{offset:.4}" stop-color="{color}" stop-opacity="{alpha:.4}"/>"#,
            offset = offset,
            color = color::hex(color::CARD_WHITE),
            alpha = background::wash_alpha(offset * card_h, card_h)
        ));
    }
    gradient.push_str("</linearGradient>");
    composer.define(&gradient);

    let mut body = svg::image(
        &svg::png_data_uri(&inner)?,
        MARGIN_SIDE,
        MARGIN_TOP,
        inner.width() as f32,
        inner.height() as f32,
        Some("card-clip"),
    );
    body.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="url(#wash)" clip-path="url(#card-clip)"/>"#,
        x = MARGIN_SIDE,
        y = MARGIN_TOP,
        w = CARD_W,
        h = card_h
    ));
    Ok(body)
}

fn metadata_layer(
    layout: &CardLayout,
    style: &CardStyle,
    surface: &Surface<'_>,
    fonts: &FontRegistry,
) -> String {
    let mut body = String::new();
    let title_top = layout.header_top;
    body.push_str(&svg::text(
        &TextRun {
            text: &layout.title.text,
            x: CONTENT_LEFT_X,
            top: title_top,
            size: layout.title.font_size,
            weight: HEADER_WEIGHT,
            fill: color::MAIN,
        },
        fonts,
    ));
    body.push_str(&svg::text(
        &TextRun {
            text: &layout.artist.text,
            x: CONTENT_LEFT_X,
            top: title_top + layout.title_h * 1.3 + 15.0,
            size: layout.artist.font_size,
            weight: HEADER_WEIGHT,
            fill: color::SUB,
        },
        fonts,
    ));

    if let Some(middle) = &layout.middle {
        body.push_str(&svg::dotted_rule(
            CONTENT_LEFT_X,
            CONTENT_RIGHT_X,
            middle.sep_y,
            20.0,
            2.0,
            color::ACCENT,
        ));
    }

    let canvas_h = layout.height as f32;
    let outer_y = MARGIN_TOP + layout.card_h + 20.0;
    let outer_right = MARGIN_SIDE + CARD_W;
    let watermark_color = color::contrasting_text_color(surface.sample_backdrop(
        CANVAS_WIDTH as f32 - 300.0,
        canvas_h - 80.0,
        300.0,
        80.0,
    ));
    for (idx, line) in style.watermark.iter().enumerate() {
        body.push_str(&right_aligned(
            line,
            outer_right,
            outer_y + idx as f32 * 30.0,
            WATERMARK_SIZE,
            Weight::Regular,
            watermark_color,
            fonts,
        ));
    }
    body
}

fn date_layer(
    date: Date,
    middle: &MiddleLayout,
    theme: Rgb,
    surface: &Surface<'_>,
    fonts: &FontRegistry,
) -> String {
    let x = CONTENT_LEFT_X + 20.0;
    let month = month_abbr(date);
    let month_fill = color::month_color(surface.sample(x, middle.top, 80.0, 40.0), theme);
    let mut body = svg::text(
        &TextRun {
            text: &month,
            x,
            top: middle.top,
            size: MONTH_SIZE,
            weight: Weight::Medium,
            fill: month_fill,
        },
        fonts,
    );
    let day = date.day().to_string();
    body.push_str(&svg::text(
        &TextRun {
            text: &day,
            x,
            top: middle.top + fonts.glyph_height('A', MONTH_SIZE, Weight::Medium) + 10.0,
            size: DAY_SIZE,
            weight: Weight::Medium,
            fill: color::MAIN,
        },
        fonts,
    ));
    body
}

fn quotation_layer(
    quote: &Quote,
    middle: &MiddleLayout,
    style: &CardStyle,
    theme: Rgb,
    surface: &Surface<'_>,
    fonts: &FontRegistry,
) -> String {
    let mut body = String::new();
    let top = middle.top + 5.0;

    for line in &middle.block.lines {
        match line {
            PlacedLine::Text { y, geometry } => {
                if geometry.text.is_empty() {
                    continue;
                }
                body.push_str(&svg::text(
                    &TextRun {
                        text: &geometry.text,
                        x: middle.quote_x + geometry.x(),
                        top: top + y,
                        size: geometry.font_size,
                        weight: QUOTE_WEIGHT,
                        fill: color::QUOTE,
                    },
                    fonts,
                ));
            }
            PlacedLine::Divider {
                mid_y,
                caption,
                caption_x,
                rule_start,
                rule_end,
            } => {
                let y = top + mid_y;
                let left_end = caption_x - 8.0;
                let right_start = caption_x + caption.width + 8.0;
                if left_end > *rule_start {
                    body.push_str(&svg::dotted_rule(
                        middle.quote_x + rule_start,
                        middle.quote_x + left_end,
                        y - 0.5,
                        4.0,
                        0.5,
                        color::QUOTE,
                    ));
                }
                if right_start < *rule_end {
                    body.push_str(&svg::dotted_rule(
                        middle.quote_x + right_start,
                        middle.quote_x + rule_end,
                        y - 0.5,
                        4.0,
                        0.5,
                        color::QUOTE,
                    ));
                }
                let baseline = y + fonts.glyph_height('H', caption.font_size, QUOTE_WEIGHT) / 2.0;
                body.push_str(&svg::text_at_baseline(
                    &TextRun {
                        text: &caption.text,
                        x: middle.quote_x + caption_x,
                        top: y,
                        size: caption.font_size,
                        weight: QUOTE_WEIGHT,
                        fill: color::QUOTE,
                    },
                    baseline,
                    fonts,
                ));
            }
            PlacedLine::Spacer { .. } => {}
        }
    }

    let daily = style.mode == Mode::Daily;
    let end = top + middle.block.height;
    let deco_x = CONTENT_RIGHT_X - 80.0;
    let deco_y = if daily { end - 20.0 } else { end - 60.0 };
    let deco_fill = color::deco_color(surface.sample(deco_x, deco_y, 60.0, 60.0), theme);
    body.push_str(&svg::text(
        &TextRun {
            text: "\u{201D}",
            x: deco_x,
            top: deco_y,
            size: DECO_SIZE,
            weight: Weight::Medium,
            fill: deco_fill,
        },
        fonts,
    ));

    if daily {
        if let Some(source) = quote.source.as_deref().filter(|s| !s.trim().is_empty()) {
            let caption = format!("--来自 @{} 的评论", source.trim());
            body.push_str(&right_aligned(
                &caption,
                CONTENT_RIGHT_X,
                end + 20.0,
                CAPTION_SIZE,
                Weight::Light,
                color::SUB,
                fonts,
            ));
        }

        let bottom_sep = middle.top + middle.height + 10.0;
        body.push_str(&svg::dotted_rule(
            CONTENT_LEFT_X,
            CONTENT_RIGHT_X,
            bottom_sep,
            20.0,
            2.0,
            color::ACCENT,
        ));
        let caption = style.footer_caption.trim();
        if !caption.is_empty() {
            let width = fonts.measure(caption, FOOTER_SIZE, Weight::Thin);
            body.push_str(&svg::text(
                &TextRun {
                    text: caption,
                    x: MARGIN_SIDE + (CARD_W - width) / 2.0,
                    top: bottom_sep + 24.0,
                    size: FOOTER_SIZE,
                    weight: Weight::Thin,
                    fill: color::SUB,
                },
                fonts,
            ));
        }
    }
    body
}

fn right_aligned(
    text: &str,
    right_x: f32,
    top: f32,
    size: f32,
    weight: Weight,
    fill: Rgb,
    fonts: &FontRegistry,
) -> String {
    let width = fonts.measure(text, size, weight);
    svg::text(
        &TextRun {
            text,
            x: right_x - width,
            top,
            size,
            weight,
            fill,
        },
        fonts,
    )
}

pub fn month_abbr(date: Date) -> String {
    date.month().to_string().chars().take(3).collect()
}
