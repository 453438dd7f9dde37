use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{RgbImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use tiny_skia::Pixmap;
use usvg::{Options, Tree};

use super::color::{self, Rgb};
use crate::font::{FontRegistry, Weight};

/// Text run description. `top` is the top of the text box; the baseline is
/// derived from the font ascent so callers can lay out by box edges.
pub struct TextRun<'a> {
    pub text: &'a str,
    pub x: f32,
    pub top: f32,
    pub size: f32,
    pub weight: Weight,
    pub fill: Rgb,
}

pub fn text(run: &TextRun<'_>, fonts: &FontRegistry) -> String {
    text_at_baseline(run, run.top + fonts.ascent(run.size, run.weight), fonts)
}

pub fn text_at_baseline(run: &TextRun<'_>, baseline: f32, fonts: &FontRegistry) -> String {
    format!(
        r#"<text x="{x:.2}" y="{y:.2}" font-size="{size:.2}" font-weight="{weight}" font-family="{family}" fill="{fill}" xml:space="preserve">{text}</text>"#,
        x = run.x,
        y = baseline,
        size = run.size,
        weight = run.weight.as_css(),
        family = escape_xml(fonts.family()),
        fill = color::hex(run.fill),
        text = escape_xml(run.text)
    )
}

pub fn image(href: &str, x: f32, y: f32, w: f32, h: f32, clip: Option<&str>) -> String {
    let clip = clip
        .map(|id| format!(r#" clip-path="url(#{})""#, id))
        .unwrap_or_default();
    format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="none"{clip}/>"#,
        uri = href,
        x = x,
        y = y,
        w = w,
        h = h,
        clip = clip
    )
}

pub fn rounded_clip(id: &str, x: f32, y: f32, w: f32, h: f32, radius: f32) -> String {
    format!(
        r#"<clipPath id="{id}"><rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}"/></clipPath>"#,
        id = id,
        x = x,
        y = y,
        w = w,
        h = h,
        r = radius
    )
}

/// A row of small dots, used for separators and divider rules.
pub fn dotted_rule(start: f32, end: f32, y: f32, step: f32, radius: f32, fill: Rgb) -> String {
    let mut out = String::new();
    let mut x = start;
    while x < end {
        out.push_str(&format!(
            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r}" fill="{fill}"/>"#,
            cx = x + radius,
            cy = y + radius,
            r = radius,
            fill = color::hex(fill)
        ));
        x += step;
    }
    out
}

pub fn png_data_uri(image: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode PNG for embedding")?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
}

pub fn rasterize(svg: &str, fonts: &FontRegistry) -> Result<RgbaImage> {
    let options = Options {
        fontdb: fonts.database(),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

/// Drops alpha, compositing over black. The backdrop covers the whole
/// canvas, so the result equals the rendered colours.
pub fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        image::Rgb([r, g, b])
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode card PNG")?;
    Ok(bytes)
}

pub fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizes_plain_shapes() {
        let fonts = FontRegistry::estimated();
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="3" viewBox="0 0 4 3"><rect x="0" y="0" width="4" height="3" fill="#FF0000"/></svg>"##;
        let image = rasterize(svg, &fonts).expect("rasterize");
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(flatten(&image).get_pixel(3, 2).0, [255, 0, 0]);
    }

    #[test]
    fn text_is_escaped() {
        let fonts = FontRegistry::estimated();
        let run = TextRun {
            text: "<a & b>",
            x: 0.0,
            top: 0.0,
            size: 10.0,
            weight: Weight::Regular,
            fill: [0, 0, 0],
        };
        let out = text(&run, &fonts);
        assert!(out.contains("&lt;a &amp; b&gt;"));
        assert!(out.contains("font-weight=\"400\""));
    }

    #[test]
    fn dotted_rule_spacing() {
        let rule = dotted_rule(0.0, 100.0, 0.0, 20.0, 2.0, [0, 0, 0]);
        assert_eq!(rule.matches("<circle").count(), 5);
    }
}
