use anyhow::{Context, Result};
use qrcode::{Color, EcLevel, QrCode};

use super::color::{self, Rgb};

const BORDER_MODULES: usize = 1;
const MODULE_OPACITY: f32 = 230.0 / 255.0;

/// Dark modules of an encoded payload, including the quiet border.
pub struct CodeGlyph {
    pub modules: usize,
    dark: Vec<bool>,
}

impl CodeGlyph {
    pub fn encode(payload: &str) -> Result<Self> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
            .with_context(|| format!("failed to encode QR payload '{}'", payload))?;
        let width = code.width();
        let modules = width + BORDER_MODULES * 2;
        let mut dark = vec![false; modules * modules];
        for (idx, color) in code.to_colors().into_iter().enumerate() {
            if color == Color::Dark {
                let x = idx % width + BORDER_MODULES;
                let y = idx / width + BORDER_MODULES;
                dark[y * modules + x] = true;
            }
        }
        Ok(Self { modules, dark })
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.modules && y < self.modules && self.dark[y * self.modules + x]
    }

    /// SVG fragment drawing the dark modules into a `size` pixel square.
    pub fn to_svg(&self, x: f32, y: f32, size: f32, fill: Rgb) -> String {
        let cell = size / self.modules as f32;
        let mut path = String::new();
        for row in 0..self.modules {
            for col in 0..self.modules {
                if self.is_dark(col, row) {
                    path.push_str(&format!(
                        "M{:.3} {:.3}h{:.3}v{:.3}h-{:.3}z",
                        x + col as f32 * cell,
                        y + row as f32 * cell,
                        cell,
                        cell,
                        cell
                    ));
                }
            }
        }
        format!(
            r#"<path d="{d}" fill="{fill}" fill-opacity="{opacity:.3}" shape-rendering="crispEdges"/>"#,
            d = path,
            fill = color::hex(fill),
            opacity = MODULE_OPACITY
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_quiet_border() {
        let glyph = CodeGlyph::encode("https://music.163.com/#/song?id=1").expect("encode");
        assert!(glyph.modules >= 21 + 2);
        for i in 0..glyph.modules {
            assert!(!glyph.is_dark(i, 0));
            assert!(!glyph.is_dark(0, i));
        }
        // finder pattern corner
        assert!(glyph.is_dark(1, 1));
    }

    #[test]
    fn svg_uses_requested_fill() {
        let glyph = CodeGlyph::encode("hello").expect("encode");
        let svg = glyph.to_svg(10.0, 20.0, 120.0, [1, 2, 3]);
        assert!(svg.contains("fill=\"#010203\""));
        assert!(svg.starts_with("<path d=\"M"));
    }
}
