use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use super::color::{self, Rgb};

const BLUR_SIGMA: f32 = 100.0;
/// Blur runs at this fraction of the canvas size with the sigma scaled to match.
const BLUR_DOWNSCALE: u32 = 8;
const BACKDROP_BRIGHTNESS: f32 = 0.7;
const INNER_BRIGHTNESS: f32 = 1.2;

const MASK_LIMIT: f32 = 0.9;
const MASK_BREAK: f32 = 0.5;
const MASK_BREAK_MAX_PX: f32 = 1100.0;
const MASK_EXPONENT: f32 = 1.5;

/// Cover scaled and cropped to fill `width` x `height`.
pub fn fit(cover: &RgbImage, width: u32, height: u32) -> RgbImage {
    DynamicImage::ImageRgb8(cover.clone())
        .resize_to_fill(width, height, FilterType::Lanczos3)
        .to_rgb8()
}

/// Full-canvas backdrop: the cover filled, blurred and darkened.
pub fn backdrop(cover: &RgbImage, width: u32, height: u32) -> RgbImage {
    let small_w = (width / BLUR_DOWNSCALE).max(1);
    let small_h = (height / BLUR_DOWNSCALE).max(1);
    let small = fit(cover, small_w, small_h);
    let blurred = imageops::blur(&small, BLUR_SIGMA / BLUR_DOWNSCALE as f32);
    let full = imageops::resize(&blurred, width, height, FilterType::Triangle);
    brightness(&full, BACKDROP_BRIGHTNESS)
}

pub fn brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f32 * factor).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// The part of the backdrop the card shows through when inner blur is on.
pub fn inner_backdrop(backdrop: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    let crop = imageops::crop_imm(backdrop, x, y, width, height).to_image();
    brightness(&crop, INNER_BRIGHTNESS)
}

/// Opacity of the white wash over the inner backdrop at row `y` of a card
/// `height` pixels tall: linear up to the break row, then a power curve.
pub fn wash_alpha(y: f32, height: f32) -> f32 {
    let break_alpha = MASK_LIMIT * MASK_BREAK;
    let break_y = (height * MASK_BREAK * MASK_LIMIT).min(MASK_BREAK_MAX_PX);
    if y < break_y {
        if break_y > 0.0 {
            break_alpha * (y / break_y)
        } else {
            0.0
        }
    } else {
        let span = height - break_y;
        let ratio = if span > 0.0 {
            ((y - break_y) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        break_alpha + (MASK_LIMIT - break_alpha) * ratio.powf(MASK_EXPONENT)
    }
}

/// What the card looks like underneath its contents, so colours can adapt
/// to it before anything is rasterised.
pub struct Surface<'a> {
    pub backdrop: &'a RgbImage,
    pub card_y: u32,
    pub card_h: u32,
    pub inner_blurred: bool,
}

impl Surface<'_> {
    /// Average colour of the card surface inside the given canvas rectangle.
    pub fn sample(&self, x: f32, y: f32, w: f32, h: f32) -> Rgb {
        if !self.inner_blurred {
            return color::CARD_WHITE;
        }
        let region = self.backdrop_region(x, y, w, h);
        let base = color::average_color(&brightness(&region, INNER_BRIGHTNESS));
        let mid_y = y + h / 2.0 - self.card_y as f32;
        let alpha = wash_alpha(mid_y, self.card_h as f32);
        [0, 1, 2].map(|i| {
            (base[i] as f32 * (1.0 - alpha) + color::CARD_WHITE[i] as f32 * alpha) as u8
        })
    }

    /// Average colour of the raw backdrop, for text drawn outside the card.
    pub fn sample_backdrop(&self, x: f32, y: f32, w: f32, h: f32) -> Rgb {
        color::average_color(&self.backdrop_region(x, y, w, h))
    }

    fn backdrop_region(&self, x: f32, y: f32, w: f32, h: f32) -> RgbImage {
        let max_w = self.backdrop.width();
        let max_h = self.backdrop.height();
        let x0 = (x.max(0.0) as u32).min(max_w.saturating_sub(1));
        let y0 = (y.max(0.0) as u32).min(max_h.saturating_sub(1));
        let w = (w.max(1.0) as u32).min(max_w - x0).max(1);
        let h = (h.max(1.0) as u32).min(max_h - y0).max(1);
        imageops::crop_imm(self.backdrop, x0, y0, w, h).to_image()
    }
}
