use image::RgbImage;

pub type Rgb = [u8; 3];

pub const CARD_WHITE: Rgb = [0xFD, 0xFD, 0xFD];
pub const MAIN: Rgb = [0x2A, 0x2A, 0x2A];
pub const SUB: Rgb = [0x55, 0x55, 0x55];
pub const QUOTE: Rgb = [0x4A, 0x4A, 0x4A];
pub const ACCENT: Rgb = [0xD0, 0xD0, 0xD0];

const MIN_QR_CONTRAST: f32 = 4.5;

pub fn hex(color: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", color[0], color[1], color[2])
}

pub fn average_color(image: &RgbImage) -> Rgb {
    let count = (image.width() as u64 * image.height() as u64).max(1);
    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
    }
    sums.map(|sum| (sum / count) as u8)
}

/// Perceived brightness on a 0..=255 scale.
pub fn perceived_luminance(color: Rgb) -> f32 {
    (color[0] as f32 * 299.0 + color[1] as f32 * 587.0 + color[2] as f32 * 114.0) / 1000.0
}

fn scale(color: Rgb, factor: f32) -> Rgb {
    color.map(|c| (c as f32 * factor).round().clamp(0.0, 255.0) as u8)
}

fn blend(a: Rgb, b: Rgb, ratio: f32) -> Rgb {
    [0, 1, 2].map(|i| (a[i] as f32 * (1.0 - ratio) + b[i] as f32 * ratio) as u8)
}

/// Month label colour: the theme darkened on bright backgrounds, lightened on dark ones.
pub fn month_color(background: Rgb, theme: Rgb) -> Rgb {
    if perceived_luminance(background) > 140.0 {
        scale(theme, 0.6)
    } else {
        scale(theme, 1.8)
    }
}

/// Decorative quotation mark colour: a pale or muted wash of the theme.
pub fn deco_color(background: Rgb, theme: Rgb) -> Rgb {
    let white = [255, 255, 255];
    if perceived_luminance(background) > 150.0 {
        blend(theme, white, 0.9)
    } else {
        blend(theme, white, 0.2)
    }
}

/// Watermark colour for text placed directly on the blurred backdrop.
pub fn contrasting_text_color(background: Rgb) -> Rgb {
    if perceived_luminance(background) > 120.0 {
        [0x4A, 0x3B, 0x32]
    } else {
        [0xF2, 0xF2, 0xF2]
    }
}

fn relative_luminance(color: Rgb) -> f32 {
    let channel = |c: u8| {
        let c = c as f32 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * channel(color[0]) + 0.7152 * channel(color[1]) + 0.0722 * channel(color[2])
}

pub fn contrast_ratio(a: Rgb, b: Rgb) -> f32 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (hi, lo) = if la > lb { (la, lb) } else { (lb, la) };
    (hi + 0.05) / (lo + 0.05)
}

/// Darkens the theme until it reaches WCAG AA contrast against `background`.
pub fn safe_code_color(theme: Rgb, background: Rgb) -> Rgb {
    let mut current = theme;
    while contrast_ratio(current, background) < MIN_QR_CONTRAST {
        if current.iter().all(|c| *c <= 5) {
            return [0, 0, 0];
        }
        current = current.map(|c| (c as f32 * 0.9) as u8);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_solid_image_is_its_color() {
        let image = RgbImage::from_pixel(4, 3, image::Rgb([10, 200, 30]));
        assert_eq!(average_color(&image), [10, 200, 30]);
    }

    #[test]
    fn safe_code_color_meets_contrast() {
        for theme in [[250, 240, 10], [200, 200, 200], [30, 30, 30], [255, 255, 255]] {
            let color = safe_code_color(theme, CARD_WHITE);
            assert!(
                contrast_ratio(color, CARD_WHITE) >= MIN_QR_CONTRAST || color == [0, 0, 0],
                "{theme:?}"
            );
        }
        assert_eq!(safe_code_color([20, 20, 20], CARD_WHITE), [20, 20, 20]);
    }

    #[test]
    fn adaptive_colors_follow_background_brightness() {
        let theme = [100, 50, 150];
        assert_eq!(month_color([250, 250, 250], theme), [60, 30, 90]);
        assert_eq!(month_color([10, 10, 10], theme), [180, 90, 255]);
        assert_eq!(contrasting_text_color([0, 0, 0]), [0xF2, 0xF2, 0xF2]);
        assert!(perceived_luminance(deco_color([255, 255, 255], theme)) > 200.0);
    }

    #[test]
    fn hex_is_uppercase_rgb() {
        assert_eq!(hex([0xFD, 0x0A, 0x00]), "#FD0A00");
    }
}
