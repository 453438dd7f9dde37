//! Quotation markup: one optional leading bracket tag per line.
//!
//! ```text
//! [:-:]centered   [:-]left   [-:]right        normal size, 80% width
//! [:_:]centered   [:_]left   [_:]right        small size, 80% width
//! [-]Chorus                                   section divider
//! anything else                               plain line, full width
//! ```
//!
//! Unknown bracket contents are not an error; the whole line is kept as text.

use serde::Serialize;
use tracing::debug;

pub const ALIGNED_WIDTH_FRACTION: f32 = 0.8;
pub const FULL_WIDTH_FRACTION: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeTier {
    Normal,
    Small,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tag {
    Align { alignment: Alignment, tier: SizeTier },
    Divider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteLine {
    pub raw_text: String,
    pub tag: Option<Tag>,
    pub display_text: String,
}

impl QuoteLine {
    pub fn is_divider(&self) -> bool {
        matches!(self.tag, Some(Tag::Divider))
    }

    pub fn style(&self) -> ResolvedStyle {
        resolve_style(self.tag.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedStyle {
    pub alignment: Alignment,
    pub size_tier: SizeTier,
    pub width_fraction: f32,
}

impl ResolvedStyle {
    fn plain() -> Self {
        Self {
            alignment: Alignment::Default,
            size_tier: SizeTier::Normal,
            width_fraction: FULL_WIDTH_FRACTION,
        }
    }

    fn aligned(alignment: Alignment, size_tier: SizeTier) -> Self {
        Self {
            alignment,
            size_tier,
            width_fraction: ALIGNED_WIDTH_FRACTION,
        }
    }
}

/// Splits a quotation into lines, one record per `\n`.
pub fn tokenize(input: &str) -> Vec<QuoteLine> {
    input.split('\n').map(tokenize_line).collect()
}

fn tokenize_line(line: &str) -> QuoteLine {
    let raw = line.strip_suffix('\r').unwrap_or(line);
    match split_tag(raw) {
        Some((tag, rest)) => QuoteLine {
            raw_text: raw.to_string(),
            tag: Some(tag),
            display_text: rest.trim().to_string(),
        },
        None => QuoteLine {
            raw_text: raw.to_string(),
            tag: None,
            display_text: raw.to_string(),
        },
    }
}

fn split_tag(line: &str) -> Option<(Tag, &str)> {
    let trimmed = line.trim_start();
    let inner_start = trimmed.strip_prefix('[')?;
    let close = inner_start.find(']')?;
    let interior = &inner_start[..close];
    let rest = &inner_start[close + 1..];
    match parse_tag(interior) {
        Some(tag) => Some((tag, rest)),
        None => {
            debug!("unrecognized quote tag [{}]; keeping line as text", interior);
            None
        }
    }
}

fn parse_tag(interior: &str) -> Option<Tag> {
    if interior == "-" {
        return Some(Tag::Divider);
    }
    let (alignment, dash) = match interior.as_bytes() {
        [b':', dash, b':'] => (Alignment::Center, *dash),
        [b':', dash] => (Alignment::Left, *dash),
        [dash, b':'] => (Alignment::Right, *dash),
        _ => return None,
    };
    let tier = match dash {
        b'-' => SizeTier::Normal,
        b'_' => SizeTier::Small,
        _ => return None,
    };
    Some(Tag::Align { alignment, tier })
}

/// Maps a tag to its rendering directive.
pub fn resolve_style(tag: Option<&Tag>) -> ResolvedStyle {
    match tag {
        Some(Tag::Align { alignment, tier }) => ResolvedStyle::aligned(*alignment, *tier),
        Some(Tag::Divider) | None => ResolvedStyle::plain(),
    }
}

/// Undoes the HTML escaping some comment feeds apply to quotation text.
pub fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
