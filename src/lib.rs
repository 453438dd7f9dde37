use anyhow::anyhow;
use image::RgbImage;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

pub mod card;
pub mod error;
pub mod font;
pub mod layout;
pub mod logging;
pub mod markup;
pub mod resolve;
pub mod settings;
pub mod sources;
pub mod ttml;

#[cfg(test)]
mod test_util;

pub use card::{Card, CardContent, CardStyle, LayerKind, Quote};
pub use error::CardError;
pub use font::{FontRegistry, Weight};
pub use settings::Settings;
pub use sources::{HttpSource, MusicSource, Platform, SongInfo};

/// Card variant; also selects how metadata is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Mode {
    #[default]
    Daily,
    Card,
    Lyric,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Daily => "daily",
            Mode::Card => "card",
            Mode::Lyric => "lyric",
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Mode::Daily),
            "card" => Ok(Mode::Card),
            "lyric" => Ok(Mode::Lyric),
            other => Err(anyhow!(
                "unknown mode '{}' (expected daily, card or lyric)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualInfo {
    pub title: String,
    pub artist: String,
    pub cover_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct CardConfig {
    pub mode: Mode,
    pub platform: Platform,
    /// `YYYY-MM-DD`; today when absent or invalid.
    pub date: Option<String>,
    pub info: Option<ManualInfo>,
    /// Ignored in lyric mode.
    pub quote: Option<Quote>,
    pub music_id: Option<String>,
    pub inner_blurred: bool,
    pub show_qrcode: bool,
    pub card_only: bool,
    /// Forwarded as-is to platform lookups (QQ Music cookie).
    pub platform_credential: Option<String>,
    pub settings_path: Option<String>,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
}

pub async fn run(config: CardConfig) -> Result<Card, CardError> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path).map_err(CardError::Config)?;
    let source = HttpSource::new(&settings).map_err(CardError::Config)?;
    run_with_source(&config, &settings, &source).await
}

/// Resolves metadata through `source`, fetches the cover and composes the card.
pub async fn run_with_source(
    config: &CardConfig,
    settings: &Settings,
    source: &dyn MusicSource,
) -> Result<Card, CardError> {
    info!(
        "generating {} card on {}",
        config.mode.as_str(),
        config.platform.as_str()
    );
    let resolved = resolve::resolve(config, settings, source).await?;
    let cover = resolve::load_cover(&resolved.song.cover_url, source).await?;

    let font_path = config
        .font_path
        .as_deref()
        .or(settings.font_path.as_deref())
        .map(Path::new);
    let font_family = config
        .font_family
        .as_deref()
        .or(settings.font_family.as_deref());
    let fonts = FontRegistry::load(font_path, font_family).map_err(CardError::Font)?;

    let code_url = resolved
        .song
        .music_id
        .as_deref()
        .map(|id| config.platform.song_url(id));
    let content = CardContent {
        title: resolved.song.title,
        artist: resolved.song.artist,
        cover,
        date: resolved.date,
        quote: resolved.quote,
        code_url,
    };
    let style = CardStyle {
        mode: config.mode,
        inner_blurred: config.inner_blurred,
        show_code: config.show_qrcode,
        card_only: config.card_only,
        footer_caption: settings.footer_caption.clone(),
        watermark: settings.watermark.clone(),
    };
    card::compose(&content, &style, &fonts).map_err(CardError::Render)
}

/// Like [`run`], but reports failure as an absent image.
pub async fn generate_card(config: CardConfig) -> Option<RgbImage> {
    match run(config).await {
        Ok(card) => Some(card.image),
        Err(err) => {
            warn!("card generation failed ({}): {:#}", err.kind(), err);
            None
        }
    }
}
