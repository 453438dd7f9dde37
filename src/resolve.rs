//! Metadata resolution: decides where the title, artist, cover and quote of
//! a card come from.
//!
//! Priority: the daily recommendation (daily mode only), then a track id
//! looked up on the selected platform, then manually supplied info. Lyric
//! mode replaces the quote with the track's lyrics.

use image::RgbImage;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::card::Quote;
use crate::error::CardError;
use crate::settings::Settings;
use crate::sources::{MusicSource, SongInfo};
use crate::{CardConfig, Mode};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
/// Cover the recommendation feed uses when nobody uploaded artwork.
const PLACEHOLDER_COVER: &str = "/tj/wfm.jpg";
const PLACEHOLDER_SIZE: u32 = 600;
const PLACEHOLDER_COLOR: [u8; 3] = [0xD3, 0xD3, 0xD3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub song: SongInfo,
    pub quote: Option<Quote>,
    pub date: Date,
}

/// Parses `YYYY-MM-DD`, falling back to today.
pub fn parse_date(value: Option<&str>) -> Date {
    let today = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date();
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => today,
        Some(value) => Date::parse(value, DATE_FORMAT).unwrap_or_else(|err| {
            warn!("invalid date '{}' ({}); using today", value, err);
            today
        }),
    }
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", date.year(), date.month() as u8, date.day()))
}

pub async fn resolve(
    config: &CardConfig,
    settings: &Settings,
    source: &dyn MusicSource,
) -> Result<Resolved, CardError> {
    let date = parse_date(config.date.as_deref());
    let date_key = format_date(date);
    let credential = config.platform_credential.as_deref();

    let daily = if config.mode == Mode::Daily {
        match source.daily_recommendation(&date_key).await {
            Ok(daily) => daily,
            Err(err) => {
                warn!("daily recommendation unavailable: {:#}", err);
                None
            }
        }
    } else {
        None
    };

    let mut daily_quote = None;
    let song = if let Some(daily) = daily {
        let song = match daily.music_id.as_deref() {
            Some(music_id) => {
                info!("using daily recommendation {}", music_id);
                lookup(source, config, music_id, credential).await
            }
            None => {
                warn!("daily recommendation names no track");
                None
            }
        };
        if let Some(comment) = daily.comment.filter(|comment| !comment.is_empty()) {
            daily_quote = Some(Quote {
                content: comment,
                source: daily.username.filter(|name| !name.is_empty()),
            });
        }
        song.map(|mut song| {
            if let Some(cover) = daily.cover.filter(|cover| !cover.is_empty() && cover != PLACEHOLDER_COVER) {
                song.cover_url = absolute_cover(&cover, source.database_url());
            }
            song
        })
    } else {
        if config.mode == Mode::Daily {
            info!("no daily recommendation; falling back to explicit options");
        }
        if let Some(music_id) = config.music_id.as_deref().filter(|id| !id.trim().is_empty()) {
            lookup(source, config, music_id.trim(), credential).await
        } else {
            config.info.as_ref().map(|manual| SongInfo {
                title: manual.title.clone(),
                artist: manual.artist.clone(),
                cover_url: manual.cover_url.clone(),
                music_id: None,
            })
        }
    };

    let Some(song) = song.filter(|song| !song.title.trim().is_empty()) else {
        return Err(CardError::MetadataUnresolvable(
            "no daily recommendation, track id or manual info produced a song".to_string(),
        ));
    };

    let quote = if config.card_only || config.mode == Mode::Card {
        None
    } else if daily_quote.is_some() {
        daily_quote
    } else if config.mode == Mode::Lyric {
        Some(lyrics_quote(config, source).await?)
    } else if let Some(quote) = &config.quote {
        Some(Quote {
            content: quote.content.replace("\\n", "\n"),
            source: quote.source.clone(),
        })
    } else if !settings.default_quote.is_empty() {
        Some(Quote {
            content: settings.default_quote.clone(),
            source: Some(settings.default_source.clone()).filter(|s| !s.is_empty()),
        })
    } else {
        None
    };

    Ok(Resolved { song, quote, date })
}

async fn lookup(
    source: &dyn MusicSource,
    config: &CardConfig,
    music_id: &str,
    credential: Option<&str>,
) -> Option<SongInfo> {
    match source.song_info(config.platform, music_id, credential).await {
        Ok(Some(song)) => Some(song),
        Ok(None) => {
            warn!("{} has no song {}", config.platform.as_str(), music_id);
            None
        }
        Err(err) => {
            warn!("song lookup failed: {:#}", err);
            None
        }
    }
}

async fn lyrics_quote(config: &CardConfig, source: &dyn MusicSource) -> Result<Quote, CardError> {
    let Some(music_id) = config.music_id.as_deref().filter(|id| !id.trim().is_empty()) else {
        return Err(CardError::MetadataUnresolvable(
            "lyric mode needs a track id".to_string(),
        ));
    };
    match source.lyrics(config.platform, music_id.trim()).await {
        Ok(Some(lyrics)) if !lyrics.trim().is_empty() => Ok(Quote {
            content: lyrics,
            source: None,
        }),
        Ok(_) => Err(CardError::AssetFetch(anyhow::anyhow!(
            "no lyrics published for {} {}",
            config.platform.as_str(),
            music_id
        ))),
        Err(err) => Err(CardError::AssetFetch(err)),
    }
}

fn absolute_cover(cover: &str, base_url: &str) -> String {
    if cover.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), cover)
    } else {
        cover.to_string()
    }
}

/// Downloads and decodes the cover. An empty URL gives a grey placeholder.
pub async fn load_cover(url: &str, source: &dyn MusicSource) -> Result<RgbImage, CardError> {
    let url = url.trim();
    if url.is_empty() {
        info!("no cover URL; using placeholder");
        return Ok(RgbImage::from_pixel(
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            image::Rgb(PLACEHOLDER_COLOR),
        ));
    }
    let bytes = source.fetch_image(url).await.map_err(CardError::AssetFetch)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|err| CardError::AssetFetch(anyhow::anyhow!("cover is not an image: {}", err)))?;
    Ok(image.to_rgb8())
}
