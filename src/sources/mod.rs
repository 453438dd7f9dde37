//! Remote collaborators: song lookups, the daily recommendation feed,
//! lyrics and cover downloads.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use crate::settings::Settings;

mod amll;
mod http;
mod ncm;
mod qq;
mod retry;

pub use http::Fetcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Platform {
    #[default]
    Ncm,
    Qq,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ncm => "ncm",
            Platform::Qq => "qq",
        }
    }

    /// Public page of a track, encoded into the card's scannable code.
    pub fn song_url(&self, music_id: &str) -> String {
        match self {
            Platform::Ncm => format!("https://music.163.com/#/song?id={}", music_id),
            Platform::Qq => qq::page_url(music_id),
        }
    }

    pub fn lyrics_folder(&self) -> &'static str {
        match self {
            Platform::Ncm => "ncm-lyrics",
            Platform::Qq => "qq-lyrics",
        }
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ncm" => Ok(Platform::Ncm),
            "qq" => Ok(Platform::Qq),
            other => Err(anyhow!("unknown platform '{}' (expected ncm or qq)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongInfo {
    pub title: String,
    pub artist: String,
    pub cover_url: String,
    pub music_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRecommendation {
    /// `None` when the feed names no usable track; the run then cannot
    /// resolve a song.
    pub music_id: Option<String>,
    pub date: Option<String>,
    pub username: Option<String>,
    pub comment: Option<String>,
    pub cover: Option<String>,
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything the card needs from the network.
///
/// `Ok(None)` means the source answered but has nothing for the request;
/// `Err` means the request itself failed.
pub trait MusicSource: Send + Sync {
    fn song_info<'a>(
        &'a self,
        platform: Platform,
        music_id: &'a str,
        credential: Option<&'a str>,
    ) -> SourceFuture<'a, Option<SongInfo>>;

    fn daily_recommendation<'a>(
        &'a self,
        date: &'a str,
    ) -> SourceFuture<'a, Option<DailyRecommendation>>;

    fn lyrics<'a>(&'a self, platform: Platform, music_id: &'a str)
    -> SourceFuture<'a, Option<String>>;

    fn fetch_image<'a>(&'a self, url: &'a str) -> SourceFuture<'a, Vec<u8>>;

    /// Base URL of the recommendation database, used to absolutise cover paths.
    fn database_url(&self) -> &str;
}

/// The live implementation backed by HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    fetcher: Fetcher,
    base_url: String,
}

impl HttpSource {
    pub fn new(settings: &Settings) -> Result<Self> {
        let fetcher = Fetcher::new(
            &settings.user_agent,
            Duration::from_secs(settings.timeout_secs.max(1)),
        )
        .with_context(|| "failed to set up HTTP source")?;
        Ok(Self {
            fetcher,
            base_url: settings.amll_base_url.clone(),
        })
    }
}

impl MusicSource for HttpSource {
    fn song_info<'a>(
        &'a self,
        platform: Platform,
        music_id: &'a str,
        credential: Option<&'a str>,
    ) -> SourceFuture<'a, Option<SongInfo>> {
        Box::pin(async move {
            match platform {
                Platform::Ncm => ncm::song_info(&self.fetcher, music_id).await,
                Platform::Qq => qq::song_info(&self.fetcher, music_id, credential).await,
            }
        })
    }

    fn daily_recommendation<'a>(
        &'a self,
        date: &'a str,
    ) -> SourceFuture<'a, Option<DailyRecommendation>> {
        Box::pin(amll::daily_recommendation(&self.fetcher, &self.base_url, date))
    }

    fn lyrics<'a>(&'a self, platform: Platform, music_id: &'a str)
    -> SourceFuture<'a, Option<String>> {
        Box::pin(amll::lyrics(&self.fetcher, &self.base_url, platform, music_id))
    }

    fn fetch_image<'a>(&'a self, url: &'a str) -> SourceFuture<'a, Vec<u8>> {
        Box::pin(self.fetcher.bytes(url))
    }

    fn database_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_and_builds_urls() {
        assert_eq!("NCM".parse::<Platform>().expect("ncm"), Platform::Ncm);
        assert_eq!("qq".parse::<Platform>().expect("qq"), Platform::Qq);
        assert!("spotify".parse::<Platform>().is_err());
        assert_eq!(
            Platform::Ncm.song_url("1"),
            "https://music.163.com/#/song?id=1"
        );
        assert_eq!(
            Platform::Qq.song_url("2"),
            "https://y.qq.com/n/ryqq_v2/songDetail/2"
        );
        assert_eq!(Platform::Ncm.lyrics_folder(), "ncm-lyrics");
    }
}
