use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::http::Fetcher;
use super::{DailyRecommendation, Platform};
use crate::ttml;

#[derive(Debug, Deserialize)]
struct DailyResponse {
    ncm_id: Option<serde_json::Value>,
    date: Option<String>,
    username: Option<String>,
    comment: Option<String>,
    cover: Option<String>,
}

pub(crate) fn daily_url(base_url: &str, date: &str) -> String {
    format!("{}/api/daily-recommendations?date={}", base_url, date)
}

pub(crate) fn lyrics_url(base_url: &str, platform: Platform, music_id: &str) -> String {
    format!("{}/{}/{}.ttml", base_url, platform.lyrics_folder(), music_id)
}

pub(crate) async fn daily_recommendation(
    fetcher: &Fetcher,
    base_url: &str,
    date: &str,
) -> Result<Option<DailyRecommendation>> {
    info!("fetching daily recommendation for {}", date);
    let Some(body) = fetcher.text(&daily_url(base_url, date), None).await? else {
        return Ok(None);
    };
    parse_daily(&body)
}

/// A `null` body, or an object without an `ncm_id` key, means no
/// recommendation. A present but empty or `null` id is still a
/// recommendation, just one without a track.
pub(crate) fn parse_daily(body: &str) -> Result<Option<DailyRecommendation>> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    let value: serde_json::Value =
        serde_json::from_str(body).with_context(|| "failed to parse daily recommendation")?;
    if value.get("ncm_id").is_none() {
        return Ok(None);
    }
    let response: DailyResponse =
        serde_json::from_value(value).with_context(|| "unexpected daily recommendation shape")?;
    let music_id = match response.ncm_id {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Some(serde_json::Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    Ok(Some(DailyRecommendation {
        music_id,
        date: response.date,
        username: response.username,
        comment: response.comment,
        cover: response.cover,
    }))
}

pub(crate) async fn lyrics(
    fetcher: &Fetcher,
    base_url: &str,
    platform: Platform,
    music_id: &str,
) -> Result<Option<String>> {
    let url = lyrics_url(base_url, platform, music_id);
    info!("fetching lyrics from {}", url);
    let Some(body) = fetcher.text(&url, None).await? else {
        return Ok(None);
    };
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }
    ttml::to_markup(body).map(Some)
}
