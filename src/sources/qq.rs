use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::SongInfo;
use super::http::Fetcher;

const INITIAL_DATA_MARKER: &str = "window.__INITIAL_DATA__ =";

#[derive(Debug, Deserialize)]
struct InitialData {
    detail: Option<serde_json::Value>,
    #[serde(rename = "songList", default)]
    song_list: Vec<Song>,
}

#[derive(Debug, Deserialize)]
struct Song {
    title: String,
    subtitle: Option<String>,
    #[serde(default)]
    singer: Vec<Singer>,
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Singer {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    mid: String,
}

pub(crate) fn page_url(music_id: &str) -> String {
    format!("https://y.qq.com/n/ryqq_v2/songDetail/{}", music_id)
}

pub(crate) async fn song_info(
    fetcher: &Fetcher,
    music_id: &str,
    cookie: Option<&str>,
) -> Result<Option<SongInfo>> {
    info!("looking up QQ Music song {}", music_id);
    let Some(page) = fetcher.text(&page_url(music_id), cookie).await? else {
        return Ok(None);
    };
    parse_page(&page, music_id)
}

/// Pulls the song out of the JSON blob the web player embeds in its page.
pub(crate) fn parse_page(page: &str, music_id: &str) -> Result<Option<SongInfo>> {
    let Some(start) = page.find(INITIAL_DATA_MARKER) else {
        return Ok(None);
    };
    let start = start + INITIAL_DATA_MARKER.len();
    let Some(len) = page[start..].find("</script>") else {
        return Ok(None);
    };
    let blob = page[start..start + len].replace("undefined", "null");
    let data: InitialData =
        serde_json::from_str(blob.trim()).with_context(|| "failed to parse QQ Music page data")?;
    if !data.detail.as_ref().is_some_and(has_content) {
        return Ok(None);
    }
    let Some(song) = data.song_list.into_iter().next() else {
        return Ok(None);
    };
    let title = match song.subtitle.as_deref() {
        Some(subtitle) if !subtitle.is_empty() => format!("{} ({})", song.title, subtitle),
        _ => song.title,
    };
    let artist = song
        .singer
        .iter()
        .map(|singer| singer.name.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    Ok(Some(SongInfo {
        title,
        artist,
        cover_url: format!(
            "https://y.qq.com/music/photo_new/T002R1200x1200M000{}.jpg",
            song.album.mid
        ),
        music_id: Some(music_id.to_string()),
    }))
}

fn has_content(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::String(text) => !text.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        serde_json::Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(json: &str) -> String {
        format!(
            "<html><script>var a = 1;</script><script>{} {}</script></html>",
            INITIAL_DATA_MARKER, json
        )
    }

    #[test]
    fn reads_embedded_song() {
        let html = page(
            r#"{"detail":{"id":1},"songList":[{"title":"Song","subtitle":"Live","singer":[{"name":"X"},{"name":"Y"}],"album":{"mid":"ABC"},"extra":undefined}]}"#,
        );
        let info = parse_page(&html, "002").expect("parse").expect("song");
        assert_eq!(info.title, "Song (Live)");
        assert_eq!(info.artist, "X / Y");
        assert_eq!(
            info.cover_url,
            "https://y.qq.com/music/photo_new/T002R1200x1200M000ABC.jpg"
        );
    }

    #[test]
    fn empty_subtitle_is_dropped() {
        let html = page(
            r#"{"detail":{"id":1},"songList":[{"title":"Song","subtitle":"","singer":[],"album":{"mid":"M"}}]}"#,
        );
        let info = parse_page(&html, "1").expect("parse").expect("song");
        assert_eq!(info.title, "Song");
    }

    #[test]
    fn missing_detail_or_marker_is_none() {
        let html = page(r#"{"detail":null,"songList":[]}"#);
        assert!(parse_page(&html, "1").expect("parse").is_none());
        let html = page(r#"{"detail":{},"songList":[]}"#);
        assert!(parse_page(&html, "1").expect("parse").is_none());
        assert!(parse_page("<html></html>", "1").expect("parse").is_none());
    }
}
