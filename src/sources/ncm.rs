use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::SongInfo;
use super::http::Fetcher;

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    songs: Vec<Song>,
}

#[derive(Debug, Deserialize)]
struct Song {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(rename = "picUrl")]
    pic_url: Option<String>,
}

pub(crate) fn detail_url(music_id: &str) -> String {
    format!(
        "https://music.163.com/api/song/detail/?id={id}&ids=%5B{id}%5D",
        id = music_id
    )
}

pub(crate) async fn song_info(fetcher: &Fetcher, music_id: &str) -> Result<Option<SongInfo>> {
    info!("looking up NetEase song {}", music_id);
    let Some(body) = fetcher.text(&detail_url(music_id), None).await? else {
        return Ok(None);
    };
    parse_detail(&body, music_id)
}

pub(crate) fn parse_detail(body: &str, music_id: &str) -> Result<Option<SongInfo>> {
    let response: DetailResponse =
        serde_json::from_str(body).with_context(|| "failed to parse NetEase song detail")?;
    let Some(song) = response.songs.into_iter().next() else {
        return Ok(None);
    };
    let artist = song
        .artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    Ok(Some(SongInfo {
        title: song.name,
        artist,
        cover_url: song.album.and_then(|album| album.pic_url).unwrap_or_default(),
        music_id: Some(music_id.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_song() {
        let body = r#"{"songs":[{"name":"晴天","artists":[{"name":"A"},{"name":"B"}],"album":{"picUrl":"https://p1.music.126.net/x.jpg"}}],"code":200}"#;
        let info = parse_detail(body, "186016").expect("parse").expect("song");
        assert_eq!(info.title, "晴天");
        assert_eq!(info.artist, "A / B");
        assert_eq!(info.cover_url, "https://p1.music.126.net/x.jpg");
        assert_eq!(info.music_id.as_deref(), Some("186016"));
    }

    #[test]
    fn empty_song_list_is_none() {
        assert!(parse_detail(r#"{"songs":[],"code":200}"#, "1").expect("parse").is_none());
        assert!(parse_detail(r#"{"code":404}"#, "1").expect("parse").is_none());
    }

    #[test]
    fn reads_recorded_response() {
        let body = include_str!("../../tests/fixtures/ncm_song_detail.json");
        let info = parse_detail(body, "1901371647").expect("parse").expect("song");
        assert_eq!(info.title, "Aurora");
        assert_eq!(info.artist, "Lumi / Kai");
    }

    #[test]
    fn url_repeats_id() {
        assert_eq!(
            detail_url("42"),
            "https://music.163.com/api/song/detail/?id=42&ids=%5B42%5D"
        );
    }
}
