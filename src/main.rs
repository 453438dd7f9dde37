use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use music_card::{CardConfig, ManualInfo, Mode, Platform, Quote};

#[derive(Parser, Debug)]
#[command(
    name = "music-card",
    version,
    about = "Render a shareable music recommendation card"
)]
struct Cli {
    /// Platform backing track lookups (ncm, qq)
    #[arg(long = "platform", default_value = "ncm")]
    platform: String,

    /// Card mode (daily, card, lyric)
    #[arg(long = "mode", default_value = "daily")]
    mode: String,

    /// Date as YYYY-MM-DD (default: today)
    #[arg(long = "date")]
    date: Option<String>,

    /// Manual song info
    #[arg(long = "info", num_args = 3, value_names = ["TITLE", "ARTIST", "COVER_URL"])]
    info: Option<Vec<String>>,

    /// Quote content and its source. A literal "\n" breaks lines.
    #[arg(long = "quote", num_args = 2, value_names = ["CONTENT", "SOURCE"])]
    quote: Option<Vec<String>>,

    /// Track id on the selected platform
    #[arg(long = "music-id")]
    music_id: Option<String>,

    /// Show the blurred cover through the card
    #[arg(long = "inner-blurred")]
    inner_blurred: bool,

    /// Add a scannable code linking to the track
    #[arg(long = "qrcode")]
    qrcode: bool,

    /// Leave out the date and quotation
    #[arg(long = "card-only")]
    card_only: bool,

    /// QQ Music cookie for authenticated lookups
    #[arg(long = "qq-music-cookie")]
    qq_music_cookie: Option<String>,

    /// Font file used for measuring and drawing text
    #[arg(long = "font-path")]
    font_path: Option<String>,

    /// Font family name to look up among system fonts
    #[arg(long = "font-family")]
    font_family: Option<String>,

    /// Output PNG path
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    music_card::logging::init(cli.verbose)?;

    let mode: Mode = cli.mode.parse()?;
    let platform: Platform = cli.platform.parse()?;
    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli, mode));
    let config = build_config(cli, mode, platform)?;

    let card = music_card::run(config).await?;
    let png = card.to_png()?;
    std::fs::write(&output, png)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

fn build_config(cli: Cli, mode: Mode, platform: Platform) -> Result<CardConfig> {
    let info = match cli.info {
        Some(values) => {
            let [title, artist, cover_url]: [String; 3] = values
                .try_into()
                .map_err(|_| anyhow!("--info expects TITLE ARTIST COVER_URL"))?;
            Some(ManualInfo {
                title,
                artist,
                cover_url,
            })
        }
        None => None,
    };
    let quote = match cli.quote {
        Some(values) => {
            let [content, source]: [String; 2] = values
                .try_into()
                .map_err(|_| anyhow!("--quote expects CONTENT SOURCE"))?;
            Some(Quote {
                content,
                source: Some(source).filter(|source| !source.is_empty()),
            })
        }
        None => None,
    };
    Ok(CardConfig {
        mode,
        platform,
        date: cli.date,
        info,
        quote,
        music_id: cli.music_id,
        inner_blurred: cli.inner_blurred,
        show_qrcode: cli.qrcode,
        card_only: cli.card_only,
        platform_credential: cli.qq_music_cookie,
        settings_path: cli.read_settings,
        font_path: cli.font_path,
        font_family: cli.font_family,
    })
}

fn default_output(cli: &Cli, mode: Mode) -> PathBuf {
    let id = cli.music_id.as_deref().unwrap_or("custom");
    let name = match mode {
        Mode::Lyric => format!("music_lyric_{}.png", id),
        Mode::Card => format!("music_card_{}.png", id),
        Mode::Daily => {
            let date = music_card::resolve::parse_date(cli.date.as_deref());
            format!("music_card_{}.png", music_card::resolve::format_date(date))
        }
    };
    PathBuf::from(name)
}
