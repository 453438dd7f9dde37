use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub amll_base_url: String,
    pub default_quote: String,
    pub default_source: String,
    pub footer_caption: String,
    pub watermark: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_path: None,
            font_family: None,
            user_agent: "Mozilla/5.0 (compatible; music-card)".to_string(),
            timeout_secs: 10,
            amll_base_url: "https://amlldb.bikonoo.com".to_string(),
            default_quote: String::new(),
            default_source: String::new(),
            footer_caption: String::new(),
            watermark: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    font: Option<FontSettings>,
    network: Option<NetworkSettings>,
    card: Option<CardSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    path: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkSettings {
    user_agent: Option<String>,
    timeout_secs: Option<u64>,
    amll_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CardSettings {
    default_quote: Option<String>,
    default_source: Option<String>,
    footer_caption: Option<String>,
    watermark: Option<Vec<String>>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(font) = incoming.font {
            if let Some(path) = font.path {
                if !path.trim().is_empty() {
                    self.font_path = Some(path);
                }
            }
            if let Some(family) = font.family {
                if !family.trim().is_empty() {
                    self.font_family = Some(family);
                }
            }
        }
        if let Some(network) = incoming.network {
            if let Some(agent) = network.user_agent {
                if !agent.trim().is_empty() {
                    self.user_agent = agent;
                }
            }
            if let Some(secs) = network.timeout_secs {
                if secs > 0 {
                    self.timeout_secs = secs;
                }
            }
            if let Some(url) = network.amll_base_url {
                let url = url.trim().trim_end_matches('/');
                if !url.is_empty() {
                    self.amll_base_url = url.to_string();
                }
            }
        }
        if let Some(card) = incoming.card {
            if let Some(quote) = card.default_quote {
                self.default_quote = quote;
            }
            if let Some(source) = card.default_source {
                self.default_source = source;
            }
            if let Some(caption) = card.footer_caption {
                self.footer_caption = caption;
            }
            if let Some(lines) = card.watermark {
                self.watermark = lines;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".music-card"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn defaults_come_from_embedded_settings() {
        with_temp_home(|home| {
            let settings = load_settings(None).expect("settings");
            assert_eq!(settings.amll_base_url, "https://amlldb.bikonoo.com");
            assert_eq!(settings.timeout_secs, 10);
            assert!(!settings.default_quote.is_empty());
            assert!(home.join(".music-card").join("settings.toml").exists());
        });
    }

    #[test]
    fn extra_settings_override_defaults() {
        with_temp_home(|home| {
            let extra = home.join("extra.toml");
            fs::write(
                &extra,
                "[network]\namll_base_url = \"http://localhost:8080/\"\ntimeout_secs = 3\n\n[card]\nwatermark = [\"a\", \"b\"]\n",
            )
            .expect("write extra");
            let settings = load_settings(Some(&extra)).expect("settings");
            assert_eq!(settings.amll_base_url, "http://localhost:8080");
            assert_eq!(settings.timeout_secs, 3);
            assert_eq!(settings.watermark, vec!["a".to_string(), "b".to_string()]);
        });
    }

    #[test]
    fn missing_extra_settings_is_an_error() {
        with_temp_home(|home| {
            let missing = home.join("nope.toml");
            assert!(load_settings(Some(&missing)).is_err());
        });
    }
}
