use thiserror::Error;

/// Fatal failures of a card-generation run.
///
/// Markup and layout problems never show up here: malformed tags fall back to
/// plain text and overflowing lines are shrunk or truncated in place.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("metadata unresolvable: {0}")]
    MetadataUnresolvable(String),
    #[error("asset fetch failed: {0}")]
    AssetFetch(#[source] anyhow::Error),
    #[error("font unavailable: {0}")]
    Font(#[source] anyhow::Error),
    #[error("render failed: {0}")]
    Render(#[source] anyhow::Error),
    #[error("invalid configuration: {0}")]
    Config(#[source] anyhow::Error),
}

impl CardError {
    pub fn kind(&self) -> &'static str {
        match self {
            CardError::MetadataUnresolvable(_) => "metadata",
            CardError::AssetFetch(_) => "asset",
            CardError::Font(_) => "font",
            CardError::Render(_) => "render",
            CardError::Config(_) => "config",
        }
    }
}
