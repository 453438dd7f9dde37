use anyhow::{anyhow, Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

const GENERIC_FAMILY: &str = "sans-serif";

/// Font weights the card draws with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Weight {
    Thin,
    Light,
    #[default]
    Regular,
    Medium,
    Semibold,
}

impl Weight {
    pub fn as_css(self) -> u16 {
        match self {
            Weight::Thin => 100,
            Weight::Light => 300,
            Weight::Regular => 400,
            Weight::Medium => 500,
            Weight::Semibold => 600,
        }
    }

    /// Width multiplier applied when no face is available.
    fn estimate_factor(self) -> f32 {
        match self {
            Weight::Thin => 0.94,
            Weight::Light => 0.97,
            Weight::Regular => 1.0,
            Weight::Medium => 1.03,
            Weight::Semibold => 1.07,
        }
    }
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
    id: Option<fontdb::ID>,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }
}

/// Per-request font context: one measuring face per weight, the database
/// used for rasterising, and a width cache.
///
/// Faces are looked up in the same database with the same family and weight
/// the renderer uses, so measured widths match drawn widths.
pub struct FontRegistry {
    base: Option<FontMetrics>,
    family: String,
    database: Arc<fontdb::Database>,
    faces: RefCell<HashMap<Weight, FontMetrics>>,
    widths: RefCell<HashMap<(String, u32, Weight), f32>>,
}

impl FontRegistry {
    /// Resolves a font from an explicit file, a family name, or the system
    /// fallbacks. An explicit file that cannot be loaded is an error; when
    /// nothing at all is found the registry measures by estimation.
    pub fn load(font_path: Option<&Path>, font_family: Option<&str>) -> Result<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        if let Some(path) = font_path {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read font: {}", path.display()))?;
            let metrics = load_font_metrics_from_data(&data, font_family)
                .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))?;
            db.load_font_data(data);
            let family = metrics
                .family()
                .map(|name| name.to_string())
                .or_else(|| font_family.map(|name| name.to_string()))
                .unwrap_or_else(|| GENERIC_FAMILY.to_string());
            info!("font: {} ({})", family, path.display());
            return Ok(Self::from_parts(Some(metrics), family, db));
        }

        let candidates = font_family
            .into_iter()
            .chain(fallback_families().iter().copied());
        for candidate in candidates {
            if let Ok((metrics, family)) =
                load_font_metrics_from_family(&db, candidate, Weight::Regular)
            {
                info!("font: {}", family);
                return Ok(Self::from_parts(Some(metrics), family, db));
            }
        }

        warn!("no usable font found; text widths will be estimated");
        Ok(Self::from_parts(None, GENERIC_FAMILY.to_string(), db))
    }

    /// A registry without any font data, measuring by estimation.
    pub fn estimated() -> Self {
        Self::from_parts(None, GENERIC_FAMILY.to_string(), fontdb::Database::new())
    }

    fn from_parts(base: Option<FontMetrics>, family: String, db: fontdb::Database) -> Self {
        Self {
            base,
            family,
            database: Arc::new(db),
            faces: RefCell::new(HashMap::new()),
            widths: RefCell::new(HashMap::new()),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn database(&self) -> Arc<fontdb::Database> {
        self.database.clone()
    }

    /// The face drawn for `weight`, falling back to the loaded face when the
    /// family has no closer match.
    fn face(&self, weight: Weight) -> Option<FontMetrics> {
        let base = self.base.as_ref()?;
        if let Some(face) = self.faces.borrow().get(&weight) {
            return Some(face.clone());
        }
        let face = query_face(&self.database, &self.family, weight)
            .ok_or_else(|| anyhow!("no {} face for weight {}", self.family, weight.as_css()))
            .and_then(|id| match self.known_face(id) {
                Some(face) => Ok(face),
                None => load_face(&self.database, id),
            })
            .unwrap_or_else(|err| {
                debug!("measuring weight {} with the base face: {:#}", weight.as_css(), err);
                base.clone()
            });
        self.faces.borrow_mut().insert(weight, face.clone());
        Some(face)
    }

    fn known_face(&self, id: fontdb::ID) -> Option<FontMetrics> {
        let faces = self.faces.borrow();
        let found = self
            .base
            .iter()
            .chain(faces.values())
            .find(|face| face.id == Some(id))
            .cloned();
        found
    }

    pub fn measure(&self, text: &str, font_size: f32, weight: Weight) -> f32 {
        let key = (text.to_string(), font_size.to_bits(), weight);
        if let Some(width) = self.widths.borrow().get(&key) {
            return *width;
        }
        let width = self.advances(text, font_size, weight).into_iter().sum::<f32>();
        self.widths.borrow_mut().insert(key, width);
        width
    }

    /// Per-character advances in pixels, one entry per `char` of `text`.
    /// Summing them in order gives exactly [`FontRegistry::measure`].
    /// Not cached.
    pub fn advances(&self, text: &str, font_size: f32, weight: Weight) -> Vec<f32> {
        let face = self.face(weight);
        char_advances_px(text, font_size, face.as_ref()).unwrap_or_else(|| {
            let size = font_size * weight.estimate_factor();
            text.chars()
                .map(|ch| estimate_char_units(ch) * size)
                .collect()
        })
    }

    /// Height of a glyph's ink box, used as the nominal line height of a size.
    pub fn glyph_height(&self, ch: char, font_size: f32, weight: Weight) -> f32 {
        self.face(weight)
            .and_then(|font| {
                let face = Face::parse(&font.data, font.face_index).ok()?;
                let glyph = face.glyph_index(ch)?;
                let rect = face.glyph_bounding_box(glyph)?;
                let height = (rect.y_max as f32 - rect.y_min as f32) * font.scale(font_size);
                (height > 0.0).then_some(height)
            })
            .unwrap_or(font_size * estimate_glyph_height_ratio(ch))
    }

    /// Distance from the top of a text box to its baseline.
    pub fn ascent(&self, font_size: f32, weight: Weight) -> f32 {
        self.face(weight)
            .map(|font| font.ascender.max(0) as f32 * font.scale(font_size))
            .filter(|ascent| *ascent > 0.0)
            .unwrap_or(font_size * 0.86)
    }

    #[cfg(test)]
    pub(crate) fn cached_widths(&self) -> usize {
        self.widths.borrow().len()
    }
}

#[cfg(target_os = "macos")]
fn fallback_families() -> &'static [&'static str] {
    &["PingFang SC", "Hiragino Sans GB", "sans-serif"]
}

#[cfg(target_os = "windows")]
fn fallback_families() -> &'static [&'static str] {
    &["Microsoft YaHei", "Arial Unicode", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_families() -> &'static [&'static str] {
    &["Noto Sans CJK SC", "NotoSans", "sans-serif"]
}

/// `None` when the face data cannot be parsed.
fn char_advances_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> Option<Vec<f32>> {
    let font = font?;
    let face = Face::parse(&font.data, font.face_index).ok()?;
    let scale = font.scale(font_size);
    let advances = text
        .chars()
        .map(|ch| {
            let units = match ch {
                '\n' => 0,
                ' ' => font.space_advance,
                _ => face
                    .glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(font.space_advance),
            };
            units as f32 * scale
        })
        .collect();
    Some(advances)
}

fn estimate_char_units(ch: char) -> f32 {
    if ch == '\n' {
        0.0
    } else if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_cjk(ch) {
        1.0
    } else {
        0.9
    }
}

fn estimate_glyph_height_ratio(ch: char) -> f32 {
    if is_cjk(ch) { 0.9 } else { 0.72 }
}

pub(crate) fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    )
}

fn metrics_from_face(
    data: &Arc<Vec<u8>>,
    face: &Face<'_>,
    face_index: u32,
    id: Option<fontdb::ID>,
) -> FontMetrics {
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|glyph| face.glyph_hor_advance(glyph))
        .unwrap_or(units_per_em / 2);
    FontMetrics {
        data: data.clone(),
        units_per_em,
        space_advance,
        ascender: face.ascender(),
        family: extract_family_name(face),
        face_index,
        id,
    }
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    let shared = Arc::new(data.to_vec());
    for index in 0..count {
        if let Ok(face) = Face::parse(&shared, index) {
            let metrics = metrics_from_face(&shared, &face, index, None);
            if let (Some(preferred), Some(found)) = (preferred_family, metrics.family()) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn query_face(db: &fontdb::Database, family: &str, weight: Weight) -> Option<fontdb::ID> {
    let families = if family.eq_ignore_ascii_case(GENERIC_FAMILY) {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    db.query(&fontdb::Query {
        families: &families,
        weight: fontdb::Weight(weight.as_css()),
        ..Default::default()
    })
}

fn load_face(db: &fontdb::Database, id: fontdb::ID) -> Result<FontMetrics> {
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data"))?;
    let shared = Arc::new(data);
    let face = Face::parse(&shared, face_index)
        .map_err(|err| anyhow!("failed to parse font face: {}", err))?;
    Ok(metrics_from_face(&shared, &face, face_index, Some(id)))
}

fn load_font_metrics_from_family(
    db: &fontdb::Database,
    family: &str,
    weight: Weight,
) -> Result<(FontMetrics, String)> {
    let id = query_face(db, family, weight).ok_or_else(|| anyhow!("font not found: {}", family))?;
    let metrics = load_face(db, id)?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok((metrics, resolved_family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_widths_scale_with_size() {
        let fonts = FontRegistry::estimated();
        let small = fonts.measure("Hello 世界", 10.0, Weight::Regular);
        let large = fonts.measure("Hello 世界", 20.0, Weight::Regular);
        assert!(small > 0.0);
        assert!((large - small * 2.0).abs() < 1e-3);
    }

    #[test]
    fn cjk_is_wider_than_latin_when_estimated() {
        let fonts = FontRegistry::estimated();
        assert!(fonts.measure("高", 34.0, Weight::Regular) > fonts.measure("a", 34.0, Weight::Regular));
    }

    #[test]
    fn heavier_weights_measure_wider() {
        let fonts = FontRegistry::estimated();
        let regular = fonts.measure("Wandering", 44.0, Weight::Regular);
        assert!(fonts.measure("Wandering", 44.0, Weight::Semibold) > regular);
        assert!(fonts.measure("Wandering", 44.0, Weight::Thin) < regular);
    }

    #[test]
    fn measurement_is_cached_per_weight() {
        let fonts = FontRegistry::estimated();
        let first = fonts.measure("cache me", 26.0, Weight::Regular);
        assert_eq!(fonts.cached_widths(), 1);
        assert_eq!(fonts.measure("cache me", 26.0, Weight::Regular), first);
        assert_eq!(fonts.cached_widths(), 1);
        fonts.measure("cache me", 26.0, Weight::Semibold);
        assert_eq!(fonts.cached_widths(), 2);
    }

    #[test]
    fn advances_sum_to_measured_width() {
        let fonts = FontRegistry::estimated();
        let text = "Sing & shine 向着星空";
        let advances = fonts.advances(text, 34.0, Weight::Medium);
        assert_eq!(advances.len(), text.chars().count());
        let sum: f32 = advances.into_iter().sum();
        assert_eq!(sum, fonts.measure(text, 34.0, Weight::Medium));
        assert_eq!(fonts.cached_widths(), 1);
    }

    #[test]
    fn system_family_measures_each_weight_with_its_own_face() {
        let fonts = FontRegistry::load(None, Some("DejaVu Sans")).expect("registry");
        if fonts.family() != "DejaVu Sans" {
            return;
        }
        let text = "Wandering Through Midnight Avenues";
        let regular = fonts.measure(text, 44.0, Weight::Regular);
        let semibold = fonts.measure(text, 44.0, Weight::Semibold);
        let drawn = query_face(&fonts.database, fonts.family(), Weight::Semibold)
            .and_then(|id| load_face(&fonts.database, id).ok())
            .expect("semibold face");
        let expected: f32 = char_advances_px(text, 44.0, Some(&drawn))
            .expect("advances")
            .into_iter()
            .sum();
        assert_eq!(semibold, expected);
        assert!(regular > 0.0);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let result = FontRegistry::load(Some(Path::new("/nonexistent/font.ttc")), None);
        assert!(result.is_err());
    }
}
