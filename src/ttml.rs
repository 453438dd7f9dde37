//! Converts TTML lyric files into quotation markup.
//!
//! Every `<div>` becomes a `[-]part` divider, every `<p>` a tagged line.
//! Files with a second singer put their lines on the right (`[-:]`) and the
//! lead on the left (`[:-]`); otherwise lines are centred (`[:-:]`).
//! Background vocals and translations follow their line in the small tier.

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;

const DEFAULT_LANG: &str = "zh-Hans";

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    /// Attribute by local name, ignoring the namespace prefix.
    fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == local)
            .map(|(_, value)| value.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    fn descendants<'a>(&'a self, local: &'a str, out: &mut Vec<&'a Element>) {
        for child in self.elements() {
            if child.name == local {
                out.push(child);
            }
            child.descendants(local, out);
        }
    }

    fn find_all<'a>(&'a self, local: &'a str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.descendants(local, &mut out);
        out
    }

    /// Text before the first child element.
    fn leading_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => break,
            }
        }
        out
    }

    fn all_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => out.push_str(&element.all_text()),
            }
        }
        out
    }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.with_context(|| "malformed TTML attribute")?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .with_context(|| "malformed TTML attribute value")?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_reader(Cursor::new(xml.as_bytes()));
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(start_element(&e)?),
            Ok(Event::Empty(e)) => {
                let element = start_element(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(anyhow!("unbalanced TTML end tag"));
                }
                if let Some(element) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(Node::Element(element));
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().with_context(|| "malformed TTML text")?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("invalid TTML: {}", err)),
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(anyhow!("unterminated TTML element"));
    }
    let document = stack.pop().unwrap_or_default();
    document
        .children
        .into_iter()
        .find_map(|child| match child {
            Node::Element(element) if element.name == "tt" => Some(element),
            _ => None,
        })
        .ok_or_else(|| anyhow!("TTML root element <tt> is missing"))
}

#[derive(Debug, Default)]
struct LyricLine {
    key: Option<String>,
    duet: bool,
    text: String,
    background: Option<Box<LyricLine>>,
    translations: BTreeMap<String, String>,
    translation: Option<String>,
}

impl LyricLine {
    fn parse(p: &Element, parent_duet: Option<bool>) -> Self {
        let duet = match parent_duet {
            Some(duet) => duet,
            None => p.attr("agent").is_some_and(|agent| agent != "v1"),
        };
        let mut line = LyricLine {
            key: p.attr("key").map(str::to_string),
            duet,
            ..LyricLine::default()
        };

        for child in &p.children {
            match child {
                Node::Text(text) => line.text.push_str(text),
                Node::Element(span) => match span.attr("role") {
                    Some("x-bg") => {
                        line.background = Some(Box::new(LyricLine::parse(span, Some(duet))));
                    }
                    Some("x-translation") => {
                        let lang = span.attr("lang").unwrap_or(DEFAULT_LANG).to_string();
                        line.translations.insert(lang, span.leading_text());
                    }
                    Some(_) => {}
                    None => line.text.push_str(&span.leading_text()),
                },
            }
        }

        if parent_duet.is_some()
            && let Some(inner) = strip_brackets(line.text.trim())
        {
            line.text = inner.trim().to_string();
        }
        line
    }

    /// Adds a translation from the metadata block. A bracketed part goes to
    /// the background vocal line when there is one.
    fn add_translation(&mut self, text: &str, lang: &str) {
        if let Some(background) = self.background.as_mut()
            && let Some((start, end, inner)) = find_bracketed(text)
        {
            background
                .translations
                .insert(lang.to_string(), inner.trim().to_string());
            let rest = format!("{}{}", &text[..start], &text[end..]);
            self.translations
                .insert(lang.to_string(), rest.trim().to_string());
            return;
        }
        self.translations
            .insert(lang.to_string(), text.trim().to_string());
    }

    fn choose_translation(&mut self, lang: Option<&str>) {
        self.translation = lang.and_then(|lang| self.translations.get(lang).cloned());
        if let Some(background) = self.background.as_mut() {
            background.choose_translation(lang);
        }
    }

    fn to_markup(&self, have_duet: bool) -> String {
        let head = if !have_duet {
            "[:-:]"
        } else if self.duet {
            "[-:]"
        } else {
            "[:-]"
        };
        let mut out = Vec::new();
        if !self.text.is_empty() {
            out.push(format!("{}{}", head, self.text));
        }
        let small = head.replace('-', "_");
        let background = self.background.as_deref();
        if let Some(bg) = background.filter(|bg| !bg.text.is_empty()) {
            out.push(format!("{}({})", small, bg.text));
        }
        if let Some(translation) = self.translation.as_deref().filter(|t| !t.is_empty()) {
            out.push(format!("{}{}", small, translation));
        }
        if let Some(translation) = background
            .and_then(|bg| bg.translation.as_deref())
            .filter(|t| !t.is_empty())
        {
            out.push(format!("{}({})", small, translation));
        }
        out.join("\n")
    }
}

fn is_open(ch: char) -> bool {
    ch == '(' || ch == '（'
}

fn is_close(ch: char) -> bool {
    ch == ')' || ch == '）'
}

/// Content of a leading bracket group such as `(oh yeah)`.
fn strip_brackets(text: &str) -> Option<&str> {
    let rest = text.trim_start_matches(is_open);
    if rest.len() == text.len() {
        return None;
    }
    let first = rest.chars().next()?;
    let close = rest[first.len_utf8()..].find(is_close)? + first.len_utf8();
    Some(&rest[..close])
}

/// First bracket group anywhere in `text`: byte span and inner content.
fn find_bracketed(text: &str) -> Option<(usize, usize, &str)> {
    let mut search = 0;
    while let Some(offset) = text[search..].find(is_open) {
        let start = search + offset;
        let inner_start = start + text[start..].len() - text[start..].trim_start_matches(is_open).len();
        if let Some(inner) = strip_brackets(&text[start..]) {
            let after = inner_start + inner.len();
            let end = after + text[after..].len() - text[after..].trim_start_matches(is_close).len();
            return Some((start, end, inner));
        }
        search = inner_start;
        if search >= text.len() {
            break;
        }
    }
    None
}

fn select_language(langs: &BTreeSet<String>) -> Option<&str> {
    for preferred in ["zh-Hans", "zh-CN", "zh-Hant"] {
        if langs.contains(preferred) {
            return Some(preferred);
        }
    }
    langs
        .iter()
        .find(|lang| lang.starts_with("zh"))
        .or_else(|| langs.iter().next())
        .map(String::as_str)
}

/// Renders a TTML document as quotation markup, one entry per line.
pub fn to_markup(ttml: &str) -> Result<String> {
    let tt = parse_tree(ttml)?;
    if tt.find_all("body").is_empty() {
        return Err(anyhow!("TTML document has no <body>"));
    }

    let mut parts: Vec<(String, Vec<LyricLine>)> = Vec::new();
    let mut langs = BTreeSet::new();
    let mut index = 0usize;
    for div in tt.find_all("div") {
        let name = div
            .attr("song-part")
            .or_else(|| div.attr("songPart"))
            .unwrap_or_default()
            .to_string();
        let mut lines = Vec::new();
        for p in div.find_all("p") {
            index += 1;
            let mut line = LyricLine::parse(p, None);
            if line.key.as_deref().is_none_or(str::is_empty) {
                line.key = Some(format!("L{}", index));
            }
            langs.extend(line.translations.keys().cloned());
            lines.push(line);
        }
        parts.push((name, lines));
    }

    let mut by_key: HashMap<String, (usize, usize)> = HashMap::new();
    for (part_idx, (_, lines)) in parts.iter().enumerate() {
        for (line_idx, line) in lines.iter().enumerate() {
            if let Some(key) = &line.key {
                by_key.insert(key.clone(), (part_idx, line_idx));
            }
        }
    }
    for translation in tt.find_all("translation") {
        let lang = translation.attr("lang").unwrap_or(DEFAULT_LANG).to_string();
        langs.insert(lang.clone());
        for text in translation.elements().filter(|element| element.name == "text") {
            let Some(target) = text.attr("for") else {
                continue;
            };
            if let Some(&(part_idx, line_idx)) = by_key.get(target) {
                parts[part_idx].1[line_idx].add_translation(&text.all_text(), &lang);
            }
        }
    }

    let lang = select_language(&langs).map(str::to_string);
    let have_duet = parts
        .iter()
        .flat_map(|(_, lines)| lines.iter())
        .any(|line| line.duet);

    let mut out = Vec::new();
    for (name, lines) in &mut parts {
        out.push(format!("[-]{}", name));
        for line in lines.iter_mut() {
            line.choose_translation(lang.as_deref());
            out.push(line.to_markup(have_duet));
        }
    }
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLO: &str = r#"<tt xmlns="http://www.w3.org/ns/ttml" xmlns:ttm="http://www.w3.org/ns/ttml#metadata" xmlns:itunes="http://music.apple.com/lyric-ttml-internal" xml:lang="ja">
<body><div itunes:song-part="Verse">
<p begin="0" end="1" itunes:key="L1"><span begin="0" end="1">Hello</span> <span begin="1" end="2">world</span><span ttm:role="x-translation" xml:lang="zh-Hans">你好世界</span></p>
<p begin="2" end="3"><span>Second</span><span ttm:role="x-bg"><span>(echo)</span></span></p>
</div></body></tt>"#;

    #[test]
    fn solo_file_is_centred() {
        insta::assert_snapshot!(to_markup(SOLO).expect("convert"), @r###"
        [-]Verse
        [:-:]Hello world
        [:_:]你好世界
        [:-:]Second
        [:_:](echo)
        "###);
    }

    #[test]
    fn duet_lines_split_sides() {
        let xml = r#"<tt xmlns:ttm="http://www.w3.org/ns/ttml#metadata"><body><div>
<p ttm:agent="v1"><span>Lead</span></p>
<p ttm:agent="v2"><span>Second voice</span></p>
</div></body></tt>"#;
        assert_eq!(
            to_markup(xml).expect("convert"),
            "[-]\n[:-]Lead\n[-:]Second voice"
        );
    }

    #[test]
    fn metadata_translations_prefer_simplified_chinese() {
        let xml = r#"<tt xmlns:itunes="http://music.apple.com/lyric-ttml-internal" xmlns:ttm="http://www.w3.org/ns/ttml#metadata">
<head><metadata><iTunesMetadata xmlns="http://music.apple.com/lyric-ttml-internal"><translations>
<translation xml:lang="en"><text for="L1">One</text></translation>
<translation xml:lang="zh-Hant"><text for="L1">壹</text></translation>
<translation xml:lang="zh-Hans"><text for="L1">一（背景）</text></translation>
</translations></iTunesMetadata></metadata></head>
<body><div><p itunes:key="L1"><span>Uno</span><span ttm:role="x-bg"><span>(bg)</span></span></p></div></body></tt>"#;
        assert_eq!(
            to_markup(xml).expect("convert"),
            "[-]\n[:-:]Uno\n[:_:](bg)\n[:_:]一\n[:_:](背景)"
        );
    }

    #[test]
    fn missing_body_is_an_error() {
        assert!(to_markup("<tt><head/></tt>").is_err());
        assert!(to_markup("<tt><body>").is_err());
        assert!(to_markup("not xml at all").is_err());
    }

    #[test]
    fn bracket_helpers() {
        assert_eq!(strip_brackets("(oh yeah)"), Some("oh yeah"));
        assert_eq!(strip_brackets("（哦）"), Some("哦"));
        assert_eq!(strip_brackets("plain"), None);
        assert_eq!(find_bracketed("a (b) c"), Some((2, 5, "b")));
        assert_eq!(select_language(&BTreeSet::from(["en".to_string(), "ja".to_string()])), Some("en"));
        assert_eq!(select_language(&BTreeSet::from(["zh-TW".to_string(), "en".to_string()])), Some("zh-TW"));
        assert_eq!(select_language(&BTreeSet::new()), None);
    }
}
