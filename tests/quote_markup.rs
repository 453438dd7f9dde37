use music_card::FontRegistry;
use music_card::layout::{PlacedLine, layout_block, layout_line};
use music_card::markup::{Alignment, SizeTier, Tag, resolve_style, tokenize};
use music_card::ttml;

fn triple(line: &music_card::markup::QuoteLine) -> (Alignment, f32, SizeTier) {
    let style = line.style();
    (style.alignment, style.width_fraction, style.size_tier)
}

#[test]
fn left_and_right_lines() {
    let lines = tokenize("[:-]Hello\n[-:]World");
    assert_eq!(lines.len(), 2);
    assert_eq!(triple(&lines[0]), (Alignment::Left, 0.8, SizeTier::Normal));
    assert_eq!(triple(&lines[1]), (Alignment::Right, 0.8, SizeTier::Normal));
    insta::assert_debug_snapshot!(lines, @r###"
    [
        QuoteLine {
            raw_text: "[:-]Hello",
            tag: Some(
                Align {
                    alignment: Left,
                    tier: Normal,
                },
            ),
            display_text: "Hello",
        },
        QuoteLine {
            raw_text: "[-:]World",
            tag: Some(
                Align {
                    alignment: Right,
                    tier: Normal,
                },
            ),
            display_text: "World",
        },
    ]
    "###);
}

#[test]
fn small_centred_line() {
    let lines = tokenize("[:_:]Echo");
    assert_eq!(lines.len(), 1);
    assert_eq!(triple(&lines[0]), (Alignment::Center, 0.8, SizeTier::Small));
    assert_eq!(lines[0].display_text, "Echo");
}

#[test]
fn plain_text_line() {
    let lines = tokenize("Plain text");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].tag, None);
    assert_eq!(triple(&lines[0]), (Alignment::Default, 1.0, SizeTier::Normal));
    assert_eq!(lines[0].display_text, "Plain text");
}

#[test]
fn malformed_tags_fall_back_to_plain() {
    for input in ["[::]x", "[-_]x", "[:-:x", "[ :-: ]x", "[left]x", "[]x"] {
        let lines = tokenize(input);
        assert_eq!(lines[0].tag, None, "{input}");
        assert_eq!(lines[0].display_text, input);
        assert_eq!(resolve_style(lines[0].tag.as_ref()), resolve_style(None));
    }
}

#[test]
fn right_aligned_text_touches_region_edge() {
    let fonts = FontRegistry::estimated();
    let block_width = 600.0;
    for line in tokenize("[-:]short\n[_:]tiny\n[-:]a considerably longer right aligned line") {
        let style = line.style();
        let geometry = layout_line(&line.display_text, &style, block_width, 34.0, &fonts);
        let region = style.width_fraction * block_width;
        assert!(geometry.draw_width >= 0.0);
        assert!(geometry.draw_width <= region + 1e-3);
        assert!((geometry.origin_x + geometry.draw_width - region).abs() < 1e-3);
    }
}

#[test]
fn lyric_file_lays_out_in_order() {
    let markup = ttml::to_markup(include_str!("fixtures/duet.ttml")).expect("duet fixture");
    assert_eq!(
        markup,
        "[-]Verse\n[:-]Hold on\n[-:]To the stars\n[_:](echo)\n[_:]向着星空\n[_:](回声)\n[-]Chorus\n[:-]Sing & shine"
    );

    let fonts = FontRegistry::estimated();
    let block = layout_block(&tokenize(&markup), 600.0, 34.0, &fonts);
    assert_eq!(block.lines.len(), 8);
    assert!(matches!(block.lines[0], PlacedLine::Divider { .. }));
    assert!(matches!(block.lines[6], PlacedLine::Divider { .. }));
    let mut last = -1.0;
    for line in &block.lines {
        let y = match line {
            PlacedLine::Text { y, .. } => *y,
            PlacedLine::Divider { mid_y, .. } => *mid_y,
            PlacedLine::Spacer { y, .. } => *y,
        };
        assert!(y > last);
        last = y;
    }
    let tags: Vec<_> = tokenize(&markup).into_iter().map(|line| line.tag).collect();
    assert_eq!(tags[0], Some(Tag::Divider));
}
