use document_core::{Document, PieceMeta};

fn meta(value: serde_json::Value) -> PieceMeta {
    value.as_object().cloned().expect("object")
}

fn line_texts(doc: &Document) -> Vec<String> {
    doc.get_lines()
        .iter()
        .map(|line| line.pieces.iter().map(|p| p.text.as_str()).collect())
        .collect()
}

#[test]
fn test_get_lines() {
    let doc = Document::from_text("one\ntwo\nthree");
    assert_eq!(doc.line_count(), 3);
    assert_eq!(line_texts(&doc), vec!["one", "two", "three"]);
}

#[test]
fn test_trailing_newline_yields_empty_last_line() {
    let doc = Document::from_text("a\nb\n");
    assert_eq!(doc.line_count(), 3);
    assert_eq!(line_texts(&doc), vec!["a", "b", ""]);
}

#[test]
fn test_insert_line() {
    let mut doc = Document::from_text("one\ntwo");
    let diffs = doc.insert_line(2, "mid", None);
    assert!(!diffs.is_empty());
    assert_eq!(doc.get_text(), "one\nmid\ntwo");
    assert_eq!(line_texts(&doc), vec!["one", "mid", "two"]);

    doc.insert_line(1, "top", None);
    assert_eq!(doc.get_text(), "top\none\nmid\ntwo");
}

#[test]
fn test_insert_line_out_of_range_is_noop() {
    let mut doc = Document::from_text("one\ntwo");
    assert!(doc.insert_line(0, "x", None).is_empty());
    assert!(doc.insert_line(3, "x", None).is_empty());
    assert_eq!(doc.get_text(), "one\ntwo");
}

#[test]
fn test_insert_line_break() {
    let mut doc = Document::from_text("ab");
    let diffs = doc.insert_line_break(1);
    assert!(!diffs.is_empty());
    assert_eq!(doc.get_text(), "ab\n");
    assert_eq!(doc.line_count(), 2);

    assert!(doc.insert_line_break(9).is_empty());
}

#[test]
fn test_delete_line_middle() {
    let mut doc = Document::from_text("one\ntwo\nthree");
    let diffs = doc.delete_line(2);
    assert!(!diffs.is_empty());
    assert_eq!(doc.get_text(), "one\nthree");
    assert_eq!(doc.line_count(), 2);
}

#[test]
fn test_delete_line_first_and_last() {
    let mut doc = Document::from_text("one\ntwo\nthree");
    doc.delete_line(1);
    assert_eq!(doc.get_text(), "two\nthree");

    doc.delete_line(2);
    assert_eq!(doc.get_text(), "two");
    assert_eq!(doc.line_count(), 1);
}

#[test]
fn test_delete_only_line_clears_content() {
    let mut doc = Document::from_text("solo");
    doc.delete_line(1);
    assert_eq!(doc.get_text(), "");
    assert_eq!(doc.line_count(), 1);
    doc.integrity_check();

    // Deleting an already-empty single line is a no-op.
    assert!(doc.delete_line(1).is_empty());
}

#[test]
fn test_delete_line_out_of_range_is_noop() {
    let mut doc = Document::from_text("one\ntwo");
    assert!(doc.delete_line(0).is_empty());
    assert!(doc.delete_line(3).is_empty());
    assert_eq!(doc.get_text(), "one\ntwo");
}

#[test]
fn test_format_line_sets_line_meta() {
    let mut doc = Document::from_text("a\nb");
    assert_eq!(doc.get_line_meta(1), None);
    assert_eq!(doc.get_line_meta(2), None);

    doc.format_line(2, &meta(serde_json::json!({"heading": 2})));
    assert_eq!(doc.get_line_meta(2), Some(meta(serde_json::json!({"heading": 2}))));
    assert_eq!(doc.get_line_meta(1), None);

    doc.format_line(1, &meta(serde_json::json!({"heading": 1})));
    assert_eq!(doc.get_line_meta(1), Some(meta(serde_json::json!({"heading": 1}))));

    // Line meta is exposed on the line shape too.
    assert_eq!(doc.get_line(2).meta, Some(meta(serde_json::json!({"heading": 2}))));
    // Content pieces stay clean.
    assert!(doc.get_pieces().iter().filter(|p| p.line_feed_count == 0).all(|p| p.meta.is_none()));
}

#[test]
fn test_format_line_out_of_range_is_noop() {
    let mut doc = Document::from_text("a");
    assert!(doc.format_line(0, &meta(serde_json::json!({"x": 1}))).is_empty());
    assert!(doc.format_line(2, &meta(serde_json::json!({"x": 1}))).is_empty());
}

#[test]
fn test_format_in_line() {
    let mut doc = Document::from_text("hello world\nsecond");
    let bold = meta(serde_json::json!({"bold": true}));
    doc.format_in_line(1, 6..11, &bold);

    let formatted: Vec<(String, bool)> = doc
        .get_pieces()
        .iter()
        .map(|p| (doc.piece_text(p), p.meta.is_some()))
        .collect();
    assert_eq!(
        formatted,
        vec![
            ("hello ".to_string(), false),
            ("world".to_string(), true),
            ("\n".to_string(), false),
            ("second".to_string(), false),
        ]
    );

    // Ranges clamp to the line width and never leak onto the next line.
    doc.format_in_line(2, 0..100, &bold);
    let line = doc.get_line(2);
    assert!(line.pieces.iter().all(|p| p.meta.is_some()));
    assert_eq!(doc.get_line(1).pieces[0].meta, None);
}

#[test]
fn test_get_line_meta_out_of_range() {
    let doc = Document::from_text("a");
    assert_eq!(doc.get_line_meta(0), None);
    assert_eq!(doc.get_line_meta(5), None);
}

#[test]
fn test_for_each_line_visits_in_order() {
    let doc = Document::from_text("x\ny\nz");
    let mut seen = Vec::new();
    doc.for_each_line(|number, line| {
        seen.push((number, line.pieces[0].text.clone()));
    });
    assert_eq!(
        seen,
        vec![(1, "x".to_string()), (2, "y".to_string()), (3, "z".to_string())]
    );
}
