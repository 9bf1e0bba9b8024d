use document_core::{Diff, DiffKind, Document, PieceMeta, PieceType};

fn meta(value: serde_json::Value) -> PieceMeta {
    value.as_object().cloned().expect("object")
}

#[test]
fn test_format_range_covers_every_piece() {
    let mut doc = Document::from_text("ab\ncd");
    let bold = meta(serde_json::json!({"bold": true}));
    let diffs = doc.format(0, 5, &bold);

    assert_eq!(
        diffs,
        vec![
            Diff { kind: DiffKind::Replace, line_number: 1 },
            Diff { kind: DiffKind::Replace, line_number: 2 },
        ]
    );
    assert!(doc.get_pieces().iter().all(|p| p.meta == Some(bold.clone())));
    doc.integrity_check();
}

#[test]
fn test_format_partial_piece_splits_at_boundaries() {
    let mut doc = Document::new();
    doc.insert(0, "abc", None).unwrap();
    doc.format(1, 1, &meta(serde_json::json!({"em": true})));

    let described: Vec<(String, bool)> = doc
        .get_pieces()
        .iter()
        .map(|p| (doc.piece_text(p), p.meta.is_some()))
        .collect();
    assert_eq!(
        described,
        vec![
            ("a".to_string(), false),
            ("b".to_string(), true),
            ("c".to_string(), false),
        ]
    );
    assert_eq!(doc.get_text(), "abc");
    doc.integrity_check();
}

#[test]
fn test_format_text_skips_line_feeds_and_non_text() {
    let mut doc = Document::from_text("ab\ncd");
    doc.insert(2, "", Some(meta(serde_json::json!({"kind": "hr"})))).unwrap();

    let bold = meta(serde_json::json!({"bold": true}));
    doc.format_text(0, doc.len(), &bold);

    for piece in doc.get_pieces() {
        match piece.piece_type() {
            PieceType::Text => assert_eq!(piece.meta, Some(bold.clone())),
            PieceType::LineFeed => assert_eq!(piece.meta, None),
            PieceType::NonText => {
                assert_eq!(piece.meta, Some(meta(serde_json::json!({"kind": "hr"}))));
            }
            PieceType::Structural => unreachable!(),
        }
    }
}

#[test]
fn test_format_non_text_touches_only_non_text() {
    let mut doc = Document::from_text("ab");
    doc.insert(1, "", Some(meta(serde_json::json!({"kind": "hr"})))).unwrap();

    doc.format_non_text(0, doc.len(), &meta(serde_json::json!({"w": 10})));

    let pieces = doc.get_pieces();
    assert_eq!(pieces[0].meta, None);
    assert_eq!(
        pieces[1].meta,
        Some(meta(serde_json::json!({"kind": "hr", "w": 10})))
    );
    assert_eq!(pieces[2].meta, None);
}

#[test]
fn test_format_merges_nested_meta() {
    let mut doc = Document::from_text("x");
    doc.format(0, 1, &meta(serde_json::json!({"style": {"color": "red"}, "size": 1})));
    doc.format(0, 1, &meta(serde_json::json!({"style": {"weight": 700}})));

    assert_eq!(
        doc.get_pieces()[0].meta,
        Some(meta(serde_json::json!({"style": {"color": "red", "weight": 700}, "size": 1})))
    );
}

#[test]
fn test_format_undo_restores_meta() {
    let mut doc = Document::from_text("ab\ncd");
    let before = doc.get_pieces();

    doc.format(0, 5, &meta(serde_json::json!({"bold": true})));
    assert!(doc.get_pieces().iter().any(|p| p.meta.is_some()));

    let diffs = doc.undo();
    assert!(diffs.iter().all(|d| d.kind == DiffKind::Replace));
    assert_eq!(doc.get_pieces(), before);
    assert_eq!(doc.get_text(), "ab\ncd");
    doc.integrity_check();

    doc.redo();
    assert!(doc.get_pieces().iter().all(|p| p.meta.is_some()));
}

#[test]
fn test_format_undo_restores_overwritten_values() {
    let mut doc = Document::from_text("x");
    doc.format(0, 1, &meta(serde_json::json!({"size": 1})));
    doc.format(0, 1, &meta(serde_json::json!({"size": 2})));

    doc.undo();
    assert_eq!(doc.get_pieces()[0].meta, Some(meta(serde_json::json!({"size": 1}))));
    doc.undo();
    assert_eq!(doc.get_pieces()[0].meta, None);
}

#[test]
fn test_reformatting_same_meta_records_no_patches() {
    let mut doc = Document::from_text("x");
    let m = meta(serde_json::json!({"size": 1}));
    doc.format(0, 1, &m);
    doc.format(0, 1, &m);

    // Undoing the no-op format changes nothing.
    doc.undo();
    assert_eq!(doc.get_pieces()[0].meta, Some(m.clone()));
    doc.undo();
    assert_eq!(doc.get_pieces()[0].meta, None);
}

#[test]
fn test_format_before_first_line() {
    let mut doc = Document::from_text("hello");
    let diffs = doc.format_before_first_line(&meta(serde_json::json!({"align": "center"})));
    assert_eq!(diffs, vec![Diff { kind: DiffKind::Replace, line_number: 1 }]);
    assert_eq!(doc.get_line_meta(1), Some(meta(serde_json::json!({"align": "center"}))));

    doc.undo();
    assert_eq!(doc.get_line_meta(1), None);
}

#[test]
fn test_format_zero_length_is_noop() {
    let mut doc = Document::from_text("hello");
    assert!(doc.format(2, 0, &meta(serde_json::json!({"x": 1}))).is_empty());
    assert!(doc.format(99, 5, &meta(serde_json::json!({"x": 1}))).is_empty());
    assert!(!doc.can_undo());
}
