//! Randomized soak: hundreds of mixed mutations against a shadow model,
//! checking the tree invariants after every step, then unwinding and
//! replaying the whole session through the history stack.

use document_core::Document;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_text(rng: &mut StdRng) -> String {
    let n = rng.gen_range(1..8);
    (0..n)
        .map(|_| {
            if rng.gen_range(0..4) == 0 {
                '\n'
            } else {
                (b'a' + rng.gen_range(0..26u8)) as char
            }
        })
        .collect()
}

#[test]
fn test_random_editing_soak() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let mut doc = Document::new();
    let mut shadow: Vec<char> = Vec::new();

    for step in 0..400 {
        let len = doc.len();
        assert_eq!(len, shadow.len(), "length diverged before step {step}");

        match rng.gen_range(0..10) {
            0..=4 => {
                let at = rng.gen_range(0..=len);
                let text = random_text(&mut rng);
                doc.insert(at, &text, None).unwrap();
                shadow.splice(at..at, text.chars());
            }
            5..=7 => {
                if len == 0 {
                    continue;
                }
                let at = rng.gen_range(0..len);
                let n = rng.gen_range(1..=(len - at).min(10));
                doc.delete(at, n);
                shadow.drain(at..at + n);
            }
            _ => {
                if len == 0 {
                    continue;
                }
                let at = rng.gen_range(0..len);
                let n = rng.gen_range(1..=(len - at).min(6));
                let meta = serde_json::json!({ "step": step }).as_object().cloned().unwrap();
                doc.format(at, n, &meta);
            }
        }

        doc.integrity_check();
        let expected: String = shadow.iter().collect();
        assert_eq!(doc.get_text(), expected, "text diverged at step {step}");
        assert_eq!(
            doc.line_count(),
            expected.chars().filter(|&c| c == '\n').count() + 1,
            "line count diverged at step {step}"
        );
    }

    // Unwind the entire session, then replay it.
    while doc.can_undo() {
        doc.undo();
        doc.integrity_check();
    }
    assert_eq!(doc.get_text(), "");
    assert_eq!(doc.line_count(), 1);

    while doc.can_redo() {
        doc.redo();
        doc.integrity_check();
    }
    let expected: String = shadow.iter().collect();
    assert_eq!(doc.get_text(), expected);
}

#[test]
fn test_line_queries_agree_with_text() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut doc = Document::new();
    for _ in 0..120 {
        let at = rng.gen_range(0..=doc.len());
        let text = random_text(&mut rng);
        doc.insert(at, &text, None).unwrap();
    }

    let text = doc.get_text();
    let expected_lines: Vec<&str> = text.split('\n').collect();
    assert_eq!(doc.line_count(), expected_lines.len());
    for (i, expected) in expected_lines.iter().enumerate() {
        let line = doc.get_line(i + 1);
        let got: String = line.pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(&got, expected, "line {} diverged", i + 1);
    }
}
