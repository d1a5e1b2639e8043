use ingest::chunk;
use proptest::prelude::*;

fn non_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

proptest! {
    #[test]
    fn chunking_is_deterministic(text in "\\PC{0,600}", size in 1usize..300, overlap in 0usize..300) {
        let first = chunk(&text, size, overlap);
        let second = chunk(&text, size, overlap);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn chunks_are_never_empty(text in "[a-z .!?\\n]{0,800}", size in 1usize..300, overlap in 0usize..300) {
        for piece in chunk(&text, size, overlap) {
            prop_assert!(!piece.is_empty());
            prop_assert_eq!(piece.trim(), piece.as_str());
        }
    }

    #[test]
    fn chunks_respect_window(text in "\\PC{0,800}", size in 1usize..300, overlap in 0usize..300) {
        for piece in chunk(&text, size, overlap) {
            prop_assert!(piece.chars().count() <= size);
        }
    }

    #[test]
    fn without_overlap_chunks_reassemble_text(text in "[a-zA-Z .!?\\n\u{e9}\u{4e2d}]{0,800}", size in 1usize..300) {
        let pieces = chunk(&text, size, 0);
        prop_assert_eq!(non_whitespace(&pieces.concat()), non_whitespace(&text));
    }

    #[test]
    fn with_overlap_every_chunk_is_a_substring(text in "[a-z .!?\\n]{0,800}", size in 2usize..300, overlap in 1usize..300) {
        for piece in chunk(&text, size, overlap) {
            prop_assert!(text.contains(&piece));
        }
    }

    #[test]
    fn with_overlap_no_content_is_lost(text in "[a-z .!?\\n]{0,800}", size in 2usize..300, overlap in 1usize..300) {
        let pieces = chunk(&text, size, overlap);
        // every non-whitespace character of the input shows up in some chunk
        let covered: String = pieces.concat();
        for c in non_whitespace(&text).chars() {
            prop_assert!(covered.contains(c));
        }
    }
}
