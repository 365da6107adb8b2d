//! Property test: splitting never loses or reorders text.
//!
//! Chapters are contiguous slices of the input, so concatenating them
//! must reproduce the input byte-for-byte, whatever structure (or lack
//! of it) the generator produced.

use narravox_splitter::BookAnalyzer;
use proptest::prelude::*;

proptest! {
    #[test]
    fn split_round_trips_any_text(
        lines in prop::collection::vec(
            prop_oneof![
                Just(String::new()),
                "[a-zA-Z ,.']{0,80}",
                (1u32..30).prop_map(|n| format!("Chapter {n}")),
                (1u32..10).prop_map(|n| format!("{n}.")),
            ],
            0..120,
        )
    ) {
        let text = lines.join("\n");
        let chapters = BookAnalyzer::new().split(&text);

        let rejoined: String = chapters.iter().map(|c| c.text.as_str()).collect();
        prop_assert_eq!(rejoined, text);

        for (i, chapter) in chapters.iter().enumerate() {
            prop_assert_eq!(chapter.number as usize, i + 1);
        }
    }
}
