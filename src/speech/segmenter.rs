//! Incremental sentence segmentation for streamed replies
//!
//! The model's reply arrives in fragments that do not line up with
//! sentences. [`extract_next`] is polled after every fragment and pulls the
//! next speakable sentence off the front of the buffer as soon as a boundary
//! is visible. [`SentenceSplitter`] wraps it with the buffer and tag state a
//! chat turn needs.

/// Minimum characters before a comma counts as a sentence boundary
pub const SOFT_BOUNDARY_MIN_CHARS: usize = 10;

/// Marks that always end a sentence (when preceded by at least one char)
const TERMINAL_MARKS: &[char] = &['.', '?', '!', '。', '．', '！', '？', '\n'];

/// Commas that end a sentence once it is long enough
const SOFT_MARKS: &[char] = &[',', '、', '，'];

/// Bracket and quote marks that carry nothing pronounceable
const BRACKET_MARKS: &[char] = &[
    '[', '(', '{', '「', '［', '（', '【', '『', '〈', '《', '〔', '｛', '«', '‹', '〘', '〚', '〛',
    '〙', '›', '»', '〕', '》', '〉', '』', '】', '）', '］', '」', '}', ')', ']',
];

/// One sentence cut from the front of a buffer
///
/// `tag`, `sentence` and `remainder` are contiguous slices of the input, so
/// concatenating them gives the buffer back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Leading bracket tag, brackets included (e.g. `[happy]`)
    pub tag: Option<&'a str>,
    /// Sentence text up to and including its boundary mark
    pub sentence: &'a str,
    /// Everything after the boundary, untouched
    pub remainder: &'a str,
}

/// Result of polling the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<'a> {
    /// A boundary was found
    Complete(Segment<'a>),
    /// No boundary yet; keep the buffer and wait for more text
    Incomplete,
}

/// Extract the next complete sentence from `buffer`
///
/// A boundary is the earliest of:
/// - a terminal mark (`. ? ! 。 ． ！ ？` or newline) after at least one char
/// - a comma (`, 、 ，`) after at least [`SOFT_BOUNDARY_MIN_CHARS`] chars
///
/// A leading `[...]` tag is split off before the search.
#[must_use]
pub fn extract_next(buffer: &str) -> Extraction<'_> {
    let (tag, body) = split_leading_tag(buffer);

    find_boundary(body).map_or(Extraction::Incomplete, |end| {
        Extraction::Complete(Segment {
            tag,
            sentence: &body[..end],
            remainder: &body[end..],
        })
    })
}

/// Whether a sentence has nothing to say (only whitespace and brackets)
#[must_use]
pub fn is_unpronounceable(sentence: &str) -> bool {
    sentence
        .chars()
        .all(|c| c.is_whitespace() || BRACKET_MARKS.contains(&c))
}

/// Split a `[...]` tag off the start of `buffer`
///
/// The tag ends at the first `]` and may not span a newline.
fn split_leading_tag(buffer: &str) -> (Option<&str>, &str) {
    if !buffer.starts_with('[') {
        return (None, buffer);
    }

    for (i, c) in buffer.char_indices().skip(1) {
        match c {
            ']' => return (Some(&buffer[..=i]), &buffer[i + 1..]),
            '\n' => break,
            _ => {}
        }
    }

    (None, buffer)
}

/// Byte offset just past the first boundary mark in `body`
fn find_boundary(body: &str) -> Option<usize> {
    body.char_indices()
        .enumerate()
        .find(|&(preceding, (_, c))| {
            (preceding >= 1 && TERMINAL_MARKS.contains(&c))
                || (preceding >= SOFT_BOUNDARY_MIN_CHARS && SOFT_MARKS.contains(&c))
        })
        .map(|(_, (i, c))| i + c.len_utf8())
}

/// A speakable sentence with the tag in effect when it was cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSentence {
    /// Most recent bracket tag, brackets included
    pub tag: Option<String>,
    /// Sentence text
    pub sentence: String,
}

impl TaggedSentence {
    /// Transcript form: `[tag] sentence`, or the bare sentence
    #[must_use]
    pub fn transcript_line(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{tag} {}", self.sentence),
            None => self.sentence.clone(),
        }
    }
}

/// Stateful splitter fed with stream fragments
///
/// Keeps the unconsumed text and the current tag between fragments. A tag
/// stays in effect for every following sentence until a new one replaces
/// it, and survives sentences that are dropped as unpronounceable.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
    tag: Option<String>,
}

impl SentenceSplitter {
    /// Create an empty splitter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every sentence that became complete
    pub fn push(&mut self, fragment: &str) -> Vec<TaggedSentence> {
        self.buffer.push_str(fragment);

        // A sentence never starts with whitespace, so a tag can lead the buffer
        let leading = self.buffer.len() - self.buffer.trim_start().len();
        self.buffer.replace_range(..leading, "");

        let mut sentences = Vec::new();
        loop {
            let (tag, sentence, consumed) = match extract_next(&self.buffer) {
                Extraction::Complete(segment) => (
                    segment.tag.map(str::to_owned),
                    segment.sentence.to_owned(),
                    self.buffer.len() - segment.remainder.trim_start().len(),
                ),
                Extraction::Incomplete => break,
            };

            self.buffer.replace_range(..consumed, "");
            if tag.is_some() {
                self.tag = tag;
            }

            if is_unpronounceable(&sentence) {
                tracing::trace!(sentence, "dropping unpronounceable sentence");
                continue;
            }

            sentences.push(TaggedSentence {
                tag: self.tag.clone(),
                sentence,
            });
        }

        sentences
    }

    /// Flush the trailing text once the stream has ended
    ///
    /// Returns `None` when nothing pronounceable is left.
    pub fn finish(&mut self) -> Option<TaggedSentence> {
        let rest = std::mem::take(&mut self.buffer);
        let (tag, body) = split_leading_tag(&rest);
        if let Some(tag) = tag {
            self.tag = Some(tag.to_owned());
        }

        if is_unpronounceable(body) {
            return None;
        }

        Some(TaggedSentence {
            tag: self.tag.clone(),
            sentence: body.to_owned(),
        })
    }

    /// Text received but not yet cut into a sentence
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Tag currently in effect
    #[must_use]
    pub fn current_tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chain `extract_next` over `input` and glue every piece back together
    fn reconstruct(input: &str) -> String {
        let mut out = String::new();
        let mut rest = input;

        while let Extraction::Complete(segment) = extract_next(rest) {
            out.push_str(segment.tag.unwrap_or_default());
            out.push_str(segment.sentence);
            rest = segment.remainder;
        }

        out.push_str(rest);
        out
    }

    fn complete(buffer: &str) -> Segment<'_> {
        match extract_next(buffer) {
            Extraction::Complete(segment) => segment,
            Extraction::Incomplete => panic!("expected a sentence in {buffer:?}"),
        }
    }

    // ---- extract_next ----

    #[test]
    fn first_sentence_is_cut_at_earliest_terminal() {
        let segment = complete("Hello there. How are you?");
        assert_eq!(segment.tag, None);
        assert_eq!(segment.sentence, "Hello there.");
        assert_eq!(segment.remainder, " How are you?");
    }

    #[test]
    fn long_clause_breaks_at_soft_comma() {
        let input = format!("{}、", "a".repeat(12));
        let segment = complete(&input);
        assert_eq!(segment.sentence.chars().count(), 13);
        assert_eq!(segment.remainder, "");
    }

    #[test]
    fn short_clause_does_not_break_at_comma() {
        assert_eq!(extract_next("short,"), Extraction::Incomplete);
    }

    #[test]
    fn soft_threshold_counts_characters_not_bytes() {
        // nine wide chars are 27 bytes but still below the threshold
        assert_eq!(extract_next("あいうえおかきくけ、"), Extraction::Incomplete);
        assert_eq!(complete("あいうえおかきくけこ、").sentence, "あいうえおかきくけこ、");
    }

    #[test]
    fn full_width_terminals_end_sentences() {
        assert_eq!(complete("こんにちは。元気？").sentence, "こんにちは。");
        assert_eq!(complete("すごい！").sentence, "すごい！");
        assert_eq!(complete("ｘ．ｙ").sentence, "ｘ．");
    }

    #[test]
    fn newline_ends_a_sentence() {
        let segment = complete("first line\nsecond");
        assert_eq!(segment.sentence, "first line\n");
        assert_eq!(segment.remainder, "second");
    }

    #[test]
    fn lone_terminal_is_not_a_sentence() {
        assert_eq!(extract_next("."), Extraction::Incomplete);
        assert_eq!(extract_next(""), Extraction::Incomplete);
    }

    #[test]
    fn no_boundary_is_incomplete() {
        assert_eq!(extract_next("Still thinking about it"), Extraction::Incomplete);
    }

    #[test]
    fn leading_tag_is_split_off() {
        let segment = complete("[happy]Great news!");
        assert_eq!(segment.tag, Some("[happy]"));
        assert_eq!(segment.sentence, "Great news!");
        assert_eq!(segment.remainder, "");
    }

    #[test]
    fn tag_alone_is_incomplete() {
        assert_eq!(extract_next("[sad]"), Extraction::Incomplete);
        assert_eq!(extract_next("[sad]Oh no"), Extraction::Incomplete);
    }

    #[test]
    fn unterminated_tag_is_plain_text() {
        let segment = complete("[oops. then");
        assert_eq!(segment.tag, None);
        assert_eq!(segment.sentence, "[oops.");
    }

    #[test]
    fn tag_does_not_span_newline() {
        let segment = complete("[a\nb]");
        assert_eq!(segment.tag, None);
        assert_eq!(segment.sentence, "[a\n");
    }

    #[test]
    fn terminal_before_soft_comma_wins() {
        let segment = complete("Yes. and then a very long clause, more");
        assert_eq!(segment.sentence, "Yes.");
    }

    #[test]
    fn soft_comma_before_terminal_wins() {
        let segment = complete("This clause is long, then ends.");
        assert_eq!(segment.sentence, "This clause is long,");
        assert_eq!(segment.remainder, " then ends.");
    }

    #[test]
    fn extraction_is_lossless() {
        let inputs = [
            "Hello there. How are you?",
            "[happy]Great news! We shipped it, finally, after a long time.\nBye",
            "「」\n[sad]Oh no… that is unfortunate、本当に残念です。それでは",
            "no boundary at all",
            "[neutral]",
            "a.b.c.d",
            "",
        ];

        for input in inputs {
            assert_eq!(reconstruct(input), input);
        }
    }

    #[test]
    fn extraction_is_lossless_for_every_growing_prefix() {
        let input = "[relaxed]Take it easy, there is plenty of time. 「Sure」!\nOkay";
        let boundaries: Vec<usize> = input
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(input.len()))
            .collect();

        for end in boundaries {
            let prefix = &input[..end];
            assert_eq!(reconstruct(prefix), prefix);
        }
    }

    // ---- is_unpronounceable ----

    #[test]
    fn bracket_only_sentences_are_unpronounceable() {
        assert!(is_unpronounceable("「」"));
        assert!(is_unpronounceable(" 【】\n"));
        assert!(is_unpronounceable("()"));
        assert!(is_unpronounceable(""));
        assert!(!is_unpronounceable("「はい」"));
        assert!(!is_unpronounceable("(ok)"));
    }

    // ---- SentenceSplitter ----

    #[test]
    fn splitter_handles_arbitrary_fragments() {
        let mut splitter = SentenceSplitter::new();
        let mut sentences = Vec::new();

        for fragment in ["Hel", "lo the", "re. How", " are", " you?", " Fine"] {
            sentences.extend(splitter.push(fragment));
        }

        let texts: Vec<_> = sentences.iter().map(|s| s.sentence.as_str()).collect();
        assert_eq!(texts, vec!["Hello there.", "How are you?"]);
        assert_eq!(splitter.pending(), "Fine");
    }

    #[test]
    fn splitter_emits_every_ready_sentence_per_fragment() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("One. Two. Three.");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[2].sentence, "Three.");
    }

    #[test]
    fn tag_carries_over_to_following_sentences() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("[happy]Great news! It works.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences.iter().all(|s| s.tag.as_deref() == Some("[happy]")));
        assert_eq!(splitter.current_tag(), Some("[happy]"));
    }

    #[test]
    fn new_tag_replaces_old_one() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("[happy]Yay! [sad]Oh no.");
        assert_eq!(sentences[0].tag.as_deref(), Some("[happy]"));
        assert_eq!(sentences[1].tag.as_deref(), Some("[sad]"));
        assert_eq!(sentences[1].sentence, "Oh no.");
    }

    #[test]
    fn discarded_sentence_keeps_the_tag() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("[happy]「」\nGreat news!");
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].sentence, "Great news!");
        assert_eq!(sentences[0].tag.as_deref(), Some("[happy]"));
    }

    #[test]
    fn tag_after_whitespace_fragment_is_detected() {
        let mut splitter = SentenceSplitter::new();
        assert_eq!(splitter.push("[happy]Yes.").len(), 1);
        assert!(splitter.push(" [sad]Oh").is_empty());

        let last = splitter.push(" no.").remove(0);
        assert_eq!(last.tag.as_deref(), Some("[sad]"));
        assert_eq!(last.sentence, "Oh no.");
    }

    #[test]
    fn finish_flushes_trailing_text() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("[sad]No punctuation here").is_empty());

        let last = splitter.finish().expect("trailing sentence");
        assert_eq!(last.tag.as_deref(), Some("[sad]"));
        assert_eq!(last.sentence, "No punctuation here");
        assert_eq!(splitter.pending(), "");
    }

    #[test]
    fn finish_drops_unpronounceable_tail() {
        let mut splitter = SentenceSplitter::new();
        splitter.push("Done. 」");
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn transcript_line_prefixes_tag() {
        let tagged = TaggedSentence {
            tag: Some("[happy]".to_string()),
            sentence: "Great news!".to_string(),
        };
        assert_eq!(tagged.transcript_line(), "[happy] Great news!");

        let bare = TaggedSentence {
            tag: None,
            sentence: "Hi.".to_string(),
        };
        assert_eq!(bare.transcript_line(), "Hi.");
    }
}
