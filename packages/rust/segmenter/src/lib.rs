//! Anchor-code segmentation of paginated corpus text.
//!
//! Pages are concatenated in order and split wherever an anchor code
//! (e.g. `6A05.1`) appears. Each anchor owns the text up to the next
//! anchor, so a description flowing across a page break stays attached
//! to its code.

pub mod overrides;

use std::path::Path;

use regex::Regex;

use ddxbuilder_shared::{DdxBuilderError, PageText, Result, SegmentOptions, TextSegment};

/// Page separator in extracted corpus text files (form feed).
const PAGE_SEPARATOR: char = '\u{0c}';

// ---------------------------------------------------------------------------
// Page loading
// ---------------------------------------------------------------------------

/// Compile the anchor pattern from config into a [`Regex`].
pub fn compile_anchor_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| DdxBuilderError::parse(format!("invalid anchor pattern {pattern:?}: {e}")))
}

/// Load form-feed-separated pages from `path`, keeping only the
/// 1-based inclusive window `[start_page, end_page]`.
pub fn load_pages(path: &Path, start_page: u32, end_page: u32) -> Result<Vec<PageText>> {
    if start_page == 0 || start_page > end_page {
        return Err(DdxBuilderError::validation(format!(
            "invalid page window {start_page}..={end_page}"
        )));
    }

    let raw = std::fs::read_to_string(path).map_err(|e| DdxBuilderError::io(path, e))?;

    let pages: Vec<PageText> = raw
        .split(PAGE_SEPARATOR)
        .enumerate()
        .map(|(i, content)| PageText {
            page_number: i as u32 + 1,
            content: content.to_string(),
        })
        .filter(|p| p.page_number >= start_page && p.page_number <= end_page)
        .collect();

    tracing::debug!(
        path = %path.display(),
        pages = pages.len(),
        start_page,
        end_page,
        "loaded corpus pages"
    );

    Ok(pages)
}

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// A run of page text: either an anchor code or the prose between anchors.
#[derive(Debug)]
struct Fragment {
    text: String,
    is_anchor: bool,
}

/// Segment pages into `(anchor_code, body)` records.
///
/// Text before the first anchor is discarded. The last anchor takes all
/// remaining text. Fragments shorter than `opts.min_fragment_len` after
/// trimming are dropped as extraction noise.
pub fn segment(pages: &[PageText], anchor: &Regex, opts: &SegmentOptions) -> Vec<TextSegment> {
    let mut fragments = Vec::new();
    for page in pages {
        split_retaining_anchors(&page.content, anchor, &mut fragments);
    }

    fragments.retain(|f| f.is_anchor || f.text.len() >= opts.min_fragment_len);

    let mut segments = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for fragment in fragments {
        if fragment.is_anchor {
            if let Some((code, parts)) = current.take() {
                segments.push(TextSegment {
                    anchor_code: code,
                    body: parts.join(" "),
                });
            }
            current = Some((fragment.text, Vec::new()));
        } else if let Some((_, parts)) = current.as_mut() {
            parts.push(fragment.text);
        }
        // Prose before the first anchor falls through and is discarded.
    }

    if let Some((code, parts)) = current {
        segments.push(TextSegment {
            anchor_code: code,
            body: parts.join(" "),
        });
    }

    tracing::debug!(segments = segments.len(), "segmented corpus pages");

    segments
}

/// Split `text` on anchor matches, keeping the anchors as their own
/// fragments. Prose fragments are whitespace-normalized and stripped of
/// double quotes; empty fragments are dropped.
fn split_retaining_anchors(text: &str, anchor: &Regex, out: &mut Vec<Fragment>) {
    let mut last = 0;

    for m in anchor.find_iter(text) {
        push_prose(&text[last..m.start()], out);
        out.push(Fragment {
            text: m.as_str().to_string(),
            is_anchor: true,
        });
        last = m.end();
    }

    push_prose(&text[last..], out);
}

fn push_prose(raw: &str, out: &mut Vec<Fragment>) {
    let normalized = normalize_prose(raw);
    if !normalized.is_empty() {
        out.push(Fragment {
            text: normalized,
            is_anchor: false,
        });
    }
}

/// Collapse runs of whitespace (including newlines) to single spaces and
/// strip double quotes left over from the extraction step.
fn normalize_prose(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> Regex {
        Regex::new(r"6[A-E]\w{2}(\.\w)?").expect("anchor regex")
    }

    fn opts() -> SegmentOptions {
        SegmentOptions {
            min_fragment_len: 3,
        }
    }

    fn page(n: u32, content: &str) -> PageText {
        PageText {
            page_number: n,
            content: content.to_string(),
        }
    }

    #[test]
    fn splits_single_page_on_anchors() {
        let pages = [page(1, "6A00.0 foo bar 6A01 baz")];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].anchor_code, "6A00.0");
        assert_eq!(segments[0].body, "foo bar");
        assert_eq!(segments[1].anchor_code, "6A01");
        assert_eq!(segments[1].body, "baz");
    }

    #[test]
    fn body_flows_across_page_breaks() {
        let pages = [
            page(1, "6A02 start of the description"),
            page(2, "continues here 6A03 next entry"),
        ];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].anchor_code, "6A02");
        assert_eq!(segments[0].body, "start of the description continues here");
        assert_eq!(segments[1].body, "next entry");
    }

    #[test]
    fn text_before_first_anchor_is_discarded() {
        let pages = [page(1, "chapter preamble text 6B00 real content")];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].anchor_code, "6B00");
        assert_eq!(segments[0].body, "real content");
    }

    #[test]
    fn short_fragments_dropped_as_noise() {
        // ")" between two anchors is extraction junk, not a body
        let pages = [page(1, "6A00.0 ) 6A01 kept body text")];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].body, "");
        assert_eq!(segments[1].body, "kept body text");
    }

    #[test]
    fn last_anchor_takes_remainder() {
        let pages = [
            page(1, "6E20 everything after"),
            page(2, "the final anchor belongs to it"),
        ];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].body,
            "everything after the final anchor belongs to it"
        );
    }

    #[test]
    fn no_anchors_yields_no_segments() {
        let pages = [page(1, "plain prose with no codes at all")];
        assert!(segment(&pages, &anchor(), &opts()).is_empty());
    }

    #[test]
    fn newlines_and_quotes_normalized() {
        let pages = [page(1, "6A05 first \"quoted\"\nline\ncontinues")];
        let segments = segment(&pages, &anchor(), &opts());

        assert_eq!(segments[0].body, "first quoted line continues");
    }

    #[test]
    fn load_pages_windows_by_page_number() {
        let dir = std::env::temp_dir();
        let path = dir.join("ddxbuilder-segmenter-load-pages-test.txt");
        std::fs::write(&path, "page one\u{0c}page two\u{0c}page three").expect("write corpus");

        let pages = load_pages(&path, 2, 3).expect("load pages");
        std::fs::remove_file(&path).ok();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 2);
        assert_eq!(pages[0].content, "page two");
        assert_eq!(pages[1].page_number, 3);
    }

    #[test]
    fn load_pages_rejects_inverted_window() {
        let err = load_pages(Path::new("unused.txt"), 10, 5);
        assert!(err.is_err());
    }

    #[test]
    fn invalid_anchor_pattern_is_a_parse_error() {
        assert!(compile_anchor_pattern("(unclosed").is_err());
    }
}
