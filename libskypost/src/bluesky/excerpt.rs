//! Excerpt construction
//!
//! Lengths are counted in UTF-8 bytes throughout, because Bluesky facets
//! address the post text by byte offset. Truncation never splits a
//! character: when the byte budget lands inside a multi-byte sequence the cut
//! moves back to the previous character boundary.

use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::OnceLock;

use crate::error::PublishError;
use crate::types::Post;

/// Marker appended after the (possibly truncated) summary
pub const ELLIPSIS: &str = "...";

/// Bytes held back from the budget on top of the ellipsis and link
pub const SAFETY_MARGIN: usize = 3;

/// Text ready to publish plus the byte span of the trailing link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// `summary + "..." + " " + short_link`
    pub text: String,
    /// The stripped, possibly truncated, summary without ellipsis or link
    pub summary: String,
    /// Byte range of the short link inside `text`
    pub link_range: Range<usize>,
}

impl Excerpt {
    pub fn link(&self) -> &str {
        &self.text[self.link_range.clone()]
    }
}

/// Build the text of a post, bounded to `max_bytes`
///
/// # Errors
///
/// - `PublishError::MissingShortLink` if the post has no short link
/// - `PublishError::LinkTooLong` if `"... " + short_link` alone exceeds
///   `max_bytes`
pub fn build_excerpt(post: &Post, max_bytes: usize) -> Result<Excerpt, PublishError> {
    let link = post.short_link.trim();
    if link.is_empty() {
        return Err(PublishError::MissingShortLink(post.id.clone()));
    }

    let tail_len = ELLIPSIS.len() + 1 + link.len();
    if tail_len > max_bytes {
        return Err(PublishError::LinkTooLong {
            needed: tail_len,
            max_bytes,
        });
    }

    let budget = max_bytes.saturating_sub(link.len() + ELLIPSIS.len() + SAFETY_MARGIN);
    let stripped = strip_markup(post.source_text());
    let summary = first_segment(&stripped, budget).to_string();

    let text = format!("{}{} {}", summary, ELLIPSIS, link);
    let link_range = (text.len() - link.len())..text.len();

    Ok(Excerpt {
        text,
        summary,
        link_range,
    })
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
            .expect("valid regex")
    })
}

fn block_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)</?(?:p|div|br|hr|li|ul|ol|h[1-6]|blockquote|pre|table|tr|td|th|figure|figcaption|section|article|header|footer)\b[^>]*>",
        )
        .expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A `<` followed by a space or digit is prose, not a tag
    RE.get_or_init(|| Regex::new(r"(?s)<[A-Za-z/!?][^>]*>").expect("valid regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
            .expect("valid regex")
    })
}

/// Remove markup, decode entities, and collapse whitespace
///
/// Script/style bodies and comments are dropped entirely. Block-level tags
/// become a space so adjacent paragraphs do not run together; inline tags
/// vanish.
pub fn strip_markup(raw: &str) -> String {
    let without_code = script_style_re().replace_all(raw, " ");
    let spaced = block_tag_re().replace_all(&without_code, " ");
    let plain = tag_re().replace_all(&spaced, "");
    let decoded = decode_entities(&plain);

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode numeric and named HTML entities
///
/// Named entities use the full HTML5 table. Unknown names and invalid code
/// points are left untouched.
pub fn decode_entities(input: &str) -> String {
    entity_re()
        .replace_all(input, |caps: &Captures| {
            decode_entity(&caps[0], &caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(whole: &str, entity: &str) -> Option<String> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = htmlize::unescape(whole);
    (decoded != whole).then(|| decoded.into_owned())
}

/// First line of `text` hard-wrapped at `budget` bytes
///
/// Breaks at the last space that keeps the line within the budget; a single
/// word longer than the budget is cut at the budget (backed off to a char
/// boundary).
fn first_segment(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    if budget == 0 {
        return "";
    }

    // A space sitting exactly on the budget is a clean break
    if text.as_bytes()[budget] == b' ' {
        return text[..budget].trim_end();
    }

    let mut cut = budget;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    match text[..cut].rfind(' ') {
        Some(space) if space > 0 => text[..space].trim_end(),
        _ => &text[..cut],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post_with(content: &str, link: &str) -> Post {
        Post {
            id: "5".to_string(),
            title: "Title".to_string(),
            content: content.to_string(),
            excerpt: None,
            short_link: link.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    const LINK: &str = "https://example.com/?p=5";

    #[test]
    fn test_short_content_is_kept_whole() {
        let excerpt = build_excerpt(&post_with("Hello world", LINK), 300).unwrap();

        assert_eq!(excerpt.text, "Hello world... https://example.com/?p=5");
        assert_eq!(excerpt.summary, "Hello world");
        assert_eq!(excerpt.link(), LINK);
        assert_eq!(excerpt.link_range.end, excerpt.text.len());
    }

    #[test]
    fn test_markup_is_stripped_and_entities_decoded() {
        let content = "<p>Fish &amp; chips</p><p>are <strong>great</strong>&nbsp;&#8212; really&hellip;</p>\
                       <script>alert('x')</script><!-- hidden -->";
        let excerpt = build_excerpt(&post_with(content, LINK), 300).unwrap();

        assert_eq!(
            excerpt.summary,
            "Fish & chips are great \u{2014} really\u{2026}"
        );
    }

    #[test]
    fn test_encoded_tags_survive_as_text() {
        assert_eq!(strip_markup("Use &lt;b&gt; for bold"), "Use <b> for bold");
    }

    #[test]
    fn test_unknown_entities_are_left_alone() {
        assert_eq!(decode_entities("a &bogus; b &#xZZ; c"), "a &bogus; b &#xZZ; c");
        assert_eq!(decode_entities("&#x1F600;"), "\u{1F600}");
        assert_eq!(decode_entities("&#55296;"), "&#55296;");
    }

    #[test]
    fn test_accented_named_entities_are_decoded() {
        assert_eq!(
            strip_markup("Caf&eacute; &uuml;ber na&iuml;ve &szlig; &shy;x"),
            "Caf\u{e9} \u{fc}ber na\u{ef}ve \u{df} \u{ad}x"
        );
        assert_eq!(decode_entities("&Eacute;t&eacute; &ndash; &amp;"), "\u{c9}t\u{e9} \u{2013} &");
    }

    #[test]
    fn test_decoded_entities_count_as_their_utf8_bytes() {
        let content = "Caf&eacute; ".repeat(20);
        // budget = 60 - 24 - 3 - 3 = 30; "Café " is 6 bytes
        let excerpt = build_excerpt(&post_with(&content, LINK), 60).unwrap();

        assert_eq!(excerpt.summary, "Caf\u{e9} Caf\u{e9} Caf\u{e9} Caf\u{e9} Caf\u{e9}");
        assert!(!excerpt.text.contains('&'));
    }

    #[test]
    fn test_bare_angle_brackets_in_prose_are_kept() {
        assert_eq!(
            strip_markup("<p>if x < 3 and y > 2 then done</p>"),
            "if x < 3 and y > 2 then done"
        );
        assert_eq!(
            strip_markup("I <3 Rust. Tags are > fun"),
            "I <3 Rust. Tags are > fun"
        );
        assert_eq!(
            strip_markup("a <em>real</em> tag <!DOCTYPE html> and <br/>break"),
            "a real tag and break"
        );
    }

    #[test]
    fn test_long_content_breaks_at_word_boundary() {
        let content = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        // budget = 60 - 24 - 3 - 3 = 30
        let excerpt = build_excerpt(&post_with(content, LINK), 60).unwrap();

        assert_eq!(excerpt.summary, "alpha beta gamma delta epsilon");
        assert!(excerpt.text.len() <= 60);
        assert_eq!(excerpt.link(), LINK);
    }

    #[test]
    fn test_long_word_is_cut_at_budget() {
        let content = "x".repeat(100);
        let excerpt = build_excerpt(&post_with(&content, LINK), 50).unwrap();

        // budget = 50 - 24 - 3 - 3 = 20
        assert_eq!(excerpt.summary, "x".repeat(20));
        assert_eq!(excerpt.text.len(), 20 + 3 + 1 + LINK.len());
    }

    #[test]
    fn test_multibyte_text_never_splits_a_character() {
        let content = "é".repeat(200);
        let excerpt = build_excerpt(&post_with(&content, LINK), 61).unwrap();

        // budget = 61 - 30 = 31 bytes, floored to 30 (15 two-byte chars)
        assert_eq!(excerpt.summary, "é".repeat(15));
        assert!(excerpt.text.len() <= 61);
        assert_eq!(excerpt.link(), LINK);
    }

    #[test]
    fn test_byte_length_never_exceeds_limit() {
        let samples = [
            String::new(),
            "short".to_string(),
            "word ".repeat(200),
            "日本語のテキスト".repeat(40),
            "<p>".to_string() + &"emoji 🎉 ".repeat(80) + "</p>",
            "a".repeat(1000),
        ];

        for max_bytes in [30, 31, 32, 50, 100, 299, 300, 301] {
            for sample in &samples {
                let excerpt = build_excerpt(&post_with(sample, LINK), max_bytes).unwrap();
                assert!(
                    excerpt.text.len() <= max_bytes,
                    "{} bytes > {} for {:?}",
                    excerpt.text.len(),
                    max_bytes,
                    sample
                );
                assert_eq!(&excerpt.text[excerpt.link_range.clone()], LINK);
                assert_eq!(excerpt.link_range.end, excerpt.text.len());
                assert!(excerpt.text.ends_with(&format!("... {}", LINK)));
            }
        }
    }

    #[test]
    fn test_link_too_long_is_rejected() {
        let result = build_excerpt(&post_with("Hello", LINK), 27);
        assert_eq!(
            result,
            Err(PublishError::LinkTooLong {
                needed: 28,
                max_bytes: 27
            })
        );
    }

    #[test]
    fn test_tail_exactly_fits() {
        let excerpt = build_excerpt(&post_with("Hello", LINK), 28).unwrap();
        assert_eq!(excerpt.text, format!("... {}", LINK));
        assert_eq!(excerpt.summary, "");
    }

    #[test]
    fn test_missing_short_link_is_rejected() {
        let result = build_excerpt(&post_with("Hello", "  "), 300);
        assert_eq!(result, Err(PublishError::MissingShortLink("5".to_string())));
    }

    #[test]
    fn test_excerpt_field_wins_over_content() {
        let mut post = post_with("<p>Long body text</p>", LINK);
        post.excerpt = Some("Teaser &amp; more".to_string());

        let excerpt = build_excerpt(&post, 300).unwrap();
        assert_eq!(excerpt.summary, "Teaser & more");
    }
}
