//! Text processing utilities

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^\p{L}\p{N}._-]+").unwrap();
}

/// Marker appended when extracted text is cut at the length cap.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length...]";

pub struct TextUtils;

impl TextUtils {
    /// Collapse runs of whitespace into single spaces and trim.
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    pub fn count_words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Truncate to at most `max_chars` characters, appending `...` when cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        match text.char_indices().nth(max_chars) {
            None => Cow::Borrowed(text),
            Some((byte_idx, _)) => Cow::Owned(format!("{}...", &text[..byte_idx])),
        }
    }

    /// Split text into word-bounded chunks.
    ///
    /// Words are appended to the current chunk, each adding its character length plus
    /// one for the joining space; the chunk is closed as soon as that running size
    /// reaches `chunk_size`. A final partial chunk is kept.
    pub fn chunk_words(content: &str, chunk_size: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0;

        for word in content.split_whitespace() {
            current.push(word);
            current_size += word.chars().count() + 1;
            if current_size >= chunk_size {
                chunks.push(current.join(" "));
                current.clear();
                current_size = 0;
            }
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Trim every line, drop blank lines and cap the result at `max_chars` characters.
    pub fn clean_extracted_text(text: &str, max_chars: usize) -> String {
        let cleaned = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        match cleaned.char_indices().nth(max_chars) {
            None => cleaned,
            Some((byte_idx, _)) => format!("{}{}", &cleaned[..byte_idx], TRUNCATION_MARKER),
        }
    }

    /// Reduce an uploaded file name to a single safe path component.
    pub fn sanitize_file_name(name: &str) -> String {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base.trim(), "_");
        let cleaned = cleaned.trim_matches('.');
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned.to_string()
        }
    }
}
