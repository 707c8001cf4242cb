/// Number of characters shown when previewing a result on the command line.
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Split text on Unicode whitespace without any normalization.
///
/// # Examples
///
/// ```
/// use vecdb::text_util::whitespace_tokens;
///
/// assert_eq!(whitespace_tokens("The cat  sat"), vec!["The", "cat", "sat"]);
/// ```
pub fn whitespace_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Lowercased whitespace tokens.
pub fn lowercase_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Overlapping character n-grams of every whitespace-separated word.
///
/// Words shorter than `n` are kept whole. Useful for scripts that do not
/// separate words with spaces, such as Japanese.
///
/// # Examples
///
/// ```
/// use vecdb::text_util::char_ngrams;
///
/// assert_eq!(char_ngrams("東京都 a", 2), vec!["東京", "京都", "a"]);
/// ```
pub fn char_ngrams(text: &str, n: usize) -> Vec<String> {
    let n = n.max(1);
    let mut grams = Vec::new();
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() <= n {
            grams.push(word.to_string());
            continue;
        }
        grams.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
    }
    grams
}

/// The first `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokens_keep_case_and_punctuation() {
        assert_eq!(whitespace_tokens("Cat, cat!"), vec!["Cat,", "cat!"]);
        assert!(whitespace_tokens("  \t\n").is_empty());
    }

    #[test]
    fn lowercase_tokens_fold_case() {
        assert_eq!(lowercase_tokens("Cat CAT"), vec!["cat", "cat"]);
    }

    #[test]
    fn char_ngrams_short_words_are_whole() {
        assert_eq!(char_ngrams("ab", 3), vec!["ab"]);
        assert_eq!(char_ngrams("abcd", 3), vec!["abc", "bcd"]);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("日本語のテキスト", 3), "日本語...");
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("exact", 5), "exact");
    }
}
