use ammonia;

/// Clean HTML content using the ammonia library.
///
/// This employs a whitelist-based sanitization strategy: it preserves safe tags
/// (like <b>, <p>) while stripping dangerous tags (like <script>, <iframe>)
/// and malicious attributes (like onclick).
///
/// Note: this will remove the <script> tag and its entire content, so a comment
/// made only of a script block sanitizes to an empty string.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_keeps_markup() {
        assert_eq!(clean_html("<b>hi</b><script>alert(1)</script>"), "<b>hi</b>");
        assert_eq!(clean_html("<script>alert(1)</script>"), "");
    }
}
