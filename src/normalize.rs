use regex::Regex;

/// Normalizes raw chat text into the form the classifier was trained on.
///
/// The full pass: lowercase, drop URL-like tokens, drop numeric mention
/// tokens, map everything outside `[a-z0-9 ]` to a space, collapse
/// whitespace runs and trim. Applying it twice yields the same output.
#[derive(Debug)]
pub struct TextNormalizer {
    url_regex: Regex,
    mention_regex: Regex,
    non_alnum_regex: Regex,
    whitespace_regex: Regex,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self {
            url_regex: Regex::new(r"(?:https?|www)\S+").unwrap(),
            mention_regex: Regex::new(r"<@!?\d+>").unwrap(),
            non_alnum_regex: Regex::new(r"[^a-z0-9\s]").unwrap(),
            whitespace_regex: Regex::new(r"\s+").unwrap(),
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let without_urls = self.url_regex.replace_all(&lowered, "");
        // A space, not the empty string: dropping the token outright would
        // glue its neighbours into a new token and break idempotence.
        let without_mentions = self.mention_regex.replace_all(&without_urls, " ");
        let alnum_only = self.non_alnum_regex.replace_all(&without_mentions, " ");
        let collapsed = self.whitespace_regex.replace_all(&alnum_only, " ");
        collapsed.trim().to_string()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize("  Hello World  "), "hello world");
    }

    #[test]
    fn strips_mentions() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize("hello <@12345> world"), "hello world");
        assert_eq!(normalizer.normalize("hey <@!987> there"), "hey there");
    }

    #[test]
    fn strips_urls() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("look at https://example.com/thing now"),
            "look at now"
        );
        assert_eq!(normalizer.normalize("see www.example.com ok"), "see ok");
        assert_eq!(normalizer.normalize("http://a.b c"), "c");
    }

    #[test]
    fn replaces_punctuation_with_spaces() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize("wow!!! such,text."), "wow such text");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.normalize("   \t\n  "), "");
        assert_eq!(normalizer.normalize("!!!"), "");
    }

    #[test]
    fn is_idempotent() {
        let normalizer = TextNormalizer::new();
        let samples = [
            "Hello <@123> check https://spam.example NOW!!!",
            "Already normalized text",
            "MiXeD CaSe &*() stuff",
            "",
            "www only www",
            "unicode héllo wörld",
            "ww<@1>wabc",
        ];
        for sample in samples {
            let once = normalizer.normalize(sample);
            let twice = normalizer.normalize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }
}
