pub const MAX_PROMPT_LENGTH: usize = 1000;

pub const SUGGESTION_KEYWORDS: &[&str] = &[
    "photorealistic",
    "hyperrealistic",
    "cinematic",
    "epic",
    "4K",
    "8K",
    "detailed",
    "intricate",
    "studio lighting",
    "fantasy",
    "sci-fi",
    "steampunk",
    "cyberpunk",
    "vaporwave",
    "gothic",
    "baroque",
    "oil painting",
    "watercolor",
    "sketch",
    "illustration",
    "comic book style",
    "abstract",
    "minimalist",
    "by artgerm",
    "by greg rutkowski",
    "by makoto shinkai",
    "vibrant colors",
    "monochromatic",
    "moody",
    "serene",
    "dynamic",
    "portrait",
    "landscape",
    "wide shot",
    "close-up",
    "macro",
    "unreal engine",
    "octane render",
];

// Byte offset just past the last space or comma, or 0 when there is none.
fn token_start(text: &str) -> usize {
    text.rfind([' ', ','])
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

pub fn trailing_token(text: &str) -> &str {
    &text[token_start(text)..]
}

pub fn suggestions<'a>(text: &str, vocabulary: &[&'a str]) -> Vec<&'a str> {
    let token = trailing_token(text).trim().to_lowercase();
    if token.is_empty() {
        return Vec::new();
    }
    vocabulary
        .iter()
        .copied()
        .filter(|keyword| keyword.to_lowercase().starts_with(&token))
        .collect()
}

pub fn accept_suggestion(text: &str, suggestion: &str) -> String {
    format!("{}{suggestion} ", &text[..token_start(text)])
}

pub fn clamp_prompt(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_LENGTH) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuggestionList {
    items: Vec<String>,
    active: usize,
}

impl SuggestionList {
    pub fn for_prompt(text: &str, vocabulary: &[&str]) -> Self {
        Self {
            items: suggestions(text, vocabulary)
                .into_iter()
                .map(str::to_string)
                .collect(),
            active: 0,
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active(&self) -> Option<&str> {
        self.items.get(self.active).map(String::as_str)
    }

    pub fn next(&mut self) {
        if !self.items.is_empty() {
            self.active = (self.active + 1) % self.items.len();
        }
    }

    pub fn previous(&mut self) {
        if !self.items.is_empty() {
            self.active = (self.active + self.items.len() - 1) % self.items.len();
        }
    }

    pub fn accept(&mut self, text: &str) -> Option<String> {
        let completed = self.active().map(|item| accept_suggestion(text, item));
        self.cancel();
        completed
    }

    pub fn cancel(&mut self) {
        self.items.clear();
        self.active = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        accept_suggestion, clamp_prompt, suggestions, trailing_token, SuggestionList,
        MAX_PROMPT_LENGTH, SUGGESTION_KEYWORDS,
    };

    #[test]
    fn completes_token_after_comma_and_space() {
        let prompt = "a photorealistic, cin";
        assert_eq!(trailing_token(prompt), "cin");
        assert_eq!(suggestions(prompt, SUGGESTION_KEYWORDS), vec!["cinematic"]);
        assert_eq!(
            accept_suggestion(prompt, "cinematic"),
            "a photorealistic, cinematic "
        );
    }

    #[test]
    fn comma_without_space_is_a_separator() {
        assert_eq!(trailing_token("castle,goth"), "goth");
        assert_eq!(accept_suggestion("castle,goth", "gothic"), "castle,gothic ");
    }

    #[test]
    fn matching_is_case_insensitive_and_keeps_vocabulary_order() {
        assert_eq!(suggestions("a 4", SUGGESTION_KEYWORDS), vec!["4K"]);
        assert_eq!(
            suggestions("city at night, BY", SUGGESTION_KEYWORDS),
            vec!["by artgerm", "by greg rutkowski", "by makoto shinkai"]
        );
        assert_eq!(
            suggestions("m", SUGGESTION_KEYWORDS),
            vec!["minimalist", "monochromatic", "moody", "macro"]
        );
    }

    #[test]
    fn empty_token_yields_nothing() {
        assert!(suggestions("", SUGGESTION_KEYWORDS).is_empty());
        assert!(suggestions("a dragon ", SUGGESTION_KEYWORDS).is_empty());
        assert!(suggestions("a dragon,", SUGGESTION_KEYWORDS).is_empty());
        assert!(suggestions("zzz", SUGGESTION_KEYWORDS).is_empty());
    }

    #[test]
    fn list_navigation_wraps_both_ways() {
        let mut list = SuggestionList::for_prompt("sc", &["sci-fi", "sketch", "scenic"]);
        assert_eq!(list.items(), ["sci-fi", "scenic"]);
        assert_eq!(list.active(), Some("sci-fi"));
        list.next();
        assert_eq!(list.active(), Some("scenic"));
        list.next();
        assert_eq!(list.active(), Some("sci-fi"));
        list.previous();
        assert_eq!(list.active(), Some("scenic"));

        assert_eq!(list.accept("a sc").as_deref(), Some("a scenic "));
        assert!(list.is_empty());
        assert_eq!(list.accept("a sc"), None);
    }

    #[test]
    fn cancel_dismisses_without_changes() {
        let mut list = SuggestionList::for_prompt("water", SUGGESTION_KEYWORDS);
        assert!(!list.is_empty());
        list.cancel();
        assert!(list.is_empty());
        list.next();
        assert_eq!(list.active(), None);
    }

    #[test]
    fn prompt_is_clamped_by_characters() {
        let long = "é".repeat(MAX_PROMPT_LENGTH + 5);
        assert_eq!(clamp_prompt(&long).chars().count(), MAX_PROMPT_LENGTH);
        assert_eq!(clamp_prompt("short"), "short");
    }
}
