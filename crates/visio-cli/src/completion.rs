use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use visio_contracts::chat::CHAT_COMMANDS;
use visio_contracts::suggest::{trailing_token, SuggestionList, SUGGESTION_KEYWORDS};

#[derive(Clone, Default)]
pub struct PromptHelper;

impl Helper for PromptHelper {}

impl Completer for PromptHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(complete_line(line, pos))
    }
}

impl Hinter for PromptHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        hint_for(line, pos)
    }
}

impl Highlighter for PromptHelper {}

impl Validator for PromptHelper {}

pub(crate) fn complete_line(line: &str, pos: usize) -> (usize, Vec<Pair>) {
    let Some(line) = line.get(..pos) else {
        return (pos, Vec::new());
    };

    if let Some(partial) = line.strip_prefix('/') {
        if partial.contains(' ') {
            return (pos, Vec::new());
        }
        let candidates = CHAT_COMMANDS
            .iter()
            .filter(|spec| spec.command.starts_with(partial))
            .map(|spec| Pair {
                display: spec.usage.to_string(),
                replacement: format!("/{}", spec.command),
            })
            .collect();
        return (0, candidates);
    }

    let token = trailing_token(line);
    let start = pos - token.trim_start().len();
    let candidates = SuggestionList::for_prompt(line, SUGGESTION_KEYWORDS)
        .items()
        .iter()
        .map(|word| Pair {
            display: word.to_string(),
            replacement: format!("{word} "),
        })
        .collect();
    (start, candidates)
}

// Rest of the first keyword after the typed prefix, only at the end of input.
pub(crate) fn hint_for(line: &str, pos: usize) -> Option<String> {
    if pos < line.len() || line.starts_with('/') {
        return None;
    }
    let typed = trailing_token(line).trim();
    let list = SuggestionList::for_prompt(line, SUGGESTION_KEYWORDS);
    list.active()?
        .get(typed.len()..)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{complete_line, hint_for};

    fn replacements(line: &str) -> (usize, Vec<String>) {
        let (start, pairs) = complete_line(line, line.len());
        (start, pairs.into_iter().map(|pair| pair.replacement).collect())
    }

    #[test]
    fn completes_the_trailing_keyword() {
        let (start, words) = replacements("a photorealistic, cin");
        assert_eq!(start, "a photorealistic, ".len());
        assert_eq!(words, vec!["cinematic ".to_string()]);
    }

    #[test]
    fn completion_is_case_insensitive() {
        let (_, words) = replacements("a portrait, PHOTO");
        assert!(words.contains(&"photorealistic ".to_string()));
    }

    #[test]
    fn trailing_separator_offers_nothing() {
        assert!(replacements("a red fox, ").1.is_empty());
        assert!(replacements("").1.is_empty());
    }

    #[test]
    fn slash_completes_command_names() {
        let (start, words) = replacements("/de");
        assert_eq!(start, 0);
        assert_eq!(words, vec!["/detach".to_string()]);
        assert!(replacements("/download 1 ").1.is_empty());
    }

    #[test]
    fn hint_skips_leading_whitespace() {
        assert_eq!(hint_for("\tcin", 4).as_deref(), Some("ematic"));
        assert_eq!(hint_for("a cin", 5).as_deref(), Some("ematic"));
        assert_eq!(hint_for("a photorealistic, cin", 21).as_deref(), Some("ematic"));
    }

    #[test]
    fn hint_waits_for_cursor_at_end() {
        assert_eq!(hint_for("cin", 1), None);
        assert_eq!(hint_for("/de", 3), None);
        assert_eq!(hint_for("cinematic", 9), None);
    }
}
