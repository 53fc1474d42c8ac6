use once_cell::sync::Lazy;
use regex::Regex;

/// Language assumed when a fenced block carries no tag
pub const DEFAULT_LANGUAGE: &str = "typescript";

/// First fenced code block: optional language tag glued to the opening
/// fence, then the nearest closing fence. The lazy `.*?` matters: a greedy
/// match would swallow everything between the first opening fence and the
/// last closing fence of a multi-block response.
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w+)?\s*(.*?)```").expect("code block pattern"));

/// Language-tagged source extracted from a completed assistant response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    pub language: String,
    pub source: String,
}

/// Scan a completed response for its first fenced code block.
///
/// Absence of a block is a normal outcome, not an error. Subsequent blocks
/// in the same response are ignored.
pub fn extract_code(text: &str) -> Option<CodeArtifact> {
    let caps = CODE_BLOCK.captures(text)?;
    let language = caps
        .get(1)
        .map(|m| m.as_str())
        .filter(|tag| !tag.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_string();
    let source = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
    Some(CodeArtifact { language, source })
}
