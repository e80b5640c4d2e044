//! Keyword-based query intent detection.
//!
//! A query that mentions a framework or a kind of code ("django", "route",
//! "serializer", ...) is mapped to the matching category filter. Framework
//! keywords are checked before type keywords.

/// Categories checked first, in order.
const FRAMEWORK_KEYWORDS: &[(&str, &[&str])] = &[
    ("django", &["django", "drf", "rest_framework"]),
    ("fastapi", &["fastapi", "pydantic"]),
    ("flask", &["flask", "blueprint"]),
];

const TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "model",
        &["model", "models", "schema", "schemas", "entity", "entities", "orm", "database table"],
    ),
    ("route", &["route", "routes", "endpoint", "endpoints", "api", "path", "url"]),
    ("view", &["view", "views", "viewset", "viewsets", "template"]),
    ("serializer", &["serializer", "serializers"]),
    ("function", &["function", "def ", "method", "methods"]),
    ("class", &["class", "classes"]),
];

/// Category filter implied by `query`, if any.
///
/// Single-word keywords must match a whole query token, so "model" does not
/// fire on "remodel". Keywords containing a space match as substrings.
///
/// # Examples
///
/// ```
/// use codesense_lens::intent::detect_intent;
///
/// assert_eq!(detect_intent("User model with email"), Some("model"));
/// assert_eq!(detect_intent("DRF serializer for orders"), Some("django"));
/// assert_eq!(detect_intent("parse the config file"), None);
/// ```
pub fn detect_intent(query: &str) -> Option<&'static str> {
    let lower = query.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    let hit = |keyword: &str| {
        if keyword.contains(' ') {
            lower.contains(keyword)
        } else {
            tokens.contains(&keyword)
        }
    };

    FRAMEWORK_KEYWORDS
        .iter()
        .chain(TYPE_KEYWORDS)
        .find(|(_, keywords)| keywords.iter().any(|k| hit(*k)))
        .map(|(category, _)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frameworks_win_over_types() {
        assert_eq!(detect_intent("flask route for login"), Some("flask"));
        assert_eq!(detect_intent("pydantic model"), Some("fastapi"));
        assert_eq!(detect_intent("rest_framework viewsets"), Some("django"));
    }

    #[test]
    fn type_keywords() {
        assert_eq!(detect_intent("API endpoints for payments"), Some("route"));
        assert_eq!(detect_intent("which views render templates"), Some("view"));
        assert_eq!(detect_intent("order serializers"), Some("serializer"));
        assert_eq!(detect_intent("helper methods on cart"), Some("function"));
        assert_eq!(detect_intent("base classes"), Some("class"));
        assert_eq!(detect_intent("the users database table"), Some("model"));
    }

    #[test]
    fn keywords_do_not_match_inside_words() {
        assert_eq!(detect_intent("remodel the kitchen"), None);
        assert_eq!(detect_intent("classification threshold"), None);
    }

    #[test]
    fn spaced_keyword_matches_as_substring() {
        assert_eq!(detect_intent("def handle_upload"), Some("function"));
        assert_eq!(detect_intent("undefined behaviour"), None);
    }
}
