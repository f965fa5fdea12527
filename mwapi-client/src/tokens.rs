// Token cache
// Session-scoped tokens read from `meta=tokens` responses, dropped on `badtoken`

use dashmap::DashMap;
use serde_json::Value;

/// Suffix the API appends to token types in `query.tokens`.
const TOKEN_SUFFIX: &str = "token";

/// Session-scoped cache of tokens by type (`csrf`, `login`, ...).
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<String, String>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token_type: &str) -> Option<String> {
        self.tokens.get(token_type).map(|token| token.value().clone())
    }

    pub fn insert(&self, token_type: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(token_type.into(), token.into());
    }

    pub fn remove(&self, token_type: &str) -> Option<String> {
        self.tokens.remove(token_type).map(|(_, token)| token)
    }

    pub fn clear(&self) {
        self.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Cache every token in a `meta=tokens` response; returns how many were found.
    pub fn absorb_response(&self, body: &Value) -> usize {
        let Some(tokens) = body
            .get("query")
            .and_then(|query| query.get("tokens"))
            .and_then(Value::as_object)
        else {
            return 0;
        };

        let mut count = 0;
        for (key, token) in tokens {
            if let (Some(token_type), Some(token)) = (key.strip_suffix(TOKEN_SUFFIX), token.as_str()) {
                self.insert(token_type, token);
                count += 1;
            }
        }
        count
    }
}

/// The token of `token_type` in a `meta=tokens` response.
pub fn token_from_response(body: &Value, token_type: &str) -> Option<String> {
    body.get("query")?
        .get("tokens")?
        .get(format!("{token_type}{TOKEN_SUFFIX}"))?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absorb_response() {
        let cache = TokenCache::new();
        let body = json!({"query": {"tokens": {"csrftoken": "abc+\\", "logintoken": "def+\\"}}});
        assert_eq!(cache.absorb_response(&body), 2);
        assert_eq!(cache.get("csrf").as_deref(), Some("abc+\\"));
        assert_eq!(cache.get("login").as_deref(), Some("def+\\"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = TokenCache::new();
        cache.insert("csrf", "a");
        cache.insert("watch", "b");
        assert_eq!(cache.remove("csrf").as_deref(), Some("a"));
        assert!(cache.get("csrf").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_token_from_response() {
        let body = json!({"query": {"tokens": {"csrftoken": "+\\"}}});
        assert_eq!(token_from_response(&body, "csrf").as_deref(), Some("+\\"));
        assert!(token_from_response(&body, "login").is_none());
        assert!(token_from_response(&json!({}), "csrf").is_none());
    }
}
