//! Strings that mix literal text with deploy-time values.

use serde::Serialize;
use serde_json::Value;

use crate::template::fns;
use crate::{Error, Result};

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Literal(String),
    /// A value only known at deploy time, e.g. `{"Ref": "Distribution"}`.
    Token(Value),
}

/// A string assembled from literal text and tokens.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenString {
    fragments: Vec<Fragment>,
}

impl TokenString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(s: impl Into<String>) -> Self {
        let mut out = Self::new();
        out.push_literal(s);
        out
    }

    pub fn push_literal(&mut self, s: impl Into<String>) {
        let s = s.into();
        if s.is_empty() {
            return;
        }
        // merge adjacent literals so rendering stays minimal
        if let Some(Fragment::Literal(last)) = self.fragments.last_mut() {
            last.push_str(&s);
        } else {
            self.fragments.push(Fragment::Literal(s));
        }
    }

    pub fn push_token(&mut self, token: Value) {
        self.fragments.push(Fragment::Token(token));
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn has_tokens(&self) -> bool {
        self.fragments
            .iter()
            .any(|f| matches!(f, Fragment::Token(_)))
    }

    /// The literal text, or `None` if the string contains tokens.
    pub fn as_literal(&self) -> Option<String> {
        if self.has_tokens() {
            return None;
        }
        Some(
            self.fragments
                .iter()
                .map(|f| match f {
                    Fragment::Literal(s) => s.as_str(),
                    Fragment::Token(_) => "",
                })
                .collect(),
        )
    }

    /// A plain JSON string when fully literal, otherwise `Fn::Join` over
    /// the fragments.
    pub fn render(&self) -> Value {
        if let Some(literal) = self.as_literal() {
            return Value::String(literal);
        }
        let parts = self
            .fragments
            .iter()
            .map(|f| match f {
                Fragment::Literal(s) => Value::String(s.clone()),
                Fragment::Token(v) => v.clone(),
            })
            .collect();
        fns::join("", parts)
    }
}

impl From<&str> for TokenString {
    fn from(s: &str) -> Self {
        Self::literal(s)
    }
}

impl From<String> for TokenString {
    fn from(s: String) -> Self {
        Self::literal(s)
    }
}

/// Serializes a structure containing tokens into a single JSON document
/// rendered as a template value.
///
/// Tokens are registered with [`TokenJson::placeholder`], which returns a
/// marker string to embed in the structure. After pretty-printing, the
/// markers are cut back out and replaced with the token values inside an
/// `Fn::Join`. Text that reaches the document must go through
/// [`TokenJson::escape`] or [`TokenJson::embed`], so that marker lookalikes
/// in it come back out unchanged.
#[derive(Debug, Default)]
pub struct TokenJson {
    tokens: Vec<Value>,
}

impl TokenJson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(&mut self, token: Value) -> String {
        let marker = marker(self.tokens.len());
        self.tokens.push(token);
        marker
    }

    /// Plain text safe to place in the document. Each literal occurrence of
    /// the marker prefix is itself stored behind a marker and restored as
    /// text on render.
    pub fn escape(&mut self, text: &str) -> String {
        let mut pieces = text.split(MARKER_PREFIX);
        let mut out = pieces.next().unwrap_or_default().to_string();
        for piece in pieces {
            let marker = self.placeholder(Value::String(MARKER_PREFIX.to_string()));
            out.push_str(&marker);
            out.push_str(piece);
        }
        out
    }

    /// Render a token string to plain text, registering any tokens.
    pub fn embed(&mut self, s: &TokenString) -> String {
        let mut out = String::new();
        for fragment in s.fragments() {
            match fragment {
                Fragment::Literal(text) => {
                    let escaped = self.escape(text);
                    out.push_str(&escaped);
                }
                Fragment::Token(value) => out.push_str(&self.placeholder(value.clone())),
            }
        }
        out
    }

    pub fn render<T: Serialize>(&self, body: &T) -> Result<Value> {
        let text = serde_json::to_string_pretty(body)?;
        let mut rendered = TokenString::new();
        let mut rest = text.as_str();
        while let Some(start) = rest.find(MARKER_PREFIX) {
            let after = &rest[start + MARKER_PREFIX.len()..];
            let end = after.find(MARKER_SUFFIX).ok_or_else(|| {
                Error::InvalidInput("unterminated token marker".to_string())
            })?;
            let index: usize = after[..end]
                .parse()
                .map_err(|_| Error::InvalidInput("malformed token marker".to_string()))?;
            let token = self
                .tokens
                .get(index)
                .ok_or_else(|| Error::NotFound(format!("token {index}")))?;
            rendered.push_literal(&rest[..start]);
            match token {
                // escaped text; it contains nothing JSON would quote
                Value::String(text) => rendered.push_literal(text.as_str()),
                other => rendered.push_token(other.clone()),
            }
            rest = &after[end + MARKER_SUFFIX.len()..];
        }
        rendered.push_literal(rest);
        Ok(rendered.render())
    }
}

const MARKER_PREFIX: &str = "${Token[TOKEN.";
const MARKER_SUFFIX: &str = "]}";

fn marker(index: usize) -> String {
    format!("{MARKER_PREFIX}{index}{MARKER_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_renders_plain_string() {
        let s = TokenString::literal("aws s3 rm s3://example.com/ --recursive");
        assert_eq!(
            s.render(),
            Value::String("aws s3 rm s3://example.com/ --recursive".to_string())
        );
    }

    #[test]
    fn test_token_renders_join() {
        let mut s = TokenString::literal("--distribution-id ");
        s.push_token(json!({ "Ref": "Dist" }));
        s.push_literal(" --paths \"/*\"");
        assert_eq!(
            s.render(),
            json!({ "Fn::Join": ["", ["--distribution-id ", { "Ref": "Dist" }, " --paths \"/*\""]] })
        );
    }

    #[test]
    fn test_adjacent_literals_merge() {
        let mut s = TokenString::new();
        s.push_literal("a");
        s.push_literal("b");
        s.push_literal("");
        assert_eq!(s.fragments(), &[Fragment::Literal("ab".to_string())]);
    }

    #[test]
    fn test_token_json_without_tokens() {
        let tj = TokenJson::new();
        let value = tj.render(&json!({ "version": "0.2" })).unwrap();
        assert_eq!(value, Value::String("{\n  \"version\": \"0.2\"\n}".to_string()));
    }

    #[test]
    fn test_token_json_replaces_markers() {
        let mut tj = TokenJson::new();
        let mut cmd = TokenString::literal("invalidate ");
        cmd.push_token(json!({ "Ref": "Dist" }));
        let embedded = tj.embed(&cmd);
        let value = tj.render(&json!({ "cmd": embedded })).unwrap();

        let parts = value["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "{\n  \"cmd\": \"invalidate ");
        assert_eq!(parts[1], json!({ "Ref": "Dist" }));
        assert_eq!(parts[2], "\"\n}");
    }

    #[test]
    fn test_marker_lookalike_in_text_is_kept() {
        let mut tj = TokenJson::new();
        let mut cmd = TokenString::literal("echo ${Token[TOKEN.0]} ");
        cmd.push_token(json!({ "Ref": "Dist" }));
        let embedded = tj.embed(&cmd);
        let value = tj.render(&json!({ "cmd": embedded })).unwrap();

        let parts = value["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "{\n  \"cmd\": \"echo ${Token[TOKEN.0]} ");
        assert_eq!(parts[1], json!({ "Ref": "Dist" }));
    }

    #[test]
    fn test_marker_lookalike_without_tokens() {
        let mut tj = TokenJson::new();
        let text = tj.escape("echo ${Token[TOKEN.7]} ${Token[TOKEN.");
        let value = tj.render(&json!({ "cmd": text })).unwrap();
        let parsed: Value = serde_json::from_str(value.as_str().unwrap()).unwrap();
        assert_eq!(parsed["cmd"], "echo ${Token[TOKEN.7]} ${Token[TOKEN.");
    }
}
