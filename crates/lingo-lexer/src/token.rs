//! Tokens and token types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use lingo_regex::{escape, Regex, RegexError};

/// Id of the built-in type matching ε.
pub const EMPTY_ID: &str = "EMPTY";
/// Id of the built-in type carried by error tokens.
pub const UNKNOWN_ID: &str = "UNKNOWN";
/// Id of the sentinel type ending every token stream.
pub const EOF_ID: &str = "EOF";

/// A named token type with its compiled pattern. Cheap to clone; equality
/// and hashing go by id.
#[derive(Clone)]
pub struct TokenType(Rc<TokenTypeInner>);

struct TokenTypeInner {
    id: String,
    pattern: String,
    compiled: Option<Regex>,
}

impl TokenType {
    pub fn new(id: &str, pattern: &str) -> Result<TokenType, RegexError> {
        let compiled = Regex::new(pattern)?;
        Ok(TokenType(Rc::new(TokenTypeInner {
            id: id.to_string(),
            pattern: pattern.to_string(),
            compiled: Some(compiled),
        })))
    }

    /// A type whose pattern is its id, escaped. Handy for keywords and
    /// punctuation.
    pub fn simple(id: &str) -> Result<TokenType, RegexError> {
        TokenType::new(id, &escape(id))
    }

    fn builtin(id: &str) -> TokenType {
        TokenType(Rc::new(TokenTypeInner {
            id: id.to_string(),
            pattern: String::new(),
            compiled: None,
        }))
    }

    /// The built-in type matching ε and nothing else.
    pub fn empty() -> TokenType {
        TokenType::builtin(EMPTY_ID)
    }

    /// The built-in type of error tokens covering unmatched text.
    pub fn unknown() -> TokenType {
        TokenType::builtin(UNKNOWN_ID)
    }

    /// The built-in sentinel terminating every token stream.
    pub fn eof() -> TokenType {
        TokenType::builtin(EOF_ID)
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn pattern(&self) -> &str {
        &self.0.pattern
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.0.compiled.as_ref()
    }

    pub fn is_eof(&self) -> bool {
        self.0.id == EOF_ID
    }

    pub fn is_unknown(&self) -> bool {
        self.0.id == UNKNOWN_ID
    }

    pub fn is_empty_type(&self) -> bool {
        self.0.id == EMPTY_ID
    }

    /// Whether this type can match ε.
    pub fn match_empty(&self) -> bool {
        self.is_empty_type()
            || self
                .0
                .compiled
                .as_ref()
                .is_some_and(|re| re.match_empty())
    }
}

impl PartialEq for TokenType {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TokenType {}

impl Hash for TokenType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.id)
    }
}

impl fmt::Debug for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenType({})", self.0.id)
    }
}

/// A lexeme with its type and the position of its first scalar. `line` is
/// 1-based; `column` is 1 + the number of scalars since the preceding
/// line feed.
#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    pub ty: TokenType,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(ty: TokenType, text: &str, line: u32, column: u32) -> Token {
        Token {
            ty,
            text: text.to_string(),
            line,
            column,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?} at {}:{})", self.ty, self.text, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id() {
        let a = TokenType::new("INT", "\\d+").unwrap();
        let b = TokenType::new("INT", "[0-9]+").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, TokenType::eof());
    }

    #[test]
    fn simple_types_match_their_id_literally() {
        let plus = TokenType::simple("+").unwrap();
        assert!(plus.regex().unwrap().is_match("+"));
        assert!(!plus.regex().unwrap().is_match("++"));
    }

    #[test]
    fn match_empty_reflects_the_pattern() {
        assert!(TokenType::new("OPT", "a?").unwrap().match_empty());
        assert!(!TokenType::new("ONE", "a").unwrap().match_empty());
        assert!(TokenType::empty().match_empty());
        assert!(!TokenType::eof().match_empty());
    }
}
