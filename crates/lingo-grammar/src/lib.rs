//! Grammar model and rule-surface resolver.
//!
//! A grammar is declared as a flat list of [`Rule`]s: names starting with
//! an upper-case letter are terminals whose first alternative is a regex
//! pattern, the rest are productions whose alternatives are sentences of
//! symbol names. The resolver turns that surface into token types wired
//! into a [`Lexer`] and productions referencing each other, on which FIRST
//! sets and nullability are computed with a guard against left recursion.

pub mod list;
pub mod ll1;
pub mod tree;

use std::cell::{Cell, Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use lingo_lexer::{Lexer, Token, TokenType};
use lingo_regex::RegexError;

pub use list::List;
pub use ll1::{Ll1Parser, ParseError};
pub use tree::{MatchResult, Tree, TreeIndex, TreeRef};

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("undefined symbol `{symbol}` in rule `{rule}`")]
    Undefined { symbol: String, rule: String },

    #[error("recursion involving `{0}`")]
    Recursion(String),

    #[error("grammar is not LL(1): production `{prod}` has two alternates on lookahead `{token}`")]
    Ll1Conflict { prod: String, token: String },

    #[error("bad pattern for terminal `{rule}`: {source}")]
    BadPattern {
        rule: String,
        #[source]
        source: RegexError,
    },
}

/// The set of terminals that can begin a derivation.
pub type TokenSet = HashSet<TokenType>;

/// Marks a terminal rule as dropped from the token stream.
pub const IGNORE_MARKER: &str = "#Ignore";

/// One declared rule: a name and its alternatives.
///
/// For a terminal (upper-case name) `alternatives[0][0]` is the regex
/// pattern and an optional `alternatives[1][0] == "#Ignore"` registers an
/// ignore modulator. For a production each inner list is one sentence of
/// symbol names; an empty list declares an ε-alternative.
#[derive(Clone, Debug)]
pub struct Rule {
    pub name: String,
    pub alternatives: Vec<Vec<String>>,
}

impl Rule {
    pub fn new(name: &str, alternatives: &[&[&str]]) -> Rule {
        Rule {
            name: name.to_string(),
            alternatives: alternatives
                .iter()
                .map(|alt| alt.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }
}

fn is_terminal_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// An element of a sentence or a parse-tree node: a production, a token
/// type, or (at tree leaves) a concrete lexeme.
#[derive(Clone, Debug)]
pub enum Element {
    Prod(Rc<Production>),
    Terminal(TokenType),
    Lexeme(Token),
}

impl Element {
    pub fn terminal(&self) -> bool {
        !matches!(self, Element::Prod(_))
    }

    /// Whether this element IS the empty element (not merely nullable).
    pub fn is_empty_element(&self) -> bool {
        match self {
            Element::Prod(p) => p.alternates().iter().any(|alt| alt.is_empty_sentence()),
            Element::Terminal(t) => t.is_empty_type(),
            Element::Lexeme(t) => t.ty.is_empty_type(),
        }
    }

    /// Whether ε is derivable from this element.
    pub fn match_empty(&self) -> Result<bool, GrammarError> {
        match self {
            Element::Prod(p) => p.match_empty(),
            Element::Terminal(t) => Ok(t.match_empty()),
            Element::Lexeme(t) => Ok(t.ty.match_empty()),
        }
    }

    pub fn first(&self) -> Result<TokenSet, GrammarError> {
        match self {
            Element::Prod(p) => p.first(),
            Element::Terminal(t) => Ok(TokenSet::from([t.clone()])),
            Element::Lexeme(t) => Ok(TokenSet::from([t.ty.clone()])),
        }
    }

    /// The identifier this element matches under in tree patterns.
    pub fn tree_pattern(&self) -> &str {
        match self {
            Element::Prod(p) => p.name(),
            Element::Terminal(t) => t.id(),
            Element::Lexeme(t) => t.ty.id(),
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Prod(a), Element::Prod(b)) => a.name() == b.name(),
            (Element::Terminal(a), Element::Terminal(b)) => a == b,
            (Element::Lexeme(a), Element::Lexeme(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Element::Prod(p) => {
                0u8.hash(state);
                p.name().hash(state);
            }
            Element::Terminal(t) => {
                1u8.hash(state);
                t.hash(state);
            }
            Element::Lexeme(t) => {
                2u8.hash(state);
                t.ty.hash(state);
                t.text.hash(state);
            }
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Prod(p) => f.write_str(p.name()),
            Element::Terminal(t) => f.write_str(t.id()),
            Element::Lexeme(t) => f.write_str(&t.text),
        }
    }
}

/// An ordered sequence of grammar elements. Empty ⇒ the ε-alternative.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Sentence(pub Vec<Element>);

impl Sentence {
    /// ε and single-terminal sentences count as terminal.
    pub fn terminal(&self) -> bool {
        self.0.is_empty() || (self.0.len() == 1 && self.0[0].terminal())
    }

    pub fn is_empty_sentence(&self) -> bool {
        self.0.is_empty() || (self.0.len() == 1 && self.0[0].is_empty_element())
    }

    pub fn match_empty(&self) -> Result<bool, GrammarError> {
        for e in &self.0 {
            if !e.match_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Union of FIRST over the longest nullable prefix, plus FIRST of the
    /// first non-nullable element.
    pub fn first(&self) -> Result<TokenSet, GrammarError> {
        let mut first = TokenSet::new();
        for e in &self.0 {
            first.extend(e.first()?);
            if !e.match_empty()? {
                break;
            }
        }
        Ok(first)
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// A named non-terminal with its alternates. FIRST is cached after the
/// first computation; the `exploring` flag catches left-recursive FIRST and
/// nullability queries, which LL(1) cannot admit.
pub struct Production {
    name: String,
    alternates: RefCell<Vec<Sentence>>,
    first: RefCell<Option<TokenSet>>,
    exploring: Cell<bool>,
}

impl Production {
    fn new(name: &str) -> Rc<Production> {
        Rc::new(Production {
            name: name.to_string(),
            alternates: RefCell::new(Vec::new()),
            first: RefCell::new(None),
            exploring: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alternates(&self) -> Ref<'_, Vec<Sentence>> {
        self.alternates.borrow()
    }

    pub fn match_empty(&self) -> Result<bool, GrammarError> {
        if self.exploring.get() {
            return Err(GrammarError::Recursion(self.name.clone()));
        }
        self.exploring.set(true);
        let result = (|| {
            for alt in self.alternates.borrow().iter() {
                if alt.match_empty()? {
                    return Ok(true);
                }
            }
            Ok(false)
        })();
        self.exploring.set(false);
        result
    }

    pub fn first(&self) -> Result<TokenSet, GrammarError> {
        if let Some(first) = self.first.borrow().as_ref() {
            return Ok(first.clone());
        }
        if self.exploring.get() {
            return Err(GrammarError::Recursion(self.name.clone()));
        }
        self.exploring.set(true);
        let result = (|| {
            let mut first = TokenSet::new();
            for alt in self.alternates.borrow().iter() {
                first.extend(alt.first()?);
            }
            Ok(first)
        })();
        self.exploring.set(false);
        let first = result?;
        *self.first.borrow_mut() = Some(first.clone());
        Ok(first)
    }
}

impl fmt::Debug for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Production({})", self.name)
    }
}

/// A resolved grammar: the lexer for its terminals plus its productions in
/// declaration order.
#[derive(Debug)]
pub struct Grammar {
    pub id: String,
    pub lexer: Lexer,
    pub productions: Vec<Rc<Production>>,
    pub by_name: HashMap<String, Rc<Production>>,
}

impl Grammar {
    pub fn new(id: &str, rules: &[Rule]) -> Result<Grammar, GrammarError> {
        let mut token_types: Vec<TokenType> = Vec::new();
        let mut tokens_by_name: HashMap<String, TokenType> = HashMap::new();
        let mut ignored: Vec<TokenType> = Vec::new();
        let mut productions: Vec<Rc<Production>> = Vec::new();
        let mut by_name: HashMap<String, Rc<Production>> = HashMap::new();

        for rule in rules {
            if is_terminal_name(&rule.name) {
                let pattern = rule
                    .alternatives
                    .first()
                    .and_then(|alt| alt.first())
                    .map(String::as_str)
                    .unwrap_or("");
                let ty = TokenType::new(&rule.name, pattern).map_err(|source| {
                    GrammarError::BadPattern {
                        rule: rule.name.clone(),
                        source,
                    }
                })?;
                if rule
                    .alternatives
                    .get(1)
                    .and_then(|alt| alt.first())
                    .is_some_and(|marker| marker == IGNORE_MARKER)
                {
                    ignored.push(ty.clone());
                }
                tokens_by_name.insert(rule.name.clone(), ty.clone());
                token_types.push(ty);
            } else {
                let prod = Production::new(&rule.name);
                by_name.insert(rule.name.clone(), prod.clone());
                productions.push(prod);
            }
        }

        for rule in rules {
            if is_terminal_name(&rule.name) {
                continue;
            }
            let mut alternates = Vec::with_capacity(rule.alternatives.len());
            for alt in &rule.alternatives {
                let mut sentence = Vec::with_capacity(alt.len());
                for symbol in alt {
                    let element = if is_terminal_name(symbol) {
                        let ty = tokens_by_name.get(symbol).ok_or_else(|| {
                            GrammarError::Undefined {
                                symbol: symbol.clone(),
                                rule: rule.name.clone(),
                            }
                        })?;
                        Element::Terminal(ty.clone())
                    } else {
                        let prod = by_name.get(symbol).ok_or_else(|| {
                            GrammarError::Undefined {
                                symbol: symbol.clone(),
                                rule: rule.name.clone(),
                            }
                        })?;
                        Element::Prod(prod.clone())
                    };
                    sentence.push(element);
                }
                alternates.push(Sentence(sentence));
            }
            *by_name[&rule.name].alternates.borrow_mut() = alternates;
        }

        let mut lexer = Lexer::new(token_types);
        for ty in ignored {
            lexer.ignore(&ty);
        }
        log::debug!(
            "grammar `{id}`: {} terminals, {} productions",
            lexer.definition().len(),
            productions.len()
        );
        Ok(Grammar {
            id: id.to_string(),
            lexer,
            productions,
            by_name,
        })
    }

    pub fn production(&self, name: &str) -> Option<&Rc<Production>> {
        self.by_name.get(name)
    }
}

#[cfg(test)]
pub(crate) fn expression_rules() -> Vec<Rule> {
    // e  -> t e'
    // e' -> PLUS t e' | ε
    // t  -> f t'
    // t' -> TIME f t' | ε
    // f  -> ID | OPEN e CLOSE
    vec![
        Rule::new("e", &[&["t", "e'"]]),
        Rule::new("e'", &[&["PLUS", "t", "e'"], &[]]),
        Rule::new("t", &[&["f", "t'"]]),
        Rule::new("t'", &[&["TIME", "f", "t'"], &[]]),
        Rule::new("f", &[&["ID"], &["OPEN", "e", "CLOSE"]]),
        Rule::new("PLUS", &[&["\\+"]]),
        Rule::new("TIME", &[&["\\*"]]),
        Rule::new("OPEN", &[&["\\("]]),
        Rule::new("CLOSE", &[&["\\)"]]),
        Rule::new("ID", &[&["[_a-zA-Z][_a-zA-Z0-9]*"]]),
        Rule::new("SPC", &[&["\\s+"], &["#Ignore"]]),
    ]
}
