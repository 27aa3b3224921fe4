//! A prefix-matching regular expression engine.
//!
//! Patterns compile through the classic pipeline: source → AST → ε-NFA
//! (Thompson) → DFA (subset construction) → minimised DFA (Hopcroft). The
//! compiled DFA is read-only afterwards and any number of [`Matcher`]s can
//! walk it, each advancing one scalar at a time and classifying the prefix
//! seen so far as no-match, partial or full.

pub mod ast;
pub mod automata;
pub mod class;
pub mod matcher;
pub mod syntax;

use rand::Rng;

use ast::Ast;
use automata::Automaton;
pub use class::{ClassAtom, ClassKind, Convert, GroupId, Modifiers, Span, SpanSet};
pub use matcher::{MatchKind, Matcher};
pub use syntax::RegexError;

/// Construction-time options; see [`Regex::with_options`].
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Options {
    pub case_insensitive: bool,
    pub unicode: bool,
}

/// A compiled regular expression: the parsed pattern plus its minimised DFA.
pub struct Regex {
    pattern: String,
    ast: Ast,
    dfa: Automaton,
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Regex, RegexError> {
        Regex::with_options(pattern, Options::default())
    }

    pub fn with_options(pattern: &str, options: Options) -> Result<Regex, RegexError> {
        let mods = Modifiers {
            case_insensitive: options.case_insensitive,
            unicode: options.unicode,
        };
        let ast = syntax::parse(pattern, mods)?;
        let dfa = ast.to_nfa().determinize().minimize();
        log::debug!("compiled `{pattern}` into {} DFA states", dfa.state_count());
        Ok(Regex {
            pattern: pattern.to_string(),
            ast,
            dfa,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// The minimised DFA.
    pub fn dfa(&self) -> &Automaton {
        &self.dfa
    }

    /// The ε-NFA, rebuilt from the AST (it is not retained after compiling).
    pub fn nfa(&self) -> Automaton {
        self.ast.to_nfa()
    }

    /// A fresh matcher positioned at the DFA start state.
    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(self)
    }

    /// Whether the whole of `input` is in the language.
    pub fn is_match(&self, input: &str) -> bool {
        self.matcher().matches(input)
    }

    /// True iff ε is in the language.
    pub fn match_empty(&self) -> bool {
        self.dfa.is_final(self.dfa.start())
    }

    /// A random member of the language: walks the DFA taking uniformly
    /// random transitions, with stopping as one extra option at any final
    /// state.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut out = String::new();
        let mut state = self.dfa.start();
        loop {
            let transitions = self.dfa.transitions_from(state);
            if transitions.is_empty() {
                break;
            }
            let mut options = transitions.len();
            let here_final = self.dfa.is_final(state);
            if here_final {
                options += 1;
            }
            let pick = rng.gen_range(0..options);
            if here_final && pick == options - 1 {
                break;
            }
            out.push_str(&transitions[pick].label.random(&mut rng));
            state = transitions[pick].target;
        }
        out
    }
}

impl std::fmt::Display for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ast)
    }
}

/// Returns `s` with every metacharacter prefixed by `\`.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if syntax::METACHARACTERS.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
