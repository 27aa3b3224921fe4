//! Incremental prefix matching against a compiled DFA.

use std::collections::HashMap;

use crate::automata::State;
use crate::class::GroupId;
use crate::Regex;

/// Classification of the input seen so far.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatchKind {
    /// No characters supplied yet.
    Start,
    /// The input is a proper prefix of some member of the language.
    Partial,
    /// The input itself is a member; longer members may still exist.
    Full,
    /// The input left the language; the matcher must be reset.
    NoMatch,
}

/// Advances through a compiled regex one scalar at a time, keeping the
/// longest full match seen so far and the text captured per group.
pub struct Matcher<'r> {
    regex: &'r Regex,
    state: State,
    last: MatchKind,
    full: String,
    partial: String,
    groups: HashMap<GroupId, String>,
}

impl<'r> Matcher<'r> {
    pub(crate) fn new(regex: &'r Regex) -> Matcher<'r> {
        Matcher {
            regex,
            state: regex.dfa().start(),
            last: MatchKind::Start,
            full: String::new(),
            partial: String::new(),
            groups: HashMap::new(),
        }
    }

    pub fn last_match(&self) -> MatchKind {
        self.last
    }

    /// The longest prefix seen so far that is a full match.
    pub fn full_text(&self) -> &str {
        &self.full
    }

    /// The whole prefix consumed, when the matcher is in a partial state.
    pub fn partial_text(&self) -> &str {
        &self.partial
    }

    /// Captured text per group id. Group 0 (the whole pattern) is not
    /// stored here.
    pub fn groups(&self) -> &HashMap<GroupId, String> {
        &self.groups
    }

    pub fn reset(&mut self) {
        self.state = self.regex.dfa().start();
        self.last = MatchKind::Start;
        self.full.clear();
        self.partial.clear();
        self.groups.clear();
    }

    /// True iff ε is in the language.
    pub fn match_empty(&self) -> bool {
        let dfa = self.regex.dfa();
        dfa.is_final(dfa.start())
    }

    /// Feeds one scalar. A dead matcher stays dead until [`reset`].
    ///
    /// [`reset`]: Matcher::reset
    pub fn advance(&mut self, c: char) -> MatchKind {
        if self.last == MatchKind::NoMatch {
            return self.last;
        }
        let dfa = self.regex.dfa();
        let transition = dfa
            .transitions_from(self.state)
            .iter()
            .find(|t| t.label.matches(c));
        let Some(transition) = transition else {
            self.last = MatchKind::NoMatch;
            return self.last;
        };

        self.state = transition.target;
        if dfa.is_final(self.state) {
            // migrate so `full` always holds the longest full prefix
            if self.last == MatchKind::Partial {
                self.full.clear();
                self.full.push_str(&self.partial);
            }
            self.full.push(c);
            self.last = MatchKind::Full;
        } else {
            if self.last == MatchKind::Full {
                self.partial.clear();
                self.partial.push_str(&self.full);
            }
            self.partial.push(c);
            self.last = MatchKind::Partial;
        }

        for &g in &transition.label.groups {
            if g != 0 {
                self.groups.entry(g).or_default().push(c);
            }
        }
        self.last
    }

    /// Whether the whole of `input`, fed from the current position, lands in
    /// a final state.
    pub fn matches(&mut self, input: &str) -> bool {
        for c in input.chars() {
            if self.advance(c) == MatchKind::NoMatch {
                return false;
            }
        }
        self.regex.dfa().is_final(self.state)
    }

    /// The patterns a next character could take from the current state.
    /// Used to describe partial matches in lexer errors.
    pub fn expected_patterns(&self) -> Vec<String> {
        self.regex
            .dfa()
            .transitions_from(self.state)
            .iter()
            .map(|t| t.label.pattern())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_classifies_prefixes() {
        let re = Regex::new("ab(cd|ef)?").unwrap();
        let mut m = re.matcher();
        assert_eq!(m.last_match(), MatchKind::Start);
        assert_eq!(m.advance('a'), MatchKind::Partial);
        assert_eq!(m.advance('b'), MatchKind::Full);
        assert_eq!(m.advance('c'), MatchKind::Partial);
        assert_eq!(m.advance('d'), MatchKind::Full);
        assert_eq!(m.full_text(), "abcd");
        assert_eq!(m.advance('x'), MatchKind::NoMatch);
        // dead matchers stay dead
        assert_eq!(m.advance('a'), MatchKind::NoMatch);
    }

    #[test]
    fn full_text_tracks_longest_full_prefix() {
        let re = Regex::new("a(bc)*").unwrap();
        let mut m = re.matcher();
        m.advance('a');
        assert_eq!(m.full_text(), "a");
        m.advance('b');
        assert_eq!(m.full_text(), "a");
        assert_eq!(m.partial_text(), "ab");
        m.advance('c');
        assert_eq!(m.full_text(), "abc");
    }

    #[test]
    fn reset_restores_the_start_state() {
        let re = Regex::new("xy").unwrap();
        let mut m = re.matcher();
        m.advance('x');
        m.advance('q');
        assert_eq!(m.last_match(), MatchKind::NoMatch);
        m.reset();
        assert_eq!(m.last_match(), MatchKind::Start);
        assert!(m.matches("xy"));
    }

    #[test]
    fn capture_groups_accumulate_per_id() {
        let re = Regex::new("(a+)(b+)").unwrap();
        let mut m = re.matcher();
        assert!(m.matches("aabbb"));
        assert_eq!(m.groups().get(&1).map(String::as_str), Some("aa"));
        assert_eq!(m.groups().get(&2).map(String::as_str), Some("bbb"));
        assert!(m.groups().get(&0).is_none());
    }

    #[test]
    fn alternate_groups_capture_only_the_taken_branch() {
        let re = Regex::new("(aab)|(aac)").unwrap();
        let mut m = re.matcher();
        assert!(m.matches("aac"));
        // the shared "aa" prefix belongs to both branches until they diverge
        let g2 = m.groups().get(&2).cloned().unwrap();
        assert!(g2.ends_with('c'));
    }
}
