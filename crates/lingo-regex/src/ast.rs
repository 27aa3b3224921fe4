//! The regular-expression AST and its translation to an ε-NFA.
//!
//! Thompson's construction: every node builds a fragment with one entry and
//! one exit state inside a shared arena automaton and returns the pair.

use std::fmt;

use crate::automata::{Automaton, State};
use crate::class::{ClassAtom, GroupId};

#[derive(Clone, Debug)]
pub enum Ast {
    /// `l|r`
    Choice(Box<Ast>, Box<Ast>),
    /// Concatenation; an empty sequence matches ε.
    Sequence(Vec<Ast>),
    /// `p?`
    ZeroOrOne(Box<Ast>),
    /// `p*`
    ZeroOrMore(Box<Ast>),
    /// `p+`
    OneOrMore(Box<Ast>),
    /// `p{min,max}`; `max == None` leaves the repetition unbounded.
    Repeat {
        node: Box<Ast>,
        min: u32,
        max: Option<u32>,
    },
    /// `(p)` — structural only; the group id is already attached to every
    /// atom inside the subpattern.
    Group(GroupId, Box<Ast>),
    Atom(ClassAtom),
}

impl Ast {
    /// Builds the complete ε-NFA for this pattern.
    pub fn to_nfa(&self) -> Automaton {
        let mut nfa = Automaton::new();
        let (entry, exit) = self.build(&mut nfa);
        let start = nfa.start();
        nfa.add_transition(start, ClassAtom::epsilon(), entry);
        nfa.mark_final(exit);
        nfa
    }

    /// Builds this node's fragment and returns its (entry, exit) states.
    fn build(&self, nfa: &mut Automaton) -> (State, State) {
        match self {
            Ast::Atom(atom) => {
                let entry = nfa.add_state();
                let exit = nfa.add_state();
                nfa.add_transition(entry, atom.clone(), exit);
                (entry, exit)
            }
            //     left
            //     ∧  \
            //    /    v
            // entry   exit
            //    \    ∧
            //     v  /
            //     right
            Ast::Choice(l, r) => {
                let entry = nfa.add_state();
                let exit = nfa.add_state();
                let (le, lx) = l.build(nfa);
                let (re, rx) = r.build(nfa);
                nfa.add_transition(entry, ClassAtom::epsilon(), le);
                nfa.add_transition(entry, ClassAtom::epsilon(), re);
                nfa.add_transition(lx, ClassAtom::epsilon(), exit);
                nfa.add_transition(rx, ClassAtom::epsilon(), exit);
                (entry, exit)
            }
            // entry --> p1 --> p2 --> ... --> exit
            Ast::Sequence(parts) => {
                let mut entry = None;
                let mut exit = None;
                for part in parts {
                    let (pe, px) = part.build(nfa);
                    if entry.is_none() {
                        entry = Some(pe);
                    }
                    if let Some(prev) = exit {
                        nfa.add_transition(prev, ClassAtom::epsilon(), pe);
                    }
                    exit = Some(px);
                }
                match (entry, exit) {
                    (Some(e), Some(x)) => (e, x),
                    _ => {
                        // ε: a lone state that is both entry and exit
                        let s = nfa.add_state();
                        (s, s)
                    }
                }
            }
            //     ______________
            //    /              \
            //   /                v
            // entry --> ... --> exit
            Ast::ZeroOrOne(p) => {
                let (entry, exit) = p.build(nfa);
                nfa.add_transition(entry, ClassAtom::epsilon(), exit);
                (entry, exit)
            }
            //     ______________
            //    ^              \
            //   /                v
            // entry --> ... --> exit
            //   ^                /
            //    \              v
            //     --------------
            Ast::ZeroOrMore(p) => {
                let (entry, exit) = p.build(nfa);
                nfa.add_transition(entry, ClassAtom::epsilon(), exit);
                nfa.add_transition(exit, ClassAtom::epsilon(), entry);
                (entry, exit)
            }
            Ast::OneOrMore(p) => {
                let (entry, exit) = p.build(nfa);
                nfa.add_transition(exit, ClassAtom::epsilon(), entry);
                (entry, exit)
            }
            Ast::Repeat { node, min, max } => {
                let mut entry = None;
                let mut exit = None;
                let mut link = |nfa: &mut Automaton, pe: State, px: State| {
                    if entry.is_none() {
                        entry = Some(pe);
                    }
                    if let Some(prev) = exit {
                        nfa.add_transition(prev, ClassAtom::epsilon(), pe);
                    }
                    exit = Some(px);
                };
                for _ in 0..*min {
                    let (pe, px) = node.build(nfa);
                    link(nfa, pe, px);
                }
                match max {
                    // the unbounded tail is a star
                    None => {
                        let (pe, px) = node.build(nfa);
                        nfa.add_transition(pe, ClassAtom::epsilon(), px);
                        nfa.add_transition(px, ClassAtom::epsilon(), pe);
                        link(nfa, pe, px);
                    }
                    Some(max) => {
                        for _ in *min..*max {
                            let (pe, px) = node.build(nfa);
                            nfa.add_transition(pe, ClassAtom::epsilon(), px);
                            link(nfa, pe, px);
                        }
                    }
                }
                match (entry, exit) {
                    (Some(e), Some(x)) => (e, x),
                    _ => {
                        let s = nfa.add_state();
                        (s, s)
                    }
                }
            }
            Ast::Group(_, p) => p.build(nfa),
        }
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Choice(l, r) => write!(f, "{l}|{r}"),
            Ast::Sequence(parts) => {
                for p in parts {
                    write!(f, "{p}")?;
                }
                Ok(())
            }
            Ast::ZeroOrOne(p) => write!(f, "{p}?"),
            Ast::ZeroOrMore(p) => write!(f, "{p}*"),
            Ast::OneOrMore(p) => write!(f, "{p}+"),
            Ast::Repeat { node, min, max } => {
                write!(f, "{node}{{")?;
                match max {
                    Some(max) if min == max => write!(f, "{min}")?,
                    Some(max) => {
                        if *min != 0 {
                            write!(f, "{min}")?;
                        }
                        write!(f, ",{max}")?;
                    }
                    None => write!(f, "{min},")?,
                }
                write!(f, "}}")
            }
            Ast::Group(_, p) => write!(f, "({p})"),
            Ast::Atom(atom) => write!(f, "{atom}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassKind, Modifiers};

    fn atom(c: char) -> Ast {
        Ast::Atom(ClassAtom::new(
            ClassKind::Single(c),
            Modifiers::default(),
            vec![0],
        ))
    }

    fn accepts(nfa: &Automaton, input: &str) -> bool {
        let dfa = nfa.determinize();
        let mut state = dfa.start();
        for c in input.chars() {
            match dfa.step(state, c) {
                Some(next) => state = next,
                None => return false,
            }
        }
        dfa.is_final(state)
    }

    #[test]
    fn empty_sequence_accepts_only_epsilon() {
        let nfa = Ast::Sequence(vec![]).to_nfa();
        assert!(accepts(&nfa, ""));
        assert!(!accepts(&nfa, "a"));
    }

    #[test]
    fn choice_accepts_either_branch() {
        let nfa = Ast::Choice(Box::new(atom('a')), Box::new(atom('b'))).to_nfa();
        assert!(accepts(&nfa, "a"));
        assert!(accepts(&nfa, "b"));
        assert!(!accepts(&nfa, "ab"));
        assert!(!accepts(&nfa, ""));
    }

    #[test]
    fn repeat_bounds_are_honoured() {
        let re = Ast::Repeat {
            node: Box::new(atom('a')),
            min: 2,
            max: Some(4),
        };
        let nfa = re.to_nfa();
        assert!(!accepts(&nfa, "a"));
        assert!(accepts(&nfa, "aa"));
        assert!(accepts(&nfa, "aaa"));
        assert!(accepts(&nfa, "aaaa"));
        assert!(!accepts(&nfa, "aaaaa"));
    }

    #[test]
    fn unbounded_repeat_has_no_upper_limit() {
        let re = Ast::Repeat {
            node: Box::new(atom('a')),
            min: 1,
            max: None,
        };
        let nfa = re.to_nfa();
        assert!(!accepts(&nfa, ""));
        assert!(accepts(&nfa, "a"));
        assert!(accepts(&nfa, &"a".repeat(40)));
    }

    #[test]
    fn display_round_trips_the_shape() {
        let re = Ast::Choice(
            Box::new(Ast::Sequence(vec![atom('a'), Ast::ZeroOrMore(Box::new(atom('b')))])),
            Box::new(Ast::Group(1, Box::new(atom('c')))),
        );
        assert_eq!(re.to_string(), "ab*|(c)");
    }
}
