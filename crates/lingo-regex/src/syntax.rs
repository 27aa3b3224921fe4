//! Parser for the concrete regex syntax.
//!
//! Precedence, high to low: atom/group, quantifier (`? * + {m,n}`),
//! concatenation, alternation. Capture groups get increasing ids starting at
//! 1 (id 0 is the whole pattern); every atom carries the ids of all groups
//! enclosing it.

use crate::ast::Ast;
use crate::class::{
    digit_kind, space_kind, word_kind, ClassAtom, ClassKind, Convert, GroupId, Modifiers,
};

/// The characters that [`crate::escape`] protects and `\` makes literal.
pub const METACHARACTERS: &str = "\\()[]{}|+*?";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegexError {
    #[error("unexpected end of pattern")]
    UnexpectedEnd,

    #[error("unexpected `{ch}` at offset {at}")]
    Unexpected { ch: char, at: usize },

    #[error("malformed repetition `{{...}}` at offset {at}")]
    BadRepeat { at: usize },

    #[error("empty word-list name at offset {at}")]
    EmptyListName { at: usize },

    #[error("unknown word-list conversion `{conversion}` at offset {at}")]
    UnknownConversion { conversion: String, at: usize },
}

pub fn parse(pattern: &str, mods: Modifiers) -> Result<Ast, RegexError> {
    let mut parser = Parser {
        chars: pattern.chars().collect(),
        pos: 0,
        next_group: 1,
        active_groups: vec![0],
        mods,
    };
    let ast = parser.alternation()?;
    match parser.peek() {
        None => Ok(ast),
        Some(ch) => Err(RegexError::Unexpected {
            ch,
            at: parser.pos,
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    next_group: GroupId,
    active_groups: Vec<GroupId>,
    mods: Modifiers,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), RegexError> {
        match self.bump() {
            Some(got) if got == c => Ok(()),
            Some(got) => Err(RegexError::Unexpected {
                ch: got,
                at: self.pos - 1,
            }),
            None => Err(RegexError::UnexpectedEnd),
        }
    }

    fn atom_of(&self, kind: ClassKind) -> Ast {
        Ast::Atom(ClassAtom::new(kind, self.mods, self.active_groups.clone()))
    }

    // alternation := concat ('|' alternation)?
    fn alternation(&mut self) -> Result<Ast, RegexError> {
        let left = self.concat()?;
        if self.eat('|') {
            let right = self.alternation()?;
            Ok(Ast::Choice(Box::new(left), Box::new(right)))
        } else {
            Ok(left)
        }
    }

    // concat := quantified*
    fn concat(&mut self) -> Result<Ast, RegexError> {
        let mut parts = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            parts.push(self.quantified()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap())
        } else {
            Ok(Ast::Sequence(parts))
        }
    }

    // quantified := atom ('?' | '*' | '+' | '{m,n}')*
    fn quantified(&mut self) -> Result<Ast, RegexError> {
        let mut node = self.atom()?;
        loop {
            node = match self.peek() {
                Some('?') => {
                    self.pos += 1;
                    Ast::ZeroOrOne(Box::new(node))
                }
                Some('*') => {
                    self.pos += 1;
                    Ast::ZeroOrMore(Box::new(node))
                }
                Some('+') => {
                    self.pos += 1;
                    Ast::OneOrMore(Box::new(node))
                }
                Some('{') => {
                    self.pos += 1;
                    self.repeat(node)?
                }
                _ => return Ok(node),
            };
        }
    }

    // '{' already consumed; forms: {k} {k,} {,k} {m,n}
    fn repeat(&mut self, node: Ast) -> Result<Ast, RegexError> {
        let at = self.pos - 1;
        let min = self.number();
        let (min, max) = if self.eat(',') {
            let max = self.number();
            (min.unwrap_or(0), max)
        } else {
            let k = min.ok_or(RegexError::BadRepeat { at })?;
            (k, Some(k))
        };
        if !self.eat('}') {
            return Err(RegexError::BadRepeat { at });
        }
        // author leniency: swap inverted bounds
        let (min, max) = match max {
            Some(max) if max < min => (max, Some(min)),
            _ => (min, max),
        };
        Ok(Ast::Repeat {
            node: Box::new(node),
            min,
            max,
        })
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .parse()
            .ok()
    }

    fn atom(&mut self) -> Result<Ast, RegexError> {
        match self.bump() {
            None => Err(RegexError::UnexpectedEnd),
            Some('(') => {
                if self.eat(':') {
                    return self.in_list();
                }
                let id = self.next_group;
                self.next_group += 1;
                self.active_groups.push(id);
                let inner = self.alternation()?;
                self.active_groups.pop();
                self.expect(')')?;
                Ok(Ast::Group(id, Box::new(inner)))
            }
            Some('[') => self.class(),
            Some('.') => Ok(self.atom_of(ClassKind::Any)),
            Some('\\') => {
                let kind = self.escape()?;
                Ok(self.atom_of(kind))
            }
            Some(c) if METACHARACTERS.contains(c) => Err(RegexError::Unexpected {
                ch: c,
                at: self.pos - 1,
            }),
            Some(c) => Ok(self.atom_of(ClassKind::Single(c))),
        }
    }

    // '(' ':' already consumed; form: name (':' conversion)*
    fn in_list(&mut self) -> Result<Ast, RegexError> {
        let start = self.pos;
        let name = self.list_word();
        if name.is_empty() {
            return Err(RegexError::EmptyListName { at: start });
        }
        let mut convert = Convert::default();
        while self.eat(':') {
            let at = self.pos;
            let conversion = self.list_word();
            match conversion.as_str() {
                "lower" => convert.lower = true,
                "upper" => convert.upper = true,
                "title" => convert.title = true,
                "trim" => convert.trim = true,
                "space" => convert.single_space = true,
                _ => return Err(RegexError::UnknownConversion { conversion, at }),
            }
        }
        self.expect(')')?;
        Ok(self.atom_of(ClassKind::InList { name, convert }))
    }

    fn list_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == ')' || c == ':' {
                break;
            }
            word.push(c);
            self.pos += 1;
        }
        word
    }

    // '\' already consumed; valid both as a free atom and inside a class
    fn escape(&mut self) -> Result<ClassKind, RegexError> {
        let c = self.bump().ok_or(RegexError::UnexpectedEnd)?;
        Ok(match c {
            'n' => ClassKind::Single('\n'),
            't' => ClassKind::Single('\t'),
            'r' => ClassKind::Single('\r'),
            'd' => digit_kind(),
            'D' => negate(digit_kind()),
            's' => space_kind(),
            'S' => negate(space_kind()),
            'w' => word_kind(),
            'W' => negate(word_kind()),
            c => ClassKind::Single(c),
        })
    }

    // '[' already consumed
    fn class(&mut self) -> Result<Ast, RegexError> {
        let negated = self.eat('^');
        let mut members = Vec::new();
        loop {
            let c = self.bump().ok_or(RegexError::UnexpectedEnd)?;
            if c == ']' {
                break;
            }
            let member = if c == '\\' {
                self.escape()?
            } else {
                ClassKind::Single(c)
            };
            // '-' between two single members forms a range; elsewhere it is
            // a literal
            let ranged = match (&member, self.peek()) {
                (ClassKind::Single(lo), Some('-')) => {
                    let lo = *lo;
                    self.pos += 1;
                    match self.peek() {
                        Some(']') | None => {
                            members.push(ClassKind::Single(lo));
                            Some(ClassKind::Single('-'))
                        }
                        Some(_) => {
                            let hi = self.bump().unwrap();
                            let hi = if hi == '\\' {
                                match self.escape()? {
                                    ClassKind::Single(h) => h,
                                    _ => {
                                        return Err(RegexError::Unexpected {
                                            ch: '\\',
                                            at: self.pos - 1,
                                        })
                                    }
                                }
                            } else {
                                hi
                            };
                            // inverted ranges are swapped rather than refused
                            if lo <= hi {
                                Some(ClassKind::Range(lo, hi))
                            } else {
                                Some(ClassKind::Range(hi, lo))
                            }
                        }
                    }
                }
                _ => None,
            };
            members.push(ranged.unwrap_or(member));
        }
        Ok(self.atom_of(ClassKind::Set { negated, members }))
    }
}

fn negate(kind: ClassKind) -> ClassKind {
    match kind {
        ClassKind::Set { members, .. } => ClassKind::Set {
            negated: true,
            members,
        },
        other => ClassKind::Set {
            negated: true,
            members: vec![other],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(pattern: &str) -> Ast {
        parse(pattern, Modifiers::default()).unwrap()
    }

    #[test]
    fn precedence_binds_quantifier_before_concat_before_alternation() {
        let ast = parse_default("ab*|c");
        match ast {
            Ast::Choice(l, r) => {
                assert_eq!(l.to_string(), "ab*");
                assert_eq!(r.to_string(), "c");
            }
            other => panic!("expected choice, got {other:?}"),
        }
    }

    #[test]
    fn display_round_trips_common_patterns() {
        for p in ["abc", "a|b", "a*", "a+b?", "(ab)+", "a{2,5}", "a{3}", "a{1,}", "[abc]x"] {
            assert_eq!(parse_default(p).to_string(), p);
        }
    }

    #[test]
    fn repeat_forms() {
        match parse_default("a{3}") {
            Ast::Repeat { min, max, .. } => assert_eq!((min, max), (3, Some(3))),
            other => panic!("{other:?}"),
        }
        match parse_default("a{2,}") {
            Ast::Repeat { min, max, .. } => assert_eq!((min, max), (2, None)),
            other => panic!("{other:?}"),
        }
        match parse_default("a{,4}") {
            Ast::Repeat { min, max, .. } => assert_eq!((min, max), (0, Some(4))),
            other => panic!("{other:?}"),
        }
        // inverted bounds are swapped
        match parse_default("a{5,2}") {
            Ast::Repeat { min, max, .. } => assert_eq!((min, max), (2, Some(5))),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn malformed_repeat_is_an_error() {
        assert!(matches!(
            parse("a{", Modifiers::default()),
            Err(RegexError::BadRepeat { .. })
        ));
        assert!(matches!(
            parse("a{}", Modifiers::default()),
            Err(RegexError::BadRepeat { .. })
        ));
    }

    #[test]
    fn unbalanced_group_is_an_error() {
        assert!(parse("(ab", Modifiers::default()).is_err());
        assert!(parse("ab)", Modifiers::default()).is_err());
    }

    #[test]
    fn group_ids_increment_and_nest() {
        // x(a(b)c) — outer group is 1, inner 2; atoms carry enclosing ids
        let ast = parse_default("x(a(b)c)");
        fn find_atoms(ast: &Ast, out: &mut Vec<ClassAtom>) {
            match ast {
                Ast::Atom(a) => out.push(a.clone()),
                Ast::Choice(l, r) => {
                    find_atoms(l, out);
                    find_atoms(r, out);
                }
                Ast::Sequence(parts) => parts.iter().for_each(|p| find_atoms(p, out)),
                Ast::ZeroOrOne(p) | Ast::ZeroOrMore(p) | Ast::OneOrMore(p) => find_atoms(p, out),
                Ast::Repeat { node, .. } => find_atoms(node, out),
                Ast::Group(_, p) => find_atoms(p, out),
            }
        }
        let mut atoms = Vec::new();
        find_atoms(&ast, &mut atoms);
        let groups: Vec<&[GroupId]> = atoms.iter().map(|a| a.groups.as_slice()).collect();
        assert_eq!(groups, vec![&[0][..], &[0, 1][..], &[0, 1, 2][..], &[0, 1][..]]);
    }

    #[test]
    fn class_ranges_and_literal_dashes() {
        let ast = parse_default("[a-z0-9ABC-]");
        match ast {
            Ast::Atom(atom) => {
                assert!(atom.matches('m'));
                assert!(atom.matches('5'));
                assert!(atom.matches('B'));
                assert!(atom.matches('-'));
                assert!(!atom.matches('D'));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn negated_class() {
        let ast = parse_default("[^0-9]");
        match ast {
            Ast::Atom(atom) => {
                assert!(!atom.matches('4'));
                assert!(atom.matches('x'));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn shorthand_classes_in_and_out_of_brackets() {
        let digits = parse_default("\\d+");
        match digits {
            Ast::OneOrMore(inner) => match *inner {
                Ast::Atom(a) => {
                    assert!(a.matches('7'));
                    assert!(!a.matches('x'));
                }
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
        match parse_default("[\\d_]") {
            Ast::Atom(a) => {
                assert!(a.matches('3'));
                assert!(a.matches('_'));
                assert!(!a.matches('x'));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn escaped_metacharacters_are_literals() {
        match parse_default("\\*") {
            Ast::Atom(a) => assert!(a.matches('*') && !a.matches('a')),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn word_list_atom() {
        match parse_default("(:colours)") {
            Ast::Atom(a) => assert_eq!(a.to_string(), "(:colours)"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn word_list_conversions() {
        match parse_default("(:names:lower:trim)") {
            Ast::Atom(a) => {
                match &a.kind {
                    ClassKind::InList { name, convert } => {
                        assert_eq!(name, "names");
                        assert!(convert.lower && convert.trim);
                        assert!(!convert.upper && !convert.title && !convert.single_space);
                    }
                    other => panic!("{other:?}"),
                }
                assert_eq!(a.to_string(), "(:names:lower:trim)");
            }
            other => panic!("{other:?}"),
        }

        assert!(matches!(
            parse("(:names:loud)", Modifiers::default()),
            Err(RegexError::UnknownConversion { conversion, .. }) if conversion == "loud"
        ));
    }
}
