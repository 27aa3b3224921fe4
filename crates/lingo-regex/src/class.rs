//! Character classes used as transition labels in the automata.
//!
//! Every atom of a regular expression (a literal, a range, a bracketed set,
//! the wildcard, a word-list reference) is a [`ClassAtom`]. Atoms answer
//! membership queries one scalar at a time and can render themselves as a
//! [`SpanSet`], the canonical sorted-disjoint-ranges form used when comparing
//! transitions during subset construction and minimisation.

use std::fmt;

use rand::Rng;

/// Flags affecting how atoms match.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Modifiers {
    pub case_insensitive: bool,
    pub unicode: bool,
}

/// Capture-group identifier. Id 0 is the implicit whole-pattern group.
pub type GroupId = u32;

/// A closed range of Unicode scalar values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Span {
    pub lo: char,
    pub hi: char,
}

impl Span {
    pub fn new(lo: char, hi: char) -> Span {
        if lo <= hi {
            Span { lo, hi }
        } else {
            Span { lo: hi, hi: lo }
        }
    }

    pub fn single(c: char) -> Span {
        Span { lo: c, hi: c }
    }

    pub fn contains(&self, c: char) -> bool {
        self.lo <= c && c <= self.hi
    }
}

/// A sorted sequence of disjoint closed scalar ranges.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct SpanSet(Vec<Span>);

const MAX_SCALAR: char = '\u{10FFFF}';

fn next_scalar(c: char) -> Option<char> {
    if c == MAX_SCALAR {
        return None;
    }
    let mut v = c as u32 + 1;
    if (0xD800..=0xDFFF).contains(&v) {
        v = 0xE000;
    }
    char::from_u32(v)
}

fn prev_scalar(c: char) -> Option<char> {
    if c == '\0' {
        return None;
    }
    let mut v = c as u32 - 1;
    if (0xD800..=0xDFFF).contains(&v) {
        v = 0xD7FF;
    }
    char::from_u32(v)
}

impl SpanSet {
    pub fn new() -> SpanSet {
        SpanSet(Vec::new())
    }

    pub fn from_spans(spans: Vec<Span>) -> SpanSet {
        SpanSet(spans).compact()
    }

    /// The full Unicode scalar range.
    pub fn all() -> SpanSet {
        SpanSet(vec![Span::new('\0', MAX_SCALAR)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.0
    }

    pub fn push(&mut self, span: Span) {
        self.0.push(span);
    }

    /// Sorts the ranges and merges overlapping or adjacent ones.
    pub fn compact(mut self) -> SpanSet {
        if self.0.len() <= 1 {
            return self;
        }
        self.0.sort();
        let mut merged: Vec<Span> = Vec::with_capacity(self.0.len());
        for span in self.0 {
            match merged.last_mut() {
                Some(last) if span.lo <= next_scalar(last.hi).unwrap_or(MAX_SCALAR) => {
                    if span.hi > last.hi {
                        last.hi = span.hi;
                    }
                }
                _ => merged.push(span),
            }
        }
        SpanSet(merged)
    }

    /// Complement relative to the full Unicode scalar range.
    pub fn invert(&self) -> SpanSet {
        let compacted = self.clone().compact();
        let mut inverted = Vec::new();
        let mut lo = Some('\0');
        for span in &compacted.0 {
            if let Some(lo) = lo {
                if lo < span.lo {
                    if let Some(hi) = prev_scalar(span.lo) {
                        inverted.push(Span::new(lo, hi));
                    }
                }
            }
            lo = next_scalar(span.hi);
        }
        if let Some(lo) = lo {
            inverted.push(Span::new(lo, MAX_SCALAR));
        }
        SpanSet(inverted)
    }

    /// Binary search over the sorted ranges.
    pub fn contains(&self, c: char) -> bool {
        self.0
            .binary_search_by(|span| {
                if c < span.lo {
                    std::cmp::Ordering::Greater
                } else if c > span.hi {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn merge(mut self, other: &SpanSet) -> SpanSet {
        self.0.extend_from_slice(&other.0);
        self.compact()
    }

    /// A uniformly chosen scalar from the set.
    pub fn random(&self, rng: &mut impl Rng) -> Option<char> {
        if self.0.is_empty() {
            return None;
        }
        // Spans may cross the surrogate gap numerically; those picks are
        // invalid scalars and are redrawn.
        loop {
            let total: u64 = self
                .0
                .iter()
                .map(|s| (s.hi as u64) - (s.lo as u64) + 1)
                .sum();
            let mut pick = rng.gen_range(0..total);
            for span in &self.0 {
                let size = (span.hi as u64) - (span.lo as u64) + 1;
                if pick < size {
                    if let Some(c) = char::from_u32(span.lo as u32 + pick as u32) {
                        return Some(c);
                    }
                    break;
                }
                pick -= size;
            }
        }
    }
}

/// `\d` — the digits.
pub fn digit_kind() -> ClassKind {
    ClassKind::Range('0', '9')
}

/// `\s` — the whitespace characters.
pub fn space_kind() -> ClassKind {
    ClassKind::Set {
        negated: false,
        members: vec![ClassKind::Range('\t', '\r'), ClassKind::Single(' ')],
    }
}

/// `\w` — word characters.
pub fn word_kind() -> ClassKind {
    ClassKind::Set {
        negated: false,
        members: vec![
            ClassKind::Range('0', '9'),
            ClassKind::Range('A', 'Z'),
            ClassKind::Single('_'),
            ClassKind::Range('a', 'z'),
        ],
    }
}

/// Conversions applied to words sampled from an in-list atom, selected with
/// `(:name:lower)`-style suffixes. Trim and space-collapsing run first;
/// lower, upper and title are mutually exclusive with the first set winning.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Convert {
    pub lower: bool,
    pub upper: bool,
    pub title: bool,
    pub trim: bool,
    pub single_space: bool,
}

impl Convert {
    pub fn apply(&self, word: &str) -> String {
        let mut word = if self.trim {
            word.trim().to_string()
        } else {
            word.to_string()
        };
        if self.single_space {
            word = collapse_spaces(&word);
        }
        if self.lower {
            word = word.to_lowercase();
        } else if self.upper {
            word = word.to_uppercase();
        } else if self.title {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                word = first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase();
            }
        }
        word
    }
}

/// Runs of whitespace shrink to their first character.
fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                in_space = true;
                out.push(c);
            }
        } else {
            in_space = false;
            out.push(c);
        }
    }
    out
}

/// Newline-separated word lists compiled into the library, referenced by
/// `(:name)` atoms for random generation.
static WORD_LISTS: &[(&str, &str)] = &[
    ("animals", include_str!("lists/animals.txt")),
    ("colours", include_str!("lists/colours.txt")),
    ("names", include_str!("lists/names.txt")),
];

pub fn list_words(name: &str) -> Option<Vec<&'static str>> {
    let (_, content) = WORD_LISTS.iter().find(|(n, _)| *n == name)?;
    Some(
        content
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .collect(),
    )
}

/// The shape of a character atom.
#[derive(Clone, PartialEq, Debug)]
pub enum ClassKind {
    /// The ε label: traversable without consuming input.
    Empty,
    /// `.` — any scalar.
    Any,
    Single(char),
    Range(char, char),
    /// `[...]` or a coalesced set of atoms from minimisation.
    Set { negated: bool, members: Vec<ClassKind> },
    /// `(:name)` — matches nothing, samples a word from an embedded list,
    /// converted per its flags.
    InList { name: String, convert: Convert },
}

impl ClassKind {
    fn span_set(&self, mods: Modifiers) -> SpanSet {
        match self {
            ClassKind::Empty => SpanSet::new(),
            ClassKind::Any => SpanSet::all(),
            ClassKind::Single(c) => {
                if mods.case_insensitive {
                    let lo = c.to_lowercase().next().unwrap_or(*c);
                    let up = c.to_uppercase().next().unwrap_or(*c);
                    if lo != up {
                        return SpanSet(vec![Span::single(lo), Span::single(up)]).compact();
                    }
                }
                SpanSet(vec![Span::single(*c)])
            }
            ClassKind::Range(from, to) => {
                if mods.case_insensitive {
                    let lf = from.to_lowercase().next().unwrap_or(*from);
                    let uf = from.to_uppercase().next().unwrap_or(*from);
                    let lt = to.to_lowercase().next().unwrap_or(*to);
                    let ut = to.to_uppercase().next().unwrap_or(*to);
                    if lf != uf && lt != ut {
                        return SpanSet(vec![Span::new(lf, lt), Span::new(uf, ut)]).compact();
                    }
                }
                SpanSet(vec![Span::new(*from, *to)])
            }
            ClassKind::Set { negated, members } => {
                let mut set = SpanSet::new();
                for m in members {
                    set = set.merge(&m.span_set(mods));
                }
                if *negated {
                    set.invert()
                } else {
                    set.compact()
                }
            }
            ClassKind::InList { .. } => SpanSet::new(),
        }
    }
}

/// A transition label: an atom kind plus the modifier flags it was compiled
/// under and the capture groups that enclose it.
#[derive(Clone, Debug)]
pub struct ClassAtom {
    pub kind: ClassKind,
    pub mods: Modifiers,
    /// Sorted ids of enclosing capture groups; 0 is the whole pattern.
    pub groups: Vec<GroupId>,
}

impl ClassAtom {
    pub fn new(kind: ClassKind, mods: Modifiers, groups: Vec<GroupId>) -> ClassAtom {
        ClassAtom { kind, mods, groups }
    }

    pub fn epsilon() -> ClassAtom {
        ClassAtom {
            kind: ClassKind::Empty,
            mods: Modifiers::default(),
            groups: Vec::new(),
        }
    }

    /// True only for the ε label.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ClassKind::Empty)
    }

    pub fn matches(&self, c: char) -> bool {
        match &self.kind {
            ClassKind::Empty => false,
            ClassKind::Any => true,
            ClassKind::Single(s) => {
                if self.mods.case_insensitive {
                    s.to_lowercase().eq(c.to_lowercase())
                } else {
                    *s == c
                }
            }
            ClassKind::Range(..) | ClassKind::Set { .. } => self.span_set().contains(c),
            ClassKind::InList { .. } => false,
        }
    }

    pub fn span_set(&self) -> SpanSet {
        self.kind.span_set(self.mods)
    }

    /// The concrete-syntax rendering, used to group equal transitions during
    /// subset construction and to label DOT edges.
    pub fn pattern(&self) -> String {
        self.to_string()
    }

    /// A random string matched by this atom: one scalar from the span set,
    /// or a converted word for `(:list)` atoms.
    pub fn random(&self, rng: &mut impl Rng) -> String {
        if let ClassKind::InList { name, convert } = &self.kind {
            if let Some(words) = list_words(name) {
                return convert.apply(words[rng.gen_range(0..words.len())]);
            }
            return String::new();
        }
        match self.span_set().random(rng) {
            Some(c) => c.to_string(),
            None => String::new(),
        }
    }
}

fn write_kind(f: &mut fmt::Formatter<'_>, kind: &ClassKind) -> fmt::Result {
    match kind {
        ClassKind::Empty => Ok(()),
        ClassKind::Any => write!(f, "."),
        ClassKind::Single(c) => match c {
            '\n' => write!(f, "\\n"),
            '\t' => write!(f, "\\t"),
            '\r' => write!(f, "\\r"),
            c => write!(f, "{c}"),
        },
        ClassKind::Range(from, to) => {
            write_kind(f, &ClassKind::Single(*from))?;
            write!(f, "-")?;
            write_kind(f, &ClassKind::Single(*to))
        }
        ClassKind::Set { negated, members } => {
            write!(f, "[")?;
            if *negated {
                write!(f, "^")?;
            }
            for m in members {
                write_kind(f, m)?;
            }
            write!(f, "]")
        }
        ClassKind::InList { name, convert } => {
            write!(f, "(:{name}")?;
            for (flag, set) in [
                ("lower", convert.lower),
                ("upper", convert.upper),
                ("title", convert.title),
                ("trim", convert.trim),
                ("space", convert.single_space),
            ] {
                if set {
                    write!(f, ":{flag}")?;
                }
            }
            write!(f, ")")
        }
    }
}

impl fmt::Display for ClassAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_kind(f, &self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_merges_overlapping_and_adjacent() {
        let set = SpanSet(vec![
            Span::new('f', 'k'),
            Span::new('a', 'c'),
            Span::new('d', 'e'),
            Span::new('h', 'm'),
        ])
        .compact();
        assert_eq!(set.spans(), &[Span::new('a', 'e'), Span::new('f', 'm')]);
    }

    #[test]
    fn contains_is_binary_search_over_ranges() {
        let set = SpanSet(vec![Span::new('0', '9'), Span::new('a', 'f')]);
        assert!(set.contains('0'));
        assert!(set.contains('5'));
        assert!(set.contains('f'));
        assert!(!set.contains('g'));
        assert!(!set.contains(' '));
    }

    #[test]
    fn invert_complements_over_unicode() {
        let set = SpanSet(vec![Span::new('b', 'd')]).invert();
        assert!(set.contains('a'));
        assert!(!set.contains('b'));
        assert!(!set.contains('d'));
        assert!(set.contains('e'));
        assert!(set.contains('\u{10FFFF}'));
        assert_eq!(set.spans()[0].lo, '\0');
    }

    #[test]
    fn invert_twice_is_identity() {
        let set = SpanSet(vec![Span::new('0', '9'), Span::single('_')]).compact();
        assert_eq!(set.invert().invert(), set);
    }

    #[test]
    fn case_insensitive_single_spans_both_cases() {
        let atom = ClassAtom::new(
            ClassKind::Single('a'),
            Modifiers {
                case_insensitive: true,
                unicode: false,
            },
            vec![],
        );
        assert!(atom.matches('a'));
        assert!(atom.matches('A'));
        let set = atom.span_set();
        assert!(set.contains('a') && set.contains('A'));
        assert!(!set.contains('b'));
    }

    #[test]
    fn random_sample_is_member() {
        let atom = ClassAtom::new(
            ClassKind::Set {
                negated: false,
                members: vec![ClassKind::Range('a', 'z'), ClassKind::Single('7')],
            },
            Modifiers::default(),
            vec![],
        );
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let s = atom.random(&mut rng);
            let c = s.chars().next().unwrap();
            assert!(atom.matches(c), "sampled {c:?} outside class");
        }
    }

    #[test]
    fn list_atoms_sample_from_the_embedded_list() {
        let atom = ClassAtom::new(
            ClassKind::InList {
                name: "colours".into(),
                convert: Convert::default(),
            },
            Modifiers::default(),
            vec![],
        );
        let words = list_words("colours").unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let w = atom.random(&mut rng);
            assert!(words.contains(&w.as_str()));
        }
    }

    #[test]
    fn list_sampling_applies_conversions() {
        let atom = ClassAtom::new(
            ClassKind::InList {
                name: "names".into(),
                convert: Convert {
                    upper: true,
                    ..Convert::default()
                },
            },
            Modifiers::default(),
            vec![],
        );
        let words = list_words("names").unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let w = atom.random(&mut rng);
            assert_eq!(w, w.to_uppercase());
            assert!(words.iter().any(|orig| orig.to_uppercase() == w));
        }
    }

    #[test]
    fn conversions_transform_case_and_spacing() {
        let title = Convert {
            title: true,
            ..Convert::default()
        };
        assert_eq!(title.apply("bLUE ridge"), "Blue ridge");

        let squeezed = Convert {
            trim: true,
            single_space: true,
            lower: true,
            ..Convert::default()
        };
        assert_eq!(squeezed.apply("  Deep   Sea\t\tGreen "), "deep sea\tgreen");

        // lower wins over upper and title when several are set
        let both = Convert {
            lower: true,
            upper: true,
            ..Convert::default()
        };
        assert_eq!(both.apply("Mixed"), "mixed");
    }

    #[test]
    fn negated_set_matches_complement() {
        let atom = ClassAtom::new(
            ClassKind::Set {
                negated: true,
                members: vec![ClassKind::Range('0', '9')],
            },
            Modifiers::default(),
            vec![],
        );
        assert!(!atom.matches('3'));
        assert!(atom.matches('x'));
    }
}
