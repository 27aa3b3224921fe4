//! LL(1) predictive parsing.
//!
//! FOLLOW is computed as a fixpoint (Aho & Ullman):
//!
//! ```text
//! repeat
//!     for each production X → Y1 Y2 ··· Yk
//!         for i from k to 1
//!             if i = k then FOLLOW[Yi] ∪= FOLLOW[X]
//!             else FOLLOW[Yi] ∪= FIRST[Yi+1]
//!                  if Yi+1 is nullable then FOLLOW[Yi] ∪= FOLLOW[Yi+1]
//! until FOLLOW did not change
//! ```
//!
//! The table maps (production, lookahead) to the selected alternate; a
//! nullable alternate is entered as ε under every FOLLOW token. Entering
//! the same cell twice means the grammar is not LL(1) and construction
//! fails.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;

use lingo_lexer::{LexError, TokenType};

use crate::tree::{self, Tree, TreeRef};
use crate::{Element, Grammar, GrammarError, Production, Sentence, TokenSet};
use std::rc::Rc;

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no production for `{prod}` -> `{token}` (expected one of: {expected})")]
    NoProduction {
        prod: String,
        token: String,
        expected: String,
    },

    #[error("unexpected `{token}` at {line}:{column}, expected `{expected}`")]
    UnexpectedToken {
        token: String,
        expected: String,
        line: u32,
        column: u32,
    },

    #[error(transparent)]
    Lex(#[from] LexError),
}

/// A table-driven predictive parser for one grammar and start production.
#[derive(Debug)]
pub struct Ll1Parser {
    grammar: Grammar,
    start: Rc<Production>,
    table: HashMap<String, HashMap<TokenType, Sentence>>,
    follow: HashMap<Element, TokenSet>,
}

impl Ll1Parser {
    pub fn new(grammar: Grammar, start: &str) -> Result<Ll1Parser, GrammarError> {
        let start = grammar
            .production(start)
            .cloned()
            .ok_or_else(|| GrammarError::Undefined {
                symbol: start.to_string(),
                rule: "<start>".to_string(),
            })?;

        let follow = compute_follow(&grammar, &start)?;
        let table = build_table(&grammar, &follow)?;
        log::debug!(
            "LL(1) table for `{}`: {} productions",
            grammar.id,
            table.len()
        );
        Ok(Ll1Parser {
            grammar,
            start,
            table,
            follow,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn start(&self) -> &Rc<Production> {
        &self.start
    }

    pub fn follow_of(&self, element: &Element) -> Option<&TokenSet> {
        self.follow.get(element)
    }

    pub fn table_row(&self, production: &str) -> Option<&HashMap<TokenType, Sentence>> {
        self.table.get(production)
    }

    pub fn parse_text(&self, input: &str) -> Result<TreeRef, ParseError> {
        self.parse(io::Cursor::new(input.as_bytes().to_vec()))
    }

    /// Drives the prediction stack over the token stream, building the
    /// parse tree top-down, and returns it after the default cleanup pass.
    pub fn parse<R: io::Read>(&self, reader: R) -> Result<TreeRef, ParseError> {
        struct BuildNode {
            element: Element,
            children: Vec<usize>,
        }

        let mut arena: Vec<BuildNode> = vec![
            BuildNode {
                element: Element::Prod(self.start.clone()),
                children: Vec::new(),
            },
            BuildNode {
                element: Element::Terminal(TokenType::eof()),
                children: Vec::new(),
            },
        ];
        let root = 0;
        // top of the prediction stack is the vector's tail
        let mut stack: Vec<usize> = vec![1, root];

        let mut stream = self.grammar.lexer.lex(reader);
        while let Some((token, error)) = stream.next_pair() {
            if let Some(error) = error {
                return Err(error.into());
            }
            loop {
                let Some(&top) = stack.last() else {
                    return Err(ParseError::UnexpectedToken {
                        token: token.ty.id().to_string(),
                        expected: "end of input".to_string(),
                        line: token.line,
                        column: token.column,
                    });
                };
                match arena[top].element.clone() {
                    Element::Terminal(ty) if ty == token.ty => {
                        let leaf = arena.len();
                        arena.push(BuildNode {
                            element: Element::Lexeme(token),
                            children: Vec::new(),
                        });
                        arena[top].children.push(leaf);
                        stack.pop();
                        break;
                    }
                    Element::Terminal(ty) => {
                        return Err(ParseError::UnexpectedToken {
                            token: token.ty.id().to_string(),
                            expected: ty.id().to_string(),
                            line: token.line,
                            column: token.column,
                        });
                    }
                    Element::Prod(prod) => {
                        let row = self.table.get(prod.name());
                        let Some(alternate) = row.and_then(|r| r.get(&token.ty)) else {
                            let mut expected: Vec<&str> = row
                                .map(|r| r.keys().map(TokenType::id).collect())
                                .unwrap_or_default();
                            expected.sort_unstable();
                            return Err(ParseError::NoProduction {
                                prod: prod.name().to_string(),
                                token: token.ty.id().to_string(),
                                expected: expected.join(", "),
                            });
                        };
                        stack.pop();
                        let mut children = Vec::with_capacity(alternate.0.len());
                        for element in &alternate.0 {
                            let child = arena.len();
                            arena.push(BuildNode {
                                element: element.clone(),
                                children: Vec::new(),
                            });
                            children.push(child);
                        }
                        for &child in children.iter().rev() {
                            stack.push(child);
                        }
                        arena[top].children = children;
                    }
                    Element::Lexeme(_) => unreachable!("lexemes are never predicted"),
                }
            }
        }

        fn freeze(arena: &[BuildNode], id: usize) -> TreeRef {
            Tree::with_children(
                arena[id].element.clone(),
                arena[id]
                    .children
                    .iter()
                    .map(|&c| Some(freeze(arena, c)))
                    .collect(),
            )
        }
        let parsed = freeze(&arena, root);
        Ok(Tree::map(&parsed, &tree::cleanup()).unwrap_or(parsed))
    }

    /// A plain-text rendering of the parse table, productions as rows and
    /// lookahead tokens as columns.
    pub fn table_display(&self) -> String {
        let mut tokens: Vec<TokenType> = Vec::new();
        for row in self.table.values() {
            for t in row.keys() {
                if !tokens.contains(t) {
                    tokens.push(t.clone());
                }
            }
        }
        tokens.sort_by(|a, b| a.id().cmp(b.id()));

        let mut out = String::new();
        let _ = write!(out, "{:>12}", "Production");
        for t in &tokens {
            let _ = write!(out, "  {:<12}", t.id());
        }
        out.push('\n');

        let mut names: Vec<&String> = self.table.keys().collect();
        names.sort();
        for name in names {
            let _ = write!(out, "{name:>12}");
            for t in &tokens {
                match self.table[name].get(t) {
                    Some(s) => {
                        let _ = write!(out, "  {:<12}", s.to_string());
                    }
                    None => {
                        let _ = write!(out, "  {:<12}", "");
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn extend(map: &mut HashMap<Element, TokenSet>, add_to: &Element, tokens: &TokenSet) -> bool {
    let entry = map.entry(add_to.clone()).or_default();
    let before = entry.len();
    entry.extend(tokens.iter().cloned());
    entry.len() != before
}

fn compute_follow(
    grammar: &Grammar,
    start: &Rc<Production>,
) -> Result<HashMap<Element, TokenSet>, GrammarError> {
    let mut follow: HashMap<Element, TokenSet> = HashMap::new();
    follow.insert(
        Element::Prod(start.clone()),
        TokenSet::from([TokenType::eof()]),
    );

    let mut changed = true;
    while changed {
        changed = false;
        for prod in &grammar.productions {
            let of_prod = Element::Prod(prod.clone());
            for alternate in prod.alternates().iter() {
                for i in (0..alternate.0.len()).rev() {
                    if i == alternate.0.len() - 1 {
                        let from = follow.get(&of_prod).cloned().unwrap_or_default();
                        changed |= extend(&mut follow, &alternate.0[i], &from);
                    } else {
                        let next = &alternate.0[i + 1];
                        changed |= extend(&mut follow, &alternate.0[i], &next.first()?);
                        if next.match_empty()? {
                            let from = follow.get(next).cloned().unwrap_or_default();
                            changed |= extend(&mut follow, &alternate.0[i], &from);
                        }
                    }
                }
            }
        }
    }
    Ok(follow)
}

fn build_table(
    grammar: &Grammar,
    follow: &HashMap<Element, TokenSet>,
) -> Result<HashMap<String, HashMap<TokenType, Sentence>>, GrammarError> {
    let mut table: HashMap<String, HashMap<TokenType, Sentence>> = HashMap::new();
    for prod in &grammar.productions {
        let row = table.entry(prod.name().to_string()).or_default();
        let mut nullable = false;
        for alternate in prod.alternates().iter() {
            if alternate.match_empty()? {
                nullable = true;
            } else {
                for token in alternate.first()? {
                    if row.insert(token.clone(), alternate.clone()).is_some() {
                        return Err(GrammarError::Ll1Conflict {
                            prod: prod.name().to_string(),
                            token: token.id().to_string(),
                        });
                    }
                }
            }
        }
        if nullable {
            let of_prod = Element::Prod(prod.clone());
            for token in follow.get(&of_prod).cloned().unwrap_or_default() {
                if row.insert(token.clone(), Sentence::default()).is_some() {
                    return Err(GrammarError::Ll1Conflict {
                        prod: prod.name().to_string(),
                        token: token.id().to_string(),
                    });
                }
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expression_rules, Rule};

    fn parser() -> Ll1Parser {
        let g = Grammar::new("expr", &expression_rules()).unwrap();
        Ll1Parser::new(g, "e").unwrap()
    }

    fn follow_ids(p: &Ll1Parser, name: &str) -> Vec<String> {
        let element = Element::Prod(p.grammar().production(name).unwrap().clone());
        let mut ids: Vec<String> = p
            .follow_of(&element)
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Pre-order terminal yield.
    fn terminals(tree: &TreeRef, out: &mut Vec<String>) {
        if let Element::Lexeme(t) = &tree.node {
            out.push(format!("{}:{}", t.ty.id(), t.text));
        }
        for child in tree.children.iter().flatten() {
            terminals(child, out);
        }
    }

    #[test]
    fn follow_sets_of_the_expression_grammar() {
        let p = parser();
        assert_eq!(follow_ids(&p, "e"), vec!["CLOSE", "EOF"]);
        assert_eq!(follow_ids(&p, "e'"), vec!["CLOSE", "EOF"]);
        assert_eq!(follow_ids(&p, "t"), vec!["CLOSE", "EOF", "PLUS"]);
        assert_eq!(follow_ids(&p, "t'"), vec!["CLOSE", "EOF", "PLUS"]);
        assert_eq!(follow_ids(&p, "f"), vec!["CLOSE", "EOF", "PLUS", "TIME"]);
    }

    #[test]
    fn table_selects_alternates_by_lookahead() {
        let p = parser();
        let g = p.grammar();
        let id = g.lexer.token_type("ID").unwrap();
        let open = g.lexer.token_type("OPEN").unwrap();
        let plus = g.lexer.token_type("PLUS").unwrap();

        let row_e = p.table_row("e").unwrap();
        assert_eq!(row_e[id].to_string(), "t e'");
        assert_eq!(row_e[open].to_string(), "t e'");
        assert!(row_e.get(plus).is_none());

        let row_e1 = p.table_row("e'").unwrap();
        assert_eq!(row_e1[plus].to_string(), "PLUS t e'");
        // ε-alternate sits under every FOLLOW token
        assert_eq!(row_e1[&TokenType::eof()], Sentence::default());

        let row_f = p.table_row("f").unwrap();
        assert_eq!(row_f[open].to_string(), "OPEN e CLOSE");
    }

    #[test]
    fn ll1_conflict_is_a_construction_error() {
        let rules = vec![
            Rule::new("s", &[&["X", "Y"], &["X", "Z"]]),
            Rule::new("X", &[&["x"]]),
            Rule::new("Y", &[&["y"]]),
            Rule::new("Z", &[&["z"]]),
        ];
        let g = Grammar::new("conflict", &rules).unwrap();
        match Ll1Parser::new(g, "s") {
            Err(GrammarError::Ll1Conflict { prod, token }) => {
                assert_eq!(prod, "s");
                assert_eq!(token, "X");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn unknown_start_production_is_an_error() {
        let g = Grammar::new("expr", &expression_rules()).unwrap();
        assert!(matches!(
            Ll1Parser::new(g, "nope"),
            Err(GrammarError::Undefined { .. })
        ));
    }

    #[test]
    fn parse_builds_a_cleaned_tree() {
        let p = parser();
        let tree = p.parse_text("x + y").unwrap();
        // after cleanup: e[ID(x), e'[PLUS(+), ID(y)]]
        assert_eq!(tree.node.tree_pattern(), "e");
        let children: Vec<&str> = tree
            .children
            .iter()
            .map(|c| c.as_ref().unwrap().node.tree_pattern())
            .collect();
        assert_eq!(children, vec!["ID", "e'"]);
        let e1 = tree.children[1].as_ref().unwrap();
        let inner: Vec<&str> = e1
            .children
            .iter()
            .map(|c| c.as_ref().unwrap().node.tree_pattern())
            .collect();
        assert_eq!(inner, vec!["PLUS", "ID"]);
    }

    #[test]
    fn preorder_terminals_equal_the_token_sequence() {
        let p = parser();
        let tree = p.parse_text("x + y * (a + b)").unwrap();
        let mut yielded = Vec::new();
        terminals(&tree, &mut yielded);
        assert_eq!(
            yielded,
            vec![
                "ID:x", "PLUS:+", "ID:y", "TIME:*", "OPEN:(", "ID:a", "PLUS:+", "ID:b", "CLOSE:)"
            ]
        );
    }

    #[test]
    fn children_follow_the_chosen_alternate() {
        let p = parser();
        // uncleaned structure is checked through the cleaned invariants:
        // nested parentheses still parse to the right yield
        let tree = p.parse_text("(x)").unwrap();
        let mut yielded = Vec::new();
        terminals(&tree, &mut yielded);
        assert_eq!(yielded, vec!["OPEN:(", "ID:x", "CLOSE:)"]);
    }

    #[test]
    fn parse_error_names_the_expected_lookahead() {
        let p = parser();
        match p.parse_text("x + + y") {
            Err(ParseError::NoProduction {
                prod,
                token,
                expected,
            }) => {
                assert_eq!(prod, "t");
                assert_eq!(token, "PLUS");
                assert!(expected.contains("ID"), "{expected}");
                assert!(expected.contains("OPEN"), "{expected}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn lexer_errors_abort_the_parse() {
        let p = parser();
        match p.parse_text("x + §") {
            Err(ParseError::Lex(LexError::Unmatched(msg))) => {
                assert!(msg.contains("unmatched text"), "{msg}");
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn epsilon_only_grammar_parses_empty_input() {
        let rules = vec![Rule::new("s", &[&[]])];
        let g = Grammar::new("empty", &rules).unwrap();
        let p = Ll1Parser::new(g, "s").unwrap();
        let tree = p.parse_text("").unwrap();
        assert_eq!(tree.node.tree_pattern(), "s");
    }

    #[test]
    fn table_display_lists_rows_and_columns() {
        let p = parser();
        let rendered = p.table_display();
        assert!(rendered.contains("Production"));
        assert!(rendered.contains("e'"));
        assert!(rendered.contains("PLUS t e'"));
    }
}
