//! End-to-end: declared rules through lexing, predictive parsing and tree
//! transformation.

use std::rc::Rc;

use lingo_grammar::tree::{self, Tree, TreeRef};
use lingo_grammar::{Element, Grammar, Ll1Parser, Rule};

fn expression_grammar() -> Grammar {
    let rules = vec![
        Rule::new("e", &[&["t", "e'"]]),
        Rule::new("e'", &[&["PLUS", "t", "e'"], &[]]),
        Rule::new("t", &[&["f", "t'"]]),
        Rule::new("t'", &[&["TIME", "f", "t'"], &[]]),
        Rule::new("f", &[&["ID"], &["OPEN", "e", "CLOSE"]]),
        Rule::new("PLUS", &[&["\\+|-"]]),
        Rule::new("TIME", &[&["\\*|/"]]),
        Rule::new("OPEN", &[&["\\("]]),
        Rule::new("CLOSE", &[&["\\)"]]),
        Rule::new("ID", &[&["[_a-zA-Z][_a-zA-Z0-9]*"]]),
        Rule::new("INT", &[&["\\d+"]]),
        Rule::new("SPC", &[&["\\s+"], &["#Ignore"]]),
    ];
    Grammar::new("expression", &rules).unwrap()
}

fn terminal_texts(tree: &TreeRef, out: &mut Vec<String>) {
    if let Element::Lexeme(t) = &tree.node {
        out.push(t.text.clone());
    }
    for child in tree.children.iter().flatten() {
        terminal_texts(child, out);
    }
}

#[test]
fn parse_then_match_then_rewrite() {
    let parser = Ll1Parser::new(expression_grammar(), "e").unwrap();
    let tree = parser.parse_text("a + b * (c - d)").unwrap();

    let mut texts = Vec::new();
    terminal_texts(&tree, &mut texts);
    assert_eq!(texts, vec!["a", "+", "b", "*", "(", "c", "-", "d", ")"]);

    // every ID directly left of an e' subtree gets wrapped under a fresh
    // f node
    let f = parser.grammar().production("f").unwrap().clone();
    let rewritten = Tree::map_match(
        &tree,
        |t, result| {
            assert_eq!(t.node.tree_pattern(), "ID");
            assert!(result.bindings.contains_key("e'"));
            Some(Tree::with_children(
                Element::Prod(f.clone()),
                vec![Some(t.clone())],
            ))
        },
        &tree::parse_pattern("ID - e'"),
    )
    .unwrap();

    // the yield is unchanged by the wrapping
    let mut texts = Vec::new();
    terminal_texts(&rewritten, &mut texts);
    assert_eq!(texts, vec!["a", "+", "b", "*", "(", "c", "-", "d", ")"]);
    assert!(!Rc::ptr_eq(&tree, &rewritten));
}

#[test]
fn statement_language_round_trip() {
    let rules = vec![
        Rule::new("program", &[&["stmt", "program'"]]),
        Rule::new("program'", &[&["stmt", "program'"], &[]]),
        Rule::new("stmt", &[&["LET", "ID", "ASSIGN", "value", "SEMI"]]),
        Rule::new("value", &[&["ID"], &["INT"]]),
        Rule::new("LET", &[&["let"]]),
        Rule::new("ID", &[&["[_a-zA-Z][_a-zA-Z0-9]*"]]),
        Rule::new("INT", &[&["\\d+"]]),
        Rule::new("ASSIGN", &[&[":="]]),
        Rule::new("SEMI", &[&[";"]]),
        Rule::new("SPC", &[&["\\s+"], &["#Ignore"]]),
    ];
    let grammar = Grammar::new("statements", &rules).unwrap();
    let parser = Ll1Parser::new(grammar, "program").unwrap();

    let tree = parser
        .parse_text("let x := 1000;\nlet y := x;")
        .unwrap();
    let mut texts = Vec::new();
    terminal_texts(&tree, &mut texts);
    assert_eq!(
        texts,
        vec!["let", "x", ":=", "1000", ";", "let", "y", ":=", "x", ";"]
    );

    // keywords win over identifiers on equal length: "let" lexes as LET,
    // and cleanup promoted each terminal wrapper down to its lexeme
    let index = Tree::build_index(&tree);
    let lets = index.matches(&[vec!["LET".to_string()]]);
    assert_eq!(lets.len(), 2);
}

#[test]
fn dot_renderings_do_not_require_graphviz() {
    let parser = Ll1Parser::new(expression_grammar(), "e").unwrap();
    let tree = parser.parse_text("a + b").unwrap();
    let dot = Tree::to_dot(&tree, "a + b");
    assert!(dot.contains("digraph G"));
    assert!(dot.contains("->"));
}
