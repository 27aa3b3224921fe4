//! Small driver around the toolkit:
//!
//! ```text
//! lingo dot <pattern>            print the NFA and DFA of a regex as DOT
//! lingo gen <pattern> [count]    print random members of the language
//! lingo lex <pattern>...         tokenize stdin with one type per pattern
//! lingo parse                    parse an arithmetic expression from stdin
//! ```

use std::io::Read;

use anyhow::{bail, Context, Result};

use lingo_grammar::tree::Tree;
use lingo_grammar::{Grammar, Ll1Parser, Rule};
use lingo_lexer::Lexer;
use lingo_regex::Regex;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("dot") => {
            let pattern = args.get(1).context("usage: lingo dot <pattern>")?;
            let regex = Regex::new(pattern).context("compiling pattern")?;
            println!("{}", regex.nfa().to_dot(&format!("NFA: {pattern}")));
            println!("{}", regex.dfa().to_dot(&format!("DFA: {pattern}")));
        }
        Some("gen") => {
            let pattern = args.get(1).context("usage: lingo gen <pattern> [count]")?;
            let count: usize = match args.get(2) {
                Some(n) => n.parse().context("parsing count")?,
                None => 5,
            };
            let regex = Regex::new(pattern).context("compiling pattern")?;
            for _ in 0..count {
                println!("{}", regex.generate());
            }
        }
        Some("lex") => {
            if args.len() < 2 {
                bail!("usage: lingo lex <pattern>...");
            }
            let patterns: Vec<&str> = args[1..].iter().map(String::as_str).collect();
            let lexer = Lexer::from_patterns(&patterns).context("compiling patterns")?;
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
            for (token, error) in lexer.lex_text(&input) {
                match error {
                    Some(error) => println!("{token}\t{error}"),
                    None => println!("{token}"),
                }
            }
        }
        Some("parse") => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
            let parser = expression_parser()?;
            let tree = parser.parse_text(input.trim_end()).context("parsing")?;
            println!("{}", Tree::to_dot(&tree, input.trim_end()));
        }
        _ => bail!("usage: lingo <dot|gen|lex|parse> ..."),
    }
    Ok(())
}

fn expression_parser() -> Result<Ll1Parser> {
    let rules = vec![
        Rule::new("e", &[&["t", "e'"]]),
        Rule::new("e'", &[&["PLUS", "t", "e'"], &[]]),
        Rule::new("t", &[&["f", "t'"]]),
        Rule::new("t'", &[&["TIME", "f", "t'"], &[]]),
        Rule::new("f", &[&["ID"], &["INT"], &["OPEN", "e", "CLOSE"]]),
        Rule::new("PLUS", &[&["\\+|-"]]),
        Rule::new("TIME", &[&["\\*|/"]]),
        Rule::new("OPEN", &[&["\\("]]),
        Rule::new("CLOSE", &[&["\\)"]]),
        Rule::new("ID", &[&["[_a-zA-Z][_a-zA-Z0-9]*"]]),
        Rule::new("INT", &[&["\\d+"]]),
        Rule::new("SPC", &[&["\\s+"], &["#Ignore"]]),
    ];
    let grammar = Grammar::new("expression", &rules).context("building grammar")?;
    Ll1Parser::new(grammar, "e").context("building parser")
}
