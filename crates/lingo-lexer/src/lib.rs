//! A longest-match lexer driving prefix regex matchers in parallel.
//!
//! The lexer feeds every decoded scalar to one matcher per token type and
//! tracks the longest full match seen. A token is emitted as soon as every
//! matcher is dead and a full match was recorded; the buffer rewinds to one
//! past that lexeme and the matchers restart. Ties between equal-length
//! matches go to the type declared first. Unmatched text is emitted inline
//! as `UNKNOWN` error tokens; the stream always ends with a single `EOF`
//! sentinel.

pub mod modulate;
pub mod token;

use std::collections::{HashMap, VecDeque};
use std::io;

use lingo_regex::{MatchKind, Matcher, RegexError};

pub use modulate::{Ignore, Modulator, Reverse};
pub use token::{Token, TokenType, EMPTY_ID, EOF_ID, UNKNOWN_ID};

/// One element of the token stream: a token and, for `UNKNOWN` tokens and
/// reader failures, the error describing it.
pub type Scanned = (Token, Option<LexError>);

#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum LexError {
    /// Unrecognised text; scanning continues after the error token.
    #[error("{0}")]
    Unmatched(String),

    /// Reader failure; ends the stream.
    #[error("read failed: {0}")]
    Io(String),

    /// Undecodable input; ends the stream.
    #[error("input is not valid utf-8")]
    InvalidUtf8,
}

const MIN_BUFFER: usize = 8;
const DEFAULT_BUFFER: usize = 1024;

type ModulatorFactory = Box<dyn Fn() -> Box<dyn Modulator>>;

/// An ordered set of token types plus the modulators applied to every
/// stream it produces. Patterns are compiled once, when the type is built;
/// scanning shares the read-only DFAs.
pub struct Lexer {
    definition: Vec<TokenType>,
    by_id: HashMap<String, TokenType>,
    modulators: Vec<ModulatorFactory>,
    buffer_size: usize,
}

impl std::fmt::Debug for Lexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lexer")
            .field("definition", &self.definition)
            .field("by_id", &self.by_id)
            .field("modulators", &self.modulators.len())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl Lexer {
    /// Declaration order matters: it is the tie-break between equal-length
    /// matches.
    pub fn new(definition: Vec<TokenType>) -> Lexer {
        let by_id = definition
            .iter()
            .map(|t| (t.id().to_string(), t.clone()))
            .collect();
        Lexer {
            definition,
            by_id,
            modulators: Vec::new(),
            buffer_size: DEFAULT_BUFFER,
        }
    }

    /// Anonymous types `p0`, `p1`, … one per pattern.
    pub fn from_patterns(patterns: &[&str]) -> Result<Lexer, RegexError> {
        let mut types = Vec::with_capacity(patterns.len());
        for (i, p) in patterns.iter().enumerate() {
            types.push(TokenType::new(&format!("p{i}"), p)?);
        }
        Ok(Lexer::new(types))
    }

    /// Initial scan-buffer size in bytes; clamped to at least 8.
    pub fn buffer(&mut self, size: usize) {
        self.buffer_size = size;
    }

    pub fn token_type(&self, id: &str) -> Option<&TokenType> {
        self.by_id.get(id)
    }

    pub fn definition(&self) -> &[TokenType] {
        &self.definition
    }

    /// Appends a modulator to the chain. The factory runs once per stream,
    /// so modulators may hold per-stream state.
    pub fn add_modulator<M: Modulator + 'static>(
        &mut self,
        factory: impl Fn() -> M + 'static,
    ) {
        self.modulators
            .push(Box::new(move || -> Box<dyn Modulator> {
                Box::new(factory())
            }));
    }

    /// Registers an [`Ignore`] modulator for `ty`.
    pub fn ignore(&mut self, ty: &TokenType) {
        let ty = ty.clone();
        self.add_modulator(move || Ignore::new(ty.clone()));
    }

    pub fn lex<R: io::Read>(&self, reader: R) -> TokenStream<'_, R> {
        let matchers = self
            .definition
            .iter()
            .filter_map(|t| {
                t.regex().map(|re| TokenMatcher {
                    ty: t.clone(),
                    matcher: re.matcher(),
                })
            })
            .collect();
        let size = self.buffer_size.max(MIN_BUFFER);
        TokenStream {
            scan: Scan {
                reader,
                matchers,
                buf: vec![0; size],
                emitted: 0,
                matched: 0,
                read: 0,
                input_done: false,
                line: 1,
                column: 1,
                unknown: String::new(),
                best: None,
                phase: Phase::Scanning,
            },
            modulators: self.modulators.iter().map(|f| f()).collect(),
            pending: VecDeque::new(),
            raw_done: false,
            stopped: false,
        }
    }

    pub fn lex_text(&self, input: &str) -> TokenStream<'_, io::Cursor<Vec<u8>>> {
        self.lex(io::Cursor::new(input.as_bytes().to_vec()))
    }
}

/// The lexeme texts matched by any of `patterns`, in order.
pub fn tokenize(input: &str, patterns: &[&str]) -> Result<Vec<String>, RegexError> {
    let lexer = Lexer::from_patterns(patterns)?;
    Ok(lexer
        .lex_text(input)
        .filter(|(t, e)| e.is_none() && !t.ty.is_eof())
        .map(|(t, _)| t.text)
        .collect())
}

/// The segments of `input` between matches of `patterns`, in order.
pub fn split(input: &str, patterns: &[&str]) -> Result<Vec<String>, RegexError> {
    let lexer = Lexer::from_patterns(patterns)?;
    Ok(lexer
        .lex_text(input)
        .filter(|(_, e)| e.is_some())
        .map(|(t, _)| t.text)
        .collect())
}

struct TokenMatcher<'l> {
    ty: TokenType,
    matcher: Matcher<'l>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Scanning,
    EofPending,
    Done,
}

/// The longest full match recorded so far: the buffer offset one past its
/// last byte, its text, and its type.
struct Best {
    pos: usize,
    text: String,
    ty: TokenType,
}

struct Scan<'l, R: io::Read> {
    reader: R,
    matchers: Vec<TokenMatcher<'l>>,
    buf: Vec<u8>,
    /// Bytes already covered by emitted tokens; discardable.
    emitted: usize,
    /// Bytes fed to the matchers.
    matched: usize,
    /// Bytes read from the reader.
    read: usize,
    input_done: bool,
    line: u32,
    column: u32,
    unknown: String,
    best: Option<Best>,
    phase: Phase,
}

fn utf8_len(byte: u8) -> Option<usize> {
    match byte {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

impl<R: io::Read> Scan<'_, R> {
    /// The position cursor advances only over emitted text, so every
    /// token's column is exactly 1 + the scalars since the last line feed
    /// up to the start of its lexeme.
    fn advance_cursor(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn make_token(&mut self, ty: TokenType, text: String) -> Token {
        let token = Token {
            ty,
            text,
            line: self.line,
            column: self.column,
        };
        self.advance_cursor(&token.text);
        token
    }

    fn reset_matchers(&mut self) {
        for m in &mut self.matchers {
            m.matcher.reset();
        }
    }

    fn error_message(&self, unmatched: &str) -> String {
        let mut msg = format!(
            "error at [{}:{}]: unmatched text: {}",
            self.line, self.column, unmatched
        );
        let mut first = true;
        for m in &self.matchers {
            if m.matcher.last_match() == MatchKind::Partial {
                if first {
                    msg.push_str(": potential partial match(es): ");
                    first = false;
                } else {
                    msg.push_str(", ");
                }
                msg.push_str(&format!(
                    "{} (next expected character(s): {})",
                    m.ty.id(),
                    m.matcher.expected_patterns().join(", ")
                ));
            }
        }
        msg
    }

    fn emit_error(&mut self, text: String) -> Scanned {
        let message = self.error_message(&text);
        log::debug!("{message}");
        let token = self.make_token(TokenType::unknown(), text);
        (token, Some(LexError::Unmatched(message)))
    }

    fn end_of_stream(&mut self, error: Option<LexError>) -> Scanned {
        self.phase = Phase::Done;
        (
            Token::new(TokenType::eof(), "$", self.line, self.column),
            error,
        )
    }

    /// Refills the buffer, discarding emitted bytes first and growing the
    /// buffer by half when less than a quarter of it is free.
    fn fill(&mut self) -> Result<(), LexError> {
        if self.emitted > 0 {
            self.buf.copy_within(self.emitted..self.read, 0);
            self.read -= self.emitted;
            self.matched -= self.emitted;
            if let Some(best) = &mut self.best {
                best.pos -= self.emitted;
            }
            self.emitted = 0;
        }
        if self.read * 4 > self.buf.len() * 3 {
            let grown = self.buf.len() + self.buf.len() / 2;
            self.buf.resize(grown, 0);
        }
        match self.reader.read(&mut self.buf[self.read..]) {
            Ok(0) => {
                self.input_done = true;
                Ok(())
            }
            Ok(n) => {
                self.read += n;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(LexError::Io(e.to_string())),
        }
    }

    /// Decodes the scalar at the match position without consuming it.
    fn next_rune(&mut self) -> Result<Option<(char, usize)>, LexError> {
        loop {
            if self.matched < self.read {
                let need = utf8_len(self.buf[self.matched]).ok_or(LexError::InvalidUtf8)?;
                if self.matched + need <= self.read {
                    let bytes = &self.buf[self.matched..self.matched + need];
                    let s = std::str::from_utf8(bytes).map_err(|_| LexError::InvalidUtf8)?;
                    let c = s.chars().next().ok_or(LexError::InvalidUtf8)?;
                    return Ok(Some((c, need)));
                }
                if self.input_done {
                    return Err(LexError::InvalidUtf8);
                }
            } else if self.input_done {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn next_scanned(&mut self) -> Option<Scanned> {
        loop {
            match self.phase {
                Phase::Done => return None,
                Phase::EofPending => return Some(self.end_of_stream(None)),
                Phase::Scanning => {}
            }

            let (r, n) = match self.next_rune() {
                Err(e) => return Some(self.end_of_stream(Some(e))),
                Ok(None) => {
                    self.phase = Phase::EofPending;
                    if let Some(best) = self.best.take() {
                        let token = self.make_token(best.ty, best.text);
                        return Some((token, None));
                    }
                    if !self.unknown.is_empty() {
                        let text = std::mem::take(&mut self.unknown);
                        return Some(self.emit_error(text));
                    }
                    continue;
                }
                Ok(Some(decoded)) => decoded,
            };
            self.matched += n;

            let mut none_alive = true;
            for m in &mut self.matchers {
                let kind = m.matcher.advance(r);
                if kind == MatchKind::Full {
                    let len = m.matcher.full_text().len();
                    let better = match &self.best {
                        None => true,
                        Some(best) => len > best.text.len(),
                    };
                    if better {
                        self.best = Some(Best {
                            pos: self.matched,
                            text: m.matcher.full_text().to_string(),
                            ty: m.ty.clone(),
                        });
                    }
                }
                if kind != MatchKind::NoMatch {
                    none_alive = false;
                }
            }

            if self.best.is_none() {
                self.unknown.push(r);
                if none_alive {
                    self.reset_matchers();
                }
            } else if !self.unknown.is_empty() {
                // A full match just appeared; any unknown bytes it does not
                // cover form an error token.
                let covered = self.best.as_ref().unwrap().text.len() - n;
                let emission = if self.unknown.len() > covered {
                    let cut = self.unknown.len() - covered;
                    let text = self.unknown[..cut].to_string();
                    self.emitted += cut;
                    Some(text)
                } else {
                    None
                };
                self.unknown.clear();
                if let Some(text) = emission {
                    return Some(self.emit_error(text));
                }
            } else if none_alive {
                let best = self.best.take().unwrap();
                self.matched = best.pos;
                self.emitted = best.pos;
                self.reset_matchers();
                let token = self.make_token(best.ty, best.text);
                return Some((token, None));
            }
        }
    }
}

/// A pull iterator of `(token, error)` pairs with single-token lookahead,
/// pushback, and an explicit stop signal.
pub struct TokenStream<'l, R: io::Read> {
    scan: Scan<'l, R>,
    modulators: Vec<Box<dyn Modulator>>,
    pending: VecDeque<Scanned>,
    raw_done: bool,
    stopped: bool,
}

impl<R: io::Read> TokenStream<'_, R> {
    pub fn next_pair(&mut self) -> Option<Scanned> {
        loop {
            if self.stopped {
                return None;
            }
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.raw_done {
                return None;
            }
            match self.scan.next_scanned() {
                None => self.raw_done = true,
                Some(item) => {
                    let mut items = vec![item];
                    for m in &mut self.modulators {
                        let mut next = Vec::new();
                        for i in items {
                            next.extend(m.modulate(i));
                        }
                        items = next;
                    }
                    self.pending.extend(items);
                }
            }
        }
    }

    pub fn peek(&mut self) -> Option<Scanned> {
        let item = self.next_pair()?;
        self.pending.push_front(item.clone());
        Some(item)
    }

    pub fn push_back(&mut self, token: Token) {
        self.pending.push_front((token, None));
    }

    /// Stops iteration; subsequent calls yield nothing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }
}

impl<R: io::Read> Iterator for TokenStream<'_, R> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        self.next_pair()
    }
}
