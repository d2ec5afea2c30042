//! # Lexer
//!
//! Converts source text into a flat stream of [`LocatedToken`]s, each
//! carrying a 1-based line and column. The scanner accumulates runs of
//! characters in `[A-Za-z0-9_#/.]` and classifies each run by trying, in
//! order: repeat marker, note, duration, decimal, integer, keyword,
//! identifier. Punctuation (`,`, `:`, `=`, `[`, `]`, `{`, `}`) is emitted
//! character-by-character; `//` runs to end-of-line as a comment.
//!
//! Note that the rest keyword `r` and a pattern named `r` are
//! lexically identical (both classify as `Keyword(Rest)`); the parser
//! disambiguates by grammatical position, recovering the literal text via
//! [`Keyword::as_str`].

use crate::error::CompileError;
use std::iter::Peekable;
use std::str::Chars;

/// A DSL keyword, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Bpm,
    Inst,
    Seq,
    Swing,
    Loop,
    Grid,
    Track,
    Pattern,
    Use,
    Rest,
}

impl Keyword {
    fn from_word(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bpm" => Some(Keyword::Bpm),
            "inst" => Some(Keyword::Inst),
            "seq" => Some(Keyword::Seq),
            "swing" => Some(Keyword::Swing),
            "loop" => Some(Keyword::Loop),
            "grid" => Some(Keyword::Grid),
            "track" => Some(Keyword::Track),
            "pattern" => Some(Keyword::Pattern),
            "use" => Some(Keyword::Use),
            "r" => Some(Keyword::Rest),
            _ => None,
        }
    }

    /// The lowercase word this keyword was matched from. Used by the parser
    /// to recover an identifier's text when a keyword token occupies a
    /// grammatical slot that expects a name (see module docs re: `r`).
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Bpm => "bpm",
            Keyword::Inst => "inst",
            Keyword::Seq => "seq",
            Keyword::Swing => "swing",
            Keyword::Loop => "loop",
            Keyword::Grid => "grid",
            Keyword::Track => "track",
            Keyword::Pattern => "pattern",
            Keyword::Use => "use",
            Keyword::Rest => "r",
        }
    }
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    Integer(i64),
    Decimal(f64),
    /// `n/d`, e.g. `1/4`.
    Duration(u32, u32),
    /// `xN` or `XN`, e.g. `x2`.
    Repeat(u32),
    /// Raw note lexeme, e.g. `"C#4"`. Parsed into a [`crate::music::Pitch`]
    /// by the parser so octave-range errors carry parser-level context.
    Note(String),
    Comma,
    Colon,
    Equals,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Eof,
}

/// A [`Token`] tagged with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '#' || c == '/' || c == '.'
}

fn classify_repeat(s: &str) -> Option<u32> {
    let mut chars = s.chars();
    match chars.next() {
        Some('x') | Some('X') => {}
        _ => return None,
    }
    let rest = chars.as_str();
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

fn classify_note(s: &str) -> bool {
    let mut chars = s.chars();
    let letter = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !matches!(letter.to_ascii_uppercase(), 'A'..='G') {
        return false;
    }
    let mut rest = chars.as_str();
    if let Some(stripped) = rest.strip_prefix('#').or_else(|| rest.strip_prefix('b')) {
        rest = stripped;
    }
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

fn classify_duration(s: &str) -> Option<(u32, u32)> {
    let (n, d) = s.split_once('/')?;
    if n.is_empty() || d.is_empty() {
        return None;
    }
    if !n.chars().all(|c| c.is_ascii_digit()) || !d.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((n.parse().ok()?, d.parse().ok()?))
}

fn classify_decimal(s: &str) -> Option<f64> {
    if !s.contains('.') {
        return None;
    }
    s.parse().ok()
}

fn classify_integer(s: &str) -> Option<i64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn classify_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Hand-rolled scanner over a `Peekable<Chars>`, tracking 1-based line and
/// column as it advances.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => {
                self.column += 1;
            }
            None => {}
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.clone().nth(1)
    }

    fn classify(&self, s: &str) -> Result<Token, String> {
        if let Some(n) = classify_repeat(s) {
            return Ok(Token::Repeat(n));
        }
        if classify_note(s) {
            return Ok(Token::Note(s.to_string()));
        }
        if let Some((n, d)) = classify_duration(s) {
            return Ok(Token::Duration(n, d));
        }
        if let Some(f) = classify_decimal(s) {
            return Ok(Token::Decimal(f));
        }
        if let Some(i) = classify_integer(s) {
            return Ok(Token::Integer(i));
        }
        if let Some(kw) = Keyword::from_word(s) {
            return Ok(Token::Keyword(kw));
        }
        if classify_identifier(s) {
            return Ok(Token::Identifier(s.to_string()));
        }
        Err(format!("Invalid token word '{s}'"))
    }

    /// Scan the entire input, returning tokens ending with [`Token::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<LocatedToken>, CompileError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            if c == '\n' || c.is_whitespace() {
                self.advance();
                continue;
            }

            if c == '/' && self.peek_second() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            let line = self.line;
            let column = self.column;

            let single = match c {
                ',' => Some(Token::Comma),
                ':' => Some(Token::Colon),
                '=' => Some(Token::Equals),
                '[' => Some(Token::LeftBracket),
                ']' => Some(Token::RightBracket),
                '{' => Some(Token::LeftBrace),
                '}' => Some(Token::RightBrace),
                _ => None,
            };

            if let Some(token) = single {
                self.advance();
                log::trace!("lexer: {token:?} at {line}:{column}");
                tokens.push(LocatedToken { token, line, column });
                continue;
            }

            if is_word_char(c) {
                let mut word = String::new();
                while let Some(c) = self.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    self.advance();
                }
                let token = self
                    .classify(&word)
                    .map_err(|msg| CompileError::lexical(line, column, msg))?;
                log::trace!("lexer: {token:?} at {line}:{column}");
                tokens.push(LocatedToken { token, line, column });
                continue;
            }

            return Err(CompileError::lexical(
                line,
                column,
                format!("Unexpected character '{c}'"),
            ));
        }

        tokens.push(LocatedToken {
            token: Token::Eof,
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|lt| lt.token)
            .collect()
    }

    #[test]
    fn test_simple_melody() {
        let tokens = tokens_of("bpm 120\nseq: C4 1/4, D4 1/4");
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Bpm),
                Token::Integer(120),
                Token::Keyword(Keyword::Seq),
                Token::Colon,
                Token::Note("C4".to_string()),
                Token::Duration(1, 4),
                Token::Comma,
                Token::Note("D4".to_string()),
                Token::Duration(1, 4),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_repeat_marker() {
        assert_eq!(tokens_of("x2"), vec![Token::Repeat(2), Token::Eof]);
    }

    #[test]
    fn test_note_with_accidentals() {
        assert_eq!(
            tokens_of("C#4 Db3"),
            vec![
                Token::Note("C#4".to_string()),
                Token::Note("Db3".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_chord_brackets() {
        assert_eq!(
            tokens_of("[C4 E4 G4] 1/2"),
            vec![
                Token::LeftBracket,
                Token::Note("C4".to_string()),
                Token::Note("E4".to_string()),
                Token::Note("G4".to_string()),
                Token::RightBracket,
                Token::Duration(1, 2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_decimal_swing_value() {
        assert_eq!(
            tokens_of("swing 0.5"),
            vec![
                Token::Keyword(Keyword::Swing),
                Token::Decimal(0.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_to_end_of_line() {
        assert_eq!(
            tokens_of("bpm 120 // tempo\nloop 2"),
            vec![
                Token::Keyword(Keyword::Bpm),
                Token::Integer(120),
                Token::Keyword(Keyword::Loop),
                Token::Integer(2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_inst_directive_with_params() {
        assert_eq!(
            tokens_of("inst lead sine attack=0.01"),
            vec![
                Token::Keyword(Keyword::Inst),
                Token::Identifier("lead".to_string()),
                Token::Identifier("sine".to_string()),
                Token::Identifier("attack".to_string()),
                Token::Equals,
                Token::Decimal(0.01),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_pattern_named_r_lexes_as_rest_keyword() {
        // `r` as a pattern name is lexically indistinguishable from the
        // rest keyword; the parser resolves this by grammatical position.
        assert_eq!(
            tokens_of("use r x2"),
            vec![
                Token::Keyword(Keyword::Use),
                Token::Keyword(Keyword::Rest),
                Token::Repeat(2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_rest_item() {
        assert_eq!(
            tokens_of("r 1/4"),
            vec![
                Token::Keyword(Keyword::Rest),
                Token::Duration(1, 4),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character_reports_position() {
        let err = Lexer::new("bpm 120\n@").tokenize().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn test_tracks_lines_and_columns() {
        let tokens = Lexer::new("bpm 120\nswing 0.5").tokenize().unwrap();
        let swing_tok = &tokens[2];
        assert_eq!(swing_tok.line, 2);
        assert_eq!(swing_tok.column, 1);
    }
}
