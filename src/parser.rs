//! # Parser
//!
//! Recursive-descent parser building a [`Program`] from the token stream.
//! Dispatches on the next token at the top level; aborts at the first
//! error, which always carries the offending token's line and column.

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{Keyword, LocatedToken, Token};
use crate::music::{DurationFraction, Pitch};

const ALLOWED_GRIDS: [i64; 6] = [2, 4, 8, 16, 32, 64];

fn is_top_level_keyword(k: Keyword) -> bool {
    matches!(
        k,
        Keyword::Bpm
            | Keyword::Inst
            | Keyword::Seq
            | Keyword::Swing
            | Keyword::Loop
            | Keyword::Grid
            | Keyword::Track
            | Keyword::Pattern
    )
}

/// Recovers an identifier's text from either an [`Token::Identifier`] or a
/// [`Token::Keyword`] (see [`crate::lexer`] docs on the `r`-as-pattern-name
/// ambiguity).
fn ident_text(token: &Token) -> Option<String> {
    match token {
        Token::Identifier(s) => Some(s.clone()),
        Token::Keyword(k) => Some(k.as_str().to_string()),
        _ => None,
    }
}

/// Parser over a token stream produced by [`crate::lexer::Lexer`].
pub struct Parser {
    tokens: Vec<LocatedToken>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<LocatedToken>) -> Self {
        Self { tokens, position: 0 }
    }

    fn current(&self) -> &LocatedToken {
        &self.tokens[self.position]
    }

    fn advance(&mut self) -> LocatedToken {
        let t = self.tokens[self.position].clone();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        t
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1).map(|t| &t.token)
    }

    fn pos(&self) -> (usize, usize) {
        (self.current().line, self.current().column)
    }

    fn expect_colon(&mut self, context: &str) -> Result<(), CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Colon => Ok(()),
            _ => Err(CompileError::syntactic(
                line,
                column,
                format!("Expected ':' {context}"),
            )),
        }
    }

    fn expect_equals(&mut self, context: &str) -> Result<(), CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Equals => Ok(()),
            _ => Err(CompileError::syntactic(
                line,
                column,
                format!("Expected '=' {context}"),
            )),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, context: &str) -> Result<(), CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Keyword(k) if k == kw => Ok(()),
            _ => Err(CompileError::syntactic(
                line,
                column,
                format!("Expected '{}' {context}", kw.as_str()),
            )),
        }
    }

    fn expect_integer(&mut self, context: &str) -> Result<i64, CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Integer(n) => Ok(n),
            _ => Err(CompileError::syntactic(
                line,
                column,
                format!("Expected integer {context}"),
            )),
        }
    }

    fn expect_number(&mut self, context: &str) -> Result<f64, CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Integer(n) => Ok(n as f64),
            Token::Decimal(f) => Ok(f),
            _ => Err(CompileError::syntactic(
                line,
                column,
                format!("Expected number {context}"),
            )),
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, CompileError> {
        let (line, column) = self.pos();
        let token = self.advance().token;
        ident_text(&token).ok_or_else(|| {
            CompileError::syntactic(line, column, format!("Expected identifier {context}"))
        })
    }

    fn expect_duration(&mut self) -> Result<DurationFraction, CompileError> {
        let (line, column) = self.pos();
        match self.advance().token {
            Token::Duration(n, d) => {
                DurationFraction::new(n, d).map_err(|msg| CompileError::value(line, column, msg))
            }
            _ => Err(CompileError::syntactic(
                line,
                column,
                "Expected a duration (n/d)".to_string(),
            )),
        }
    }

    /// `(vel = INT|DEC)?`, validated to `[0, 1]`.
    fn parse_optional_velocity(&mut self) -> Result<Option<f64>, CompileError> {
        let is_vel = match &self.current().token {
            t => ident_text(t).map(|s| s.eq_ignore_ascii_case("vel")).unwrap_or(false),
        };
        if is_vel && matches!(self.peek_next(), Some(Token::Equals)) {
            self.advance();
            self.expect_equals("after vel")?;
            let (line, column) = self.pos();
            let v = self.expect_number("for vel")?;
            if !(0.0..=1.0).contains(&v) {
                return Err(CompileError::value(
                    line,
                    column,
                    format!("velocity must be in [0, 1], got {v}"),
                ));
            }
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    /// Parse the whole token stream into a [`Program`].
    pub fn parse(&mut self) -> Result<Program, CompileError> {
        let mut bpm: Option<u32> = None;
        let mut instruments = Vec::new();
        let mut patterns = Vec::new();
        let mut tracks = Vec::new();
        let mut sequence: Option<Vec<SequenceItem>> = None;
        let mut settings = GlobalSettings::default();

        loop {
            match &self.current().token {
                Token::Eof => break,
                Token::Keyword(Keyword::Bpm) => {
                    let (line, column) = self.pos();
                    if bpm.is_some() {
                        return Err(CompileError::syntactic(
                            line,
                            column,
                            "Duplicate 'bpm' directive".to_string(),
                        ));
                    }
                    self.advance();
                    let n = self.expect_integer("after bpm")?;
                    if n <= 0 {
                        return Err(CompileError::value(
                            line,
                            column,
                            format!("bpm must be positive, got {n}"),
                        ));
                    }
                    bpm = Some(n as u32);
                }
                Token::Keyword(Keyword::Swing) => {
                    self.advance();
                    let (line, column) = self.pos();
                    let v = self.expect_number("after swing")?;
                    if !(0.0..=0.75).contains(&v) {
                        return Err(CompileError::value(
                            line,
                            column,
                            format!("swing must be in [0, 0.75], got {v}"),
                        ));
                    }
                    settings.swing = v;
                }
                Token::Keyword(Keyword::Loop) => {
                    self.advance();
                    let (line, column) = self.pos();
                    let n = self.expect_integer("after loop")?;
                    if n < 1 {
                        return Err(CompileError::value(
                            line,
                            column,
                            format!("loop must be >= 1, got {n}"),
                        ));
                    }
                    settings.loop_bars = n as u32;
                }
                Token::Keyword(Keyword::Grid) => {
                    self.advance();
                    let (line, column) = self.pos();
                    let n = self.expect_integer("after grid")?;
                    if !ALLOWED_GRIDS.contains(&n) {
                        return Err(CompileError::value(
                            line,
                            column,
                            format!("grid must be one of {ALLOWED_GRIDS:?}, got {n}"),
                        ));
                    }
                    settings.grid = n as u16;
                }
                Token::Keyword(Keyword::Inst) => {
                    let inst = self.parse_inst()?;
                    instruments.push(inst);
                }
                Token::Keyword(Keyword::Pattern) => {
                    let pattern = self.parse_pattern()?;
                    patterns.push(pattern);
                }
                Token::Keyword(Keyword::Track) => {
                    let track = self.parse_track()?;
                    tracks.push(track);
                }
                Token::Keyword(Keyword::Seq) => {
                    let (line, column) = self.pos();
                    if sequence.is_some() {
                        return Err(CompileError::syntactic(
                            line,
                            column,
                            "Duplicate top-level 'seq' block".to_string(),
                        ));
                    }
                    self.advance();
                    self.expect_colon("after seq")?;
                    sequence = Some(self.parse_sequence_items()?);
                }
                _ => {
                    let (line, column) = self.pos();
                    return Err(CompileError::syntactic(
                        line,
                        column,
                        "Expected a top-level directive (bpm, inst, seq, swing, loop, grid, track, pattern)".to_string(),
                    ));
                }
            }
        }

        if instruments.is_empty() {
            instruments.push(Program::default_instrument());
        }

        log::trace!(
            "parser: {} instrument(s), {} pattern(s), {} track(s)",
            instruments.len(),
            patterns.len(),
            tracks.len()
        );

        Ok(Program {
            bpm: bpm.unwrap_or(120),
            instruments,
            patterns,
            tracks,
            sequence,
            settings,
        })
    }

    fn parse_inst(&mut self) -> Result<Instrument, CompileError> {
        self.advance(); // 'inst'
        let name = self.expect_identifier("after inst")?;
        let (wf_line, wf_column) = self.pos();
        let waveform_text = self.expect_identifier("for instrument waveform")?;
        let waveform = Waveform::from_str(&waveform_text).ok_or_else(|| {
            CompileError::value(
                wf_line,
                wf_column,
                format!("Unknown waveform '{waveform_text}'"),
            )
        })?;

        let mut gain = None;
        let mut adsr = Adsr::default();
        let mut has_adsr = false;

        loop {
            let is_param = ident_text(&self.current().token).is_some();
            if !(is_param && matches!(self.peek_next(), Some(Token::Equals))) {
                break;
            }
            let (key_line, key_column) = self.pos();
            let key = self.expect_identifier("as instrument parameter name")?;
            self.expect_equals("after instrument parameter name")?;
            let (val_line, val_column) = self.pos();
            let value = self.expect_number("as instrument parameter value")?;

            match key.to_ascii_lowercase().as_str() {
                "gain" => {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(CompileError::value(
                            val_line,
                            val_column,
                            format!("gain must be in [0, 1], got {value}"),
                        ));
                    }
                    gain = Some(value);
                }
                "attack" => {
                    if value < 0.0 {
                        return Err(CompileError::value(
                            val_line,
                            val_column,
                            format!("attack must be >= 0, got {value}"),
                        ));
                    }
                    adsr.attack = value;
                    has_adsr = true;
                }
                "decay" => {
                    if value < 0.0 {
                        return Err(CompileError::value(
                            val_line,
                            val_column,
                            format!("decay must be >= 0, got {value}"),
                        ));
                    }
                    adsr.decay = value;
                    has_adsr = true;
                }
                "sustain" => {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(CompileError::value(
                            val_line,
                            val_column,
                            format!("sustain must be in [0, 1], got {value}"),
                        ));
                    }
                    adsr.sustain = value;
                    has_adsr = true;
                }
                "release" => {
                    if value < 0.0 {
                        return Err(CompileError::value(
                            val_line,
                            val_column,
                            format!("release must be >= 0, got {value}"),
                        ));
                    }
                    adsr.release = value;
                    has_adsr = true;
                }
                other => {
                    return Err(CompileError::value(
                        key_line,
                        key_column,
                        format!("Unknown instrument parameter '{other}'"),
                    ));
                }
            }
        }

        Ok(Instrument {
            name,
            waveform,
            gain,
            adsr: if has_adsr { Some(adsr) } else { None },
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, CompileError> {
        self.advance(); // 'pattern'
        let name = self.expect_identifier("after pattern")?;
        self.expect_colon("after pattern name")?;
        let items = self.parse_sequence_items()?;
        Ok(Pattern { name, items })
    }

    fn parse_track(&mut self) -> Result<Track, CompileError> {
        self.advance(); // 'track'
        let name = self.expect_identifier("after track")?;
        self.expect_keyword(Keyword::Inst, "in track declaration")?;
        self.expect_equals("after inst in track declaration")?;
        let (instrument_line, instrument_column) = self.pos();
        let instrument = self.expect_identifier("as track instrument name")?;
        self.expect_colon("after track instrument")?;
        let items = self.parse_sequence_items()?;
        Ok(Track {
            name,
            instrument,
            items,
            instrument_line,
            instrument_column,
        })
    }

    fn parse_sequence_items(&mut self) -> Result<Vec<SequenceItem>, CompileError> {
        let mut items = Vec::new();
        loop {
            match &self.current().token {
                Token::Eof | Token::RightBrace => break,
                Token::Keyword(k) if is_top_level_keyword(*k) => break,
                _ => {
                    items.push(self.parse_sequence_item()?);
                    if matches!(self.current().token, Token::Comma) {
                        self.advance();
                    }
                }
            }
        }
        Ok(items)
    }

    fn parse_sequence_item(&mut self) -> Result<SequenceItem, CompileError> {
        let (line, column) = self.pos();
        match self.current().token.clone() {
            Token::Keyword(Keyword::Rest) => {
                self.advance();
                let duration = self.expect_duration()?;
                Ok(SequenceItem::Rest { duration })
            }
            Token::Note(lexeme) => {
                self.advance();
                let pitch = Pitch::parse(&lexeme)
                    .map_err(|msg| CompileError::value(line, column, msg))?;
                let duration = self.expect_duration()?;
                let velocity = self.parse_optional_velocity()?;
                Ok(SequenceItem::Note {
                    pitch,
                    duration,
                    velocity,
                })
            }
            Token::LeftBracket => {
                self.advance();
                let mut pitches = Vec::new();
                while let Token::Note(lexeme) = self.current().token.clone() {
                    let (nline, ncolumn) = self.pos();
                    self.advance();
                    pitches.push(
                        Pitch::parse(&lexeme)
                            .map_err(|msg| CompileError::value(nline, ncolumn, msg))?,
                    );
                }
                if pitches.is_empty() {
                    return Err(CompileError::syntactic(
                        line,
                        column,
                        "Chord must contain at least one note".to_string(),
                    ));
                }
                let (bline, bcolumn) = self.pos();
                match self.advance().token {
                    Token::RightBracket => {}
                    _ => {
                        return Err(CompileError::syntactic(
                            bline,
                            bcolumn,
                            "Expected ']' to close chord".to_string(),
                        ))
                    }
                }
                let duration = self.expect_duration()?;
                let velocity = self.parse_optional_velocity()?;
                Ok(SequenceItem::Chord {
                    pitches,
                    duration,
                    velocity,
                })
            }
            Token::Repeat(count) => {
                self.advance();
                if count == 0 {
                    return Err(CompileError::value(
                        line,
                        column,
                        "Repeat count must be positive".to_string(),
                    ));
                }
                let (bline, bcolumn) = self.pos();
                match self.advance().token {
                    Token::LeftBrace => {}
                    _ => {
                        return Err(CompileError::syntactic(
                            bline,
                            bcolumn,
                            "Expected '{' to open repeat block".to_string(),
                        ))
                    }
                }
                let items = self.parse_sequence_items()?;
                let (eline, ecolumn) = self.pos();
                match self.advance().token {
                    Token::RightBrace => {}
                    _ => {
                        return Err(CompileError::syntactic(
                            eline,
                            ecolumn,
                            "Expected '}' to close repeat block".to_string(),
                        ))
                    }
                }
                Ok(SequenceItem::RepeatBlock { count, items })
            }
            Token::Keyword(Keyword::Use) => {
                self.advance();
                let (name_line, name_column) = self.pos();
                let name = self.expect_identifier("after use")?;
                let repetitions = if let Token::Repeat(n) = self.current().token {
                    let (rline, rcolumn) = self.pos();
                    self.advance();
                    if n == 0 {
                        return Err(CompileError::value(
                            rline,
                            rcolumn,
                            "Repeat count must be positive".to_string(),
                        ));
                    }
                    n
                } else {
                    1
                };
                Ok(SequenceItem::PatternUse {
                    name,
                    repetitions,
                    line: name_line,
                    column: name_column,
                })
            }
            _ => Err(CompileError::syntactic(
                line,
                column,
                "Expected a sequence item (rest, note, chord, repeat block, or pattern use)"
                    .to_string(),
            )),
        }
    }
}
