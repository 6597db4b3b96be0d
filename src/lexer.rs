// Tokenizer for JSONata expressions
// Lazy and restartable; the parser pulls one token at a time

use crate::parser::ParserError;

/// Token types for the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    String(String),
    Number(f64),
    True,
    False,
    Null,
    Regex { pattern: String, flags: String },

    // Identifiers
    Name(String),
    Variable(String),

    // Operators
    Dot,
    DotDot,
    Comma,
    Semicolon,
    Colon,
    ColonEqual,
    Question,
    Coalesce, // ??
    Elvis,    // ?:
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Pipe,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Caret,
    Ampersand,
    Hash,
    At,
    Bang,
    Tilde,
    ChainArrow, // ~>
    And,
    Or,
    In,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    Eof,
}

impl TokenKind {
    /// Source text of the token, used in error messages and signatures.
    pub fn text(&self) -> String {
        match self {
            TokenKind::String(s) => format!("\"{}\"", s),
            TokenKind::Number(n) => crate::utils::format_number(*n),
            TokenKind::True => "true".into(),
            TokenKind::False => "false".into(),
            TokenKind::Null => "null".into(),
            TokenKind::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
            TokenKind::Name(n) => n.clone(),
            TokenKind::Variable(v) => format!("${}", v),
            TokenKind::Eof => "(end)".into(),
            op => op.operator_text().to_string(),
        }
    }

    fn operator_text(&self) -> &'static str {
        match self {
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonEqual => ":=",
            TokenKind::Question => "?",
            TokenKind::Coalesce => "??",
            TokenKind::Elvis => "?:",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Pipe => "|",
            TokenKind::Equal => "=",
            TokenKind::NotEqual => "!=",
            TokenKind::LessThan => "<",
            TokenKind::LessThanOrEqual => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterThanOrEqual => ">=",
            TokenKind::Caret => "^",
            TokenKind::Ampersand => "&",
            TokenKind::Hash => "#",
            TokenKind::At => "@",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::ChainArrow => "~>",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::In => "in",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            _ => "",
        }
    }

    /// Tokens after which a `/` means division rather than a regex.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::String(_)
                | TokenKind::Number(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::Regex { .. }
                | TokenKind::Name(_)
                | TokenKind::Variable(_)
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
        )
    }
}

/// A token and the character offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\u{b}')
}

/// Characters that end a name.
fn is_delimiter(ch: char) -> bool {
    is_whitespace(ch)
        || ch.is_control()
        || matches!(
            ch,
            '.' | '['
                | ']'
                | '{'
                | '}'
                | '('
                | ')'
                | ','
                | '@'
                | '#'
                | ';'
                | ':'
                | '?'
                | '+'
                | '-'
                | '*'
                | '/'
                | '%'
                | '|'
                | '='
                | '<'
                | '>'
                | '^'
                | '&'
                | '!'
                | '~'
        )
}

/// Lexer for JSONata expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    regex_allowed: bool,
    done: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            regex_allowed: true,
            done: false,
        }
    }

    /// Rewind to the start of the input.
    pub fn reset(&mut self) {
        self.position = 0;
        self.regex_allowed = true;
        self.done = false;
    }

    #[inline]
    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    #[inline]
    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParserError> {
        loop {
            match self.current() {
                Some(ch) if is_whitespace(ch) => self.advance(),
                Some('/') if self.peek(1) == Some('*') => {
                    let start = self.position;
                    self.position += 2;
                    loop {
                        match self.current() {
                            None => return Err(ParserError::UnclosedComment { position: start }),
                            Some('*') if self.peek(1) == Some('/') => {
                                self.position += 2;
                                break;
                            }
                            Some(_) => self.advance(),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String, ParserError> {
        let start = self.position;
        let mut result = String::new();
        self.advance(); // opening quote

        loop {
            match self.current() {
                None => return Err(ParserError::UnterminatedString { position: start }),
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance();
                    let escape_at = self.position;
                    match self.current() {
                        None => return Err(ParserError::UnterminatedString { position: start }),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some('/') => result.push('/'),
                        Some('b') => result.push('\u{0008}'),
                        Some('f') => result.push('\u{000C}'),
                        Some('n') => result.push('\n'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some('u') => {
                            self.advance();
                            let unit = self.read_hex4(escape_at)?;
                            result.push(self.decode_utf16(unit, escape_at)?);
                            continue;
                        }
                        Some(ch) => {
                            return Err(ParserError::InvalidEscape {
                                sequence: ch.to_string(),
                                position: escape_at,
                            })
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_hex4(&mut self, escape_at: usize) -> Result<u32, ParserError> {
        let mut code = 0u32;
        for _ in 0..4 {
            match self.current().and_then(|h| h.to_digit(16)) {
                Some(digit) => {
                    code = code * 16 + digit;
                    self.advance();
                }
                None => return Err(ParserError::InvalidUnicodeEscape { position: escape_at }),
            }
        }
        Ok(code)
    }

    /// Joins surrogate pairs written as two `\u` escapes; a lone surrogate
    /// becomes U+FFFD.
    fn decode_utf16(&mut self, unit: u32, escape_at: usize) -> Result<char, ParserError> {
        if (0xD800..0xDC00).contains(&unit)
            && self.current() == Some('\\')
            && self.peek(1) == Some('u')
        {
            let save = self.position;
            self.position += 2;
            let low = self.read_hex4(escape_at)?;
            if (0xDC00..0xE000).contains(&low) {
                let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            self.position = save;
        }
        Ok(char::from_u32(unit).unwrap_or('\u{FFFD}'))
    }

    fn read_number(&mut self) -> Result<f64, ParserError> {
        let start = self.position;
        if self.current() == Some('0') {
            self.advance();
        } else {
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if self.current() == Some('.') && matches!(self.peek(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.current(), Some('e' | 'E')) {
            let digits_at = match self.peek(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if matches!(self.peek(digits_at), Some(c) if c.is_ascii_digit()) {
                self.position += digits_at;
                while matches!(self.current(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        let text: String = self.input[start..self.position].iter().collect();
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(ParserError::NumberOutOfRange {
                token: text,
                position: start,
            }),
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.current() {
            if is_delimiter(ch) {
                break;
            }
            self.advance();
        }
        self.input[start..self.position].iter().collect()
    }

    fn read_backtick_name(&mut self) -> Result<String, ParserError> {
        let start = self.position;
        self.advance(); // opening backtick
        let name_start = self.position;
        while let Some(ch) = self.current() {
            if ch == '`' {
                let name = self.input[name_start..self.position].iter().collect();
                self.advance();
                return Ok(name);
            }
            self.advance();
        }
        Err(ParserError::UnterminatedName { position: start })
    }

    /// Scans `pattern/flags` after the opening slash.
    ///
    /// Slashes inside brackets, parentheses or braces, or preceded by an odd
    /// number of backslashes, do not close the pattern.
    fn read_regex(&mut self) -> Result<TokenKind, ParserError> {
        let start = self.position - 1;
        let pattern_start = self.position;
        let mut depth = 0i32;
        while let Some(ch) = self.current() {
            let escaped = self.position > pattern_start && self.input[self.position - 1] == '\\';
            if ch == '/' && depth <= 0 {
                let mut backslashes = 0;
                while self.position > pattern_start + backslashes
                    && self.input[self.position - backslashes - 1] == '\\'
                {
                    backslashes += 1;
                }
                if backslashes % 2 == 0 {
                    let pattern: String = self.input[pattern_start..self.position].iter().collect();
                    if pattern.is_empty() {
                        return Err(ParserError::EmptyRegex { position: start });
                    }
                    self.advance();
                    let flags_start = self.position;
                    while matches!(self.current(), Some('i' | 'm')) {
                        self.advance();
                    }
                    let flags = self.input[flags_start..self.position].iter().collect();
                    return Ok(TokenKind::Regex { pattern, flags });
                }
            }
            if matches!(ch, '(' | '[' | '{') && !escaped {
                depth += 1;
            }
            if matches!(ch, ')' | ']' | '}') && !escaped {
                depth -= 1;
            }
            self.advance();
        }
        Err(ParserError::UnterminatedRegex { position: start })
    }

    /// Raw text of a lambda signature once its opening `<` has been consumed,
    /// returned with both angle brackets.
    pub fn read_signature(&mut self) -> Result<String, ParserError> {
        let start = self.position.saturating_sub(1);
        let mut depth = 1;
        let mut text = String::from("<");
        while let Some(ch) = self.current() {
            self.advance();
            if is_whitespace(ch) {
                continue;
            }
            text.push(ch);
            match ch {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        self.regex_allowed = false;
                        return Ok(text);
                    }
                }
                _ => {}
            }
        }
        Err(ParserError::InvalidSignature {
            signature: text,
            position: start,
        })
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, ParserError> {
        self.skip_whitespace_and_comments()?;
        let position = self.position;
        let kind = self.scan_token()?;
        self.regex_allowed = !kind.ends_operand();
        Ok(Token { kind, position })
    }

    fn scan_token(&mut self) -> Result<TokenKind, ParserError> {
        let ch = match self.current() {
            None => return Ok(TokenKind::Eof),
            Some(ch) => ch,
        };

        if ch == '/' && self.regex_allowed {
            self.advance();
            return self.read_regex();
        }

        let two = self.peek(1);
        let double = |kind: TokenKind, lexer: &mut Lexer| {
            lexer.position += 2;
            Ok(kind)
        };
        match (ch, two) {
            ('.', Some('.')) => return double(TokenKind::DotDot, self),
            (':', Some('=')) => return double(TokenKind::ColonEqual, self),
            ('!', Some('=')) => return double(TokenKind::NotEqual, self),
            ('>', Some('=')) => return double(TokenKind::GreaterThanOrEqual, self),
            ('<', Some('=')) => return double(TokenKind::LessThanOrEqual, self),
            ('*', Some('*')) => return double(TokenKind::StarStar, self),
            ('~', Some('>')) => return double(TokenKind::ChainArrow, self),
            ('?', Some('?')) => return double(TokenKind::Coalesce, self),
            ('?', Some(':')) => return double(TokenKind::Elvis, self),
            _ => {}
        }

        let single = match ch {
            '.' => Some(TokenKind::Dot),
            '[' => Some(TokenKind::LeftBracket),
            ']' => Some(TokenKind::RightBracket),
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            ',' => Some(TokenKind::Comma),
            '@' => Some(TokenKind::At),
            '#' => Some(TokenKind::Hash),
            ';' => Some(TokenKind::Semicolon),
            ':' => Some(TokenKind::Colon),
            '?' => Some(TokenKind::Question),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '|' => Some(TokenKind::Pipe),
            '=' => Some(TokenKind::Equal),
            '<' => Some(TokenKind::LessThan),
            '>' => Some(TokenKind::GreaterThan),
            '^' => Some(TokenKind::Caret),
            '&' => Some(TokenKind::Ampersand),
            '!' => Some(TokenKind::Bang),
            '~' => Some(TokenKind::Tilde),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance();
            return Ok(kind);
        }

        match ch {
            '"' | '\'' => Ok(TokenKind::String(self.read_string(ch)?)),
            '`' => Ok(TokenKind::Name(self.read_backtick_name()?)),
            '0'..='9' => Ok(TokenKind::Number(self.read_number()?)),
            '$' => {
                self.advance();
                Ok(TokenKind::Variable(self.read_name()))
            }
            c if c.is_control() => Err(ParserError::UnknownOperator {
                token: format!("\\u{:04x}", c as u32),
                position: self.position,
            }),
            _ => {
                let name = self.read_name();
                Ok(match name.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "in" => TokenKind::In,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Name(name),
                })
            }
        }
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, ParserError>;

    /// Yields tokens up to, not including, the end of input; stops after an error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_token() {
            Ok(Token {
                kind: TokenKind::Eof,
                ..
            }) => {
                self.done = true;
                None
            }
            Ok(token) => Some(Ok(token)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
