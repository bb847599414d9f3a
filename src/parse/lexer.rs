//! Rule-file lexer.
//!
//! Turns raw rule text into positioned tokens. Single-character operators
//! resolve through a direct lookup, identifiers are promoted to reserved
//! words when they match one, and `//` line comments come back as `Comment`
//! tokens for the parser to skip.

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Error,
    Eof,
    Comment,
    Ident,
    Quote,

    // Operators
    Tilde,
    Equals,
    Semi,
    LParen,
    RParen,

    // Reserved words
    If,
    Then,
    Move,
    Flag,
    Unflag,
    Stream,
    And,
    Or,
    Not,
}

/// A single token: kind, literal text, and byte offset in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: usize,
}

fn operator_kind(c: char) -> Option<TokenKind> {
    Some(match c {
        '~' => TokenKind::Tilde,
        '=' => TokenKind::Equals,
        ';' => TokenKind::Semi,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        _ => return None,
    })
}

fn reserved_kind(word: &str) -> Option<TokenKind> {
    Some(match word {
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "move" => TokenKind::Move,
        "flag" => TokenKind::Flag,
        "unflag" => TokenKind::Unflag,
        "stream" => TokenKind::Stream,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Streaming lexer over one rule file.
///
/// Create with [`Lexer::new`] and call [`Lexer::next_token`] repeatedly;
/// an `Eof` token marks the end of input.
pub struct Lexer<'a> {
    buf: &'a str,
    /// Current char, `None` at end of input.
    cur: Option<char>,
    /// Byte offset of the current char.
    pos: usize,
    /// Byte offset of the next char.
    next_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(buf: &'a str) -> Self {
        let mut lex = Self {
            buf,
            cur: None,
            pos: 0,
            next_pos: 0,
        };
        // Prime the single-char lookahead.
        lex.advance();
        lex
    }

    /// Produce the next token, skipping whitespace.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let Some(c) = self.cur else {
            return self.token(TokenKind::Eof, self.buf.len());
        };

        if let Some(kind) = operator_kind(c) {
            let start = self.pos;
            self.advance();
            return Token {
                kind,
                text: c.to_string(),
                pos: start,
            };
        }

        if c == '/' && self.peek() == Some('/') {
            return self.scan_comment();
        }
        if is_ident_start(c) {
            return self.scan_ident();
        }
        if c == '"' {
            return self.scan_quote();
        }

        self.token(TokenKind::Error, self.pos)
    }

    fn token(&self, kind: TokenKind, pos: usize) -> Token {
        Token {
            kind,
            text: String::new(),
            pos,
        }
    }

    /// Advance to the next char in the input.
    fn advance(&mut self) {
        self.pos = self.next_pos;
        match self.buf[self.next_pos..].chars().next() {
            Some(c) => {
                self.next_pos += c.len_utf8();
                self.cur = Some(c);
            }
            None => {
                self.pos = self.buf.len();
                self.cur = None;
            }
        }
    }

    /// Peek at the char after the current one without consuming anything.
    fn peek(&self) -> Option<char> {
        self.buf[self.next_pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.cur, Some(' ' | '\t' | '\n' | '\r')) {
            self.advance();
        }
    }

    fn scan_ident(&mut self) -> Token {
        let start = self.pos;
        while self.cur.is_some_and(is_ident_char) {
            self.advance();
        }
        let text = &self.buf[start..self.pos];
        Token {
            kind: reserved_kind(text).unwrap_or(TokenKind::Ident),
            text: text.to_string(),
            pos: start,
        }
    }

    /// Scan a quoted string. The token text keeps the surrounding quotes;
    /// the parser unquotes. Only `\"` and `\\` escapes are legal.
    fn scan_quote(&mut self) -> Token {
        let start = self.pos;
        self.advance();
        while let Some(c) = self.cur {
            match c {
                '"' => {
                    self.advance();
                    return Token {
                        kind: TokenKind::Quote,
                        text: self.buf[start..self.pos].to_string(),
                        pos: start,
                    };
                }
                '\\' => {
                    self.advance();
                    match self.cur {
                        Some('\\' | '"') => self.advance(),
                        // Illegal escape: error positioned at the offending byte.
                        _ => return self.token(TokenKind::Error, self.pos),
                    }
                }
                _ => self.advance(),
            }
        }
        // Input ended before the closing quote.
        self.token(TokenKind::Error, start)
    }

    fn scan_comment(&mut self) -> Token {
        let start = self.pos;
        while self.cur.is_some_and(|c| c != '\n') {
            self.advance();
        }
        let tok = Token {
            kind: TokenKind::Comment,
            text: self.buf[start..self.pos].to_string(),
            pos: start,
        };
        self.advance();
        tok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let kind = tok.kind;
            out.push(kind);
            if matches!(kind, TokenKind::Eof | TokenKind::Error) {
                return out;
            }
        }
    }

    #[test]
    fn lexes_a_full_rule() {
        let toks = kinds(r#"if from = "a@example.com" then move "Archive";"#);
        assert_eq!(
            toks,
            vec![
                TokenKind::If,
                TokenKind::Ident,
                TokenKind::Equals,
                TokenKind::Quote,
                TokenKind::Then,
                TokenKind::Move,
                TokenKind::Quote,
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn promotes_reserved_words() {
        let toks = kinds("if then move flag unflag stream and or not");
        assert_eq!(
            toks,
            vec![
                TokenKind::If,
                TokenKind::Then,
                TokenKind::Move,
                TokenKind::Flag,
                TokenKind::Unflag,
                TokenKind::Stream,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn identifiers_allow_underscore_and_dollar() {
        let mut lexer = Lexer::new("$foo_1 _bar");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.text, "$foo_1");
        let tok = lexer.next_token();
        assert_eq!(tok.text, "_bar");
    }

    #[test]
    fn records_byte_positions() {
        let mut lexer = Lexer::new("  if  subject");
        let tok = lexer.next_token();
        assert_eq!(tok.pos, 2);
        let tok = lexer.next_token();
        assert_eq!(tok.pos, 6);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let mut lexer = Lexer::new("// a comment\nif");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Comment);
        assert_eq!(tok.text, "// a comment");
        assert_eq!(lexer.next_token().kind, TokenKind::If);
    }

    #[test]
    fn quote_keeps_surrounding_quotes() {
        let mut lexer = Lexer::new(r#""hello \"quoted\" \\ world""#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Quote);
        assert_eq!(tok.text, r#""hello \"quoted\" \\ world""#);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn illegal_escape_is_an_error() {
        let mut lexer = Lexer::new(r#""bad \n escape""#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        // Positioned at the offending byte, not the string start.
        assert_eq!(tok.pos, 6);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut lexer = Lexer::new(r#""never closed"#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(tok.pos, 0);
    }

    #[test]
    fn unrecognized_char_is_an_error() {
        let mut lexer = Lexer::new("if @");
        assert_eq!(lexer.next_token().kind, TokenKind::If);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(tok.pos, 3);
    }

    #[test]
    fn eof_after_whitespace() {
        let mut lexer = Lexer::new("   \n\t ");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }
}
