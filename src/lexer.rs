use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::span::{Pos, Span, Spanned};
use crate::token::Token;

pub struct Lexer<'src> {
    source: &'src [u8],
    file_id: u16,
    pos: usize,
    line: u32,
    col: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file_id: u16) -> Self {
        Self {
            source: source.as_bytes(),
            file_id,
            pos: 0,
            line: 1,
            col: 1,
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the whole source, always ending with a single `Eof` token.
    pub fn tokenize(mut self) -> (Vec<Spanned<Token>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn here(&self) -> (usize, Pos) {
        (self.pos, Pos::new(self.line, self.col))
    }

    fn span_from(&self, start: (usize, Pos)) -> Span {
        let (start_byte, start_pos) = start;
        Span::new(
            self.file_id,
            start_byte as u32,
            self.pos as u32,
            start_pos,
            Pos::new(self.line, self.col),
        )
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn next_token(&mut self) -> Spanned<Token> {
        loop {
            self.skip_whitespace_and_comments();

            let start = self.here();
            let Some(ch) = self.peek() else {
                return Spanned::new(Token::Eof, self.span_from(start));
            };

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword(start);
            }
            if ch.is_ascii_digit() {
                return self.scan_number(start);
            }
            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // Unknown byte: report and keep scanning for recovery.
            let span = self.span_from(start);
            self.diagnostics.push(Diagnostic::new(
                ErrorKind::UnknownToken,
                span,
                (ch as char).to_string(),
            ));
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_ascii_whitespace() {
                    self.bump();
                } else {
                    break;
                }
            }

            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'/') {
                while let Some(ch) = self.peek() {
                    if ch == b'\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'*') {
                self.skip_block_comment();
                continue;
            }

            break;
        }
    }

    /// Block comments nest at most one level deep (spec §4.1).
    fn skip_block_comment(&mut self) {
        let start = self.here();
        self.bump(); // '/'
        self.bump(); // '*'
        let mut depth = 1u32;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'*')) if depth < 2 => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                (Some(b'*'), Some(b'/')) => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                (Some(_), _) => {
                    self.bump();
                }
                (None, _) => {
                    let span = self.span_from(start);
                    self.diagnostics.push(Diagnostic::new(
                        ErrorKind::UnterminatedComment,
                        span,
                        "/*",
                    ));
                    return;
                }
            }
        }
    }

    fn scan_ident_or_keyword(&mut self, start: (usize, Pos)) -> Spanned<Token> {
        let begin = start.0;
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.source[begin..self.pos])
            .expect("identifier bytes are ascii")
            .to_string();
        let span = self.span_from(start);
        let tok = Token::from_keyword(&text).unwrap_or(Token::Ident(text));
        Spanned::new(tok, span)
    }

    fn scan_number(&mut self, start: (usize, Pos)) -> Spanned<Token> {
        let begin = start.0;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.source[begin..self.pos]).expect("digits are ascii");
        let span = self.span_from(start);
        match text.parse::<i32>() {
            Ok(v) => Spanned::new(Token::Integer(v), span),
            Err(_) => {
                self.diagnostics
                    .push(Diagnostic::new(ErrorKind::UnknownToken, span, text.to_string()));
                Spanned::new(Token::Integer(0), span)
            }
        }
    }

    /// Scans a punctuation/operator token. Returns `None` when the current
    /// byte starts nothing recognizable, so the caller's loop can record an
    /// error and resume scanning at the next byte.
    fn scan_symbol(&mut self, start: (usize, Pos)) -> Option<Spanned<Token>> {
        let ch = self.peek()?;
        let two = |lex: &mut Self, second: u8, two_tok: Token, one_tok: Token| {
            lex.bump();
            if lex.peek() == Some(second) {
                lex.bump();
                two_tok
            } else {
                one_tok
            }
        };

        let tok = match ch {
            b'(' => {
                self.bump();
                Token::LParen
            }
            b')' => {
                self.bump();
                Token::RParen
            }
            b'{' => {
                self.bump();
                Token::LBrace
            }
            b'}' => {
                self.bump();
                Token::RBrace
            }
            b';' => {
                self.bump();
                Token::Semicolon
            }
            b',' => {
                self.bump();
                Token::Comma
            }
            b':' => {
                self.bump();
                Token::Colon
            }
            b'?' => {
                self.bump();
                Token::Question
            }
            b'+' => two(self, b'+', Token::PlusPlus, Token::Plus),
            b'-' => two(self, b'-', Token::MinusMinus, Token::Minus),
            b'*' => {
                self.bump();
                Token::Star
            }
            b'/' => {
                self.bump();
                Token::Slash
            }
            b'%' => {
                self.bump();
                Token::Percent
            }
            b'<' => two(self, b'=', Token::Le, Token::Lt),
            b'>' => two(self, b'=', Token::Ge, Token::Gt),
            b'=' => two(self, b'=', Token::EqEq, Token::Eq),
            b'!' => two(self, b'=', Token::Ne, Token::Bang),
            b'&' if self.peek_at(1) == Some(b'&') => {
                self.bump();
                self.bump();
                Token::AndAnd
            }
            b'|' if self.peek_at(1) == Some(b'|') => {
                self.bump();
                self.bump();
                Token::OrOr
            }
            _ => return None,
        };
        Some(Spanned::new(tok, self.span_from(start)))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let (tokens, diags) = Lexer::new(src, 0).tokenize();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            lex("if else while print break continue foo"),
            vec![
                Token::If,
                Token::Else,
                Token::While,
                Token::Print,
                Token::Break,
                Token::Continue,
                Token::Ident("foo".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn integers_and_operators() {
        assert_eq!(
            lex("1 + 2 * 3 <= 4 && !x"),
            vec![
                Token::Integer(1),
                Token::Plus,
                Token::Integer(2),
                Token::Star,
                Token::Integer(3),
                Token::Le,
                Token::Integer(4),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn postfix_and_prefix_ops() {
        assert_eq!(
            lex("x++ --y"),
            vec![
                Token::Ident("x".into()),
                Token::PlusPlus,
                Token::MinusMinus,
                Token::Ident("y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            lex("x // trailing comment\n= 1;"),
            vec![
                Token::Ident("x".into()),
                Token::Eq,
                Token::Integer(1),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn block_comments_nest_one_level() {
        assert_eq!(
            lex("/* outer /* inner */ still-outer */ x"),
            vec![Token::Ident("x".into()), Token::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_reports_at_open_location() {
        let (tokens, diags) = Lexer::new("x /* never closed", 0).tokenize();
        assert_eq!(tokens.last().unwrap().node, Token::Eof);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnterminatedComment);
        assert_eq!(diags[0].span.begin, Pos::new(1, 3));
    }

    #[test]
    fn unknown_byte_reports_and_recovers() {
        let (tokens, diags) = Lexer::new("a $ b", 0).tokenize();
        let kinds: Vec<Token> = tokens.into_iter().map(|t| t.node).collect();
        assert_eq!(
            kinds,
            vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Eof]
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnknownToken);
        assert_eq!(diags[0].detail, "$");
    }

    #[test]
    fn tracks_line_and_column() {
        let (tokens, _) = Lexer::new("a\nbb", 0).tokenize();
        assert_eq!(tokens[0].span.begin, Pos::new(1, 1));
        assert_eq!(tokens[1].span.begin, Pos::new(2, 1));
        assert_eq!(tokens[1].span.end_pos, Pos::new(2, 3));
    }
}
