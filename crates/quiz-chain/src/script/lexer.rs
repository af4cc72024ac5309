//! Tokenizer with significant indentation.

use super::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Keyword(&'static str),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "in", "while", "break", "continue", "pass", "and", "or",
    "not", "is", "True", "False", "None",
];

/// Words of the host language that name constructs the sandbox does not have.
pub const REJECTED: &[&str] = &[
    "import", "from", "try", "except", "finally", "raise", "def", "lambda", "class", "with",
    "return", "yield", "global", "nonlocal", "del", "assert", "async", "await",
];

// Longest first so that `//=` wins over `//` and `/`.
const OPERATORS: &[&str] = &[
    "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "+", "-", "*",
    "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

const TAB_WIDTH: usize = 8;

pub fn tokenize(source: &str) -> ScriptResult<Vec<Spanned>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    depth: usize,
    at_line_start: bool,
    out: Vec<Spanned>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            out: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn push(&mut self, token: Token) {
        self.out.push(Spanned {
            token,
            line: self.line,
        });
    }

    fn run(mut self) -> ScriptResult<Vec<Spanned>> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                self.indentation()?;
                if self.pos >= self.chars.len() {
                    break;
                }
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\n' => {
                    if self.depth == 0 {
                        self.newline();
                        self.at_line_start = true;
                    }
                    self.pos += 1;
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }

        self.newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent);
        }
        self.push(Token::Eof);
        Ok(self.out)
    }

    /// Emit a logical newline unless the previous token already ended a line.
    fn newline(&mut self) {
        match self.out.last().map(|s| &s.token) {
            None | Some(Token::Newline) | Some(Token::Indent) | Some(Token::Dedent) => {}
            _ => self.push(Token::Newline),
        }
    }

    /// Measure the indentation of a new line; blank and comment-only lines
    /// are consumed whole.
    fn indentation(&mut self) -> ScriptResult<()> {
        loop {
            let mut width = 0;
            while let Some(c) = self.peek(0) {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\x0c' | '\r' => {}
                    _ => break,
                }
                self.pos += 1;
            }

            match self.peek(0) {
                None => return Ok(()),
                Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    continue;
                }
                Some('#') => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                    continue;
                }
                Some(_) => {}
            }

            self.at_line_start = false;
            let current = self.indents.last().copied().unwrap_or(0);
            if width > current {
                self.indents.push(width);
                self.push(Token::Indent);
            } else if width < current {
                while self.indents.last().is_some_and(|&w| w > width) {
                    self.indents.pop();
                    self.push(Token::Dedent);
                }
                if self.indents.last().copied() != Some(width) {
                    return Err(self.error("unindent does not match any outer indentation level"));
                }
            }
            return Ok(());
        }
    }

    fn number(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        let mut is_float = false;

        let digits = |lx: &mut Lexer| {
            while lx.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
                lx.pos += 1;
            }
        };

        digits(self);
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            digits(self);
        } else if self.peek(0) == Some('.')
            && !self.peek(1).is_some_and(|c| c.is_alphabetic() || c == '_')
        {
            // `1.` is a float.
            is_float = true;
            self.pos += 1;
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                digits(self);
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();

        if self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error(format!("invalid number literal '{text}'")));
        }

        let token = if is_float {
            Token::Float(
                text.parse()
                    .map_err(|_| self.error(format!("invalid float literal '{text}'")))?,
            )
        } else {
            Token::Int(
                text.parse()
                    .map_err(|_| self.error(format!("integer literal '{text}' is too large")))?,
            )
        };
        self.push(token);
        Ok(())
    }

    fn word(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(0), Some('\'' | '"')) {
            match word.to_ascii_lowercase().as_str() {
                "r" => return self.string(true),
                "u" | "b" => return self.string(false),
                "f" | "rf" | "fr" => {
                    return Err(self.error("f-strings are not supported; use str() and +"))
                }
                _ => {}
            }
        }

        if let Some(&kw) = KEYWORDS.iter().find(|&&k| k == word) {
            self.push(Token::Keyword(kw));
        } else if REJECTED.contains(&word.as_str()) {
            return Err(self.error(format!("'{word}' is not available in scripts")));
        } else {
            self.push(Token::Ident(word));
        }
        Ok(())
    }

    fn string(&mut self, raw: bool) -> ScriptResult<()> {
        let quote = self.chars[self.pos];
        let start_line = self.line;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(ScriptError::Syntax {
                    line: start_line,
                    message: "unterminated string literal".to_string(),
                });
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            match c {
                '\n' if !triple => {
                    return Err(ScriptError::Syntax {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    })
                }
                '\n' => {
                    self.line += 1;
                    text.push('\n');
                    self.pos += 1;
                }
                '\\' => {
                    let next = self.peek(1);
                    self.pos += 2;
                    match next {
                        None => {
                            return Err(ScriptError::Syntax {
                                line: start_line,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                        Some('\n') => {
                            self.line += 1;
                            if raw {
                                text.push_str("\\\n");
                            }
                        }
                        Some(e) if raw => {
                            text.push('\\');
                            text.push(e);
                        }
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('0') => text.push('\0'),
                        Some('\\') => text.push('\\'),
                        Some('\'') => text.push('\''),
                        Some('"') => text.push('"'),
                        // Unknown escapes stay as written, so `"\d+"` is a regex.
                        Some(e) => {
                            text.push('\\');
                            text.push(e);
                        }
                    }
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        self.out.push(Spanned {
            token: Token::Str(text),
            line: start_line,
        });
        Ok(())
    }

    fn operator(&mut self) -> ScriptResult<()> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c));
            if !matches {
                continue;
            }

            match *op {
                "(" | "[" | "{" => self.depth += 1,
                ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            self.pos += len;
            if *op == ";" {
                self.newline();
            } else {
                self.push(Token::Op(*op));
            }
            return Ok(());
        }

        Err(self.error(format!("unexpected character '{}'", self.chars[self.pos])))
    }
}
