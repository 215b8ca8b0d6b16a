/// Category of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: any run of non-whitespace, non-operator characters.
    Arg,
    /// Double-quoted string.
    StringDq,
    /// Single-quoted string.
    StringSq,
    /// A word containing `/` and starting with `/`.
    PathAbs,
    /// A word containing `/` but not starting with `/`.
    PathRel,
    Pipe,
    Amp,
    Lt,
    Gt,
    Semi,
    Newline,
    /// Lexing failed; the diagnostic is in `text`.
    Error,
}

impl TokenKind {
    /// Terminal class NAME: anything that can denote a program, argument, or path.
    pub fn is_name(self) -> bool {
        matches!(
            self,
            TokenKind::Arg
                | TokenKind::StringDq
                | TokenKind::StringSq
                | TokenKind::PathAbs
                | TokenKind::PathRel
        )
    }
}

/// One token with its decoded text and the position of its first character.
///
/// `line` counts newlines inside the current input chunk; `col` is the
/// character offset from the start of the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
}

fn is_operator(c: char) -> bool {
    matches!(c, '|' | '&' | '<' | '>' | ';')
}

fn operator_kind(c: char) -> TokenKind {
    match c {
        '|' => TokenKind::Pipe,
        '&' => TokenKind::Amp,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        ';' => TokenKind::Semi,
        _ => TokenKind::Newline,
    }
}

/// Scan one input chunk into tokens.
///
/// Operators are single characters; whitespace separates words; `"` and `'`
/// open quoted strings. Decoding happens here: escape sequences collapse in
/// the token text, so later stages never see a backslash that meant quoting.
pub fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if is_operator(c) || c == '\n' {
            tokens.push(Token {
                kind: operator_kind(c),
                text: c.to_string(),
                line,
                col: i,
            });
            if c == '\n' {
                line += 1;
            }
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else {
            let col = i;
            let mut tk = if c == '"' || c == '\'' {
                scan_string(&chars, &mut i, c)
            } else {
                scan_arg(&chars, &mut i)
            };
            tk.line = line;
            tk.col = col;
            tokens.push(tk);
        }
    }

    tokens
}

/// Scan a quoted string. `i` points at the opening delimiter on entry and
/// past the closing delimiter on exit.
///
/// `\\` and `\<delim>` produce one literal byte; everything else, newlines
/// included, passes through unchanged. Hitting end-of-input before the
/// closing delimiter yields an `Error` token.
fn scan_string(chars: &[char], i: &mut usize, delim: char) -> Token {
    let kind = if delim == '"' {
        TokenKind::StringDq
    } else {
        TokenKind::StringSq
    };
    let mut text = String::new();

    *i += 1;
    while *i < chars.len() && chars[*i] != delim {
        let c = chars[*i];
        let next = chars.get(*i + 1).copied();

        if c == '\\' && (next == Some('\\') || next == Some(delim)) {
            text.push(next.unwrap());
            *i += 2;
        } else {
            text.push(c);
            *i += 1;
        }
    }

    if *i >= chars.len() {
        return Token {
            kind: TokenKind::Error,
            text: format!("Expected '{delim}'"),
            line: 0,
            col: 0,
        };
    }

    // past the closing delimiter
    *i += 1;

    Token {
        kind,
        text,
        line: 0,
        col: 0,
    }
}

/// Scan a bare word, which may turn out to be a path.
///
/// `\<c>` consumes two characters and emits `c`; a trailing lone backslash is
/// literal. Any `/` that makes it into the text promotes the token to
/// `PathRel`; a leading `/` makes it `PathAbs`.
fn scan_arg(chars: &[char], i: &mut usize) -> Token {
    let mut kind = TokenKind::Arg;
    let mut text = String::new();

    while *i < chars.len() {
        let c = chars[*i];
        if c.is_whitespace() || is_operator(c) {
            break;
        }

        if c == '\\' && *i + 1 < chars.len() {
            let escaped = chars[*i + 1];
            text.push(escaped);
            if escaped == '/' {
                kind = TokenKind::PathRel;
            }
            *i += 2;
        } else {
            text.push(c);
            if c == '/' {
                kind = TokenKind::PathRel;
            }
            *i += 1;
        }
    }

    if text.starts_with('/') {
        kind = TokenKind::PathAbs;
    }

    Token {
        kind,
        text,
        line: 0,
        col: 0,
    }
}
