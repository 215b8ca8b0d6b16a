use std::fmt;

use crate::lexer::{Token, TokenKind};

// Grammar, with terminals in brackets:
//
//   NAME          -> [ARG] | [STRING_DQ] | [STRING_SQ] | [PATH_ABS] | [PATH_REL]
//   ARGLIST       -> NAME ARGLIST | e
//   AMP_OP        -> [AMP] | e
//   STDIN_PIPE    -> [LT] NAME | e
//   STDOUT_PIPE   -> [GT] NAME | e
//   PIPELINE      -> NAME ARGLIST STDIN_PIPE PIPELINE_TAIL STDOUT_PIPE AMP_OP
//   PIPELINE_TAIL -> [PIPE] NAME ARGLIST PIPELINE_TAIL | e
//   PLN_LIST      -> [SEMI] LINE | e
//   LINE          -> PIPELINE PLN_LIST | e
//   LINES_LIST    -> [NEWLINE] PROGRAM | e
//   PROGRAM       -> LINE LINES_LIST | e

/// Production tag for a parse-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prod {
    Name,
    ArgList,
    AmpOp,
    StdinPipe,
    StdoutPipe,
    Pipeline,
    PipelineTail,
    PlnList,
    Line,
    LinesList,
    Program,
    /// Leaf wrapping a single token.
    Terminal,
}

/// One node of the n-ary parse tree. Leaves (`Prod::Terminal`) borrow their
/// token from the lexed stream; the tree never outlives the token list.
#[derive(Debug)]
pub struct ParseNode<'t> {
    pub prod: Prod,
    pub token: Option<&'t Token>,
    pub children: Vec<ParseNode<'t>>,
}

impl<'t> ParseNode<'t> {
    fn leaf(token: &'t Token) -> Self {
        ParseNode {
            prod: Prod::Terminal,
            token: Some(token),
            children: Vec::new(),
        }
    }

    fn empty(prod: Prod) -> Self {
        ParseNode {
            prod,
            token: None,
            children: Vec::new(),
        }
    }

    fn with(prod: Prod, children: Vec<ParseNode<'t>>) -> Self {
        ParseNode {
            prod,
            token: None,
            children,
        }
    }

    /// True for an ε-derivation (a non-terminal that consumed nothing).
    pub fn is_empty(&self) -> bool {
        self.prod != Prod::Terminal && self.children.is_empty()
    }
}

/// A recorded parse failure with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line {}, Position {}, Parse error: {}",
            self.line, self.col, self.message
        )
    }
}

/// Parse a token stream into a tree rooted at PROGRAM.
///
/// `line_base` is the session's cumulative newline count; it is added to each
/// token's in-chunk line so errors carry session-wide line numbers. On
/// failure the recorded errors land in `errors` and `None` is returned.
pub fn parse<'t>(
    tokens: &'t [Token],
    line_base: usize,
    errors: &mut Vec<ParseError>,
) -> Option<ParseNode<'t>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        line_base,
    };
    parser.program(errors)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    line_base: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> &'t Token {
        let tk = &self.tokens[self.pos];
        self.pos += 1;
        tk
    }

    fn record(&self, errors: &mut Vec<ParseError>, tk: &Token, message: &str) {
        errors.push(ParseError {
            line: self.line_base + tk.line,
            col: tk.col,
            message: message.to_string(),
        });
    }

    /// A required symbol was demanded but the input ran out.
    fn record_eoi(&self, errors: &mut Vec<ParseError>) {
        let (line, col) = match self.tokens.last() {
            Some(tk) => (self.line_base + tk.line, tk.col),
            None => (self.line_base, 0),
        };
        errors.push(ParseError {
            line,
            col,
            message: "Unexpected end of input.".to_string(),
        });
    }

    /// Shared preamble of every production with an ε alternative: take ε when
    /// the lookahead is absent or not `first`, surfacing a lexer `Error`
    /// token's embedded message instead.
    ///
    /// `Ok(token)` means the lookahead matched and was consumed.
    fn epsilon_unless(
        &mut self,
        first: TokenKind,
        prod: Prod,
        errors: &mut Vec<ParseError>,
    ) -> Result<&'t Token, Option<ParseNode<'t>>> {
        match self.peek() {
            Some(tk) if tk.kind == first => Ok(self.bump()),
            Some(tk) if tk.kind == TokenKind::Error => {
                self.record(errors, tk, &tk.text);
                Err(None)
            }
            _ => Err(Some(ParseNode::empty(prod))),
        }
    }

    fn name(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.peek() {
            Some(tk) if tk.kind.is_name() => {
                let leaf = ParseNode::leaf(self.bump());
                Some(ParseNode::with(Prod::Name, vec![leaf]))
            }
            Some(tk) => {
                self.record(errors, tk, "Expected an argument, a string, or a path.");
                None
            }
            None => {
                self.record_eoi(errors);
                None
            }
        }
    }

    fn arglist(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.peek() {
            Some(tk) if tk.kind.is_name() => {
                let name = self.name(errors)?;
                let rest = self.arglist(errors)?;
                Some(ParseNode::with(Prod::ArgList, vec![name, rest]))
            }
            Some(tk) if tk.kind == TokenKind::Error => {
                self.record(errors, tk, &tk.text);
                None
            }
            _ => Some(ParseNode::empty(Prod::ArgList)),
        }
    }

    fn amp_op(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Amp, Prod::AmpOp, errors) {
            Ok(tk) => Some(ParseNode::with(Prod::AmpOp, vec![ParseNode::leaf(tk)])),
            Err(eps) => eps,
        }
    }

    fn stdin_pipe(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Lt, Prod::StdinPipe, errors) {
            Ok(tk) => {
                let name = self.name(errors)?;
                Some(ParseNode::with(
                    Prod::StdinPipe,
                    vec![ParseNode::leaf(tk), name],
                ))
            }
            Err(eps) => eps,
        }
    }

    fn stdout_pipe(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Gt, Prod::StdoutPipe, errors) {
            Ok(tk) => {
                let name = self.name(errors)?;
                Some(ParseNode::with(
                    Prod::StdoutPipe,
                    vec![ParseNode::leaf(tk), name],
                ))
            }
            Err(eps) => eps,
        }
    }

    fn pipeline_tail(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Pipe, Prod::PipelineTail, errors) {
            Ok(tk) => {
                let name = self.name(errors)?;
                let args = self.arglist(errors)?;
                let rest = self.pipeline_tail(errors)?;
                Some(ParseNode::with(
                    Prod::PipelineTail,
                    vec![ParseNode::leaf(tk), name, args, rest],
                ))
            }
            Err(eps) => eps,
        }
    }

    fn pipeline(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        let name = self.name(errors)?;
        let args = self.arglist(errors)?;
        let stdin = self.stdin_pipe(errors)?;
        let tail = self.pipeline_tail(errors)?;
        let stdout = self.stdout_pipe(errors)?;
        let amp = self.amp_op(errors)?;
        Some(ParseNode::with(
            Prod::Pipeline,
            vec![name, args, stdin, tail, stdout, amp],
        ))
    }

    fn pln_list(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Semi, Prod::PlnList, errors) {
            Ok(tk) => {
                let line = self.line(errors)?;
                Some(ParseNode::with(
                    Prod::PlnList,
                    vec![ParseNode::leaf(tk), line],
                ))
            }
            Err(eps) => eps,
        }
    }

    fn line(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.peek() {
            Some(tk) if tk.kind.is_name() => {
                let pipeline = self.pipeline(errors)?;
                let rest = self.pln_list(errors)?;
                Some(ParseNode::with(Prod::Line, vec![pipeline, rest]))
            }
            Some(tk) if tk.kind == TokenKind::Error => {
                self.record(errors, tk, &tk.text);
                None
            }
            _ => Some(ParseNode::empty(Prod::Line)),
        }
    }

    fn lines_list(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.epsilon_unless(TokenKind::Newline, Prod::LinesList, errors) {
            Ok(tk) => {
                let program = self.program(errors)?;
                Some(ParseNode::with(
                    Prod::LinesList,
                    vec![ParseNode::leaf(tk), program],
                ))
            }
            Err(eps) => eps,
        }
    }

    fn program(&mut self, errors: &mut Vec<ParseError>) -> Option<ParseNode<'t>> {
        match self.peek() {
            Some(tk) if tk.kind.is_name() => {
                let line = self.line(errors)?;
                let rest = self.lines_list(errors)?;
                Some(ParseNode::with(Prod::Program, vec![line, rest]))
            }
            Some(tk) if tk.kind == TokenKind::Error => {
                self.record(errors, tk, &tk.text);
                None
            }
            _ => Some(ParseNode::empty(Prod::Program)),
        }
    }
}
