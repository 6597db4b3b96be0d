// JSONata expression parser
// Pratt (top-down operator precedence) parser; path, predicate and grouping
// structure is assembled as each operator is reduced

use std::sync::Arc;

use thiserror::Error;

use crate::ast::{
    AstNode, BinaryOp, LambdaDef, PathExpr, PathStep, SortTerm, Stage, TransformDef,
};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::signature::Signature;
use crate::value::{STACK_RED_ZONE, STACK_SEGMENT};

/// Nesting depth at which parsing gives up rather than risk the stack.
pub const MAX_PARSE_DEPTH: usize = 200;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error("S0101: String literal must be terminated by a matching quote at position {position}")]
    UnterminatedString { position: usize },

    #[error("S0102: Number out of range: {token} at position {position}")]
    NumberOutOfRange { token: String, position: usize },

    #[error("S0103: Unsupported escape sequence: \\{sequence} at position {position}")]
    InvalidEscape { sequence: String, position: usize },

    #[error("S0104: The escape sequence \\u must be followed by 4 hex digits at position {position}")]
    InvalidUnicodeEscape { position: usize },

    #[error("S0105: Quoted property name must be terminated with a backquote (`) at position {position}")]
    UnterminatedName { position: usize },

    #[error("S0106: Comment has no closing tag at position {position}")]
    UnclosedComment { position: usize },

    #[error("S0201: Syntax error: {token} at position {position}")]
    Syntax { token: String, position: usize },

    #[error("S0202: Expected {expected}, got {found} at position {position}")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("S0203: Expected {expected} before end of expression")]
    ExpectedBeforeEnd { expected: String, position: usize },

    #[error("S0204: Unknown operator: {token} at position {position}")]
    UnknownOperator { token: String, position: usize },

    #[error("S0207: Unexpected end of expression")]
    UnexpectedEnd { position: usize },

    #[error("S0208: Parameter {name} of function definition must be a variable name (start with $) at position {position}")]
    InvalidParameter { name: String, position: usize },

    #[error("S0209: A predicate cannot follow a grouping expression in a step at position {position}")]
    PredicateAfterGroup { position: usize },

    #[error("S0210: Each step can only have one grouping expression at position {position}")]
    MultipleGroups { position: usize },

    #[error("S0211: The symbol {token} cannot be used as a unary operator at position {position}")]
    InvalidUnary { token: String, position: usize },

    #[error("S0212: The left side of := must be a variable name (start with $) at position {position}")]
    InvalidBindTarget { position: usize },

    #[error("S0213: The literal value {value} cannot be used as a step within a path expression at position {position}")]
    LiteralStep { value: String, position: usize },

    #[error("S0214: The right side of # must be a variable name (start with $) at position {position}")]
    InvalidIndexVariable { token: String, position: usize },

    #[error("S0301: Empty regular expressions are not allowed at position {position}")]
    EmptyRegex { position: usize },

    #[error("S0302: No terminating / in regular expression at position {position}")]
    UnterminatedRegex { position: usize },

    #[error("S0303: Invalid regular expression /{pattern}/: {message}")]
    InvalidRegex {
        pattern: String,
        message: String,
        position: usize,
    },

    #[error("S0401: Invalid function signature {signature} at position {position}")]
    InvalidSignature { signature: String, position: usize },

    #[error("U1001: Expression nesting exceeds {max} levels at position {position}")]
    TooDeep { max: usize, position: usize },
}

impl ParserError {
    /// JSONata error code, e.g. `S0201`
    pub fn code(&self) -> &'static str {
        match self {
            ParserError::UnterminatedString { .. } => "S0101",
            ParserError::NumberOutOfRange { .. } => "S0102",
            ParserError::InvalidEscape { .. } => "S0103",
            ParserError::InvalidUnicodeEscape { .. } => "S0104",
            ParserError::UnterminatedName { .. } => "S0105",
            ParserError::UnclosedComment { .. } => "S0106",
            ParserError::Syntax { .. } => "S0201",
            ParserError::Expected { .. } => "S0202",
            ParserError::ExpectedBeforeEnd { .. } => "S0203",
            ParserError::UnknownOperator { .. } => "S0204",
            ParserError::UnexpectedEnd { .. } => "S0207",
            ParserError::InvalidParameter { .. } => "S0208",
            ParserError::PredicateAfterGroup { .. } => "S0209",
            ParserError::MultipleGroups { .. } => "S0210",
            ParserError::InvalidUnary { .. } => "S0211",
            ParserError::InvalidBindTarget { .. } => "S0212",
            ParserError::LiteralStep { .. } => "S0213",
            ParserError::InvalidIndexVariable { .. } => "S0214",
            ParserError::EmptyRegex { .. } => "S0301",
            ParserError::UnterminatedRegex { .. } => "S0302",
            ParserError::InvalidRegex { .. } => "S0303",
            ParserError::InvalidSignature { .. } => "S0401",
            ParserError::TooDeep { .. } => "U1001",
        }
    }

    /// Character offset in the expression where the problem was found
    pub fn position(&self) -> usize {
        match self {
            ParserError::UnterminatedString { position }
            | ParserError::NumberOutOfRange { position, .. }
            | ParserError::InvalidEscape { position, .. }
            | ParserError::InvalidUnicodeEscape { position }
            | ParserError::UnterminatedName { position }
            | ParserError::UnclosedComment { position }
            | ParserError::Syntax { position, .. }
            | ParserError::Expected { position, .. }
            | ParserError::ExpectedBeforeEnd { position, .. }
            | ParserError::UnknownOperator { position, .. }
            | ParserError::UnexpectedEnd { position }
            | ParserError::InvalidParameter { position, .. }
            | ParserError::PredicateAfterGroup { position }
            | ParserError::MultipleGroups { position }
            | ParserError::InvalidUnary { position, .. }
            | ParserError::InvalidBindTarget { position }
            | ParserError::LiteralStep { position, .. }
            | ParserError::InvalidIndexVariable { position, .. }
            | ParserError::EmptyRegex { position }
            | ParserError::UnterminatedRegex { position }
            | ParserError::InvalidRegex { position, .. }
            | ParserError::InvalidSignature { position, .. }
            | ParserError::TooDeep { position, .. } => *position,
        }
    }
}

/// Parser for JSONata expressions
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParserError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
            depth: 0,
        })
    }

    /// Move to the next token, returning the one just consumed.
    fn advance(&mut self) -> Result<Token, ParserError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current_token, next))
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current_token.kind == kind
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), ParserError> {
        if self.current_token.kind == expected {
            self.advance()?;
            return Ok(());
        }
        if self.current_token.kind == TokenKind::Eof {
            return Err(ParserError::ExpectedBeforeEnd {
                expected: expected.text(),
                position: self.current_token.position,
            });
        }
        Err(ParserError::Expected {
            expected: expected.text(),
            found: self.current_token.kind.text(),
            position: self.current_token.position,
        })
    }

    /// (left, right) binding power of a token in infix position
    fn binding_power(token: &TokenKind) -> Option<(u8, u8)> {
        // Higher numbers = higher precedence
        match token {
            TokenKind::ColonEqual => Some((10, 9)), // Right associative
            TokenKind::Question => Some((20, 21)),
            TokenKind::Or => Some((25, 26)),
            TokenKind::And => Some((30, 31)),
            TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::LessThan
            | TokenKind::LessThanOrEqual
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanOrEqual
            | TokenKind::In
            | TokenKind::Caret
            | TokenKind::ChainArrow
            | TokenKind::Coalesce
            | TokenKind::Elvis => Some((40, 41)),
            TokenKind::DotDot => Some((45, 46)),
            TokenKind::Ampersand | TokenKind::Plus | TokenKind::Minus => Some((50, 51)),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some((60, 61)),
            TokenKind::LeftBrace => Some((70, 71)),
            TokenKind::Dot => Some((75, 76)),
            TokenKind::LeftBracket
            | TokenKind::LeftParen
            | TokenKind::Hash
            | TokenKind::At => Some((80, 81)),
            _ => None,
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<AstNode, ParserError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(ParserError::TooDeep {
                max: MAX_PARSE_DEPTH,
                position: self.current_token.position,
            });
        }

        let token = self.advance()?;
        let mut lhs = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.parse_prefix(token)
        })?;

        loop {
            let (left_bp, right_bp) = match Self::binding_power(&self.current_token.kind) {
                Some(bp) => bp,
                None => break,
            };
            if left_bp < min_bp {
                break;
            }
            let token = self.advance()?;
            lhs = self.parse_infix(token, lhs, right_bp)?;
        }

        self.depth -= 1;
        Ok(lhs)
    }

    /// Tokens in operand position
    fn parse_prefix(&mut self, token: Token) -> Result<AstNode, ParserError> {
        let position = token.position;
        match token.kind {
            TokenKind::String(s) => Ok(AstNode::String(s)),
            TokenKind::Number(n) => Ok(AstNode::Number(n)),
            TokenKind::True => Ok(AstNode::Boolean(true)),
            TokenKind::False => Ok(AstNode::Boolean(false)),
            TokenKind::Null => Ok(AstNode::Null),
            TokenKind::Regex { pattern, flags } => {
                if let Err(e) = crate::utils::build_regex(&pattern, &flags) {
                    return Err(ParserError::InvalidRegex {
                        pattern,
                        message: e.to_string(),
                        position,
                    });
                }
                Ok(AstNode::Regex { pattern, flags })
            }
            TokenKind::Name(name) => Ok(AstNode::name_path(name)),
            // Operator words double as field names in operand position
            TokenKind::And => Ok(AstNode::name_path("and")),
            TokenKind::Or => Ok(AstNode::name_path("or")),
            TokenKind::In => Ok(AstNode::name_path("in")),
            TokenKind::Variable(name) => Ok(AstNode::Variable(name)),
            TokenKind::Star => Ok(AstNode::Wildcard),
            TokenKind::StarStar => Ok(AstNode::Descendant),
            TokenKind::Minus => {
                let operand = self.parse_expression(71)?;
                match operand {
                    AstNode::Number(n) => Ok(AstNode::Number(-n)),
                    other => Ok(AstNode::Negate(Box::new(other))),
                }
            }
            TokenKind::LeftParen => self.parse_block(),
            TokenKind::LeftBracket => self.parse_array_constructor(),
            TokenKind::LeftBrace => Ok(AstNode::Object(self.parse_object_pairs()?)),
            TokenKind::Pipe => self.parse_transform(),
            TokenKind::Eof => Err(ParserError::UnexpectedEnd { position }),
            other => Err(ParserError::InvalidUnary {
                token: other.text(),
                position,
            }),
        }
    }

    /// Tokens in operator position
    fn parse_infix(
        &mut self,
        token: Token,
        lhs: AstNode,
        right_bp: u8,
    ) -> Result<AstNode, ParserError> {
        let position = token.position;
        if let Some(op) = binary_operator(&token.kind) {
            let rhs = self.parse_expression(right_bp)?;
            return Ok(AstNode::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        match token.kind {
            TokenKind::ChainArrow => {
                let rhs = self.parse_expression(right_bp)?;
                Ok(AstNode::Apply {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::ColonEqual => {
                let value = self.parse_expression(right_bp)?;
                match lhs {
                    AstNode::Variable(name) => Ok(AstNode::Bind {
                        name,
                        value: Box::new(value),
                    }),
                    _ => Err(ParserError::InvalidBindTarget { position }),
                }
            }
            TokenKind::Question => {
                let then_branch = self.parse_expression(0)?;
                let else_branch = if self.at(&TokenKind::Colon) {
                    self.advance()?;
                    Some(Box::new(self.parse_expression(0)?))
                } else {
                    None
                };
                Ok(AstNode::Conditional {
                    condition: Box::new(lhs),
                    then_branch: Box::new(then_branch),
                    else_branch,
                })
            }
            TokenKind::Dot => {
                let rhs = self.parse_expression(right_bp)?;
                make_path(lhs, rhs, position)
            }
            TokenKind::LeftBracket => {
                if self.at(&TokenKind::RightBracket) {
                    self.advance()?;
                    return Ok(keep_array(lhs));
                }
                let predicate = self.parse_expression(0)?;
                self.expect(TokenKind::RightBracket)?;
                add_predicate(lhs, predicate, position)
            }
            TokenKind::LeftBrace => {
                let pairs = self.parse_object_pairs()?;
                add_group(lhs, pairs, position)
            }
            TokenKind::LeftParen => self.parse_call(lhs, position),
            TokenKind::Caret => {
                let terms = self.parse_sort_terms()?;
                let mut path = into_path(lhs, position)?;
                path.steps.push(PathStep::new(AstNode::Sort(terms)));
                Ok(AstNode::Path(path))
            }
            TokenKind::Hash => {
                let var = self.advance()?;
                let name = match var.kind {
                    TokenKind::Variable(name) => name,
                    other => {
                        return Err(ParserError::InvalidIndexVariable {
                            token: other.text(),
                            position: var.position,
                        })
                    }
                };
                let mut path = into_path(lhs, position)?;
                if let Some(step) = path.steps.last_mut() {
                    if step.stages.is_empty() {
                        step.index = Some(name);
                    } else {
                        step.stages.push(Stage::Index(name));
                    }
                    step.tuple = true;
                }
                Ok(AstNode::Path(path))
            }
            other => Err(ParserError::UnknownOperator {
                token: other.text(),
                position,
            }),
        }
    }

    /// `( expr ; expr ; ... )`
    fn parse_block(&mut self) -> Result<AstNode, ParserError> {
        let mut expressions = Vec::new();
        while !self.at(&TokenKind::RightParen) {
            expressions.push(self.parse_expression(0)?);
            if !self.at(&TokenKind::Semicolon) {
                break;
            }
            self.advance()?;
        }
        self.expect(TokenKind::RightParen)?;
        Ok(AstNode::Block(expressions))
    }

    /// `[ item, lo..hi, ... ]`
    fn parse_array_constructor(&mut self) -> Result<AstNode, ParserError> {
        let mut items = Vec::new();
        if !self.at(&TokenKind::RightBracket) {
            loop {
                items.push(self.parse_expression(0)?);
                if !self.at(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightBracket)?;
        Ok(AstNode::Array { items, cons: false })
    }

    /// `key: value, ...}` after an opening brace
    fn parse_object_pairs(&mut self) -> Result<Vec<(AstNode, AstNode)>, ParserError> {
        let mut pairs = Vec::new();
        if !self.at(&TokenKind::RightBrace) {
            loop {
                let key = self.parse_expression(0)?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression(0)?;
                pairs.push((key, value));
                if !self.at(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(pairs)
    }

    /// `| pattern | update [, delete] |`
    fn parse_transform(&mut self) -> Result<AstNode, ParserError> {
        let pattern = self.parse_expression(0)?;
        self.expect(TokenKind::Pipe)?;
        let update = self.parse_expression(0)?;
        let delete = if self.at(&TokenKind::Comma) {
            self.advance()?;
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        self.expect(TokenKind::Pipe)?;
        Ok(AstNode::Transform(Arc::new(TransformDef {
            pattern,
            update,
            delete,
        })))
    }

    /// `(<a, >b)` after `^`
    fn parse_sort_terms(&mut self) -> Result<Vec<SortTerm>, ParserError> {
        self.expect(TokenKind::LeftParen)?;
        let mut terms = Vec::new();
        loop {
            let mut descending = false;
            if self.at(&TokenKind::LessThan) {
                self.advance()?;
            } else if self.at(&TokenKind::GreaterThan) {
                descending = true;
                self.advance()?;
            }
            let expr = self.parse_expression(0)?;
            terms.push(SortTerm { expr, descending });
            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.expect(TokenKind::RightParen)?;
        Ok(terms)
    }

    /// Function call, partial application, or a `function(...)` definition.
    fn parse_call(&mut self, procedure: AstNode, position: usize) -> Result<AstNode, ParserError> {
        let mut args = Vec::new();
        let mut partial = false;
        if !self.at(&TokenKind::RightParen) {
            loop {
                if self.at(&TokenKind::Question) {
                    self.advance()?;
                    partial = true;
                    args.push(AstNode::Placeholder);
                } else {
                    args.push(self.parse_expression(0)?);
                }
                if !self.at(&TokenKind::Comma) {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(TokenKind::RightParen)?;

        if matches!(procedure.as_bare_name(), Some("function") | Some("λ")) {
            return self.parse_lambda(args, position);
        }

        let procedure = Box::new(procedure);
        if partial {
            Ok(AstNode::Partial { procedure, args })
        } else {
            Ok(AstNode::Function { procedure, args })
        }
    }

    fn parse_lambda(&mut self, args: Vec<AstNode>, position: usize) -> Result<AstNode, ParserError> {
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                AstNode::Variable(name) => params.push(name),
                other => {
                    return Err(ParserError::InvalidParameter {
                        name: format!("{:?}", other),
                        position,
                    })
                }
            }
        }

        let mut signature = None;
        if self.at(&TokenKind::LessThan) {
            let sig_position = self.current_token.position;
            let text = self.lexer.read_signature()?;
            self.current_token = self.lexer.next_token()?;
            let parsed = Signature::parse(&text).map_err(|_| ParserError::InvalidSignature {
                signature: text.clone(),
                position: sig_position,
            })?;
            signature = Some(parsed);
        }

        self.expect(TokenKind::LeftBrace)?;
        let body = self.parse_expression(0)?;
        self.expect(TokenKind::RightBrace)?;
        Ok(AstNode::Lambda(Arc::new(LambdaDef {
            params,
            signature,
            body,
        })))
    }

    /// Parse the complete expression
    pub fn parse(&mut self) -> Result<AstNode, ParserError> {
        let ast = self.parse_expression(0)?;
        if !self.at(&TokenKind::Eof) {
            return Err(ParserError::Syntax {
                token: self.current_token.kind.text(),
                position: self.current_token.position,
            });
        }
        Ok(ast)
    }
}

// ── Structure assembly ───────────────────────────────────────────────────────

fn binary_operator(token: &TokenKind) -> Option<BinaryOp> {
    let op = match token {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Modulo,
        TokenKind::Equal => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::LessThan => BinaryOp::LessThan,
        TokenKind::LessThanOrEqual => BinaryOp::LessThanOrEqual,
        TokenKind::GreaterThan => BinaryOp::GreaterThan,
        TokenKind::GreaterThanOrEqual => BinaryOp::GreaterThanOrEqual,
        TokenKind::In => BinaryOp::In,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::Ampersand => BinaryOp::Concatenate,
        TokenKind::Coalesce => BinaryOp::Coalesce,
        TokenKind::Elvis => BinaryOp::Default,
        TokenKind::DotDot => BinaryOp::Range,
        _ => return None,
    };
    Some(op)
}

/// A node as a path step; string literals become field names.
fn into_step(node: AstNode, position: usize) -> Result<PathStep, ParserError> {
    match node {
        AstNode::String(name) => Ok(PathStep::new(AstNode::Name(name))),
        AstNode::Number(n) => Err(ParserError::LiteralStep {
            value: crate::utils::format_number(n),
            position,
        }),
        AstNode::Boolean(b) => Err(ParserError::LiteralStep {
            value: b.to_string(),
            position,
        }),
        AstNode::Null => Err(ParserError::LiteralStep {
            value: "null".into(),
            position,
        }),
        other => Ok(PathStep::new(other)),
    }
}

fn into_path(node: AstNode, position: usize) -> Result<PathExpr, ParserError> {
    match node {
        AstNode::Path(path) => Ok(path),
        other => Ok(PathExpr::single(into_step(other, position)?)),
    }
}

/// `lhs.rhs`: concatenate steps, moving predicates on the right-hand
/// operand into stages of its step.
fn make_path(lhs: AstNode, rhs: AstNode, position: usize) -> Result<AstNode, ParserError> {
    let mut path = into_path(lhs, position)?;
    match rhs {
        AstNode::Path(rest) if rest.group.is_none() => {
            if rest.keep_singleton {
                path.keep_singleton = true;
            }
            path.steps.extend(rest.steps);
        }
        AstNode::Filter {
            input,
            predicates,
            keep_array,
        } => {
            let mut step = into_step(*input, position)?;
            step.stages = predicates.into_iter().map(Stage::Filter).collect();
            if keep_array {
                path.keep_singleton = true;
            }
            path.steps.push(step);
        }
        other => path.steps.push(into_step(other, position)?),
    }

    // Array constructors at either end keep their structure
    if let Some(AstNode::Array { cons, .. }) = path.steps.first_mut().map(|s| &mut s.node) {
        *cons = true;
    }
    if let Some(AstNode::Array { cons, .. }) = path.steps.last_mut().map(|s| &mut s.node) {
        *cons = true;
    }
    Ok(AstNode::Path(path))
}

/// `expr[]`
fn keep_array(node: AstNode) -> AstNode {
    match node {
        AstNode::Path(mut path) => {
            path.keep_singleton = true;
            AstNode::Path(path)
        }
        AstNode::Filter {
            input, predicates, ..
        } => AstNode::Filter {
            input,
            predicates,
            keep_array: true,
        },
        other => AstNode::Filter {
            input: Box::new(other),
            predicates: Vec::new(),
            keep_array: true,
        },
    }
}

/// `expr[predicate]`
fn add_predicate(node: AstNode, predicate: AstNode, position: usize) -> Result<AstNode, ParserError> {
    match node {
        AstNode::Path(mut path) => {
            if path.group.is_some() {
                return Err(ParserError::PredicateAfterGroup { position });
            }
            if let Some(step) = path.steps.last_mut() {
                step.stages.push(Stage::Filter(predicate));
            }
            Ok(AstNode::Path(path))
        }
        AstNode::Group { .. } => Err(ParserError::PredicateAfterGroup { position }),
        AstNode::Filter {
            input,
            mut predicates,
            keep_array,
        } => {
            predicates.push(predicate);
            Ok(AstNode::Filter {
                input,
                predicates,
                keep_array,
            })
        }
        other => Ok(AstNode::Filter {
            input: Box::new(other),
            predicates: vec![predicate],
            keep_array: false,
        }),
    }
}

/// `expr{key: value}`
fn add_group(
    node: AstNode,
    pairs: Vec<(AstNode, AstNode)>,
    position: usize,
) -> Result<AstNode, ParserError> {
    match node {
        AstNode::Path(mut path) => {
            if path.group.is_some() {
                return Err(ParserError::MultipleGroups { position });
            }
            path.group = Some(pairs);
            Ok(AstNode::Path(path))
        }
        AstNode::Group { .. } => Err(ParserError::MultipleGroups { position }),
        other => Ok(AstNode::Group {
            input: Box::new(other),
            pairs,
        }),
    }
}

/// Parse a JSONata expression into an AST
pub fn parse(expression: &str) -> Result<AstNode, ParserError> {
    let mut parser = Parser::new(expression)?;
    parser.parse()
}
