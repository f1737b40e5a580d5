//! Boolean condition expressions.
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "True" | "False" | condition | "(" expr ")"
//! ```
//!
//! A condition is a word of `[A-Za-z0-9_:.*]`, at most 256 characters long,
//! with the same `name:arg` shape as statement conditions. Conditions are
//! only invoked when evaluation reaches them: `and`/`or` evaluate operands
//! left to right and stop once the result is known.
//!
//! Parentheses and `not` may nest at most 64 levels deep.

use crate::condition::check_condition;
use crate::context::EvaluationContext;
use crate::error::{PolicyError, Result};
use crate::policy::AccessPolicy;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const MAX_ATOM_LEN: usize = 256;
const MAX_DEPTH: usize = 64;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[()]|[^\s()]+").expect("token pattern is valid"))
}

fn atom_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_:.*]+$").expect("atom pattern is valid"))
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(bool),
    Condition(String),
    Not(Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Not,
    And,
    Or,
    Word(&'a str),
}

impl Expression {
    /// Parses an expression, rejecting anything left over after it.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
        };

        let expression = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected {} after expression", describe(token))));
        }
        Ok(expression)
    }

    /// Evaluates the expression, resolving conditions against the policy.
    pub fn evaluate(&self, policy: &AccessPolicy, ctx: &EvaluationContext) -> Result<bool> {
        match self {
            Expression::Literal(value) => Ok(*value),
            Expression::Condition(reference) => check_condition(policy, reference, ctx),
            Expression::Not(inner) => Ok(!inner.evaluate(policy, ctx)?),
            Expression::And(operands) => {
                for operand in operands {
                    if !operand.evaluate(policy, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::Or(operands) => {
                for operand in operands {
                    if operand.evaluate(policy, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, operands: &[Expression], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", operand)?;
            }
            f.write_str(")")
        }

        match self {
            Expression::Literal(true) => f.write_str("True"),
            Expression::Literal(false) => f.write_str("False"),
            Expression::Condition(reference) => f.write_str(reference),
            Expression::Not(inner) => write!(f, "not {}", inner),
            Expression::And(operands) => join(f, operands, "and"),
            Expression::Or(operands) => join(f, operands, "or"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    token_pattern()
        .find_iter(source)
        .map(|m| match m.as_str() {
            "(" => Ok(Token::Open),
            ")" => Ok(Token::Close),
            "not" => Ok(Token::Not),
            "and" => Ok(Token::And),
            "or" => Ok(Token::Or),
            word if word.len() > MAX_ATOM_LEN => Err(syntax_error(
                source,
                format!(
                    "condition \"{}...\" is longer than {} characters",
                    word.chars().take(16).collect::<String>(),
                    MAX_ATOM_LEN
                ),
            )),
            word if atom_pattern().is_match(word) => Ok(Token::Word(word)),
            word => Err(syntax_error(source, format!("invalid token \"{}\"", word))),
        })
        .collect()
}

fn syntax_error(source: &str, message: String) -> PolicyError {
    PolicyError::ExpressionSyntax {
        expression: source.to_string(),
        message,
    }
}

fn describe(token: &Token<'_>) -> String {
    match token {
        Token::Open => "\"(\"".to_string(),
        Token::Close => "\")\"".to_string(),
        Token::Not => "\"not\"".to_string(),
        Token::And => "\"and\"".to_string(),
        Token::Or => "\"or\"".to_string(),
        Token::Word(word) => format!("\"{}\"", word),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token<'a>) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> PolicyError {
        syntax_error(self.source, message)
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut operands = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(collapse(operands, Expression::Or))
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut operands = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            operands.push(self.parse_unary()?);
        }
        Ok(collapse(operands, Expression::And))
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.eat(&Token::Not) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expression::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::Word("True")) => Ok(Expression::Literal(true)),
            Some(Token::Word("False")) => Ok(Expression::Literal(false)),
            Some(Token::Word(reference)) => Ok(Expression::Condition(reference.to_string())),
            Some(Token::Open) => {
                let inner = self.nested(Self::parse_or)?;
                if !self.eat(&Token::Close) {
                    return Err(self.error("missing closing parenthesis".to_string()));
                }
                Ok(inner)
            }
            Some(token) => Err(self.error(format!("expected a condition, found {}", describe(&token)))),
            None => Err(self.error("unexpected end of expression".to_string())),
        }
    }
}

fn collapse(mut operands: Vec<Expression>, combine: fn(Vec<Expression>) -> Expression) -> Expression {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        combine(operands)
    }
}
