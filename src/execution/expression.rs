//! Arithmetic Expressions
//!
//! A small recursive-descent evaluator used by `set_variable` steps after
//! placeholder substitution:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := number | '(' expr ')'
//! ```
//!
//! Evaluation is opportunistic: [`try_evaluate`] returns `None` whenever the
//! text is not a well-formed expression, and the caller keeps the literal.

use thiserror::Error;

const OPERATORS: &[char] = &['+', '-', '*', '/', '%'];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{0}' at {1}")]
    Unexpected(char, usize),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn parse(mut self) -> Result<f64, ExprError> {
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(c) => Err(ExprError::Unexpected(c, self.pos)),
        }
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(ExprError::DivisionByZero),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(c) => Err(ExprError::Unexpected(c, self.pos)),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(ExprError::Unexpected(c, self.pos)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == '.')
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| ExprError::InvalidNumber(literal))
    }
}

/// Evaluates an arithmetic expression.
pub fn evaluate(text: &str) -> Result<f64, ExprError> {
    let value = Parser::new(text).parse()?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExprError::NotFinite)
    }
}

/// Renders a number as an integer string when exactly integral, otherwise
/// as the shortest decimal that round-trips.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Attempts arithmetic on already-substituted text.
///
/// Returns `None` when the text contains no operator or does not evaluate,
/// in which case the literal text should be used.
///
/// ```
/// use tapflow::execution::expression::try_evaluate;
///
/// assert_eq!(try_evaluate("2 + 3").as_deref(), Some("5"));
/// assert_eq!(try_evaluate("hello"), None);
/// assert_eq!(try_evaluate("2 / 0"), None);
/// ```
pub fn try_evaluate(text: &str) -> Option<String> {
    if !text.contains(OPERATORS) {
        return None;
    }
    match evaluate(text) {
        Ok(value) => Some(format_number(value)),
        Err(e) => {
            log::debug!("'{}' kept literal: {}", text, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("2 + 3 * 4"), Ok(14.0));
        assert_eq!(evaluate("(2 + 3) * 4"), Ok(20.0));
        assert_eq!(evaluate("10 - 4 - 3"), Ok(3.0));
        assert_eq!(evaluate("20 / 4 / 5"), Ok(1.0));
        assert_eq!(evaluate("7 % 4 + 1"), Ok(4.0));
    }

    #[test]
    fn test_unary() {
        assert_eq!(evaluate("-3 + 5"), Ok(2.0));
        assert_eq!(evaluate("--3"), Ok(3.0));
        assert_eq!(evaluate("+4 * -(1 + 1)"), Ok(-8.0));
    }

    #[test]
    fn test_decimals() {
        assert_eq!(evaluate("2.5 + 0.5"), Ok(3.0));
        assert_eq!(evaluate(".5 * 4"), Ok(2.0));
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("5 % 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("1 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert!(matches!(evaluate("1 + a"), Err(ExprError::Unexpected('a', _))));
        assert!(matches!(evaluate("1 2"), Err(ExprError::Unexpected('2', _))));
        assert!(matches!(evaluate("1..2 + 1"), Err(ExprError::InvalidNumber(_))));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_try_evaluate_passthrough() {
        assert_eq!(try_evaluate("hello"), None);
        assert_eq!(try_evaluate("42"), None);
        assert_eq!(try_evaluate("(5)"), None);
    }

    #[test]
    fn test_try_evaluate_fallbacks() {
        assert_eq!(try_evaluate("2 / 0"), None);
        assert_eq!(try_evaluate("hello-world"), None);
        assert_eq!(try_evaluate("a + b"), None);
    }

    #[test]
    fn test_try_evaluate_results() {
        assert_eq!(try_evaluate("2 + 3").as_deref(), Some("5"));
        assert_eq!(try_evaluate("2.5 + 0.5").as_deref(), Some("3"));
        assert_eq!(try_evaluate("10 / 4").as_deref(), Some("2.5"));
        assert_eq!(try_evaluate("7 % 3").as_deref(), Some("1"));
    }
}
