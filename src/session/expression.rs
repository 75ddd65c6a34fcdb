//! Assignment expressions.
//!
//! An expression is an operator followed by a literal:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `=42`, `='text'`, `="text"` | Replace |
//! | `+n`, `-n`, `*n`, `/n` | Arithmetic on the previous value |
//! | `+'suffix'` | Concatenate onto a previous string |
//!
//! Malformed expressions evaluate to no value rather than failing the
//! caller, see [`eval_operation`].

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::protocol::HmiValue;

// ============================================================================
// Types
// ============================================================================

/// Expression operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Assign,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(Self::Assign),
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }
}

/// A parsed assignment expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Operator.
    pub op: Operator,
    /// Literal operand, a string for quoted literals.
    pub operand: HmiValue,
}

impl Expression {
    /// Parses `<op><literal>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCommand`] for an unknown operator, a
    /// missing operand, an unterminated quote, or a non-numeric bare literal.
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let op = chars
            .next()
            .and_then(Operator::from_char)
            .ok_or_else(|| Error::malformed_command(text))?;
        let rest = chars.as_str();

        let operand = match rest.chars().next() {
            None => return Err(Error::malformed_command(text)),
            Some(quote @ ('\'' | '"')) => {
                let inner = &rest[quote.len_utf8()..];
                let body = inner
                    .strip_suffix(quote)
                    .ok_or_else(|| Error::malformed_command(text))?;
                HmiValue::Str(body.to_string())
            }
            Some(_) => HmiValue::parse_number(rest).ok_or_else(|| Error::malformed_command(text))?,
        };

        Ok(Self { op, operand })
    }

    /// Applies the expression to a previous value.
    ///
    /// Arithmetic needs a numeric previous value and a numeric operand,
    /// except `+` on two strings which concatenates. Division by zero and
    /// overflowing real results yield `None`.
    #[must_use]
    pub fn apply(&self, old: Option<&HmiValue>) -> Option<HmiValue> {
        if self.op == Operator::Assign {
            return Some(self.operand.clone());
        }

        let old = old?;
        if let (Operator::Add, HmiValue::Str(a), HmiValue::Str(b)) = (self.op, old, &self.operand) {
            return Some(HmiValue::Str(format!("{a}{b}")));
        }
        if !old.is_numeric() || !self.operand.is_numeric() {
            return None;
        }

        if let (Some(a), Some(b)) = (as_int(old), as_int(&self.operand))
            && let Some(v) = self.apply_int(a, b)
        {
            return Some(HmiValue::Int(v));
        }

        let a = old.to_f64()?;
        let b = self.operand.to_f64()?;
        let v = match self.op {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div if b == 0.0 => return None,
            Operator::Div => a / b,
            Operator::Assign => return None,
        };
        v.is_finite().then_some(HmiValue::Real(v))
    }

    /// Integer arithmetic, `None` when the result is not an exact integer.
    fn apply_int(&self, a: i64, b: i64) -> Option<i64> {
        match self.op {
            Operator::Add => a.checked_add(b),
            Operator::Sub => a.checked_sub(b),
            Operator::Mul => a.checked_mul(b),
            Operator::Div => (b != 0 && a.checked_rem(b) == Some(0))
                .then(|| a.checked_div(b))
                .flatten(),
            Operator::Assign => None,
        }
    }
}

fn as_int(value: &HmiValue) -> Option<i64> {
    match value {
        HmiValue::Int(v) => Some(*v),
        HmiValue::UInt(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

/// Evaluates an assignment string against a previous value.
///
/// Returns `None` when the string is malformed or the operation does not
/// apply to the operands.
#[must_use]
pub fn eval_operation(old: Option<&HmiValue>, expression: &str) -> Option<HmiValue> {
    Expression::parse(expression).ok()?.apply(old)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_to_integer() {
        assert_eq!(eval_operation(Some(&HmiValue::Int(10)), "+5"), Some(HmiValue::Int(15)));
    }

    #[test]
    fn test_assign_quoted_string() {
        assert_eq!(eval_operation(None, "='hello'"), Some(HmiValue::from("hello")));
        assert_eq!(
            eval_operation(Some(&HmiValue::Int(1)), "=\"hi\""),
            Some(HmiValue::from("hi"))
        );
        assert_eq!(eval_operation(None, "=''"), Some(HmiValue::from("")));
    }

    #[test]
    fn test_missing_operand_is_no_value() {
        assert_eq!(eval_operation(Some(&HmiValue::Int(10)), "+"), None);
        assert!(matches!(
            Expression::parse("+"),
            Err(Error::MalformedCommand { .. })
        ));
    }

    #[test]
    fn test_mismatched_quotes_are_malformed() {
        assert!(Expression::parse("='abc\"").is_err());
        assert!(Expression::parse("='").is_err());
        assert!(Expression::parse("=abc").is_err());
        assert!(Expression::parse("%5").is_err());
        assert!(Expression::parse("").is_err());
    }

    #[test]
    fn test_non_finite_literal_is_malformed() {
        assert!(matches!(
            Expression::parse("=NaN"),
            Err(Error::MalformedCommand { .. })
        ));
        assert_eq!(eval_operation(Some(&HmiValue::Real(1.5)), "=NaN"), None);
        assert_eq!(eval_operation(Some(&HmiValue::Real(1.5)), "*inf"), None);
    }

    #[test]
    fn test_division() {
        assert_eq!(eval_operation(Some(&HmiValue::Int(10)), "/2"), Some(HmiValue::Int(5)));
        assert_eq!(eval_operation(Some(&HmiValue::Int(10)), "/4"), Some(HmiValue::Real(2.5)));
        assert_eq!(eval_operation(Some(&HmiValue::Int(10)), "/0"), None);
    }

    #[test]
    fn test_real_arithmetic() {
        assert_eq!(
            eval_operation(Some(&HmiValue::Real(1.5)), "*2"),
            Some(HmiValue::Real(3.0))
        );
        assert_eq!(
            eval_operation(Some(&HmiValue::Int(1)), "-0.5"),
            Some(HmiValue::Real(0.5))
        );
    }

    #[test]
    fn test_arithmetic_needs_numbers() {
        assert_eq!(eval_operation(None, "+1"), None);
        assert_eq!(eval_operation(Some(&HmiValue::from("a")), "*2"), None);
        assert_eq!(eval_operation(Some(&HmiValue::Int(2)), "*'a'"), None);
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval_operation(Some(&HmiValue::from("ab")), "+'cd'"),
            Some(HmiValue::from("abcd"))
        );
    }

    #[test]
    fn test_negative_literal() {
        let expr = Expression::parse("=-3").expect("parse");
        assert_eq!(expr.op, Operator::Assign);
        assert_eq!(expr.operand, HmiValue::Int(-3));
    }
}
