use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison applied by a `where` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    /// An operator token nobody recognized. Never matches.
    Unknown(String),
}

impl Operator {
    /// Evaluate `stored <op> expected`.
    pub fn evaluate(&self, stored: &Value, expected: &Value) -> bool {
        match self {
            Operator::Eq => values_equal(stored, expected),
            Operator::Ne => !values_equal(stored, expected),
            Operator::Gt => compare(stored, expected) == Some(Ordering::Greater),
            Operator::Lt => compare(stored, expected) == Some(Ordering::Less),
            Operator::Ge => matches!(
                compare(stored, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Le => matches!(
                compare(stored, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => str_pair(stored, expected).is_some_and(|(a, b)| a.contains(b)),
            Operator::StartsWith => {
                str_pair(stored, expected).is_some_and(|(a, b)| a.starts_with(b))
            }
            Operator::EndsWith => str_pair(stored, expected).is_some_and(|(a, b)| a.ends_with(b)),
            Operator::Unknown(_) => false,
        }
    }
}

impl From<&str> for Operator {
    fn from(token: &str) -> Self {
        match token {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "contains" => Operator::Contains,
            "startsWith" | "starts_with" => Operator::StartsWith,
            "endsWith" | "ends_with" => Operator::EndsWith,
            other => Operator::Unknown(other.to_string()),
        }
    }
}

impl FromStr for Operator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Operator::from(s))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Unknown(token) => token.as_str(),
        };
        f.write_str(token)
    }
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two scalars of the same kind; `None` when they are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn str_pair<'v>(a: &'v Value, b: &'v Value) -> Option<(&'v str, &'v str)> {
    Some((a.as_str()?, b.as_str()?))
}

/// Text a value sorts by: strings as-is, other scalars by their JSON form.
/// Missing and null values have no key and sort first.
pub(crate) fn sort_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_tokens() {
        assert_eq!(Operator::from("="), Operator::Eq);
        assert_eq!(Operator::from("startsWith"), Operator::StartsWith);
        assert_eq!(Operator::from("ends_with"), Operator::EndsWith);
        assert_eq!(Operator::from("~="), Operator::Unknown("~=".into()));
        assert_eq!(Operator::from(">=").to_string(), ">=");
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(Operator::Gt.evaluate(&json!(32), &json!(18)));
        assert!(!Operator::Gt.evaluate(&json!(18), &json!(18)));
        assert!(Operator::Ge.evaluate(&json!(18), &json!(18)));
        assert!(Operator::Lt.evaluate(&json!(2.5), &json!(3)));
        assert!(Operator::Le.evaluate(&json!(3), &json!(3.0)));
        assert!(Operator::Eq.evaluate(&json!(3), &json!(3.0)));
    }

    #[test]
    fn test_string_comparisons() {
        assert!(Operator::Eq.evaluate(&json!("99"), &json!("99")));
        assert!(Operator::Ne.evaluate(&json!("99"), &json!("24")));
        assert!(Operator::Gt.evaluate(&json!("b"), &json!("a")));
        assert!(Operator::Contains.evaluate(&json!("John Doe"), &json!("hn D")));
        assert!(Operator::StartsWith.evaluate(&json!("John Doe"), &json!("John")));
        assert!(Operator::EndsWith.evaluate(&json!("John Doe"), &json!("Doe")));
    }

    #[test]
    fn test_mixed_types_do_not_match() {
        assert!(!Operator::Eq.evaluate(&json!(18), &json!("18")));
        assert!(Operator::Ne.evaluate(&json!(18), &json!("18")));
        assert!(!Operator::Gt.evaluate(&json!("20"), &json!(18)));
        assert!(!Operator::Contains.evaluate(&json!(123), &json!("2")));
        assert!(!Operator::Gt.evaluate(&Value::Null, &json!(18)));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let op = Operator::from("like");
        assert!(!op.evaluate(&json!("a"), &json!("a")));
    }

    #[test]
    fn test_sort_keys() {
        assert_eq!(sort_key(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(sort_key(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(sort_key(Some(&json!(true))), Some("true".to_string()));
        assert_eq!(sort_key(Some(&Value::Null)), None);
        assert_eq!(sort_key(None), None);
    }

    #[test]
    fn test_parse_direction() {
        assert_eq!("DESC".parse::<Direction>().unwrap(), Direction::Desc);
        assert_eq!("asc".parse::<Direction>().unwrap(), Direction::Asc);
        assert!("up".parse::<Direction>().is_err());
    }
}
