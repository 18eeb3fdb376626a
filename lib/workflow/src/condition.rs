//! Condition evaluation.
//!
//! A condition node holds ordered branches. Each branch but the last is a
//! list of typed comparisons joined by `and`/`or`; the last branch is the
//! fallback and matches unconditionally. Operands are variable slots, so
//! resolving them (literal or reference) is left to an [`OperandResolver`].

use crate::error::ConditionError;
use crate::variable::{Variable, VariableType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How a branch's comparisons combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    /// Every comparison must hold.
    #[default]
    And,
    /// At least one comparison must hold.
    Or,
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "!contains")]
    NotContains,
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "!empty")]
    NotEmpty,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Comparator {
    /// Returns the operator as written in definitions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Contains => "contains",
            Self::NotContains => "!contains",
            Self::Empty => "empty",
            Self::NotEmpty => "!empty",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// Returns true for operators that only inspect the first operand.
    #[must_use]
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::Empty | Self::NotEmpty)
    }
}

/// One typed comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub value1: Variable,
    pub op: Comparator,
    #[serde(default)]
    pub value2: Variable,
}

/// A branch of a condition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Handle carried by the edges that leave through this branch.
    pub handle: String,
    #[serde(default)]
    pub connector: Connector,
    #[serde(default)]
    pub conditions: Vec<Comparison>,
}

/// A resolved operand: its declared type and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub ty: VariableType,
    pub value: JsonValue,
}

impl Operand {
    /// Creates an operand.
    #[must_use]
    pub fn new(ty: VariableType, value: JsonValue) -> Self {
        Self { ty, value }
    }
}

/// Turns an operand slot into a typed value.
#[async_trait]
pub trait OperandResolver: Send + Sync {
    /// Resolves one operand.
    ///
    /// # Errors
    ///
    /// Returns an error if the operand's type or value cannot be determined.
    async fn resolve(&self, operand: &Variable) -> Result<Operand, ConditionError>;
}

/// Picks the first branch whose comparisons hold, or the last branch.
///
/// # Errors
///
/// Returns an error if there are no branches or a comparison cannot be evaluated.
pub async fn select_branch<'a>(
    branches: &'a [Branch],
    resolver: &dyn OperandResolver,
) -> Result<&'a Branch, ConditionError> {
    let (fallback, guarded) = branches.split_last().ok_or(ConditionError::NoBranches)?;
    for branch in guarded {
        if evaluate_branch(branch, resolver).await? {
            return Ok(branch);
        }
    }
    Ok(fallback)
}

/// Evaluates one branch with short-circuiting.
///
/// # Errors
///
/// Returns an error if a comparison reached before short-circuiting fails.
pub async fn evaluate_branch(
    branch: &Branch,
    resolver: &dyn OperandResolver,
) -> Result<bool, ConditionError> {
    let is_and = branch.connector == Connector::And;
    for comparison in &branch.conditions {
        let lhs = resolver.resolve(&comparison.value1).await?;
        let rhs = if comparison.op.is_unary() {
            None
        } else {
            Some(resolver.resolve(&comparison.value2).await?)
        };

        let holds = compare(comparison.op, &lhs, rhs.as_ref())?;
        if holds && !is_and {
            return Ok(true);
        }
        if !holds && is_and {
            return Ok(false);
        }
    }
    Ok(is_and)
}

/// Applies a comparator to resolved operands.
///
/// `rhs` is ignored by unary comparators and required by the others.
///
/// # Errors
///
/// Returns an error on type mismatch, unparsable values, or a comparator the
/// operand type does not support.
pub fn compare(op: Comparator, lhs: &Operand, rhs: Option<&Operand>) -> Result<bool, ConditionError> {
    let rhs = match rhs {
        Some(rhs) if !op.is_unary() => {
            if rhs.ty != lhs.ty {
                return Err(ConditionError::TypeMismatch {
                    left: lhs.ty.to_string(),
                    right: rhs.ty.to_string(),
                });
            }
            Some(rhs)
        }
        _ => None,
    };
    let unsupported = || ConditionError::UnsupportedOperator {
        op: op.as_str().to_string(),
        ty: lhs.ty.to_string(),
    };

    match lhs.ty {
        VariableType::String => {
            let left = as_text(&lhs.value);
            match (op, rhs) {
                (Comparator::Empty, _) => Ok(left.is_empty()),
                (Comparator::NotEmpty, _) => Ok(!left.is_empty()),
                (Comparator::Eq, Some(rhs)) => Ok(left == as_text(&rhs.value)),
                (Comparator::Ne, Some(rhs)) => Ok(left != as_text(&rhs.value)),
                (Comparator::Contains, Some(rhs)) => Ok(left.contains(&as_text(&rhs.value))),
                (Comparator::NotContains, Some(rhs)) => Ok(!left.contains(&as_text(&rhs.value))),
                _ => Err(unsupported()),
            }
        }
        VariableType::Number => {
            let Some(rhs) = rhs else {
                return Err(unsupported());
            };
            let left = as_number(&lhs.value)?;
            let right = as_number(&rhs.value)?;
            match op {
                Comparator::Eq => Ok(left == right),
                Comparator::Ne => Ok(left != right),
                Comparator::Gt => Ok(left > right),
                Comparator::Lt => Ok(left < right),
                Comparator::Ge => Ok(left >= right),
                Comparator::Le => Ok(left <= right),
                _ => Err(unsupported()),
            }
        }
        VariableType::StringArray | VariableType::NumberArray => match op {
            Comparator::Empty => Ok(array_len(&lhs.value)? == 0),
            Comparator::NotEmpty => Ok(array_len(&lhs.value)? != 0),
            _ => Err(unsupported()),
        },
        other => Err(ConditionError::UnsupportedType {
            ty: other.to_string(),
        }),
    }
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_number(value: &JsonValue) -> Result<f64, ConditionError> {
    let invalid = || ConditionError::InvalidNumber {
        value: as_text(value),
    };
    match value {
        JsonValue::Number(n) => n.as_f64().ok_or_else(invalid),
        JsonValue::String(s) => s.trim().parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn array_len(value: &JsonValue) -> Result<usize, ConditionError> {
    let invalid = || ConditionError::InvalidArray {
        value: as_text(value),
    };
    match value {
        JsonValue::Array(items) => Ok(items.len()),
        JsonValue::String(s) => serde_json::from_str::<Vec<JsonValue>>(s)
            .map(|items| items.len())
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableValue;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Resolves literals from their content and references from a fixed table,
    /// recording every slot it was asked about.
    struct TableResolver {
        refs: HashMap<(String, String), Operand>,
        asked: Mutex<Vec<String>>,
    }

    impl TableResolver {
        fn new() -> Self {
            Self {
                refs: HashMap::new(),
                asked: Mutex::new(Vec::new()),
            }
        }

        fn with_ref(mut self, node: &str, name: &str, operand: Operand) -> Self {
            self.refs.insert((node.to_string(), name.to_string()), operand);
            self
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl OperandResolver for TableResolver {
        async fn resolve(&self, operand: &Variable) -> Result<Operand, ConditionError> {
            match &operand.value {
                VariableValue::Literal { content } => {
                    self.asked.lock().expect("lock").push(content.clone());
                    Ok(Operand::new(operand.ty, JsonValue::String(content.clone())))
                }
                VariableValue::Ref {
                    source_node,
                    source_name,
                } => {
                    self.asked.lock().expect("lock").push(format!("{source_node}.{source_name}"));
                    self.refs
                        .get(&(source_node.clone(), source_name.clone()))
                        .cloned()
                        .ok_or_else(|| ConditionError::UnknownOutputVariable {
                            node_id: source_node.clone(),
                            name: source_name.clone(),
                        })
                }
            }
        }
    }

    fn number(content: &str) -> Variable {
        Variable::literal("", VariableType::Number, content)
    }

    fn text(content: &str) -> Variable {
        Variable::literal("", VariableType::String, content)
    }

    fn cmp(value1: Variable, op: Comparator, value2: Variable) -> Comparison {
        Comparison { value1, op, value2 }
    }

    fn branch(handle: &str, connector: Connector, conditions: Vec<Comparison>) -> Branch {
        Branch {
            handle: handle.to_string(),
            connector,
            conditions,
        }
    }

    #[tokio::test]
    async fn false_guard_falls_through_to_else() {
        let branches = vec![
            branch("if", Connector::And, vec![cmp(number("5"), Comparator::Eq, number("3"))]),
            branch("else", Connector::And, vec![]),
        ];
        let selected = select_branch(&branches, &TableResolver::new()).await.expect("select");
        assert_eq!(selected.handle, "else");
    }

    #[tokio::test]
    async fn first_matching_branch_wins() {
        let branches = vec![
            branch("small", Connector::And, vec![cmp(number("5"), Comparator::Lt, number("3"))]),
            branch("big", Connector::And, vec![cmp(number("5"), Comparator::Ge, number("5"))]),
            branch("bigger", Connector::And, vec![cmp(number("5"), Comparator::Gt, number("1"))]),
            branch("else", Connector::And, vec![]),
        ];
        let selected = select_branch(&branches, &TableResolver::new()).await.expect("select");
        assert_eq!(selected.handle, "big");
    }

    #[tokio::test]
    async fn and_short_circuits_on_first_false() {
        let resolver = TableResolver::new();
        let guard = branch(
            "if",
            Connector::And,
            vec![
                cmp(text("a"), Comparator::Eq, text("b")),
                cmp(text("never"), Comparator::Eq, text("read")),
            ],
        );
        assert!(!evaluate_branch(&guard, &resolver).await.expect("evaluate"));
        assert_eq!(resolver.asked(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn or_short_circuits_on_first_true() {
        let resolver = TableResolver::new();
        let guard = branch(
            "if",
            Connector::Or,
            vec![
                cmp(text("a"), Comparator::Ne, text("b")),
                cmp(text("never"), Comparator::Eq, text("read")),
            ],
        );
        assert!(evaluate_branch(&guard, &resolver).await.expect("evaluate"));
        assert_eq!(resolver.asked(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn or_needs_one_true_and_and_needs_all() {
        let resolver = TableResolver::new();
        let mixed = vec![
            cmp(text("x"), Comparator::Eq, text("y")),
            cmp(text("hello"), Comparator::Contains, text("ell")),
        ];
        assert!(evaluate_branch(&branch("b", Connector::Or, mixed.clone()), &resolver).await.expect("or"));
        assert!(!evaluate_branch(&branch("b", Connector::And, mixed), &resolver).await.expect("and"));
        assert!(evaluate_branch(&branch("b", Connector::And, vec![]), &resolver).await.expect("empty and"));
        assert!(!evaluate_branch(&branch("b", Connector::Or, vec![]), &resolver).await.expect("empty or"));
    }

    #[tokio::test]
    async fn reference_operands_use_source_types() {
        let resolver = TableResolver::new()
            .with_ref("kw", "total", Operand::new(VariableType::Number, json!(4)))
            .with_ref("kw", "keywords", Operand::new(VariableType::StringArray, json!(["a"])));
        let guard = branch(
            "if",
            Connector::And,
            vec![
                cmp(
                    Variable::reference("", VariableType::String, "kw", "total"),
                    Comparator::Gt,
                    number("3"),
                ),
                cmp(
                    Variable::reference("", VariableType::String, "kw", "keywords"),
                    Comparator::NotEmpty,
                    Variable::default(),
                ),
            ],
        );
        assert!(evaluate_branch(&guard, &resolver).await.expect("evaluate"));
    }

    #[tokio::test]
    async fn no_branches_is_an_error() {
        let err = select_branch(&[], &TableResolver::new()).await.unwrap_err();
        assert_eq!(err, ConditionError::NoBranches);
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let err = compare(
            Comparator::Eq,
            &Operand::new(VariableType::String, json!("5")),
            Some(&Operand::new(VariableType::Number, json!(5))),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConditionError::TypeMismatch {
                left: "string".to_string(),
                right: "number".to_string()
            }
        );
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let err = compare(
            Comparator::Lt,
            &Operand::new(VariableType::Number, json!("five")),
            Some(&Operand::new(VariableType::Number, json!("3"))),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConditionError::InvalidNumber {
                value: "five".to_string()
            }
        );
    }

    #[test]
    fn operators_are_checked_per_type() {
        let n = Operand::new(VariableType::Number, json!(1));
        assert!(matches!(
            compare(Comparator::Contains, &n, Some(&n)),
            Err(ConditionError::UnsupportedOperator { .. })
        ));
        let s = Operand::new(VariableType::String, json!("a"));
        assert!(matches!(
            compare(Comparator::Gt, &s, Some(&s)),
            Err(ConditionError::UnsupportedOperator { .. })
        ));
        let arr = Operand::new(VariableType::NumberArray, json!("[1, 2]"));
        assert!(matches!(
            compare(Comparator::Eq, &arr, Some(&arr)),
            Err(ConditionError::UnsupportedOperator { .. })
        ));
        let file = Operand::new(VariableType::File, json!("12"));
        assert!(matches!(
            compare(Comparator::Eq, &file, Some(&file)),
            Err(ConditionError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn string_and_array_emptiness() {
        let empty = Operand::new(VariableType::String, JsonValue::Null);
        assert!(compare(Comparator::Empty, &empty, None).expect("empty"));

        let arr = Operand::new(VariableType::StringArray, json!("[]"));
        assert!(compare(Comparator::Empty, &arr, None).expect("empty array"));
        let arr = Operand::new(VariableType::NumberArray, json!([1, 2]));
        assert!(compare(Comparator::NotEmpty, &arr, None).expect("non-empty array"));

        let bad = Operand::new(VariableType::StringArray, json!("not json"));
        assert!(matches!(
            compare(Comparator::Empty, &bad, None),
            Err(ConditionError::InvalidArray { .. })
        ));
    }

    #[test]
    fn parses_editor_branch_json() {
        let branch: Branch = serde_json::from_value(json!({
            "handle": "b-1",
            "connector": "or",
            "conditions": [{
                "value1": {"type": "number", "value": {"type": "ref", "sourceNode": "kw", "sourceName": "total"}},
                "op": ">=",
                "value2": {"type": "number", "value": {"type": "literal", "content": "2"}}
            }]
        }))
        .expect("parse");
        assert_eq!(branch.connector, Connector::Or);
        assert_eq!(branch.conditions[0].op, Comparator::Ge);
    }
}
