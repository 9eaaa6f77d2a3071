//! Branch Conditions
//!
//! Evaluates the condition of a `branch` step. `variable_equals` is a pure
//! lookup in the run's variables; the element conditions search a freshly
//! fetched UI snapshot.

use std::str::FromStr;

use log::debug;

use super::{StepError, VariableStore};
use crate::device::SnapshotProvider;
use crate::workflow::model::Selector;

const STEP_TYPE: &str = "branch";

/// Supported condition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    VariableEquals,
    Exists,
    NotExists,
    TextEquals,
    TextContains,
}

impl FromStr for ConditionKind {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "variable_equals" => Ok(Self::VariableEquals),
            "exists" => Ok(Self::Exists),
            "not_exists" => Ok(Self::NotExists),
            "text_equals" => Ok(Self::TextEquals),
            "text_contains" => Ok(Self::TextContains),
            other => Err(StepError::UnknownCondition(other.to_string())),
        }
    }
}

/// Parameters of a branch step, borrowed from its definition.
#[derive(Debug, Clone, Copy)]
pub struct BranchParams<'a> {
    pub condition: Option<&'a str>,
    pub selector: Option<&'a Selector>,
    pub variable_name: Option<&'a str>,
    pub expected_value: Option<&'a str>,
}

/// Evaluates a branch condition.
///
/// `Ok(bool)` is the condition value. Configuration problems are returned
/// before any device I/O; snapshot failures surface as device errors.
pub async fn evaluate_condition(
    params: BranchParams<'_>,
    vars: &VariableStore,
    snapshots: Option<&dyn SnapshotProvider>,
    serial: &str,
) -> Result<bool, StepError> {
    let condition = params
        .condition
        .ok_or_else(|| StepError::missing(STEP_TYPE, &["condition"]))?;
    let kind: ConditionKind = condition.parse()?;
    let expected = params.expected_value.map(|v| vars.substitute(v));

    if kind == ConditionKind::VariableEquals {
        let name = params
            .variable_name
            .ok_or_else(|| StepError::missing(STEP_TYPE, &["variable_name"]))?;
        let actual = vars.get(name).unwrap_or("");
        let expected = expected.unwrap_or_default();
        debug!("variable_equals: {}='{}' vs '{}'", name, actual, expected);
        return Ok(actual == expected);
    }

    let selector = params
        .selector
        .ok_or_else(|| StepError::missing(STEP_TYPE, &["selector"]))?;
    let expected = match kind {
        ConditionKind::TextEquals | ConditionKind::TextContains => Some(
            expected.ok_or_else(|| StepError::missing(STEP_TYPE, &["expected_value"]))?,
        ),
        _ => None,
    };
    let snapshots = snapshots.ok_or(StepError::Unavailable("snapshot provider"))?;

    let selector = Selector::new(selector.by, vars.substitute(&selector.value));
    let snapshot = snapshots.snapshot(serial).await?;
    let element = snapshot.lookup(&selector);
    debug!("{:?} {}: found={}", kind, selector, element.is_some());

    let outcome = match (kind, element, expected) {
        (ConditionKind::Exists, element, _) => element.is_some(),
        (ConditionKind::NotExists, element, _) => element.is_none(),
        (ConditionKind::TextEquals, Some(element), Some(expected)) => element.text == expected,
        (ConditionKind::TextContains, Some(element), Some(expected)) => {
            element.text.contains(expected.as_str())
        }
        _ => false,
    };
    Ok(outcome)
}
