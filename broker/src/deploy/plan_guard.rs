//! Rejects plans that would destroy resources

use std::sync::LazyLock;

use regex::Regex;

use crate::deploy::executor::ExecutionOutput;
use crate::errors::{BrokerError, Result};

static PLAN_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plan: \d+ to add, \d+ to change, (\d+) to destroy\.").expect("valid regex")
});

/// Fail with `PlanGuardFailure` when the plan summary destroys anything
pub fn check_plan(output: &ExecutionOutput) -> Result<()> {
    let Some(captures) = PLAN_SUMMARY.captures(&output.stdout) else {
        return Ok(());
    };

    match captures.get(1).map(|m| m.as_str()) {
        Some(count) if count.trim_start_matches('0').is_empty() => Ok(()),
        _ => Err(BrokerError::PlanGuardFailure),
    }
}
