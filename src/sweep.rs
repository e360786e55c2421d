//! Sweep expansion.
//!
//! The first declared axis varies slowest and the last varies fastest, so the
//! same definition always yields the same submission order.

use crate::error::ConfigError;
use crate::model::{InvariantParams, RunSpec, SweepAxis};
use std::collections::HashSet;
use std::sync::Arc;

/// Reject axes whose cross product would be empty or contain duplicate runs.
pub fn validate_axes(axes: &[SweepAxis]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for axis in axes {
        let name = axis.name.trim_start_matches('-').replace('_', "-");
        if name.is_empty() {
            return Err(ConfigError::InvalidAxis {
                axis: axis.name.clone(),
                reason: "axis name is empty".into(),
            });
        }
        if !names.insert(name) {
            return Err(ConfigError::InvalidAxis {
                axis: axis.name.clone(),
                reason: "declared more than once".into(),
            });
        }
        if axis.values.is_empty() {
            return Err(ConfigError::InvalidAxis {
                axis: axis.name.clone(),
                reason: "no values".into(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = axis.values.iter().find(|v| !seen.insert(v.as_str())) {
            return Err(ConfigError::InvalidAxis {
                axis: axis.name.clone(),
                reason: format!("value `{dup}` listed more than once"),
            });
        }
    }
    Ok(())
}

/// Expand axes into one `RunSpec` per combination, in sweep order.
pub fn expand(
    axes: &[SweepAxis],
    invariants: InvariantParams,
    tag: &str,
) -> Result<Vec<RunSpec>, ConfigError> {
    validate_axes(axes)?;
    let invariants = Arc::new(invariants);
    let total: usize = axes.iter().map(|a| a.values.len()).product();

    let mut combos: Vec<Vec<(String, String)>> = vec![Vec::with_capacity(axes.len())];
    for axis in axes {
        let mut next = Vec::with_capacity(combos.len() * axis.values.len());
        for combo in &combos {
            for value in &axis.values {
                let mut c = combo.clone();
                c.push((axis.name.clone(), value.clone()));
                next.push(c);
            }
        }
        combos = next;
    }
    debug_assert_eq!(combos.len(), total);

    Ok(combos
        .into_iter()
        .enumerate()
        .map(|(index, axis_values)| RunSpec {
            index,
            tag: tag.to_string(),
            axis_values,
            invariants: invariants.clone(),
        })
        .collect())
}
