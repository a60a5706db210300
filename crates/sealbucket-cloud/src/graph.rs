//! Dependency ordering over recorded resources

use crate::error::{CloudError, Result};
use crate::state::StackState;
use std::collections::{BTreeMap, BTreeSet};

/// Order in which the resources of `state` can be deleted.
///
/// Every resource appears before all of its dependencies. Dependencies that
/// are not recorded in the state are ignored. Ties are broken by key.
pub fn destroy_order(state: &StackState) -> Result<Vec<String>> {
    let keys: BTreeSet<&str> = state.resources.keys().map(String::as_str).collect();
    destroy_order_of(state, &keys)
}

/// Same as [`destroy_order`], restricted to `keys`.
pub fn destroy_order_of<'a>(
    state: &'a StackState,
    keys: &BTreeSet<&'a str>,
) -> Result<Vec<String>> {
    // Number of remaining resources that still depend on each key
    let mut dependents: BTreeMap<&'a str, usize> = keys.iter().map(|k| (*k, 0)).collect();
    for key in keys {
        if let Some(resource) = state.resources.get(*key) {
            for dep in &resource.dependencies {
                if let Some(count) = dependents.get_mut(dep.as_str()) {
                    *count += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<&'a str> = dependents
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(key, _)| *key)
        .collect();
    let mut order = Vec::with_capacity(keys.len());

    while let Some(key) = ready.pop_first() {
        order.push(key.to_string());
        dependents.remove(key);

        if let Some(resource) = state.resources.get(key) {
            for dep in &resource.dependencies {
                if let Some(count) = dependents.get_mut(dep.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dep.as_str());
                    }
                }
            }
        }
    }

    if !dependents.is_empty() {
        let stuck: Vec<&str> = dependents.keys().copied().collect();
        return Err(CloudError::DependencyCycle(stuck.join(", ")));
    }

    Ok(order)
}
