use std::collections::HashSet;
use std::sync::Mutex;
use lazy_static::lazy_static;
use log::error;

lazy_static! {
    /// `component: description` keys of every invariant that held at least once.
    static ref CHECKED_INVARIANTS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

fn key(component: &str, description: &str) -> String {
    format!("{}: {}", component, description)
}

/// Asserts that an invariant of a project edit holds.
///
/// A violation is logged, and panics in debug and test builds. A release build
/// logs and carries on; the caller decides whether to abort the write.
/// Holding invariants are recorded so [`contract_test`] can prove they were checked.
///
/// Returns `condition`.
pub fn assert_invariant(condition: bool, description: &str, component: &str) -> bool {
    if !condition {
        let msg = format!("INVARIANT VIOLATION [{}]: {}", component, description);
        error!("{}", msg);

        if cfg!(debug_assertions) || cfg!(test) {
            panic!("{}", msg);
        }
    } else if let Ok(mut set) = CHECKED_INVARIANTS.lock() {
        set.insert(key(component, description));
    }
    condition
}

/// Panics unless every invariant in `required` was asserted (and held) for `component`.
#[cfg(test)]
pub fn contract_test(component: &str, required: &[&str]) {
    let checked = CHECKED_INVARIANTS.lock().unwrap();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|req| !checked.contains(&key(component, req)))
        .collect();

    if !missing.is_empty() {
        panic!(
            "Contract test failed for '{}'. Invariants never checked:\n{:#?}",
            component, missing
        );
    }
    log::info!("Contract test passed: {}", component);
}
