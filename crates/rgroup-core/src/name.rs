//! Fully-qualified group name resolution

use crate::error::{ResourceGroupError, Result};

/// Join the configured root and a short group name as `root/short`
///
/// Fails with `ConfigurationMissing` when the root is unset or empty. No
/// escaping is done; characters the facility cannot accept are rejected
/// later, at commit time.
pub fn resolve(root: Option<&str>, short_name: &str) -> Result<String> {
    let root = match root {
        Some(root) if !root.is_empty() => root,
        _ => return Err(ResourceGroupError::ConfigurationMissing),
    };

    if short_name.is_empty() {
        return Err(ResourceGroupError::EmptyGroupName);
    }

    let mut full = String::with_capacity(root.len() + 1 + short_name.len());
    full.push_str(root);
    full.push('/');
    full.push_str(short_name);
    Ok(full)
}
