pub mod session_cache;

pub use session_cache::{CacheChange, SessionCache, SubscriptionId};

use std::fs;
use std::path::Path;

/// Ensure the directory holding `path` exists
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
