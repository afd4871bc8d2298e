//! Generated instance names.

use chrono::Utc;
use uuid::Uuid;

const SUFFIX_LEN: usize = 10;

/// Build a unique instance name of the form `{prefix}-{MMDDYY}-{suffix}`.
///
/// GKE and GCE names must be lowercase RFC-1035 labels, so the suffix is
/// drawn from the hex form of a v4 UUID.
#[must_use]
pub fn generate(prefix: &str) -> String {
    let date = Utc::now().format("%m%d%y");
    let entropy = Uuid::new_v4().simple().to_string();
    let suffix: String = entropy.chars().take(SUFFIX_LEN).collect();
    format!("{prefix}-{date}-{suffix}")
}
