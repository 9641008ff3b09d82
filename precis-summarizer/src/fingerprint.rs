use sha2::{Digest, Sha256};

use crate::options::SummaryOptions;

/// Namespace every summary cache key lives under.
pub const CACHE_NAMESPACE: &str = "summary:";

/// Deterministic cache key for a request: `summary:<sha256 hex>`.
///
/// Only `max_length` and `style` are hashed, in a fixed textual layout ahead of
/// the text, so a new field on [`SummaryOptions`] cannot silently change keys.
pub fn fingerprint(text: &str, options: &SummaryOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "max_length={};style={}\n",
            options.max_length,
            options.style.as_str()
        )
        .as_bytes(),
    );
    hasher.update(text.as_bytes());
    format!("{CACHE_NAMESPACE}{}", hex::encode(hasher.finalize()))
}
