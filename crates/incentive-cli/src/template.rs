// Promo batch templates loaded from JSON files

use anyhow::{anyhow, Result};
use incentive_core::promo::check_batch_size;
use incentive_core::PromoDraft;
use std::path::Path;

/// Reads a promo template and checks its terms before anything is sent.
/// The template's `code` field, if present, is ignored by the server.
pub fn load_template(path: &Path) -> Result<PromoDraft> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read template '{}': {}", path.display(), e))?;

    let draft: PromoDraft = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse template '{}': {}", path.display(), e))?;

    draft
        .validate_terms()
        .map_err(|e| anyhow!("Invalid template '{}': {}", path.display(), e))?;

    Ok(draft)
}

/// Builds the request body for `POST /promocodes/generate`.
pub fn batch_request(
    count: usize,
    prefix: Option<&str>,
    template: &PromoDraft,
) -> Result<serde_json::Value> {
    check_batch_size(count)?;
    Ok(serde_json::json!({
        "count": count,
        "prefix": prefix,
        "template": template,
    }))
}
