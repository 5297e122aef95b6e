//! The static tool catalog.
//!
//! Loaded once at startup from the bundled dataset (or a path configured
//! under `[catalog] dataset`) and immutable afterwards. Everything that
//! browses, favorites, or compares tools works against this list; user
//! content lives in the storage backend instead.

use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::config::CatalogConfig;
use crate::models::Tool;
use crate::query::PricingTier;

const BUNDLED: &str = include_str!("../data/tools.json");

/// Load and validate the catalog.
pub fn load(config: &CatalogConfig) -> Result<Vec<Tool>> {
    let raw = match &config.dataset {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset: {}", path.display()))?,
        None => BUNDLED.to_string(),
    };

    let tools: Vec<Tool> = serde_json::from_str(&raw).context("Failed to parse tool dataset")?;

    let mut seen = HashSet::new();
    for tool in &tools {
        if !seen.insert(tool.id) {
            anyhow::bail!("duplicate tool id in dataset: {}", tool.id);
        }
        if tool.popularity > 100 {
            anyhow::bail!("tool {} popularity out of range: {}", tool.id, tool.popularity);
        }
    }

    Ok(tools)
}

/// Distinct categories present in the catalog, sorted.
pub fn categories(tools: &[Tool]) -> Vec<String> {
    let mut cats: Vec<String> = tools
        .iter()
        .map(|t| t.category.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    cats.sort();
    cats
}

pub fn find(tools: &[Tool], id: i64) -> Option<&Tool> {
    tools.iter().find(|t| t.id == id)
}

/// Pricing labels that match none of the non-wildcard tiers.
///
/// The tier tests are substring heuristics over free-text labels, so an
/// uncurated label can silently fall outside every bracket. This check
/// exists for dataset curation, not for filtering.
pub fn audit_pricing_labels(tools: &[Tool]) -> Vec<(i64, String)> {
    tools
        .iter()
        .filter(|t| {
            let label = &t.pricing;
            ![PricingTier::Free, PricingTier::Paid, PricingTier::Freemium]
                .iter()
                .any(|tier| tier.matches(label))
        })
        .map(|t| (t.id, t.pricing.clone()))
        .collect()
}
