//! Query-to-source routing.
//!
//! Maps a free-text query to topical categories by case-insensitive
//! keyword matching, extracts product versions mentioned near product
//! names, and resolves the categories to concrete knowledge-source
//! locators — preferring an exact version-table entry over a
//! category's generic locator list.
//!
//! Matching is table-driven on purpose. A misrouted query degrades
//! answer quality with no visible error, so the rules must be
//! auditable and extensible by editing the config table.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use regex::Regex;

use crate::config::{RoutingConfig, VersionRule};
use crate::models::KnowledgeSourceLocator;

struct Category {
    name: String,
    keywords: Vec<String>,
    locators: Vec<String>,
}

struct ProductMatcher {
    product: String,
    pattern: Regex,
}

pub struct SourceRouter {
    fallback: String,
    categories: Vec<Category>,
    versions: Vec<VersionRule>,
    products: Vec<ProductMatcher>,
    max_locators: usize,
}

impl SourceRouter {
    pub fn new(routing: &RoutingConfig, max_locators: usize) -> Result<Self> {
        let categories = routing
            .categories
            .iter()
            .map(|c| Category {
                name: c.name.clone(),
                keywords: c.keywords.iter().map(|k| k.to_lowercase()).collect(),
                locators: c.locators.clone(),
            })
            .collect();

        // One matcher per distinct product in the version table:
        // the product name, then a version number within a short span.
        let mut products = Vec::new();
        let mut seen = HashSet::new();
        for rule in &routing.versions {
            if !seen.insert(rule.product.clone()) {
                continue;
            }
            let pattern = Regex::new(&format!(
                r"(?i){}[^0-9]{{0,40}}?(\d+(?:\.\d+)*)",
                regex::escape(&rule.product)
            ))?;
            products.push(ProductMatcher {
                product: rule.product.clone(),
                pattern,
            });
        }

        Ok(Self {
            fallback: routing.fallback.clone(),
            categories,
            versions: routing.versions.clone(),
            products,
            max_locators,
        })
    }

    /// Categories whose keyword lists match the query, in table order.
    /// A query matching nothing routes to the fallback category.
    pub fn classify(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();

        let matched: Vec<String> = self
            .categories
            .iter()
            .filter(|c| c.keywords.iter().any(|k| query_lower.contains(k)))
            .map(|c| c.name.clone())
            .collect();

        if matched.is_empty() {
            vec![self.fallback.clone()]
        } else {
            matched
        }
    }

    /// Version mentioned for each known product, or None. When a query
    /// names a product several times, the most specific version (most
    /// dotted segments) wins; ties go to the earliest mention.
    pub fn extract_versions(&self, query: &str) -> HashMap<String, Option<String>> {
        let mut versions = HashMap::new();

        for matcher in &self.products {
            let mut best: Option<String> = None;
            for caps in matcher.pattern.captures_iter(query) {
                let found = caps[1].to_string();
                let more_specific = match &best {
                    None => true,
                    Some(current) => {
                        found.matches('.').count() > current.matches('.').count()
                    }
                };
                if more_specific {
                    best = Some(found);
                }
            }
            versions.insert(matcher.product.clone(), best);
        }

        versions
    }

    /// Resolve categories to an ordered locator list. Per category, an
    /// exact version-table hit replaces the generic list; locators are
    /// deduplicated first-seen and capped at the configured maximum.
    pub fn resolve_locators(
        &self,
        categories: &[String],
        versions: &HashMap<String, Option<String>>,
    ) -> Vec<KnowledgeSourceLocator> {
        let mut locators = Vec::new();
        let mut seen = HashSet::new();

        for name in categories {
            let versioned = versions
                .get(name)
                .and_then(|v| v.as_deref())
                .and_then(|v| {
                    self.versions
                        .iter()
                        .find(|rule| rule.product == *name && rule.version == v)
                });

            if let Some(rule) = versioned {
                if seen.insert(rule.locator.clone()) {
                    locators.push(KnowledgeSourceLocator {
                        url: rule.locator.clone(),
                        category: name.clone(),
                        version: Some(rule.version.clone()),
                    });
                }
                continue;
            }

            if let Some(category) = self.categories.iter().find(|c| c.name == *name) {
                for url in &category.locators {
                    if seen.insert(url.clone()) {
                        locators.push(KnowledgeSourceLocator {
                            url: url.clone(),
                            category: name.clone(),
                            version: None,
                        });
                    }
                }
            }
        }

        locators.truncate(self.max_locators);
        locators
    }

    /// Full routing pass: classify, extract versions, resolve.
    pub fn route(&self, query: &str) -> Vec<KnowledgeSourceLocator> {
        let categories = self.classify(query);
        let versions = self.extract_versions(query);
        self.resolve_locators(&categories, &versions)
    }
}
