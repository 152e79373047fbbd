//! Fixed news category taxonomy
//!
//! Enrichment results name sub-categories; only names present here are kept.
//! The database seeds the same tree on startup.

use serde::{Deserialize, Serialize};

/// Sub-category assigned when enrichment names none that resolve
pub const DEFAULT_SUB_CATEGORY: &str = "featured";

/// Major categories in display order, each with its sub-categories
pub const CATEGORY_TAXONOMY: &[(&str, &[&str])] = &[
    ("politics", &[]),
    ("economy", &["finance", "real-estate", "industry", "consumer"]),
    ("society", &["incidents", "labor-welfare", "education", "environment", "courts"]),
    (
        "life-culture",
        &["food", "travel", "fashion-beauty", "health", "religion", "family", "performing-arts"],
    ),
    ("world", &["asia-middle-east", "americas-europe-africa", "international-organizations"]),
    ("it-science", &["internet", "mobile", "games", "ai", "science"]),
    ("entertainment", &["broadcasting", "film", "music", "celebrities"]),
    ("sports", &["football", "baseball", "basketball-volleyball", "golf", "sports-general"]),
    ("opinion", &[]),
    ("weather", &[]),
    ("local", &[]),
    ("other", &[DEFAULT_SUB_CATEGORY]),
];

/// One major category and its sub-categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorCategory {
    pub name: String,
    pub sub_categories: Vec<String>,
}

/// The taxonomy as owned values
pub fn taxonomy() -> Vec<MajorCategory> {
    CATEGORY_TAXONOMY
        .iter()
        .map(|(major, subs)| MajorCategory {
            name: major.to_string(),
            sub_categories: subs.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}

/// Major category owning `sub_category`
pub fn major_of(sub_category: &str) -> Option<&'static str> {
    CATEGORY_TAXONOMY
        .iter()
        .find(|(_, subs)| subs.contains(&sub_category))
        .map(|(major, _)| *major)
}
