//! Standards-coverage aggregation and gap detection.
//!
//! Coverage is derived fresh from current rows on every request; nothing
//! here is persisted or cached. At single-classroom volumes the fold is
//! O(tags) and not worth more machinery.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::resolve::ClassRef;

/// A standard is stale when its most recent hit is this many days or more
/// before the as-of date.
pub const STALE_AFTER_DAYS: i64 = 28;

/// One activity-to-standard tag joined to its activity's class and date.
/// Rows with a missing class or date come from unscheduled activities (or
/// a tag whose activity was deleted out from under it) and are skipped.
#[derive(Debug, Clone)]
pub struct TagRow {
    pub class_id: Option<String>,
    pub standard_id: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardRef {
    pub id: String,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Covered,
    Stale,
    NeverCovered,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardCoverage {
    pub standard_id: String,
    pub code: String,
    pub hit_count: i64,
    pub last_hit_date: Option<NaiveDate>,
    pub status: CoverageStatus,
}

impl StandardCoverage {
    pub fn is_gap(&self) -> bool {
        self.status != CoverageStatus::Covered
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCoverage {
    pub class_id: String,
    pub class_name: String,
    pub total_standards: usize,
    pub covered_count: usize,
    pub coverage_pct: i64,
    pub standards: Vec<StandardCoverage>,
}

/// Fold tag rows into per-class, per-standard coverage.
///
/// Every standard is evaluated against every class; no subject or grade
/// filtering happens at this layer. Output ordering follows the input
/// ordering of `classes` then `standards`, so callers that pre-sort get
/// stable results.
pub fn compute_coverage(
    tags: &[TagRow],
    standards: &[StandardRef],
    classes: &[ClassRef],
    as_of: NaiveDate,
) -> Vec<ClassCoverage> {
    let mut hits: HashMap<(String, String), (i64, NaiveDate)> = HashMap::new();
    for tag in tags {
        let (Some(class_id), Some(date)) = (tag.class_id.as_ref(), tag.date) else {
            continue;
        };
        let entry = hits
            .entry((class_id.clone(), tag.standard_id.clone()))
            .or_insert((0, date));
        entry.0 += 1;
        if date > entry.1 {
            entry.1 = date;
        }
    }

    let mut out = Vec::with_capacity(classes.len());
    for class in classes {
        let mut rows = Vec::with_capacity(standards.len());
        let mut covered_count = 0usize;
        for standard in standards {
            let key = (class.id.clone(), standard.id.clone());
            let (hit_count, last_hit_date) = match hits.get(&key) {
                Some((n, d)) => (*n, Some(*d)),
                None => (0, None),
            };
            if hit_count > 0 {
                covered_count += 1;
            }
            let status = classify(hit_count, last_hit_date, as_of);
            rows.push(StandardCoverage {
                standard_id: standard.id.clone(),
                code: standard.code.clone(),
                hit_count,
                last_hit_date,
                status,
            });
        }
        let coverage_pct = if standards.is_empty() {
            0
        } else {
            (100.0 * covered_count as f64 / standards.len() as f64).round() as i64
        };
        out.push(ClassCoverage {
            class_id: class.id.clone(),
            class_name: class.name.clone(),
            total_standards: standards.len(),
            covered_count,
            coverage_pct,
            standards: rows,
        });
    }
    out
}

fn classify(hit_count: i64, last_hit_date: Option<NaiveDate>, as_of: NaiveDate) -> CoverageStatus {
    match last_hit_date {
        None => CoverageStatus::NeverCovered,
        _ if hit_count == 0 => CoverageStatus::NeverCovered,
        Some(last) => {
            if as_of.signed_duration_since(last).num_days() >= STALE_AFTER_DAYS {
                CoverageStatus::Stale
            } else {
                CoverageStatus::Covered
            }
        }
    }
}
