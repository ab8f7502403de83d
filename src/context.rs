//! Teaching-context snapshot fed into AI prompt construction.
//!
//! A fan-out over a few small queries: classes, the last two weeks of
//! activities, the next week of calendar events, and current gap
//! standards. Everything is assembled from one connection borrow inside a
//! single `DbHandle::call`.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::coverage::{self, StandardRef, TagRow};
use crate::resolve::ClassRef;

const RECENT_DAYS: i64 = 14;
const UPCOMING_DAYS: i64 = 7;
const MAX_GAPS_PER_CLASS: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextActivity {
    pub class_name: String,
    pub date: String,
    pub title: String,
    pub activity_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEvent {
    pub date: String,
    pub title: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextGap {
    pub class_name: String,
    pub code: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingContext {
    pub today: NaiveDate,
    pub class_names: Vec<String>,
    pub recent_activities: Vec<ContextActivity>,
    pub upcoming_events: Vec<ContextEvent>,
    pub gap_standards: Vec<ContextGap>,
}

pub fn build_context(conn: &Connection, today: NaiveDate) -> Result<TeachingContext> {
    let classes = load_classes(conn)?;
    let class_names = classes.iter().map(|c| c.name.clone()).collect();

    let since = (today - Duration::days(RECENT_DAYS)).to_string();
    let mut stmt = conn.prepare(
        "SELECT c.name, a.date, a.title, a.activity_type
         FROM activities a JOIN classes c ON c.id = a.class_id
         WHERE a.date IS NOT NULL AND a.date >= ? AND a.date <= ?
         ORDER BY a.date",
    )?;
    let recent_activities = stmt
        .query_map([&since, &today.to_string()], |r| {
            Ok(ContextActivity {
                class_name: r.get(0)?,
                date: r.get(1)?,
                title: r.get(2)?,
                activity_type: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let until = (today + Duration::days(UPCOMING_DAYS)).to_string();
    let mut stmt = conn.prepare(
        "SELECT date, title, kind FROM calendar_events
         WHERE date >= ? AND date <= ? ORDER BY date",
    )?;
    let upcoming_events = stmt
        .query_map([&today.to_string(), &until], |r| {
            Ok(ContextEvent {
                date: r.get(0)?,
                title: r.get(1)?,
                kind: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let gap_standards = load_gaps(conn, &classes, today)?;

    Ok(TeachingContext {
        today,
        class_names,
        recent_activities,
        upcoming_events,
        gap_standards,
    })
}

pub fn load_classes(conn: &Connection) -> Result<Vec<ClassRef>> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY id")?;
    let classes = stmt
        .query_map([], |r| {
            Ok(ClassRef {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(classes)
}

pub fn load_standards(conn: &Connection, subject: Option<&str>) -> Result<Vec<StandardRef>> {
    let base = "SELECT id, code, description FROM standards";
    let order = " ORDER BY subject, grade_band, code";
    let mut out = Vec::new();
    match subject {
        Some(subject) => {
            let sql = format!("{} WHERE subject = ?{}", base, order);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([subject], standard_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let sql = format!("{}{}", base, order);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], standard_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn standard_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StandardRef> {
    Ok(StandardRef {
        id: r.get(0)?,
        code: r.get(1)?,
        description: r.get(2)?,
    })
}

pub fn load_tag_rows(conn: &Connection) -> Result<Vec<TagRow>> {
    let mut stmt = conn.prepare(
        "SELECT a.class_id, t.standard_id, a.date
         FROM activity_standard_tags t
         JOIN activities a ON a.id = t.activity_id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(class_id, standard_id, date)| TagRow {
            class_id,
            standard_id,
            // unparseable dates are treated like missing ones
            date: date.and_then(|d| d.parse().ok()),
        })
        .collect())
}

fn load_gaps(conn: &Connection, classes: &[ClassRef], today: NaiveDate) -> Result<Vec<ContextGap>> {
    let standards = load_standards(conn, None)?;
    let tags = load_tag_rows(conn)?;
    let per_class = coverage::compute_coverage(&tags, &standards, classes, today);

    let mut gaps = Vec::new();
    for class in per_class {
        for row in class
            .standards
            .iter()
            .filter(|s| s.is_gap())
            .take(MAX_GAPS_PER_CLASS)
        {
            gaps.push(ContextGap {
                class_name: class.class_name.clone(),
                code: row.code.clone(),
                status: match row.status {
                    coverage::CoverageStatus::Stale => "stale".to_string(),
                    _ => "never_covered".to_string(),
                },
            });
        }
    }
    Ok(gaps)
}

impl TeachingContext {
    /// Flatten the snapshot into prompt text for the generation calls.
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Today is {}.\n", self.today));
        if !self.class_names.is_empty() {
            out.push_str(&format!("Classes: {}.\n", self.class_names.join(", ")));
        }
        if !self.recent_activities.is_empty() {
            out.push_str("Recent activities:\n");
            for a in &self.recent_activities {
                out.push_str(&format!(
                    "- {} [{}] {} ({})\n",
                    a.date, a.class_name, a.title, a.activity_type
                ));
            }
        }
        if !self.upcoming_events.is_empty() {
            out.push_str("Upcoming calendar events:\n");
            for e in &self.upcoming_events {
                out.push_str(&format!("- {} {} ({})\n", e.date, e.title, e.kind));
            }
        }
        if !self.gap_standards.is_empty() {
            out.push_str("Standards needing attention:\n");
            for g in &self.gap_standards {
                out.push_str(&format!("- {}: {} ({})\n", g.class_name, g.code, g.status));
            }
        }
        out
    }
}
