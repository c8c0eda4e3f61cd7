use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

/// Users above this total allocation are flagged in the report.
pub const FULL_ALLOCATION: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLine {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub allocation: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: i64,
    pub name: String,
    pub client_name: Option<String>,
    pub status: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub resources: Vec<ResourceLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAllocation {
    pub user_id: i64,
    pub username: String,
    pub total_allocation: i64,
    pub project_count: usize,
    pub over_allocated: bool,
}

/// Staffing snapshot for one Monday-to-Sunday week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyResourceReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub generated_at: NaiveDateTime,
    pub projects: Vec<ProjectSummary>,
    pub allocations: Vec<UserAllocation>,
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    project_id: i64,
    project_name: String,
    client_name: Option<String>,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    user_id: Option<i64>,
    username: Option<String>,
    role: Option<String>,
    allocation: Option<i64>,
}

pub fn week_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

impl WeeklyResourceReport {
    /// Active projects overlapping the week containing `day`, with the
    /// resources whose assignment also overlaps it.
    #[instrument(skip(pool))]
    pub async fn generate(pool: &Pool<Sqlite>, day: NaiveDate) -> Result<Self, AppError> {
        let (week_start, week_end) = week_bounds(day);
        info!(%week_start, %week_end, "Generating weekly resource report");

        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT p.id AS project_id, p.name AS project_name, c.name AS client_name, p.status,
                    p.start_date, p.end_date,
                    pr.user_id, u.username, pr.role, pr.allocation
             FROM projects p
             LEFT JOIN clients c ON c.id = p.client_id
             LEFT JOIN project_resources pr ON pr.project_id = p.id
                AND (pr.start_date IS NULL OR pr.start_date <= ?2)
                AND (pr.end_date IS NULL OR pr.end_date >= ?1)
             LEFT JOIN users u ON u.id = pr.user_id
             WHERE p.status = 'active'
               AND (p.start_date IS NULL OR p.start_date <= ?2)
               AND (p.end_date IS NULL OR p.end_date >= ?1)
             ORDER BY p.name, u.username",
        )
        .bind(week_start)
        .bind(week_end)
        .fetch_all(pool)
        .await?;

        Ok(Self::from_rows(week_start, week_end, rows))
    }

    fn from_rows(week_start: NaiveDate, week_end: NaiveDate, rows: Vec<ReportRow>) -> Self {
        let mut projects: Vec<ProjectSummary> = Vec::new();
        let mut totals: BTreeMap<i64, UserAllocation> = BTreeMap::new();

        for row in rows {
            if projects.last().map(|p| p.project_id) != Some(row.project_id) {
                projects.push(ProjectSummary {
                    project_id: row.project_id,
                    name: row.project_name,
                    client_name: row.client_name,
                    status: row.status,
                    start_date: row.start_date,
                    end_date: row.end_date,
                    resources: Vec::new(),
                });
            }

            let (Some(user_id), Some(username), Some(role), Some(allocation)) =
                (row.user_id, row.username, row.role, row.allocation)
            else {
                continue;
            };

            let entry = totals.entry(user_id).or_insert_with(|| UserAllocation {
                user_id,
                username: username.clone(),
                total_allocation: 0,
                project_count: 0,
                over_allocated: false,
            });
            entry.total_allocation += allocation;
            entry.project_count += 1;
            entry.over_allocated = entry.total_allocation > FULL_ALLOCATION;

            if let Some(project) = projects.last_mut() {
                project.resources.push(ResourceLine {
                    user_id,
                    username,
                    role,
                    allocation,
                });
            }
        }

        let mut allocations: Vec<UserAllocation> = totals.into_values().collect();
        allocations.sort_by(|a, b| {
            b.total_allocation
                .cmp(&a.total_allocation)
                .then_with(|| a.username.cmp(&b.username))
        });

        Self {
            week_start,
            week_end,
            generated_at: Utc::now().naive_utc(),
            projects,
            allocations,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "Weekly resource report: {} to {}",
            self.week_start, self.week_end
        )
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.subject());
        let _ = writeln!(out);

        if self.projects.is_empty() {
            let _ = writeln!(out, "No active projects this week.");
        }
        for project in &self.projects {
            let client = project.client_name.as_deref().unwrap_or("No client");
            let _ = writeln!(out, "{} ({})", project.name, client);
            if project.resources.is_empty() {
                let _ = writeln!(out, "  no resources assigned");
            }
            for r in &project.resources {
                let _ = writeln!(out, "  - {} | {} | {}%", r.username, r.role, r.allocation);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Allocation by person:");
        for a in &self.allocations {
            let flag = if a.over_allocated { " (over-allocated)" } else { "" };
            let _ = writeln!(
                out,
                "  {}: {}% across {} project(s){}",
                a.username, a.total_allocation, a.project_count, flag
            );
        }
        out
    }

    pub fn render_html(&self, base_url: Option<&str>) -> String {
        let mut out = String::new();
        let _ = write!(out, "<h1>{}</h1>", escape(&self.subject()));

        if self.projects.is_empty() {
            out.push_str("<p>No active projects this week.</p>");
        }
        for project in &self.projects {
            let title = match base_url {
                Some(base) => format!(
                    "<a href=\"{}/projects/{}\">{}</a>",
                    escape(base.trim_end_matches('/')),
                    project.project_id,
                    escape(&project.name)
                ),
                None => escape(&project.name),
            };
            let _ = write!(
                out,
                "<h2>{} <small>{}</small></h2>",
                title,
                escape(project.client_name.as_deref().unwrap_or("No client"))
            );
            out.push_str("<table><tr><th>Name</th><th>Role</th><th>Allocation</th></tr>");
            for r in &project.resources {
                let _ = write!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{}%</td></tr>",
                    escape(&r.username),
                    escape(&r.role),
                    r.allocation
                );
            }
            out.push_str("</table>");
        }

        out.push_str("<h2>Allocation by person</h2><ul>");
        for a in &self.allocations {
            let style = if a.over_allocated { " style=\"color:#b00\"" } else { "" };
            let _ = write!(
                out,
                "<li{}>{}: {}% across {} project(s)</li>",
                style,
                escape(&a.username),
                a.total_allocation,
                a.project_count
            );
        }
        out.push_str("</ul>");
        out
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
