use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub users: Vec<SearchHit>,
    pub skills: Vec<SearchHit>,
    pub projects: Vec<SearchHit>,
    pub clients: Vec<SearchHit>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.users.len() + self.skills.len() + self.projects.len() + self.clients.len()
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Case-insensitive substring search across the main entities.
#[instrument(skip(pool))]
pub async fn search(pool: &Pool<Sqlite>, query: &str) -> Result<SearchResults, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::Validation(
            "Search query must not be empty".to_string(),
        ));
    }
    info!("Searching");
    let pattern = like_pattern(query);

    let users = sqlx::query_as::<_, SearchHit>(
        "SELECT id, username AS title, job_title AS subtitle FROM users
         WHERE username LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'
            OR first_name LIKE ?1 ESCAPE '\\' OR last_name LIKE ?1 ESCAPE '\\'
         ORDER BY username LIMIT ?2",
    )
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    let skills = sqlx::query_as::<_, SearchHit>(
        "SELECT id, name AS title, category AS subtitle FROM skill_templates
         WHERE name LIKE ?1 ESCAPE '\\' OR category LIKE ?1 ESCAPE '\\'
            OR description LIKE ?1 ESCAPE '\\'
         ORDER BY name LIMIT ?2",
    )
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    let projects = sqlx::query_as::<_, SearchHit>(
        "SELECT id, name AS title, status AS subtitle FROM projects
         WHERE name LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
         ORDER BY name LIMIT ?2",
    )
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    let clients = sqlx::query_as::<_, SearchHit>(
        "SELECT id, name AS title, industry AS subtitle FROM clients
         WHERE name LIKE ?1 ESCAPE '\\' OR industry LIKE ?1 ESCAPE '\\'
         ORDER BY name LIMIT ?2",
    )
    .bind(&pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(SearchResults {
        users,
        skills,
        projects,
        clients,
    })
}
