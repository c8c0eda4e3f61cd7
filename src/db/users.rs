use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbUser, Role, User};
use crate::error::AppError;

const USER_COLUMNS: &str =
    "SELECT id, username, email, role, first_name, last_name, job_title, location FROM users";

/// Fields accepted when creating an account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub job_title: Option<&'a str>,
    pub location: Option<&'a str>,
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!("User with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Listing users");
    let rows = sqlx::query_as::<_, DbUser>(&format!("{} ORDER BY username", USER_COLUMNS))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

/// Returns the user when the password matches, `None` otherwise.
#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let hash: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    let Some((id, hash)) = hash else {
        return Ok(None);
    };

    match bcrypt::verify(password, &hash) {
        Ok(true) => Ok(Some(get_user(pool, id).await?)),
        _ => Ok(None),
    }
}

#[instrument(skip_all, fields(username = new_user.username, role = %new_user.role))]
pub async fn create_user(pool: &Pool<Sqlite>, new_user: NewUser<'_>) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(new_user.username)
            .bind(new_user.email)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Username '{}' or email '{}' already exists",
            new_user.username, new_user.email
        )));
    }

    let hashed_password = bcrypt::hash(new_user.password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, email, password, role, first_name, last_name, job_title, location)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_user.username)
    .bind(new_user.email)
    .bind(hashed_password)
    .bind(new_user.role.as_str())
    .bind(new_user.first_name)
    .bind(new_user.last_name)
    .bind(new_user.job_title)
    .bind(new_user.location)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_user_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    job_title: Option<&str>,
    location: Option<&str>,
) -> Result<User, AppError> {
    info!("Updating user profile");
    let res = sqlx::query(
        "UPDATE users
         SET first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name),
             job_title = COALESCE(?, job_title),
             location = COALESCE(?, location)
         WHERE id = ?",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(job_title)
    .bind(location)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    get_user(pool, user_id).await
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Checks `current` against the stored hash before replacing it.
#[instrument(skip_all, fields(user_id))]
pub async fn change_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    current: &str,
    new_password: &str,
) -> Result<(), AppError> {
    let hash: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    let Some(hash) = hash else {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    };

    if !bcrypt::verify(current, &hash).unwrap_or(false) {
        return Err(AppError::Validation(
            "Current password is incorrect".to_string(),
        ));
    }

    update_user_password(pool, user_id, new_password).await
}

#[instrument(skip(pool))]
pub async fn update_user_admin(
    pool: &Pool<Sqlite>,
    user_id: i64,
    email: Option<&str>,
    role: Option<Role>,
    job_title: Option<&str>,
    location: Option<&str>,
) -> Result<User, AppError> {
    info!("Admin updating user");

    if let Some(email) = email {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND id != ?")
                .bind(email)
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }
    }

    let res = sqlx::query(
        "UPDATE users
         SET email = COALESCE(?, email),
             role = COALESCE(?, role),
             job_title = COALESCE(?, job_title),
             location = COALESCE(?, location)
         WHERE id = ?",
    )
    .bind(email)
    .bind(role.map(|r| r.as_str()))
    .bind(job_title)
    .bind(location)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    get_user(pool, user_id).await
}
