//! Query functions, one module per aggregate. Every function takes the pool
//! (or a borrowed connection when it has to join a caller's transaction) and
//! returns `AppError` on failure.

pub mod analytics;
pub mod approvals;
pub mod cascade;
pub mod clients;
pub mod endorsements;
pub mod notifications;
pub mod projects;
pub mod report_settings;
pub mod resources;
pub mod search;
pub mod sessions;
pub mod skill_templates;
pub mod taxonomy;
pub mod user_skills;
pub mod users;

pub use analytics::*;
pub use approvals::*;
pub use cascade::*;
pub use clients::*;
pub use endorsements::*;
pub use notifications::*;
pub use projects::*;
pub use report_settings::*;
pub use resources::*;
pub use search::*;
pub use sessions::*;
pub use skill_templates::*;
pub use taxonomy::*;
pub use user_skills::*;
pub use users::*;
