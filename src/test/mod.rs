mod cascade;
mod config;
mod database;
mod reports;
mod utils;

pub use utils::{test_db, test_utils};
