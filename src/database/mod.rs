pub mod backfill;
pub mod compare;
pub mod inspect;
pub mod migrations;
pub mod schema;

pub use backfill::*;
pub use compare::*;
pub use migrations::*;
pub use schema::*;
