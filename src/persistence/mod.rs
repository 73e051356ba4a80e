//! Database layer: pool, migrations, the durable trade log, and users.

mod log;
mod pool;
mod users;

pub use log::{DurableLog, MemLog, PgLog};
pub use pool::{create_pool_and_migrate, run_migrations};
pub use sqlx::PgPool;
pub use users::{UserRow, insert_user, list_users};
