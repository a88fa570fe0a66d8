pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg_store;

mod inventory_repo;
mod reservation_repo;
mod user_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_store::PgStore;
