pub mod db;
pub mod entities;
pub mod repository;

pub use db::init_db;
pub use repository::{MemoryRepository, RepositoryError, SeaOrmMemoryRepository};
