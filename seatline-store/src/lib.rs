pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod reservation_repo;

pub use database::DbClient;
pub use redis_repo::{RedisClient, RedisDraftStore};
pub use reservation_repo::StoreReservationRepository;
