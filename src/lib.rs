use config::Config;

use cache::CacheAsideStore;
use database::User;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod pagination;
pub mod result;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: CacheAsideStore<User>,
}
