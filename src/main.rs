use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use gatekeeper::{
    AppState,
    cache::{AdmissionController, CacheAsideStore, MemoryStore, RedisStore, SharedStore},
    config::Config,
    database::{MemoryTable, PersistentStore, PgUserStore, User, UserColumn},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置共享存储
    let shared: Arc<dyn SharedStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.clone()).expect("Failed to create Redis client");
            let store = RedisStore::connect(client)
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("Using Redis as shared store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process shared store (single instance only)");
            Arc::new(MemoryStore::new())
        }
    };

    // 设置持久化存储
    let users_db: Arc<dyn PersistentStore<User>> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.store_timeout() * 20)
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        conn.execute("SET application_name = 'gatekeeper';").await?;
                        Ok(())
                    })
                })
                .connect(url)
                .await
                .expect("Failed to connect to Postgres");
            Arc::new(PgUserStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-process user table (data is not persisted)");
            Arc::new(MemoryTable::<User>::new().with_unique(UserColumn::Email))
        }
    };

    // 设置准入控制器
    let admission = Arc::new(
        AdmissionController::new(shared.clone(), config.admission())
            .expect("Invalid admission configuration"),
    );
    tracing::info!(
        points = config.rate_limit_points,
        window_secs = config.rate_limit_window_secs,
        block_secs = config.rate_limit_block_secs,
        policy = ?config.rate_limit_failure_policy,
        "admission control configured"
    );

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        users: CacheAsideStore::new(users_db, shared, config.cache()),
    };

    let app = routes::create_router(state, admission);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
