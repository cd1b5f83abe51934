use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use crate::{
    bot::Bot,
    config::{Config, DatabaseConfig},
    domain::events::AppEvent,
    notifier::Notifier,
    platform::{PlatformClient, TelegramClient},
    processor::EventProcessor,
    repository::{PgUserStore, UserStore},
    routes::{
        auth::check_secret,
        event::stream,
        health,
        referrals::{get_audit, get_leaderboard, get_referrals},
        webhook::{apply_event, receive_update},
    },
};
use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;

pub struct AppState {
    store: Arc<dyn UserStore>,
    processor: Arc<EventProcessor>,
    notifier: Arc<Notifier>,
    bot: Arc<Bot>,
    tx: broadcast::Sender<AppEvent>,
    pub config: Config,
}

impl AppState {
    /// Wires the processor, notifier and bot around one store handle.
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let processor = Arc::new(EventProcessor::new(
            store.clone(),
            config.processor.clone(),
        ));
        let notifier = Arc::new(Notifier::new(platform.clone(), tx.clone()));
        let bot = Arc::new(Bot::new(
            processor.clone(),
            notifier.clone(),
            platform,
            config.telegram.group_id,
            config.processor.leaderboard_limit,
        ));

        Self {
            store,
            processor,
            notifier,
            bot,
            tx,
            config,
        }
    }

    pub fn get_store(&self) -> Arc<dyn UserStore> {
        self.store.clone()
    }

    pub fn get_processor(&self) -> Arc<EventProcessor> {
        self.processor.clone()
    }

    pub fn get_notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    pub fn get_bot(&self) -> Arc<Bot> {
        self.bot.clone()
    }

    pub fn get_sender(&self) -> broadcast::Sender<AppEvent> {
        self.tx.clone()
    }
}

pub struct Application;

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<()> {
        Self::setup_tracing(&config.application.debug_mode)?;

        let store = Self::get_store(&config.database).await?;
        let telegram = Arc::new(TelegramClient::new(&config.telegram));
        if let Some(url) = &config.telegram.webhook_url {
            if let Err(e) = telegram
                .set_webhook(url, &config.telegram.webhook_secret)
                .await
            {
                tracing::error!("setting webhook failed >>> {}", e);
            }
        }

        let app_state = Arc::new(AppState::new(config.clone(), store, telegram));
        let app = Self::router(app_state, config.clone());

        let ip = config.application.host.parse::<IpAddr>()?;
        let addr = SocketAddr::new(ip, config.application.port);
        tracing::info!("listening on {}", addr.port());
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }

    pub fn router(app_state: Arc<AppState>, config: Config) -> Router {
        let cors = CorsLayer::permissive();
        Router::new()
            .route("/webhook", post(receive_update))
            .route("/events", post(apply_event))
            .route("/audit", get(get_audit))
            .route_layer(middleware::from_fn(check_secret))
            .route("/health", get(health))
            .route("/stream", get(stream))
            .route("/leaderboard", get(get_leaderboard))
            .route("/users/:id/referrals", get(get_referrals))
            .with_state(app_state)
            .layer(Extension(config))
            .layer(cors)
    }

    fn setup_tracing(debug_mode: &str) -> anyhow::Result<()> {
        let subscriber = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| debug_mode.into()),
            )
            .with(tracing_subscriber::fmt::layer());

        // sqlx reports through `log`
        tracing_log::LogTracer::init().map_err(|e| anyhow::anyhow!("{}", e))?;
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }

    async fn get_store(db_config: &DatabaseConfig) -> anyhow::Result<Arc<dyn UserStore>> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(db_config.acquire_timeout())
            .connect_lazy_with(db_config.get_connect_options());
        let store = PgUserStore::new(pool);
        store.migrate().await?;
        tracing::info!("database initialized successfully");
        Ok(Arc::new(store))
    }
}
