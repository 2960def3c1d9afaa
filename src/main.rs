mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use crate::db::{db::DBClient, marketdb::MarketStore};
use service::{
    error::ServiceError,
    escrow_gateway::{EscrowGateway, Web3EscrowGateway},
    notification_service::{NotificationFanout, NotificationHub},
    proposal_service::ProposalService,
    reputation_service::ReputationService,
    settlement_service::SettlementService,
};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub notification_hub: Arc<NotificationHub>,
    pub escrow_gateway: Arc<dyn EscrowGateway>,
    // Services
    pub settlement_service: Arc<SettlementService>,
    pub proposal_service: Arc<ProposalService>,
    pub reputation_service: Arc<ReputationService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Result<Self, ServiceError> {
        let db_client_arc = Arc::new(db_client);
        let store: Arc<dyn MarketStore> = db_client_arc.clone();

        // The fan-out hub lives for the whole process, independent of the
        // services it is injected into.
        let notification_hub = NotificationHub::new();
        let fanout: Arc<dyn NotificationFanout> = notification_hub.clone();

        let escrow_gateway: Arc<dyn EscrowGateway> = Arc::new(Web3EscrowGateway::new(
            &config.rpc_url,
            &config.escrow_contract_address,
            store.clone(),
            config.escrow_confirmations,
        )?);

        let settlement_service = Arc::new(SettlementService::new(
            store.clone(),
            escrow_gateway.clone(),
            fanout.clone(),
        ));
        let proposal_service = Arc::new(ProposalService::new(
            store.clone(),
            settlement_service.clone(),
            fanout.clone(),
        ));
        let reputation_service = Arc::new(ReputationService::new(store));

        Ok(Self {
            env: config,
            db_client: db_client_arc,
            notification_hub,
            escrow_gateway,
            settlement_service,
            proposal_service,
            reputation_service,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    // Connect to PostgreSQL
    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            println!("✅ Connection to the database is successful!");
            pool
        }
        Err(err) => {
            println!("🔥 Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    let app_state = match AppState::new(db_client, config.clone()) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            println!("🔥 Failed to initialize the escrow gateway: {}", err);
            std::process::exit(1);
        }
    };

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH]);

    let app = create_router(app_state.clone()).layer(cors);

    println!("🚀 Server is running on http://localhost:{}", config.port);
    println!("🔗 Escrow contract: {}", config.escrow_contract_address);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}
