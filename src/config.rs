// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    // Escrow contract connection
    pub rpc_url: String,
    pub escrow_contract_address: String,
    pub escrow_confirmations: usize,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let escrow_contract_address = std::env::var("ESCROW_CONTRACT_ADDRESS")
            .expect("ESCROW_CONTRACT_ADDRESS must be set");

        let rpc_url = std::env::var("ESCROW_RPC_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string());
        let escrow_confirmations = std::env::var("ESCROW_CONFIRMATIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Config {
            database_url,
            port,
            rpc_url,
            escrow_contract_address,
            escrow_confirmations,
            allowed_origins,
        }
    }
}
