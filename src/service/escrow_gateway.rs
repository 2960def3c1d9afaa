// services/escrow_gateway.rs
//
// Thin request/response wrapper over the external escrow contract. No state
// beyond the connection; every failure is surfaced as ExternalCall with the
// underlying message so the caller can decide whether to retry.
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use uuid::Uuid;
use web3::{
    contract::{Contract, Options},
    signing::{keccak256, SecretKey, SecretKeyRef},
    transports::Http,
    types::{Address, TransactionReceipt, H256, U256},
    Web3,
};

use crate::{
    db::marketdb::MarketStore,
    service::error::ServiceError,
    utils::currency::{u256_to_wei, wei_to_u256},
};

#[derive(Debug, Clone, PartialEq)]
pub struct EscrowCreated {
    pub contract_job_id: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscrowTx {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractJobView {
    pub client: String,
    pub provider: String,
    pub amount: BigDecimal,
    pub status: u8,
    pub client_confirmed: bool,
    pub provider_confirmed: bool,
}

#[async_trait]
pub trait EscrowGateway: Send + Sync {
    /// Create the contract-side job and lock the client's funds into escrow.
    async fn create_and_deposit(
        &self,
        client_id: Uuid,
        provider_wallet: &str,
        provider_id: Uuid,
        amount_wei: &BigDecimal,
        category: &str,
    ) -> Result<EscrowCreated, ServiceError>;

    /// Provider-side acceptance; flips the contract job to in-progress.
    async fn accept_in_contract(
        &self,
        provider_id: Uuid,
        contract_job_id: &str,
    ) -> Result<EscrowTx, ServiceError>;

    /// Mirror a completion confirmation on-chain. Reads the party's on-chain
    /// flag first; returns `None` without sending when already confirmed.
    async fn confirm_completion(
        &self,
        caller_id: Uuid,
        contract_job_id: &str,
    ) -> Result<Option<EscrowTx>, ServiceError>;

    async fn contract_job(&self, contract_job_id: &str) -> Result<ContractJobView, ServiceError>;

    async fn wallet_balance(&self, wallet_address: &str) -> Result<BigDecimal, ServiceError>;
}

fn external(call: &'static str, reason: impl ToString) -> ServiceError {
    ServiceError::ExternalCall {
        call,
        reason: reason.to_string(),
    }
}

fn parse_address(call: &'static str, value: &str) -> Result<Address, ServiceError> {
    let raw = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(raw).map_err(|e| external(call, format!("bad address {}: {}", value, e)))?;
    if bytes.len() != 20 {
        return Err(external(call, format!("bad address length: {}", value)));
    }
    Ok(Address::from_slice(&bytes))
}

fn tx_hash_string(hash: H256) -> String {
    format!("{:#x}", hash)
}

pub struct Web3EscrowGateway {
    web3: Web3<Http>,
    contract: Contract<Http>,
    store: Arc<dyn MarketStore>,
    confirmations: usize,
}

impl Web3EscrowGateway {
    pub fn new(
        rpc_url: &str,
        contract_address: &str,
        store: Arc<dyn MarketStore>,
        confirmations: usize,
    ) -> Result<Self, ServiceError> {
        let transport =
            Http::new(rpc_url).map_err(|e| external("connect", format!("{}: {}", rpc_url, e)))?;
        let web3 = Web3::new(transport);
        let address = parse_address("connect", contract_address)?;
        let contract = Contract::from_json(web3.eth(), address, include_bytes!("../abi/escrow.json"))
            .map_err(|e| external("connect", format!("bad escrow ABI: {}", e)))?;

        Ok(Self {
            web3,
            contract,
            store,
            confirmations,
        })
    }

    /// Resolve the custodial signing key and wallet address for a user.
    async fn signer_for(
        &self,
        call: &'static str,
        user_id: Uuid,
    ) -> Result<(SecretKey, Address), ServiceError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;
        let key_hex = user
            .wallet_key
            .as_deref()
            .ok_or_else(|| external(call, format!("user {} has no signing key", user_id)))?;
        let raw = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let bytes = hex::decode(raw).map_err(|e| external(call, format!("bad signing key: {}", e)))?;
        let key = SecretKey::from_slice(&bytes)
            .map_err(|e| external(call, format!("bad signing key: {}", e)))?;
        let address = parse_address(call, &user.wallet_address)?;
        Ok((key, address))
    }

    /// Pull the contract-assigned job id out of the JobCreated event log.
    fn created_job_id(&self, receipt: &TransactionReceipt) -> Result<U256, ServiceError> {
        let topic = H256::from(keccak256(b"JobCreated(uint256,address,address,uint256)"));
        receipt
            .logs
            .iter()
            .find(|log| log.address == self.contract.address() && log.topics.first() == Some(&topic))
            .and_then(|log| log.topics.get(1))
            .map(|id| U256::from_big_endian(id.as_bytes()))
            .ok_or_else(|| external("createJob", "transaction confirmed but JobCreated event missing"))
    }

    fn parse_contract_job_id(contract_job_id: &str) -> Result<U256, ServiceError> {
        U256::from_dec_str(contract_job_id)
            .map_err(|e| external("getJob", format!("bad contract job id {}: {}", contract_job_id, e)))
    }
}

#[async_trait]
impl EscrowGateway for Web3EscrowGateway {
    async fn create_and_deposit(
        &self,
        client_id: Uuid,
        provider_wallet: &str,
        _provider_id: Uuid,
        amount_wei: &BigDecimal,
        category: &str,
    ) -> Result<EscrowCreated, ServiceError> {
        let (key, _) = self.signer_for("createJob", client_id).await?;
        let provider = parse_address("createJob", provider_wallet)?;
        let value = wei_to_u256(amount_wei).map_err(|e| external("createJob", e))?;

        let receipt = self
            .contract
            .signed_call_with_confirmations(
                "createJob",
                (provider, category.to_string()),
                Options::with(|opt| opt.value = Some(value)),
                self.confirmations,
                SecretKeyRef::new(&key),
            )
            .await
            .map_err(|e| external("createJob", e))?;

        let job_id = self.created_job_id(&receipt)?;
        tracing::info!(
            contract_job_id = %job_id,
            tx = %tx_hash_string(receipt.transaction_hash),
            "Escrow job created and funded"
        );

        Ok(EscrowCreated {
            contract_job_id: job_id.to_string(),
            tx_hash: tx_hash_string(receipt.transaction_hash),
        })
    }

    async fn accept_in_contract(
        &self,
        provider_id: Uuid,
        contract_job_id: &str,
    ) -> Result<EscrowTx, ServiceError> {
        let (key, _) = self.signer_for("acceptJob", provider_id).await?;
        let job_id = Self::parse_contract_job_id(contract_job_id)?;

        let receipt = self
            .contract
            .signed_call_with_confirmations(
                "acceptJob",
                (job_id,),
                Options::default(),
                self.confirmations,
                SecretKeyRef::new(&key),
            )
            .await
            .map_err(|e| external("acceptJob", e))?;

        Ok(EscrowTx {
            tx_hash: tx_hash_string(receipt.transaction_hash),
        })
    }

    async fn confirm_completion(
        &self,
        caller_id: Uuid,
        contract_job_id: &str,
    ) -> Result<Option<EscrowTx>, ServiceError> {
        let (key, caller_address) = self.signer_for("confirmCompletion", caller_id).await?;
        let view = self.contract_job(contract_job_id).await?;

        // Skip the send when this party already confirmed on-chain.
        let client = parse_address("confirmCompletion", &view.client)?;
        let provider = parse_address("confirmCompletion", &view.provider)?;
        let already = (caller_address == client && view.client_confirmed)
            || (caller_address == provider && view.provider_confirmed);
        if already {
            tracing::debug!(
                contract_job_id,
                caller = %caller_id,
                "On-chain confirmation already recorded, skipping"
            );
            return Ok(None);
        }

        let job_id = Self::parse_contract_job_id(contract_job_id)?;
        let receipt = self
            .contract
            .signed_call_with_confirmations(
                "confirmCompletion",
                (job_id,),
                Options::default(),
                self.confirmations,
                SecretKeyRef::new(&key),
            )
            .await
            .map_err(|e| external("confirmCompletion", e))?;

        Ok(Some(EscrowTx {
            tx_hash: tx_hash_string(receipt.transaction_hash),
        }))
    }

    async fn contract_job(&self, contract_job_id: &str) -> Result<ContractJobView, ServiceError> {
        let job_id = Self::parse_contract_job_id(contract_job_id)?;

        let (client, provider, amount, status, client_confirmed, provider_confirmed): (
            Address,
            Address,
            U256,
            U256,
            bool,
            bool,
        ) = self
            .contract
            .query("getJob", (job_id,), None, Options::default(), None)
            .await
            .map_err(|e| external("getJob", e))?;

        Ok(ContractJobView {
            client: format!("{:#x}", client),
            provider: format!("{:#x}", provider),
            amount: u256_to_wei(amount),
            status: status.low_u64() as u8,
            client_confirmed,
            provider_confirmed,
        })
    }

    async fn wallet_balance(&self, wallet_address: &str) -> Result<BigDecimal, ServiceError> {
        let address = parse_address("balance", wallet_address)?;
        let balance = self
            .web3
            .eth()
            .balance(address, None)
            .await
            .map_err(|e| external("balance", e))?;
        Ok(u256_to_wei(balance))
    }
}
