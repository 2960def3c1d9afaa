pub mod error;
pub mod escrow_gateway;
pub mod notification_service;
pub mod proposal_service;
pub mod reputation_service;
pub mod settlement_service;

#[cfg(test)]
pub mod test_support;
