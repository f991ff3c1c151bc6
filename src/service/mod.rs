pub mod wallet_service;

pub use wallet_service::{WalletKeyService, SEED_VAULT_ALIAS};
