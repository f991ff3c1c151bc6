//! Domain 模块
//!
//! 包含密钥派生与种子保管的核心领域逻辑

pub mod derivation;
pub mod seed_store;

// 重新导出常用类型
pub use derivation::{
    ChildNumber, DerivationPath, DeterministicKey, KeyDerivationEngine, KeyPurpose,
};
pub use seed_store::{Seed, SeedStore};
