//! IronKey - 聊天客户端内嵌钱包的密钥派生与本地密钥保险库
//!
//! 单一种子沿固定用途路径派生全部账户/身份密钥；对称密钥保险库
//! 保护本地机密，可选生物识别门禁。零网络、零全局状态。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{Result, WalletError};

// 企业级标准：统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{DeterministicKey, KeyDerivationEngine, KeyPurpose, Seed, SeedStore},
        error::{Result, WalletError},
        infrastructure::{
            BiometricGate, BiometricOutcome, CancellationHandle, CipherSession,
            EncryptionKeyVault, SoftwareKeyStore,
        },
        service::WalletKeyService,
        utils::{Address, ChecksumAddressCodec},
    };
}
