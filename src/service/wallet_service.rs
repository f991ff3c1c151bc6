//! 钱包密钥服务
//!
//! 面向宿主应用的外观：身份/支付密钥获取、校验和地址渲染、
//! 种子经保险库密封后的持久化与恢复。

use zeroize::Zeroize;

use crate::domain::derivation::{DeterministicKey, KeyPurpose};
use crate::domain::seed_store::{Seed, SeedStore};
use crate::error::{Result, WalletError};
use crate::infrastructure::encryption::EncryptionKeyVault;
use crate::utils::log_redact::redact_address;

/// 种子密封使用的保险库别名
pub const SEED_VAULT_ALIAS: &str = "wallet-seed";

/// 钱包密钥服务
pub struct WalletKeyService {
    seed_store: SeedStore,
}

impl WalletKeyService {
    /// 按显式注入的种子保管器构造
    pub fn new(seed_store: SeedStore) -> Self {
        Self { seed_store }
    }

    /// 从助记词初始化新钱包
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        Ok(Self {
            seed_store: SeedStore::from_mnemonic(phrase)?,
        })
    }

    /// 钱包是否已初始化
    pub fn has_wallet(&self) -> bool {
        self.seed_store.has_seed()
    }

    pub fn seed_store(&self) -> &SeedStore {
        &self.seed_store
    }

    /// 聊天身份密钥（m/0'/1/0）
    pub fn identity_key(&self) -> Result<DeterministicKey> {
        self.seed_store.derive_cached(&KeyPurpose::Identity.path()?)
    }

    /// 支付密钥序列（m/44'/60'/0'/0/0..count，升序）
    pub fn payment_keys(&self, count: u32) -> Result<Vec<DeterministicKey>> {
        (0..count)
            .map(|index| {
                self.seed_store
                    .derive_cached(&KeyPurpose::Payment { index }.path()?)
            })
            .collect()
    }

    /// 身份地址（EIP-55 校验和渲染）
    pub fn identity_address(&self) -> Result<String> {
        let address = self.identity_key()?.checksummed_address();
        tracing::debug!(address = %redact_address(&address), "Rendered identity address");
        Ok(address)
    }

    /// 支付地址序列（EIP-55 校验和渲染）
    pub fn payment_addresses(&self, count: u32) -> Result<Vec<String>> {
        Ok(self
            .payment_keys(count)?
            .iter()
            .map(|key| key.checksummed_address())
            .collect())
    }

    /// 密封种子：经保险库加密，返回 nonce+密文 交由存储层落盘
    pub async fn seal_seed(&self, vault: &EncryptionKeyVault) -> Result<Vec<u8>> {
        let seed = self.seed_store.get_seed()?;
        let session = vault.encrypt_cipher(SEED_VAULT_ALIAS).await?;
        session.seal(seed.as_bytes())
    }

    /// 从密封数据恢复种子
    pub async fn restore_seed(
        &mut self,
        vault: &EncryptionKeyVault,
        sealed: &[u8],
    ) -> Result<()> {
        let session = vault.decrypt_cipher(SEED_VAULT_ALIAS).await?;
        let mut plaintext = session.open(sealed)?;

        if plaintext.len() != 64 {
            plaintext.zeroize();
            return Err(WalletError::CipherOperation {
                reason: "sealed seed has invalid length".to_string(),
            });
        }

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&plaintext);
        plaintext.zeroize();

        self.seed_store.install_seed(Seed::from_bytes(bytes));
        Ok(())
    }
}
