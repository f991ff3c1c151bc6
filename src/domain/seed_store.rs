//! 种子保管模块
//!
//! 持有钱包根熵（助记词派生的种子字节）。种子在实例内独占所有，
//! 不记录日志、不传输、不以派生形式在会话之外持久化。

use std::collections::HashMap;
use std::sync::Mutex;

use bip39::{Language, Mnemonic};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::derivation::{DerivationPath, DeterministicKey, KeyDerivationEngine};
use crate::error::{Result, WalletError};

/// 钱包根种子（64 字节，Drop 时清零）
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 64],
}

impl Seed {
    /// 从 BIP39 助记词派生种子（空口令）
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase).map_err(|e| {
            WalletError::InvalidMnemonic {
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            bytes: mnemonic.to_seed(""),
        })
    }

    /// 从原始种子字节构造（恢复流程使用）
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 种子指纹：SHA-256 前 4 字节的十六进制
    ///
    /// 仅用于缓存身份和日志关联，不泄露种子内容。
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(self.bytes);
        hex::encode(&hash[..4])
    }
}

// 手动实现 Debug：种子字节禁止进入日志
impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seed(fp={})", self.fingerprint())
    }
}

/// 种子保管器
///
/// 按需向派生引擎提供种子字节，并持有一份实例私有的派生缓存。
/// 缓存绝不跨实例共享：多钱包场景下不同种子的派生键不得互相污染。
pub struct SeedStore {
    seed: Option<Seed>,
    cache: Mutex<HashMap<String, DeterministicKey>>,
}

impl SeedStore {
    /// 创建空保管器（钱包未初始化状态）
    pub fn new() -> Self {
        Self {
            seed: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 从助记词初始化
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        Ok(Self {
            seed: Some(Seed::from_mnemonic(phrase)?),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// 安装种子（恢复流程）；替换旧种子时清空缓存
    pub fn install_seed(&mut self, seed: Seed) {
        tracing::info!(fingerprint = %seed.fingerprint(), "Installing wallet seed");
        self.seed = Some(seed);
        self.cache
            .lock()
            .expect("derived-key cache lock poisoned")
            .clear();
    }

    /// 钱包是否已初始化
    pub fn has_seed(&self) -> bool {
        self.seed.is_some()
    }

    /// 获取种子；未初始化返回 SeedUnavailable
    pub fn get_seed(&self) -> Result<&Seed> {
        self.seed.as_ref().ok_or(WalletError::SeedUnavailable)
    }

    /// 带缓存的路径派生
    ///
    /// 缓存键为路径渲染（种子在实例内唯一，无需参与键）。
    /// 命中与未命中产出逐字节相同的结果（派生本身是纯函数）。
    pub fn derive_cached(&self, path: &DerivationPath) -> Result<DeterministicKey> {
        let cache_key = path.to_string();

        {
            let cache = self.cache.lock().expect("derived-key cache lock poisoned");
            if let Some(key) = cache.get(&cache_key) {
                return Ok(key.clone());
            }
        }

        let seed = self.get_seed()?;
        let key = KeyDerivationEngine::derive(seed, path)?;

        self.cache
            .lock()
            .expect("derived-key cache lock poisoned")
            .insert(cache_key, key.clone());

        Ok(key)
    }

    /// 清除种子与缓存（会话结束、钱包登出）
    pub fn clear(&mut self) {
        self.seed = None;
        self.cache
            .lock()
            .expect("derived-key cache lock poisoned")
            .clear();
    }
}

impl Default for SeedStore {
    fn default() -> Self {
        Self::new()
    }
}
