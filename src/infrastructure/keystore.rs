//! 软件密钥库
//!
//! "受保护密钥存储"的文件实现：每个别名一个 JSON 条目，32 字节保险库
//! 密钥由主密钥（AES-256-GCM）包裹后落盘。密钥材料从不以明文离开本模块。
//!
//! 本模块内部使用 anyhow 传递提供者层错误；保险库边界统一包装为
//! `WalletError::KeyStore`，原始原因保留在错误链上。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 参数（口令形式的主密钥）
const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// nonce 长度（AES-GCM 96位）
const NONCE_LENGTH: usize = 12;

/// 密钥存在性探测结果
///
/// 显式返回存在/缺失，替代"尝试创建再捕获已存在异常"的控制流。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Present,
    Absent,
}

/// 保险库密钥材料（32 字节，Drop 时清零）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKeyMaterial {
    key: [u8; KEY_LENGTH],
}

impl VaultKeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for VaultKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKeyMaterial")
            .field("key", &"<redacted>")
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 主密钥
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 密钥库主密钥（包裹各别名密钥）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// 从环境变量读取主密钥
    ///
    /// 支持三种格式：
    /// - 64 个十六进制字符 -> 直接解码为 32 字节
    /// - 恰好 32 字节的原始字符串 -> 按字节使用
    /// - 16 字符以上的口令 -> PBKDF2 派生（盐持久化在密钥库目录）
    pub fn from_env(env_name: &str, store_dir: &Path) -> Result<Self> {
        let key_str =
            std::env::var(env_name).map_err(|_| anyhow!("{} environment variable not set", env_name))?;

        if key_str.is_empty() {
            return Err(anyhow!("{} is empty", env_name));
        }

        if key_str.len() == 64 {
            let decoded = hex::decode(&key_str).context("Invalid hex master key")?;
            Self::from_raw(&decoded)
        } else if key_str.len() == KEY_LENGTH {
            Self::from_raw(key_str.as_bytes())
        } else if key_str.len() >= 16 {
            let salt = load_or_create_salt(store_dir)?;
            Ok(Self::from_passphrase(&key_str, &salt))
        } else {
            Err(anyhow!("{} too short (min 16)", env_name))
        }
    }

    /// 从口令和盐派生主密钥
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
        Self { key }
    }

    fn from_raw(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(anyhow!("Master key must be {} bytes", KEY_LENGTH));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// 主密钥校验值：Sha256(key || "kcv") 前 8 字节
    ///
    /// 持久化在条目里，加载时恒定时间比较，在 AEAD 解包之前
    /// 就能区分"主密钥错误"与"条目损坏"。
    fn check_value(&self) -> [u8; 8] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(b"kcv");
        let digest = hasher.finalize();

        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        out
    }
}

/// 加载或创建密钥库目录下的盐文件
fn load_or_create_salt(store_dir: &Path) -> Result<Vec<u8>> {
    let salt_path = store_dir.join("master.salt");

    if salt_path.exists() {
        let salt = std::fs::read(&salt_path).context("Failed to read master salt")?;
        if salt.len() != SALT_LENGTH {
            return Err(anyhow!("Corrupt master salt file: {:?}", salt_path));
        }
        return Ok(salt);
    }

    std::fs::create_dir_all(store_dir).context("Failed to create keystore directory")?;

    let mut salt = vec![0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    std::fs::write(&salt_path, &salt).context("Failed to persist master salt")?;

    Ok(salt)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 存储后端抽象
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 密钥存储后端
///
/// 硬件密钥库可用时由平台实现替换；默认实现为文件密钥库。
#[async_trait]
pub trait KeyStoreBackend: Send + Sync {
    /// 探测别名下密钥是否存在
    async fn probe(&self, alias: &str) -> Result<KeyState>;

    /// 在别名下创建新密钥（别名已占用时报错，幂等性由保险库层保证）
    async fn create(&self, alias: &str) -> Result<()>;

    /// 加载别名下的密钥材料
    async fn load(&self, alias: &str) -> Result<VaultKeyMaterial>;

    /// 删除别名下的密钥（别名不存在时为无操作）
    async fn delete(&self, alias: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 文件密钥库实现
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 磁盘条目格式
#[derive(Serialize, Deserialize)]
struct KeyEntry {
    alias: String,
    /// 包裹后的密钥（nonce + ciphertext，base64）
    wrapped_key: String,
    /// 主密钥校验值（base64）
    master_check: String,
    created_at: DateTime<Utc>,
    version: u32,
}

/// 文件密钥库
pub struct SoftwareKeyStore {
    dir: PathBuf,
    master: MasterKey,
}

impl SoftwareKeyStore {
    /// 打开（或初始化）密钥库目录
    pub fn open(dir: impl Into<PathBuf>, master: MasterKey) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).context("Failed to create keystore directory")?;
        Ok(Self { dir, master })
    }

    /// 按配置打开：主密钥来自配置指定的环境变量
    pub fn open_from_env(config: &crate::config::VaultConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.keystore_dir);
        let master = MasterKey::from_env(&config.master_key_env, &dir)?;
        Self::open(dir, master)
    }

    fn entry_path(&self, alias: &str) -> Result<PathBuf> {
        validate_alias(alias)?;
        Ok(self.dir.join(format!("{}.json", alias)))
    }

    /// 包裹密钥：主密钥 AES-GCM 加密，nonce 前缀
    fn wrap_key(&self, key: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.master.key)
            .map_err(|e| anyhow!("Invalid master key: {}", e))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, key)
            .map_err(|e| anyhow!("Key wrap failed: {}", e))?;

        let mut wrapped = nonce.to_vec();
        wrapped.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(wrapped))
    }

    fn unwrap_key(&self, wrapped_b64: &str) -> Result<VaultKeyMaterial> {
        let wrapped = base64::engine::general_purpose::STANDARD
            .decode(wrapped_b64)
            .context("Corrupt wrapped key encoding")?;

        if wrapped.len() < NONCE_LENGTH {
            return Err(anyhow!("Wrapped key too short"));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.master.key)
            .map_err(|e| anyhow!("Invalid master key: {}", e))?;

        let nonce = Nonce::from_slice(&wrapped[..NONCE_LENGTH]);
        let mut plaintext = cipher
            .decrypt(nonce, &wrapped[NONCE_LENGTH..])
            .map_err(|e| anyhow!("Key unwrap failed: {}", e))?;

        if plaintext.len() != KEY_LENGTH {
            plaintext.zeroize();
            return Err(anyhow!("Unwrapped key has invalid length"));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&plaintext);
        plaintext.zeroize();

        Ok(VaultKeyMaterial { key })
    }
}

#[async_trait]
impl KeyStoreBackend for SoftwareKeyStore {
    async fn probe(&self, alias: &str) -> Result<KeyState> {
        let path = self.entry_path(alias)?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(KeyState::Present),
            Ok(false) => Ok(KeyState::Absent),
            Err(e) => Err(anyhow!("Failed to probe key entry {:?}: {}", path, e)),
        }
    }

    async fn create(&self, alias: &str) -> Result<()> {
        let path = self.entry_path(alias)?;

        if self.probe(alias).await? == KeyState::Present {
            return Err(anyhow!("Key already exists under alias '{}'", alias));
        }

        // 生成 32 字节随机密钥并立即包裹
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        let wrapped_key = self.wrap_key(&key)?;
        key.zeroize();

        let entry = KeyEntry {
            alias: alias.to_string(),
            wrapped_key,
            master_check: base64::engine::general_purpose::STANDARD
                .encode(self.master.check_value()),
            created_at: Utc::now(),
            version: 1,
        };

        let json = serde_json::to_vec_pretty(&entry).context("Failed to serialize key entry")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write key entry {:?}", path))?;

        tracing::info!(alias = %alias, "Created vault key");
        Ok(())
    }

    async fn load(&self, alias: &str) -> Result<VaultKeyMaterial> {
        let path = self.entry_path(alias)?;

        let json = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Key entry not found for alias '{}'", alias))?;
        let entry: KeyEntry =
            serde_json::from_slice(&json).context("Corrupt key entry")?;

        // 恒定时间比较主密钥校验值
        let stored_check = base64::engine::general_purpose::STANDARD
            .decode(&entry.master_check)
            .context("Corrupt master check encoding")?;
        let expected = self.master.check_value();

        if stored_check.len() != expected.len()
            || stored_check.ct_eq(&expected).unwrap_u8() != 1
        {
            return Err(anyhow!(
                "Master key mismatch for alias '{}' (wrong master key or corrupted entry)",
                alias
            ));
        }

        self.unwrap_key(&entry.wrapped_key)
    }

    async fn delete(&self, alias: &str) -> Result<()> {
        let path = self.entry_path(alias)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(alias = %alias, "Deleted vault key");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(alias = %alias, "Delete requested for absent key");
                Ok(())
            }
            Err(e) => Err(anyhow!("Failed to delete key entry {:?}: {}", path, e)),
        }
    }
}

/// 别名校验：防止路径穿越，限制字符集
fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() || alias.len() > 64 {
        return Err(anyhow!("Key alias must be 1-64 characters"));
    }

    let valid = alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(anyhow!("Key alias contains invalid characters: '{}'", alias));
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 测试用内存后端
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 内存密钥库（测试用）
///
/// 可脚本化注入故障，验证保险库层的错误包装。
pub struct InMemoryKeyStore {
    keys: tokio::sync::Mutex<std::collections::HashMap<String, [u8; KEY_LENGTH]>>,
    /// 注入的故障队列：非空时下一次操作弹出并失败
    faults: tokio::sync::Mutex<VecDeque<String>>,
    /// 创建操作计数（并发幂等性测试用）
    create_count: std::sync::atomic::AtomicU32,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: tokio::sync::Mutex::new(std::collections::HashMap::new()),
            faults: tokio::sync::Mutex::new(VecDeque::new()),
            create_count: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// 注入一次故障
    pub async fn inject_fault(&self, reason: &str) {
        self.faults.lock().await.push_back(reason.to_string());
    }

    /// 底层创建操作发生的次数
    pub fn create_count(&self) -> u32 {
        self.create_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn take_fault(&self) -> Option<String> {
        self.faults.lock().await.pop_front()
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStoreBackend for InMemoryKeyStore {
    async fn probe(&self, alias: &str) -> Result<KeyState> {
        validate_alias(alias)?;
        if let Some(reason) = self.take_fault().await {
            return Err(anyhow!(reason));
        }
        if self.keys.lock().await.contains_key(alias) {
            Ok(KeyState::Present)
        } else {
            Ok(KeyState::Absent)
        }
    }

    async fn create(&self, alias: &str) -> Result<()> {
        validate_alias(alias)?;
        if let Some(reason) = self.take_fault().await {
            return Err(anyhow!(reason));
        }

        let mut keys = self.keys.lock().await;
        if keys.contains_key(alias) {
            return Err(anyhow!("Key already exists under alias '{}'", alias));
        }

        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        keys.insert(alias.to_string(), key);
        self.create_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, alias: &str) -> Result<VaultKeyMaterial> {
        validate_alias(alias)?;
        if let Some(reason) = self.take_fault().await {
            return Err(anyhow!(reason));
        }
        let keys = self.keys.lock().await;
        let key = keys
            .get(alias)
            .ok_or_else(|| anyhow!("Key entry not found for alias '{}'", alias))?;
        Ok(VaultKeyMaterial { key: *key })
    }

    async fn delete(&self, alias: &str) -> Result<()> {
        validate_alias(alias)?;
        if let Some(reason) = self.take_fault().await {
            return Err(anyhow!(reason));
        }
        self.keys.lock().await.remove(alias);
        Ok(())
    }
}
