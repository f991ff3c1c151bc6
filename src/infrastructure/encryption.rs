//! 密钥保险库与认证加密会话
//!
//! AES-256-GCM。每次加密生成新的随机 nonce，并作为密文前缀持久化；
//! 解密时从前缀取回。同一密钥长期复用，每消息 nonce 绝不复用：
//! 固定 IV 在 GCM 下会同时摧毁机密性和完整性。

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::infrastructure::keystore::{KeyState, KeyStoreBackend};

/// nonce 长度（96 位）
pub const NONCE_LENGTH: usize = 12;

/// 会话方向：一个会话只绑定一个方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    Encrypt,
    Decrypt,
}

/// 认证加密会话
///
/// 绑定到一个密钥别名和一个方向，恰好执行一次逻辑操作后消费自身。
/// 后续操作必须向保险库重新申请会话。
pub struct CipherSession {
    id: Uuid,
    alias: String,
    direction: CipherDirection,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CipherSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSession")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("direction", &self.direction)
            .field("cipher", &"<redacted>")
            .finish()
    }
}

impl CipherSession {
    /// 会话关联 ID（日志用）
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> CipherDirection {
        self.direction
    }

    /// 加密并封装：返回 nonce + ciphertext(+tag)
    ///
    /// 消费会话。nonce 每次随机生成，不保密，随密文一起持久化。
    pub fn seal(self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.direction != CipherDirection::Encrypt {
            return Err(WalletError::CipherConfig {
                reason: "session is bound to decrypt".to_string(),
            });
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext)
                .map_err(|e| WalletError::CipherOperation {
                    reason: format!("encryption failed: {}", e),
                })?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);

        tracing::debug!(session = %self.id, alias = %self.alias, "Sealed payload");
        Ok(sealed)
    }

    /// 解封并解密：输入 nonce + ciphertext(+tag)
    ///
    /// 消费会话。认证标签不匹配（篡改、密钥错误）返回 CipherOperation。
    pub fn open(self, sealed: &[u8]) -> Result<Vec<u8>> {
        if self.direction != CipherDirection::Decrypt {
            return Err(WalletError::CipherConfig {
                reason: "session is bound to encrypt".to_string(),
            });
        }

        if sealed.len() < NONCE_LENGTH {
            return Err(WalletError::CipherOperation {
                reason: "sealed payload too short".to_string(),
            });
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_LENGTH]);
        let plaintext =
            self.cipher
                .decrypt(nonce, &sealed[NONCE_LENGTH..])
                .map_err(|e| WalletError::CipherOperation {
                    reason: format!("decryption failed: {}", e),
                })?;

        tracing::debug!(session = %self.id, alias = %self.alias, "Opened payload");
        Ok(plaintext)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 保险库
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 加密密钥保险库
///
/// 管理受保护存储中按别名组织的对称密钥，向外只提供单次操作的
/// 密码会话，从不暴露原始密钥字节。
///
/// 并发模型：ensure/delete 按别名串行（消除两个调用方同时观察到
/// "缺失"而重复创建的竞态）；encrypt/decrypt 会话相互独立，可任意并发。
pub struct EncryptionKeyVault {
    backend: Arc<dyn KeyStoreBackend>,
    alias_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EncryptionKeyVault {
    /// 按显式注入的后端构造（后端生命周期由调用方作用域决定，无全局单例）
    pub fn new(backend: Arc<dyn KeyStoreBackend>) -> Self {
        Self {
            backend,
            alias_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// 取别名专属锁
    async fn lock_for(&self, alias: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.alias_locks.lock().await;
        locks
            .entry(alias.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// 幂等地确保别名下存在密钥
    ///
    /// ✅移除异常控制流：先显式探测存在性，缺失才创建；
    /// 同别名的创建/删除全程持锁。
    pub async fn ensure_key(&self, alias: &str) -> Result<()> {
        let lock = self.lock_for(alias).await;
        let _guard = lock.lock().await;

        match self
            .backend
            .probe(alias)
            .await
            .map_err(WalletError::key_store)?
        {
            KeyState::Present => Ok(()),
            KeyState::Absent => {
                self.backend
                    .create(alias)
                    .await
                    .map_err(WalletError::key_store)?;
                tracing::info!(alias = %alias, "Vault key ensured");
                Ok(())
            }
        }
    }

    /// 删除别名下的密钥
    pub async fn delete_key(&self, alias: &str) -> Result<()> {
        let lock = self.lock_for(alias).await;
        let _guard = lock.lock().await;

        self.backend
            .delete(alias)
            .await
            .map_err(WalletError::key_store)
    }

    /// 获取加密会话
    ///
    /// 密钥缺失时惰性创建（VaultKey 生命周期：首次使用时创建）。
    pub async fn encrypt_cipher(&self, alias: &str) -> Result<CipherSession> {
        self.ensure_key(alias).await?;
        self.session(alias, CipherDirection::Encrypt).await
    }

    /// 获取解密会话
    ///
    /// 不做惰性创建：新建密钥下不可能有合法密文，密钥缺失直接报错。
    pub async fn decrypt_cipher(&self, alias: &str) -> Result<CipherSession> {
        self.session(alias, CipherDirection::Decrypt).await
    }

    async fn session(&self, alias: &str, direction: CipherDirection) -> Result<CipherSession> {
        let material = self
            .backend
            .load(alias)
            .await
            .map_err(WalletError::key_store)?;

        let cipher = Aes256Gcm::new_from_slice(material.as_bytes()).map_err(|e| {
            WalletError::CipherConfig {
                reason: format!("invalid key material: {}", e),
            }
        })?;

        let session = CipherSession {
            id: Uuid::new_v4(),
            alias: alias.to_string(),
            direction,
            cipher,
        };

        tracing::debug!(
            session = %session.id,
            alias = %alias,
            direction = ?direction,
            "Issued cipher session"
        );
        Ok(session)
    }
}
