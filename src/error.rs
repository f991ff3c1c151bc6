//! 统一错误类型
//!
//! 覆盖密钥派生、地址校验、密钥保险库和生物识别门的全部错误分类

use thiserror::Error;

/// 钱包密钥子系统错误
#[derive(Debug, Error)]
pub enum WalletError {
    // 派生错误
    /// 派生路径非法（空路径、索引越界、格式错误）
    #[error("invalid derivation path: {reason}")]
    InvalidPath { reason: String },

    /// 不支持的派生用途（仅支持 identity / payment）
    #[error("unsupported key purpose: {purpose}")]
    UnsupportedPurpose { purpose: String },

    /// 子密钥派生产生无效中间值（调用方应跳到下一个索引重试）
    #[error("derivation produced an invalid child at index {index}")]
    DerivationOverflow { index: u32 },

    // 种子错误
    /// 钱包尚未初始化，种子不可用
    #[error("wallet seed is not available")]
    SeedUnavailable,

    /// 助记词解析失败
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic { reason: String },

    // 保险库错误
    /// 底层密钥存储提供者失败（保留原始原因）
    #[error("key store operation failed: {cause}")]
    KeyStore {
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 密码器构造参数错误（算法、模式、密钥长度）
    #[error("cipher configuration error: {reason}")]
    CipherConfig { reason: String },

    /// 加密/解密操作失败（认证标签不匹配、数据损坏）
    #[error("cipher operation failed: {reason}")]
    CipherOperation { reason: String },

    // 生物识别错误
    /// 传感器不可用（硬件缺失、未录入凭据、未设置安全锁）
    #[error("biometric sensor unavailable: {reason}")]
    BiometricUnavailable { reason: String },

    /// 用户或外部取消了本次认证
    #[error("biometric authentication canceled")]
    BiometricCanceled,

    /// 生物样本不匹配（可重试）
    #[error("biometric authentication failed")]
    BiometricAuthFailed,
}

impl WalletError {
    /// 包装密钥存储提供者的底层错误
    pub fn key_store(cause: anyhow::Error) -> Self {
        Self::KeyStore {
            cause: cause.into(),
        }
    }
}

/// 统一 Result 别名
pub type Result<T> = std::result::Result<T, WalletError>;
