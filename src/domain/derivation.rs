//! 分层确定性密钥派生
//!
//! 从单一种子沿固定用途路径派生钱包密钥（BIP-32 / secp256k1）。
//! 两条策略路径：
//! - 身份密钥: `m/0'/1/0`（常量路径，与索引无关）
//! - 支付密钥: `m/44'/60'/0'/0/{index}`（按账户索引参数化）
//!
//! 派生是 (种子, 路径) 的纯函数，无随机性，可安全并发调用。

use once_cell::sync::Lazy;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::seed_store::Seed;
use crate::error::{Result, WalletError};
use crate::utils::checksum_address::Address;
use crate::utils::log_redact::redact_address;

/// 硬化索引偏移 (0x80000000)，BIP-32 标准
const HARDENED_OFFSET: u32 = 0x8000_0000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 路径值类型
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 单个子密钥索引（31位索引 + 硬化标志）
///
/// 硬化索引空间与普通索引空间不相交：硬化的 i 与普通的 i 编码不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildNumber {
    index: u32,
    hardened: bool,
}

impl ChildNumber {
    /// 普通（非硬化）子索引
    pub fn normal(index: u32) -> Result<Self> {
        Self::checked(index, false)
    }

    /// 硬化子索引
    pub fn hardened(index: u32) -> Result<Self> {
        Self::checked(index, true)
    }

    fn checked(index: u32, hardened: bool) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::InvalidPath {
                reason: format!("child index {} exceeds maximum ({})", index, HARDENED_OFFSET - 1),
            });
        }
        Ok(Self { index, hardened })
    }

    // 路径模板内部使用，索引为编译期已知的合法值
    const fn of(index: u32, hardened: bool) -> Self {
        Self { index, hardened }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_hardened(&self) -> bool {
        self.hardened
    }
}

impl std::fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// 根相对派生路径：非空的 ChildNumber 有序序列
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
    /// 构造路径；空序列返回 InvalidPath
    pub fn new(components: Vec<ChildNumber>) -> Result<Self> {
        if components.is_empty() {
            return Err(WalletError::InvalidPath {
                reason: "derivation path must not be empty".to_string(),
            });
        }
        Ok(Self(components))
    }

    /// 路径深度 = 序列长度
    pub fn depth(&self) -> u8 {
        self.0.len() as u8
    }

    pub fn components(&self) -> &[ChildNumber] {
        &self.0
    }

    /// 末级子索引（构造保证非空）
    pub fn last(&self) -> ChildNumber {
        self.0[self.0.len() - 1]
    }
}

impl std::fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m")?;
        for component in &self.0 {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// 身份密钥固定路径 m/0'/1/0
static IDENTITY_PATH: Lazy<DerivationPath> = Lazy::new(|| {
    DerivationPath(vec![
        ChildNumber::of(0, true),
        ChildNumber::of(1, false),
        ChildNumber::of(0, false),
    ])
});

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 派生用途
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 派生用途（封闭枚举）✅移除运行时fallback分支
///
/// 固定两个路径模板而不是暴露任意路径，整类"错误派生路径"缺陷
/// 在此被消除；新增用途是编译期的穷尽性检查，不是运行时分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    /// 聊天身份密钥，m/0'/1/0
    Identity,
    /// 支付账户密钥，m/44'/60'/0'/0/{index}
    Payment { index: u32 },
}

impl KeyPurpose {
    /// 展开为具体派生路径
    pub fn path(&self) -> Result<DerivationPath> {
        match self {
            KeyPurpose::Identity => Ok(IDENTITY_PATH.clone()),
            KeyPurpose::Payment { index } => Ok(DerivationPath(vec![
                ChildNumber::of(44, true),
                ChildNumber::of(60, true),
                ChildNumber::of(0, true),
                ChildNumber::of(0, false),
                ChildNumber::normal(*index)?,
            ])),
        }
    }

    /// 解析用途标签（来自宿主应用的存储/配置层）
    ///
    /// 支持 `identity` 和 `payment:<index>`；其余标签返回 UnsupportedPurpose。
    pub fn parse(label: &str) -> Result<Self> {
        if label == "identity" {
            return Ok(KeyPurpose::Identity);
        }

        if let Some(index_str) = label.strip_prefix("payment:") {
            let index: u32 = index_str.parse().map_err(|_| WalletError::UnsupportedPurpose {
                purpose: label.to_string(),
            })?;
            return Ok(KeyPurpose::Payment { index });
        }

        Err(WalletError::UnsupportedPurpose {
            purpose: label.to_string(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 派生结果
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 派生出的密钥树节点
///
/// 由 (种子, 路径) 唯一确定，逐字节可复现。调用方可以在会话内缓存，
/// 但不得在 SeedStore 保护域之外持久化私钥材料。
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeterministicKey {
    #[zeroize(skip)]
    path: DerivationPath,
    #[zeroize(skip)]
    child_number: ChildNumber,
    depth: u8,
    /// secp256k1 私钥标量
    private_key: [u8; 32],
    /// 未压缩公钥（去掉 0x04 前缀的 64 字节）
    public_key: [u8; 64],
    #[zeroize(skip)]
    address: Address,
}

impl DeterministicKey {
    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> ChildNumber {
        self.child_number
    }

    /// 私钥字节（仅用于签名，不得持久化）
    pub fn private_key_bytes(&self) -> &[u8; 32] {
        &self.private_key
    }

    /// 未压缩公钥字节（无 0x04 前缀）
    pub fn public_key_bytes(&self) -> &[u8; 64] {
        &self.public_key
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 校验和地址渲染
    pub fn checksummed_address(&self) -> String {
        self.address.to_checksummed()
    }
}

// 手动实现 Debug：私钥材料禁止进入日志
impl std::fmt::Debug for DeterministicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicKey")
            .field("path", &self.path.to_string())
            .field("depth", &self.depth)
            .field("address", &redact_address(&self.address.to_lower_hex()))
            .finish_non_exhaustive()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 派生引擎
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 密钥派生引擎
///
/// 纯同步 CPU 计算，无共享可变状态，可从多线程并发调用。
pub struct KeyDerivationEngine;

impl KeyDerivationEngine {
    /// 沿指定路径从种子派生密钥
    ///
    /// # Arguments
    /// * `seed` - 钱包根种子
    /// * `path` - 根相对派生路径
    ///
    /// # Errors
    /// - `InvalidPath` - 路径无法被 BIP-32 解析
    /// - `DerivationOverflow` - 子密钥派生产生无效中间值（概率约 2^-127，
    ///   调用方应换下一个索引重试，而不是崩溃）
    pub fn derive(seed: &Seed, path: &DerivationPath) -> Result<DeterministicKey> {
        use coins_bip32::path::DerivationPath as Bip32Path;
        use coins_bip32::prelude::*;
        use k256::ecdsa::SigningKey;
        use sha3::{Digest, Keccak256};

        // 解析派生路径
        let bip32_path =
            path.to_string()
                .parse::<Bip32Path>()
                .map_err(|e| WalletError::InvalidPath {
                    reason: format!("{}: {}", path, e),
                })?;

        // 从种子派生密钥
        let master_key = XPriv::root_from_seed(seed.as_bytes(), None).map_err(|_| {
            WalletError::DerivationOverflow {
                index: path.components()[0].index(),
            }
        })?;

        let derived_key =
            master_key
                .derive_path(&bip32_path)
                .map_err(|_| WalletError::DerivationOverflow {
                    index: path.last().index(),
                })?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &SigningKey = derived_key.as_ref();
        let private_key_bytes = signing_key.to_bytes();

        let verifying_key = signing_key.verifying_key();
        let encoded_point = verifying_key.to_encoded_point(false); // 未压缩格式
        let public_key_slice = &encoded_point.as_bytes()[1..]; // 去掉 0x04 前缀

        // Keccak256 哈希，取后 20 字节作为地址
        let hash = Keccak256::digest(public_key_slice);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(private_key_bytes.as_slice());

        let mut public_key = [0u8; 64];
        public_key.copy_from_slice(public_key_slice);

        Ok(DeterministicKey {
            path: path.clone(),
            child_number: path.last(),
            depth: path.depth(),
            private_key,
            public_key,
            address: Address(address),
        })
    }

    /// 按用途派生
    pub fn derive_for_purpose(seed: &Seed, purpose: KeyPurpose) -> Result<DeterministicKey> {
        Self::derive(seed, &purpose.path()?)
    }

    /// 身份密钥：derive(seed, m/0'/1/0)
    pub fn identity_key(seed: &Seed) -> Result<DeterministicKey> {
        Self::derive(seed, &IDENTITY_PATH)
    }

    /// 支付密钥序列：derive(seed, m/44'/60'/0'/0/i)，i 升序
    ///
    /// (种子, 索引) 的纯函数：相同 count 重复调用必然产出相同序列，
    /// 没有任何内部计数器在调用之间泄漏。
    pub fn payment_keys(seed: &Seed, count: u32) -> Result<Vec<DeterministicKey>> {
        (0..count)
            .map(|index| Self::derive_for_purpose(seed, KeyPurpose::Payment { index }))
            .collect()
    }
}
