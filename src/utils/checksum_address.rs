//! EIP-55 校验和地址编解码模块
//!
//! 地址的大小写混合渲染：每个十六进制字母的大小写编码小写地址哈希的一位
//! <https://eips.ethereum.org/EIPS/eip-55>

use sha3::{Digest, Keccak256};

/// 20字节以太坊地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// 小写十六进制渲染（带0x前缀）
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 校验和渲染
    pub fn to_checksummed(&self) -> String {
        ChecksumAddressCodec::to_checksum(&self.to_lower_hex())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_checksummed())
    }
}

/// EIP-55 校验和编解码器
pub struct ChecksumAddressCodec;

impl ChecksumAddressCodec {
    /// 判断地址是否携带校验和（启发式存在性检查，非密码学验证）
    ///
    /// 仅当payload部分既非全小写也非全大写时返回true。
    /// 空输入返回false。
    pub fn has_checksum(address: &str) -> bool {
        let payload = Self::strip_prefix(address);
        if payload.is_empty() {
            return false;
        }

        let has_lower = payload.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = payload.chars().any(|c| c.is_ascii_uppercase());
        has_lower && has_upper
    }

    /// 验证校验和：地址与其规范校验和渲染逐字符一致才返回true
    ///
    /// payload必须是40个十六进制字符；空输入或格式错误返回false，不抛错。
    pub fn is_valid_checksum(address: &str) -> bool {
        let payload = Self::strip_prefix(address);
        if payload.len() != 40 || !payload.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        let normalized = format!("0x{}", payload);
        normalized == Self::to_checksum(&normalized)
    }

    /// 计算EIP-55校验和渲染
    ///
    /// 1. 去掉可选的0x前缀，payload转小写
    /// 2. 对小写ASCII payload做Keccak-256，哈希渲染为小写十六进制
    /// 3. 对payload每个位置i：同索引哈希数字值 >= 8 则该位置字母转大写
    /// 4. 重新加上0x前缀
    ///
    /// 空输入返回空字符串。数字字符不受大小写影响。
    pub fn to_checksum(address: &str) -> String {
        let payload = Self::strip_prefix(address);
        if payload.is_empty() {
            return String::new();
        }

        let lower = payload.to_lowercase();
        let hash = Keccak256::digest(lower.as_bytes());
        let hash_hex = hex::encode(hash);

        let mut out = String::with_capacity(lower.len() + 2);
        out.push_str("0x");

        for (i, ch) in lower.chars().enumerate() {
            // hash_hex 有64个字符，payload 最多40个，索引不会越界
            let hash_digit = hash_hex.as_bytes()[i];
            let value = (hash_digit as char).to_digit(16).unwrap_or(0);

            if ch.is_ascii_alphabetic() && value >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }

        out
    }

    /// 去掉可选的0x/0X前缀
    fn strip_prefix(address: &str) -> &str {
        address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address)
    }
}
