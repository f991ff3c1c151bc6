//! 钱包派生算法验证测试
//!
//! 验证身份/支付路径派生与标准钱包（MetaMask、Trust Wallet 等）的一致性，
//! 使用 BIP39 标准测试向量

use ironkey::domain::{KeyDerivationEngine, KeyPurpose, Seed, SeedStore};
use ironkey::error::WalletError;
use ironkey::service::WalletKeyService;
use ironkey::utils::ChecksumAddressCodec;

/// BIP39 标准测试助记词
const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// 身份路径 m/0'/1/0 的期望地址
const IDENTITY_ADDRESS: &str = "0xa391af6a522436f335b7c6486640153641847ea2";

/// 支付路径 m/44'/60'/0'/0/{i} 的期望地址
const PAYMENT_ADDRESSES: [&str; 2] = [
    "0x9858effd232b4033e47d90003d41ec34ecaeda94",
    "0x6fac4d18c912343bf86fa7049364dd4e424ab9c0",
];

#[test]
fn test_identity_path_vector() {
    let seed = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();
    let key = KeyDerivationEngine::identity_key(&seed).unwrap();

    assert_eq!(key.address().to_lower_hex(), IDENTITY_ADDRESS);
    assert_eq!(key.path().to_string(), "m/0'/1/0");
}

#[test]
fn test_payment_path_vectors() {
    let seed = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();
    let keys = KeyDerivationEngine::payment_keys(&seed, 2).unwrap();

    for (key, expected) in keys.iter().zip(PAYMENT_ADDRESSES) {
        assert_eq!(key.address().to_lower_hex(), expected);
    }
}

#[test]
fn test_identity_differs_from_payment_zero() {
    let seed = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();
    let identity = KeyDerivationEngine::identity_key(&seed).unwrap();
    let payments = KeyDerivationEngine::payment_keys(&seed, 1).unwrap();

    assert_ne!(identity.address(), payments[0].address());
}

#[test]
fn test_payment_sequence_is_restartable() {
    // 相同 (种子, count) 必须产出逐字节相同的序列
    let seed = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();

    let first = KeyDerivationEngine::payment_keys(&seed, 4).unwrap();
    let second = KeyDerivationEngine::payment_keys(&seed, 4).unwrap();

    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.private_key_bytes(), b.private_key_bytes());
        assert_eq!(a.address(), b.address());
    }
}

#[test]
fn test_sequence_element_equals_single_derivation() {
    let seed = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();
    let keys = KeyDerivationEngine::payment_keys(&seed, 5).unwrap();

    for (i, key) in keys.iter().enumerate() {
        let single = KeyDerivationEngine::derive_for_purpose(
            &seed,
            KeyPurpose::Payment { index: i as u32 },
        )
        .unwrap();
        assert_eq!(key.address(), single.address());
    }
}

#[test]
fn test_different_seeds_produce_different_keys() {
    let seed_a = Seed::from_mnemonic(TEST_MNEMONIC).unwrap();
    let seed_b = Seed::from_mnemonic(
        "legal winner thank year wave sausage worth useful legal winner thank yellow",
    )
    .unwrap();

    let key_a = KeyDerivationEngine::identity_key(&seed_a).unwrap();
    let key_b = KeyDerivationEngine::identity_key(&seed_b).unwrap();
    assert_ne!(key_a.address(), key_b.address());
}

#[test]
fn test_concurrent_derivation_is_consistent() {
    // 派生是纯函数，多线程并发调用产出一致结果
    let seed = std::sync::Arc::new(Seed::from_mnemonic(TEST_MNEMONIC).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let seed = seed.clone();
            std::thread::spawn(move || {
                KeyDerivationEngine::identity_key(&seed)
                    .unwrap()
                    .address()
                    .to_lower_hex()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), IDENTITY_ADDRESS);
    }
}

#[test]
fn test_service_renders_checksummed_addresses() {
    let service = WalletKeyService::from_mnemonic(TEST_MNEMONIC).unwrap();

    let identity = service.identity_address().unwrap();
    assert!(ChecksumAddressCodec::is_valid_checksum(&identity));
    assert_eq!(identity.to_lowercase(), IDENTITY_ADDRESS);

    let payments = service.payment_addresses(2).unwrap();
    for (address, expected) in payments.iter().zip(PAYMENT_ADDRESSES) {
        assert!(ChecksumAddressCodec::is_valid_checksum(address));
        assert_eq!(address.to_lowercase(), expected);
    }
}

#[test]
fn test_multi_wallet_stores_are_isolated() {
    // 两个保管器（不同种子）各自缓存，互不污染
    let store_a = SeedStore::from_mnemonic(TEST_MNEMONIC).unwrap();
    let store_b = SeedStore::from_mnemonic(
        "legal winner thank year wave sausage worth useful legal winner thank yellow",
    )
    .unwrap();

    let path = KeyPurpose::Identity.path().unwrap();
    let key_a1 = store_a.derive_cached(&path).unwrap();
    let key_b = store_b.derive_cached(&path).unwrap();
    let key_a2 = store_a.derive_cached(&path).unwrap();

    assert_ne!(key_a1.address(), key_b.address());
    assert_eq!(key_a1.address(), key_a2.address());
    assert_eq!(key_a1.address().to_lower_hex(), IDENTITY_ADDRESS);
}

#[test]
fn test_uninitialized_seed_store() {
    let store = SeedStore::new();
    assert!(!store.has_seed());
    assert!(matches!(
        store.get_seed(),
        Err(WalletError::SeedUnavailable)
    ));
}
