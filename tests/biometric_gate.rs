//! 生物识别门集成测试
//!
//! 覆盖：完整的门禁+保险库解锁流程、可用性三要素、取消语义

use std::sync::Arc;
use std::time::Duration;

use ironkey::config::BiometricConfig;
use ironkey::error::WalletError;
use ironkey::infrastructure::biometric::{
    BiometricCapability, BiometricGate, BiometricOutcome, BiometricSample, CancellationHandle,
    MockBiometricProvider,
};
use ironkey::infrastructure::encryption::EncryptionKeyVault;
use ironkey::infrastructure::keystore::InMemoryKeyStore;

fn vault() -> EncryptionKeyVault {
    EncryptionKeyVault::new(Arc::new(InMemoryKeyStore::new()))
}

fn gate(provider: MockBiometricProvider) -> BiometricGate {
    BiometricGate::new(Arc::new(provider), &BiometricConfig::default())
}

#[tokio::test]
async fn test_end_to_end_biometric_unlock() {
    // 完整流程：保险库发会话 -> 门禁认证 -> 用解锁的会话加密
    let vault = vault();
    let provider = MockBiometricProvider::available();
    provider.push_sample(BiometricSample::Match).await;
    provider.push_sample(BiometricSample::Match).await;
    let gate = gate(provider);

    let session = vault.encrypt_cipher("protected-notes").await.unwrap();
    let outcome = gate
        .authenticate(session, &CancellationHandle::new())
        .await
        .unwrap();

    let unlocked = outcome.into_session().unwrap();
    let sealed = unlocked.seal(b"private note").unwrap();

    // 解密方向同样过门
    let session = vault.decrypt_cipher("protected-notes").await.unwrap();
    let outcome = gate
        .authenticate(session, &CancellationHandle::new())
        .await
        .unwrap();
    let opened = outcome.into_session().unwrap().open(&sealed).unwrap();

    assert_eq!(opened, b"private note");
}

#[tokio::test]
async fn test_failed_sample_allows_retry_with_same_session() {
    let vault = vault();
    let provider = MockBiometricProvider::available();
    provider.push_sample(BiometricSample::Mismatch).await;
    provider.push_sample(BiometricSample::Mismatch).await;
    provider.push_sample(BiometricSample::Match).await;
    let gate = gate(provider);

    let mut session = vault.encrypt_cipher("retry-alias").await.unwrap();

    // 两次不匹配，第三次成功；全程复用同一个保险库会话
    for _ in 0..2 {
        session = match gate
            .authenticate(session, &CancellationHandle::new())
            .await
            .unwrap()
        {
            BiometricOutcome::Failed(returned) => returned,
            other => panic!("expected Failed, got {:?}", other),
        };
    }

    let outcome = gate
        .authenticate(session, &CancellationHandle::new())
        .await
        .unwrap();
    assert!(matches!(outcome, BiometricOutcome::Succeeded(_)));
}

#[tokio::test]
async fn test_availability_requires_all_three_factors() {
    let combos = [
        (false, true, true),
        (true, false, true),
        (true, true, false),
        (false, false, false),
    ];

    for (sensor, enrolled, lock) in combos {
        let provider = MockBiometricProvider::with_capability(BiometricCapability {
            sensor_present: sensor,
            credentials_enrolled: enrolled,
            secure_lock_configured: lock,
        });
        let gate = gate(provider);
        assert!(!gate.is_sensor_available());
    }

    let all_present = MockBiometricProvider::available();
    assert!(gate(all_present).is_sensor_available());
}

#[tokio::test]
async fn test_external_cancellation_releases_attempt() {
    let vault = vault();
    let provider =
        MockBiometricProvider::available().with_sample_delay(Duration::from_secs(60));
    provider.push_sample(BiometricSample::Match).await;
    let gate = gate(provider);

    let cancel = CancellationHandle::new();
    let canceler = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceler.cancel();
    });

    let session = vault.encrypt_cipher("cancel-alias").await.unwrap();
    let outcome = gate.authenticate(session, &cancel).await.unwrap();

    assert!(matches!(outcome, BiometricOutcome::Canceled));
    assert!(matches!(
        outcome.into_session(),
        Err(WalletError::BiometricCanceled)
    ));
}

#[tokio::test]
async fn test_hardware_error_is_terminal() {
    let vault = vault();
    let provider = MockBiometricProvider::available();
    provider
        .push_sample(BiometricSample::Unavailable {
            reason: "sensor hardware fault".to_string(),
        })
        .await;
    let gate = gate(provider);

    let session = vault.encrypt_cipher("error-alias").await.unwrap();
    let outcome = gate
        .authenticate(session, &CancellationHandle::new())
        .await
        .unwrap();

    match &outcome {
        BiometricOutcome::Error { reason } => assert!(reason.contains("hardware fault")),
        other => panic!("expected Error, got {:?}", other),
    }
    assert!(matches!(
        outcome.into_session(),
        Err(WalletError::BiometricUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_vault_failure_blocks_biometric_feature() {
    // 保险库失败必须阻断依赖加密的功能，而不是回退到明文路径
    let backend = Arc::new(InMemoryKeyStore::new());
    let vault = EncryptionKeyVault::new(backend.clone());

    backend.inject_fault("keystore unavailable").await;
    let err = vault.encrypt_cipher("blocked-alias").await.unwrap_err();

    match err {
        WalletError::KeyStore { cause } => {
            assert!(cause.to_string().contains("keystore unavailable"));
        }
        other => panic!("expected KeyStore error, got {:?}", other),
    }
}
