//! 生物识别门
//!
//! 将保险库的密码会话包装进一次生物识别认证操作。状态机：
//! `Idle -> Authenticating -> {Succeeded, Failed, Error, Canceled}`，
//! 每次调用恰好产生一个终止结果，随后回到 Idle。
//!
//! 平台传感器的回调式 API 被建模为可取消的异步操作：取消句柄由
//! 外部持有，触发后确定性地以 Canceled 终止并释放硬件会话。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::BiometricConfig;
use crate::error::{Result, WalletError};
use crate::infrastructure::encryption::CipherSession;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 提供者抽象
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 传感器能力
#[derive(Debug, Clone, Copy)]
pub struct BiometricCapability {
    /// 硬件传感器存在
    pub sensor_present: bool,
    /// 至少录入了一条生物凭据
    pub credentials_enrolled: bool,
    /// 设备配置了安全锁屏
    pub secure_lock_configured: bool,
}

impl BiometricCapability {
    /// 三要素全部满足才视为可用
    pub fn available(&self) -> bool {
        self.sensor_present && self.credentials_enrolled && self.secure_lock_configured
    }

    /// 不可用原因描述（错误信息用）
    fn describe_missing(&self) -> String {
        let mut missing = Vec::new();
        if !self.sensor_present {
            missing.push("no sensor hardware");
        }
        if !self.credentials_enrolled {
            missing.push("no enrolled credential");
        }
        if !self.secure_lock_configured {
            missing.push("no secure lock configured");
        }
        missing.join(", ")
    }
}

/// 单次采样比对结果（提供者返回）
#[derive(Debug, Clone)]
pub enum BiometricSample {
    /// 样本匹配
    Match,
    /// 样本不匹配（可重试）
    Mismatch,
    /// 不可恢复故障（硬件故障、尝试次数用尽、用户在系统层取消）
    Unavailable { reason: String },
}

/// 生物识别提供者
///
/// 由平台层实现（指纹/面容传感器的硬件回调通道）。
#[async_trait]
pub trait BiometricProvider: Send + Sync {
    /// 查询传感器能力
    fn capability(&self) -> BiometricCapability;

    /// 采集并比对一次生物样本
    async fn acquire_sample(&self) -> BiometricSample;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 取消句柄
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 认证取消句柄
///
/// 调用方在发起认证前创建并自行持有；`cancel()` 可从任意线程触发。
#[derive(Clone, Default)]
pub struct CancellationHandle {
    canceled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发取消（幂等）
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// 等待取消触发
    async fn canceled_future(&self) {
        loop {
            // 先注册再检查，避免触发与注册之间的丢失唤醒
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 认证门
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 终止结果（每次 authenticate 调用恰好一个）
pub enum BiometricOutcome {
    /// 认证成功：包装的密码会话交还调用方。会话是一次性的，
    /// 后续操作需要向保险库重新申请。
    Succeeded(CipherSession),
    /// 样本不匹配：会话原样退回，调用方可直接重试，无需新会话。
    Failed(CipherSession),
    /// 不可恢复错误：当前尝试终止，必须由用户显式发起重试。
    Error { reason: String },
    /// 取消句柄触发：同 Error 终止，但不作为失败向用户上报。
    Canceled,
}

impl BiometricOutcome {
    /// 转换为错误分类，供偏好 `?` 传播的调用方使用
    pub fn into_session(self) -> Result<CipherSession> {
        match self {
            BiometricOutcome::Succeeded(session) => Ok(session),
            BiometricOutcome::Failed(_) => Err(WalletError::BiometricAuthFailed),
            BiometricOutcome::Error { reason } => {
                Err(WalletError::BiometricUnavailable { reason })
            }
            BiometricOutcome::Canceled => Err(WalletError::BiometricCanceled),
        }
    }
}

impl std::fmt::Debug for BiometricOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BiometricOutcome::Succeeded(_) => write!(f, "Succeeded"),
            BiometricOutcome::Failed(_) => write!(f, "Failed"),
            BiometricOutcome::Error { reason } => write!(f, "Error({})", reason),
            BiometricOutcome::Canceled => write!(f, "Canceled"),
        }
    }
}

/// 门状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Authenticating,
}

/// 生物识别门
pub struct BiometricGate {
    provider: Arc<dyn BiometricProvider>,
    state: std::sync::Mutex<GateState>,
    auth_timeout: Duration,
}

impl BiometricGate {
    /// 按显式注入的提供者构造
    pub fn new(provider: Arc<dyn BiometricProvider>, config: &BiometricConfig) -> Self {
        Self {
            provider,
            state: std::sync::Mutex::new(GateState::Idle),
            auth_timeout: Duration::from_secs(config.auth_timeout_secs),
        }
    }

    /// 传感器可用性判定：{硬件存在, 已录入凭据, 已配置安全锁} 全部为真
    pub fn is_sensor_available(&self) -> bool {
        self.provider.capability().available()
    }

    /// 认证并解锁密码会话
    ///
    /// # Arguments
    /// * `session` - 待解锁的保险库密码会话
    /// * `cancel` - 外部持有的取消句柄
    ///
    /// # Errors
    /// - `BiometricUnavailable` - 传感器不可用（门禁前置检查：不可用时绝不进入），
    ///   或同一个门上已有认证在进行
    pub async fn authenticate(
        &self,
        session: CipherSession,
        cancel: &CancellationHandle,
    ) -> Result<BiometricOutcome> {
        let capability = self.provider.capability();
        if !capability.available() {
            return Err(WalletError::BiometricUnavailable {
                reason: capability.describe_missing(),
            });
        }

        // Idle -> Authenticating；已在认证中则拒绝进入
        {
            let mut state = self.state.lock().expect("gate state lock poisoned");
            if *state == GateState::Authenticating {
                return Err(WalletError::BiometricUnavailable {
                    reason: "authentication already in progress".to_string(),
                });
            }
            *state = GateState::Authenticating;
        }

        let outcome = tokio::select! {
            _ = cancel.canceled_future() => {
                // 取消时释放硬件会话（session 在此丢弃）
                BiometricOutcome::Canceled
            }
            sample = tokio::time::timeout(self.auth_timeout, self.provider.acquire_sample()) => {
                match sample {
                    Ok(BiometricSample::Match) => BiometricOutcome::Succeeded(session),
                    Ok(BiometricSample::Mismatch) => BiometricOutcome::Failed(session),
                    Ok(BiometricSample::Unavailable { reason }) => {
                        BiometricOutcome::Error { reason }
                    }
                    Err(_) => BiometricOutcome::Error {
                        reason: "authentication timed out".to_string(),
                    },
                }
            }
        };

        // 任何终止结果都回到 Idle
        *self.state.lock().expect("gate state lock poisoned") = GateState::Idle;

        tracing::info!(outcome = ?outcome, "Biometric authentication finished");
        Ok(outcome)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 模拟提供者（测试用）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 模拟生物识别提供者
///
/// 按脚本返回采样结果；宿主应用的集成测试也使用它替代平台传感器。
pub struct MockBiometricProvider {
    capability: BiometricCapability,
    samples: tokio::sync::Mutex<VecDeque<BiometricSample>>,
    sample_delay: Duration,
}

impl MockBiometricProvider {
    /// 全部能力可用的提供者
    pub fn available() -> Self {
        Self::with_capability(BiometricCapability {
            sensor_present: true,
            credentials_enrolled: true,
            secure_lock_configured: true,
        })
    }

    pub fn with_capability(capability: BiometricCapability) -> Self {
        Self {
            capability,
            samples: tokio::sync::Mutex::new(VecDeque::new()),
            sample_delay: Duration::ZERO,
        }
    }

    /// 采样前的模拟延迟（取消/超时测试用）
    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    /// 追加一个脚本化采样结果
    pub async fn push_sample(&self, sample: BiometricSample) {
        self.samples.lock().await.push_back(sample);
    }
}

#[async_trait]
impl BiometricProvider for MockBiometricProvider {
    fn capability(&self) -> BiometricCapability {
        self.capability
    }

    async fn acquire_sample(&self) -> BiometricSample {
        if !self.sample_delay.is_zero() {
            tokio::time::sleep(self.sample_delay).await;
        }

        self.samples
            .lock()
            .await
            .pop_front()
            .unwrap_or(BiometricSample::Unavailable {
                reason: "no scripted sample".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::encryption::EncryptionKeyVault;
    use crate::infrastructure::keystore::InMemoryKeyStore;

    async fn test_session() -> CipherSession {
        let vault = EncryptionKeyVault::new(Arc::new(InMemoryKeyStore::new()));
        vault.encrypt_cipher("gate-test").await.unwrap()
    }

    fn gate_with(provider: MockBiometricProvider) -> BiometricGate {
        BiometricGate::new(Arc::new(provider), &BiometricConfig::default())
    }

    #[tokio::test]
    async fn test_successful_authentication_returns_session() {
        let provider = MockBiometricProvider::available();
        provider.push_sample(BiometricSample::Match).await;
        let gate = gate_with(provider);

        let outcome = gate
            .authenticate(test_session().await, &CancellationHandle::new())
            .await
            .unwrap();
        assert!(matches!(outcome, BiometricOutcome::Succeeded(_)));

        // 成功后门回到 Idle，可再次认证
        assert!(gate.is_sensor_available());
    }

    #[tokio::test]
    async fn test_mismatch_returns_session_for_retry() {
        let provider = MockBiometricProvider::available();
        provider.push_sample(BiometricSample::Mismatch).await;
        provider.push_sample(BiometricSample::Match).await;
        let gate = gate_with(provider);

        let outcome = gate
            .authenticate(test_session().await, &CancellationHandle::new())
            .await
            .unwrap();

        // 失败把会话退回，重试不需要重新向保险库申请
        let session = match outcome {
            BiometricOutcome::Failed(session) => session,
            other => panic!("expected Failed, got {:?}", other),
        };

        let retry = gate
            .authenticate(session, &CancellationHandle::new())
            .await
            .unwrap();
        assert!(matches!(retry, BiometricOutcome::Succeeded(_)));
    }

    #[tokio::test]
    async fn test_cancellation_yields_canceled() {
        let provider = MockBiometricProvider::available()
            .with_sample_delay(Duration::from_secs(30));
        provider.push_sample(BiometricSample::Match).await;
        let gate = gate_with(provider);

        let cancel = CancellationHandle::new();
        let canceler = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceler.cancel();
        });

        let outcome = gate
            .authenticate(test_session().await, &cancel)
            .await
            .unwrap();
        assert!(matches!(outcome, BiometricOutcome::Canceled));
        assert!(cancel.is_canceled());
    }

    #[tokio::test]
    async fn test_pre_canceled_handle_short_circuits() {
        let provider = MockBiometricProvider::available()
            .with_sample_delay(Duration::from_secs(30));
        let gate = gate_with(provider);

        let cancel = CancellationHandle::new();
        cancel.cancel();

        let outcome = gate
            .authenticate(test_session().await, &cancel)
            .await
            .unwrap();
        assert!(matches!(outcome, BiometricOutcome::Canceled));
    }

    #[tokio::test]
    async fn test_unavailable_capability_combinations() {
        // 三要素中任意一项缺失都必须判定不可用
        let combos = [
            (false, true, true),
            (true, false, true),
            (true, true, false),
        ];

        for (sensor, enrolled, lock) in combos {
            let provider = MockBiometricProvider::with_capability(BiometricCapability {
                sensor_present: sensor,
                credentials_enrolled: enrolled,
                secure_lock_configured: lock,
            });
            let gate = gate_with(provider);

            assert!(!gate.is_sensor_available());

            let err = gate
                .authenticate(test_session().await, &CancellationHandle::new())
                .await
                .unwrap_err();
            assert!(matches!(err, WalletError::BiometricUnavailable { .. }));
        }
    }

    #[tokio::test]
    async fn test_provider_fault_yields_error_outcome() {
        let provider = MockBiometricProvider::available();
        provider
            .push_sample(BiometricSample::Unavailable {
                reason: "too many attempts".to_string(),
            })
            .await;
        let gate = gate_with(provider);

        let outcome = gate
            .authenticate(test_session().await, &CancellationHandle::new())
            .await
            .unwrap();
        match outcome {
            BiometricOutcome::Error { reason } => assert!(reason.contains("too many attempts")),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outcome_error_mapping() {
        assert!(matches!(
            BiometricOutcome::Canceled.into_session(),
            Err(WalletError::BiometricCanceled)
        ));
        assert!(matches!(
            BiometricOutcome::Error {
                reason: "hw".to_string()
            }
            .into_session(),
            Err(WalletError::BiometricUnavailable { .. })
        ));

        let session = test_session().await;
        assert!(matches!(
            BiometricOutcome::Failed(session).into_session(),
            Err(WalletError::BiometricAuthFailed)
        ));
    }
}
