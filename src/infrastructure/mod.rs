pub mod biometric;
pub mod encryption;
pub mod keystore;
pub mod logging;

// 重新导出常用类型
pub use biometric::{
    BiometricCapability, BiometricGate, BiometricOutcome, BiometricProvider, BiometricSample,
    CancellationHandle, MockBiometricProvider,
};
pub use encryption::{CipherDirection, CipherSession, EncryptionKeyVault};
pub use keystore::{
    InMemoryKeyStore, KeyState, KeyStoreBackend, MasterKey, SoftwareKeyStore, VaultKeyMaterial,
};
