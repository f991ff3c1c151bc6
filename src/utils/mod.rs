pub mod checksum_address;
pub mod log_redact;

// 重新导出常用类型
pub use checksum_address::{Address, ChecksumAddressCodec};
pub use log_redact::{redact_address, redact_hex_string};
