//! 日志系统配置模块
//! 支持结构化日志与日志级别配置

use std::path::Path;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 返回的 guard 在存活期间保证文件日志落盘，调用方须持有到进程退出。
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    // 设置日志级别过滤器
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_writer = if config.enable_file_logging {
        let log_dir = config
            .log_file_path
            .as_ref()
            .and_then(|p| Path::new(p).parent())
            .unwrap_or_else(|| Path::new("./logs"));

        std::fs::create_dir_all(log_dir)?;

        let file_appender = rolling::daily(log_dir, "ironkey.log");
        let (writer, guard) = non_blocking(file_appender);
        Some((writer, guard))
    } else {
        None
    };

    let mut guard = None;

    if config.format == "json" {
        if let Some((writer, g)) = file_writer {
            let stdout_layer = fmt::layer().json().with_timer(ChronoUtc::rfc_3339());
            let file_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339());
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
            guard = Some(g);
        } else {
            let stdout_layer = fmt::layer().json().with_timer(ChronoUtc::rfc_3339());
            Registry::default().with(filter).with(stdout_layer).init();
        }
    } else {
        if let Some((writer, g)) = file_writer {
            let stdout_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false);
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
            guard = Some(g);
        } else {
            let stdout_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true);
            Registry::default().with(filter).with(stdout_layer).init();
        }
    }

    Ok(guard)
}

/// 简化初始化（使用默认配置）
pub fn init_default_logging() {
    let config = LoggingConfig::default();
    if init_logging(&config).is_err() {
        // 回退到最基本的日志初始化
        tracing_subscriber::fmt::init();
    }
}
