//! 观测性初始化。

pub mod events;

use anyhow::{anyhow, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const LOG_DIR_ENV: &str = "INTERVIEW_LOG_DIR";
const LOG_FILE_PREFIX: &str = "interview-call.log";

/// 安装全局 tracing 订阅者。设置了 `INTERVIEW_LOG_DIR` 时额外按天滚动写入文件，
/// 调用方需要持有返回的 guard 直到退出。
pub fn init_tracing() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(true);

    let log_dir = std::env::var(LOG_DIR_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().json().with_writer(writer);
            let subscriber = Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .with(file_layer);
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|err| anyhow!("failed to set global subscriber: {err}"))?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = Registry::default().with(env_filter).with(fmt_layer);
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|err| anyhow!("failed to set global subscriber: {err}"))?;
            Ok(None)
        }
    }
}
