//! 日志订阅器安装入口。
//!
//! ## 契约（What）
//! - [`install`] 组装 `fmt + EnvFilter` 并设置为全局 Subscriber；
//! - `RUST_LOG` 存在时优先使用环境变量，否则使用配置中的过滤指令；
//! - 已有全局 Subscriber 时返回 `false`，不覆盖宿主的观测配置。

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::config::TelemetryConfig;

/// 安装全局日志订阅器。
///
/// # 教案式说明
/// - **意图（Why）**：宿主若未配置 tracing，解释器的告警与错误日志会被静默丢弃；
/// - **逻辑（How）**：先检查是否已设置全局 Subscriber，再构造过滤器与 fmt 层并注册；
/// - **契约（What）**：返回 `true` 表示本次调用完成安装，`false` 表示已有 Subscriber 在位。
pub fn install(config: &TelemetryConfig) -> bool {
    if dispatcher::has_been_set() {
        return false;
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(&config.filter))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

fn build_env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
