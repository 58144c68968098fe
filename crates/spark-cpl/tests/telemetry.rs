//! 日志订阅器安装契约。
//!
//! 独立测试二进制：全局 Subscriber 只能设置一次，不能与 `tracing-test` 的用例共处一个进程。

use spark_cpl::config::TelemetryConfig;
use spark_cpl::telemetry;

/// 首次安装成功，重复安装不覆盖已有 Subscriber。
#[test]
fn install_is_idempotent() {
    let config = TelemetryConfig {
        filter: "spark_cpl=debug".to_owned(),
    };
    assert!(telemetry::install(&config));
    assert!(!telemetry::install(&config));
    tracing::info!(target: "spark_cpl", "telemetry installed");
}
