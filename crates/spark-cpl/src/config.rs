//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总解释器的运行参数：重定向递归上限、注册表域、AOR 规范化策略、日志开关与默认时区；
//! - 采用 `serde` + TOML 解析为强类型结构，未知键直接拒绝，避免拼写错误被静默忽略。
//!
//! ## 契约（What）
//! - 每个键都有默认值，空文档即合法配置；
//! - [`CplConfig::validate`] 在加载后执行语义校验，失败返回 [`CplError::Config`]。

use std::path::Path;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{CplError, Result};

/// 重定向递归深度的硬上限。
pub const MAX_PROXY_RECURSE: u8 = 10;

/// 日志目录路径的最大字节数。
pub const MAX_LOG_DIR_LEN: usize = 256;

/// 解释器配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把宿主模块参数集中为一个可序列化结构，便于测试中直接构造；
/// - **契约 (What)**：
///   - `log_dir` 缺省时 LOG 节点不做任何事；
///   - `lookup_domain` 缺省时 LOOKUP 节点走失败分支；
///   - `default_timezone` 必须是 IANA 时区名；
/// - **设计权衡 (Trade-offs)**：`log_dir` 只作为开关与元数据传给日志投递方，
///   解释器本身不写文件。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CplConfig {
    pub proxy_recurse: u8,
    pub proxy_route: Option<u32>,
    pub log_dir: Option<String>,
    pub case_sensitive: bool,
    pub realm_prefix: Option<String>,
    pub lookup_domain: Option<String>,
    pub lookup_append_branches: bool,
    pub use_domain: bool,
    pub default_timezone: String,
    pub telemetry: TelemetryConfig,
}

impl Default for CplConfig {
    fn default() -> Self {
        Self {
            proxy_recurse: 0,
            proxy_route: None,
            log_dir: None,
            case_sensitive: false,
            realm_prefix: None,
            lookup_domain: None,
            lookup_append_branches: false,
            use_domain: false,
            default_timezone: "UTC".to_owned(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// 日志订阅器配置。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `EnvFilter` 指令，`RUST_LOG` 存在时以后者为准。
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

impl CplConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| CplError::Config {
            detail: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 读取 TOML 文件并校验。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| CplError::Config {
            detail: format!("cannot read {}: {err}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }

    /// 语义校验。
    ///
    /// - `proxy_recurse` 不得超过 [`MAX_PROXY_RECURSE`]；
    /// - `log_dir` 非空且长度不超过 [`MAX_LOG_DIR_LEN`]；
    /// - `default_timezone` 可解析为 IANA 时区。
    pub fn validate(&self) -> Result<()> {
        if self.proxy_recurse > MAX_PROXY_RECURSE {
            return Err(CplError::Config {
                detail: format!(
                    "proxy_recurse {} exceeds the maximum of {MAX_PROXY_RECURSE}",
                    self.proxy_recurse
                ),
            });
        }
        if let Some(dir) = &self.log_dir {
            if dir.is_empty() || dir.len() > MAX_LOG_DIR_LEN {
                return Err(CplError::Config {
                    detail: format!("log_dir must be 1..={MAX_LOG_DIR_LEN} bytes"),
                });
            }
        }
        self.timezone().map(|_| ())
    }

    /// 解析默认时区。
    pub fn timezone(&self) -> Result<Tz> {
        self.default_timezone
            .parse::<Tz>()
            .map_err(|_| CplError::Config {
                detail: format!("unknown timezone `{}`", self.default_timezone),
            })
    }

    pub fn logging_enabled(&self) -> bool {
        self.log_dir.is_some()
    }
}
