//! # spark-cpl
//!
//! ## 定位与职责（Why）
//! - 解释预编译的 CPL（Call Processing Language）二进制脚本，为一个呼入或呼出的信令请求
//!   决定路由、拒绝、重定向、记录或代理；
//! - 脚本来自不受信的编译产物，所有偏移访问都经过边界检查，越界一律折叠为格式错误。
//!
//! ## 架构嵌入（Where）
//! - `script` 模块负责二进制布局的解码与测试用编码；
//! - `eval` 模块逐节点求值，`interpreter` 模块驱动调度循环与会话生命周期；
//! - `proxy` 模块承载唯一的挂起点：PROXY 分叉与分支回复处理；
//! - `context` 模块声明全部外部协作方，`registrar`、`invoke` 提供内存实现与调用入口。
//!
//! ## 使用方式（How）
//! 1. 以 [`context::ExternalContext::builder`] 注入事务层与注册表；
//! 2. 经 [`invoke::ScriptInvoker::invoke`] 执行用户脚本，或直接构造 [`interpreter::Interpreter`]；
//! 3. 结果为 `Suspended` 时，把事务层的分支事件交给 [`interpreter::CplSession::on_proxy_event`]。

/// 配置模型与 TOML 加载。
pub mod config;

/// 外部协作方契约与默认实现。
pub mod context;

/// 错误域。
pub mod error;

/// 节点求值函数与去向枚举。
pub mod eval;

/// 报文头惰性缓存。
pub mod headers;

/// 调度循环与会话生命周期。
pub mod interpreter;

/// 脚本调用入口。
pub mod invoke;

/// 候选目标集合。
pub mod location;

/// PROXY 节点与分支事件。
pub mod proxy;

/// 内存注册表。
pub mod registrar;

/// 二进制脚本的解码与编码。
pub mod script;

/// `tracing` 订阅器安装。
pub mod telemetry;

/// RFC 2445 时间规则匹配。
pub mod time;

/// SIP/TEL URI 的轻量解析。
pub mod uri;

pub use context::{ExternalContext, MessageContext, TransactionApi, UserLocationApi};
pub use error::{CollaboratorError, CplError, Result};
pub use interpreter::{CplSession, Direction, Interpreter, ProcessingMode, ScriptOutcome};
pub use invoke::{Invocation, ScriptInvoker};
pub use script::{BinaryScript, NodeKind, NodeSpec};
