//! # invoke 模块说明
//!
//! ## 角色定位（Why）
//! - 把“收到一个请求”翻译为“找到归属用户的脚本并执行”：确定脚本归属、取脚本、
//!   构造解释器、把执行结果折算为调用方的路由决策；
//! - 调用方只面对 [`Invocation`] 四种结果，不需要理解解释器内部状态。
//!
//! ## 契约（What）
//! - 呼入以 Request-URI 的用户与主机为归属，缺少用户部分时退回 To；呼出以 From 为归属；
//! - 没有脚本或脚本为空时返回 [`Invocation::Continue`]；
//! - 呼出时位置集预置被叫 AOR，但不标记为已修改，因此未采取动作的脚本仍返回 `Continue`。

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::CplConfig;
use crate::context::{ExternalContext, HeaderKind, MessageContext};
use crate::error::{CollaboratorError, CplError, Result};
use crate::interpreter::{CplSession, Direction, Interpreter, ProcessingMode, ScriptOutcome};
use crate::script::BinaryScript;
use crate::uri::{parse_uri, split_name_addr};

/// 构造用户 AOR。
///
/// - 用户部分按 `case_sensitive` 决定是否转小写；
/// - `use_domain` 打开或需要 `sip:` 形式时追加 `@domain`：域名转小写并剥离 `realm_prefix`；
/// - `sip` 为真时加上 `sip:` 前缀。
#[must_use]
pub fn build_user_aor(user: &str, domain: &str, sip: bool, config: &CplConfig) -> String {
    let mut aor = String::with_capacity(user.len() + domain.len() + 5);
    if sip {
        aor.push_str("sip:");
    }
    if config.case_sensitive {
        aor.push_str(user);
    } else {
        aor.push_str(&user.to_lowercase());
    }
    if config.use_domain || sip {
        let domain = config
            .realm_prefix
            .as_deref()
            .filter(|prefix| !prefix.is_empty())
            .and_then(|prefix| domain.strip_prefix(prefix))
            .unwrap_or(domain);
        aor.push('@');
        aor.push_str(&domain.to_lowercase());
    }
    aor
}

/// 脚本存储。
pub trait ScriptStore: Send + Sync {
    /// `Ok(None)` 表示该用户没有上传脚本。
    fn fetch(&self, aor: &str) -> Result<Option<BinaryScript>, CollaboratorError>;
}

/// 以 `DashMap` 保存的内存脚本存储，键为 AOR。
#[derive(Debug, Clone, Default)]
pub struct MemoryScriptStore {
    scripts: Arc<DashMap<String, BinaryScript>>,
}

impl MemoryScriptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存或替换脚本，返回旧脚本。
    pub fn store(&self, aor: impl Into<String>, script: BinaryScript) -> Option<BinaryScript> {
        self.scripts.insert(aor.into(), script)
    }

    pub fn remove(&self, aor: &str) -> Option<BinaryScript> {
        self.scripts.remove(aor).map(|(_, script)| script)
    }
}

impl ScriptStore for MemoryScriptStore {
    fn fetch(&self, aor: &str) -> Result<Option<BinaryScript>, CollaboratorError> {
        Ok(self.scripts.get(aor).map(|entry| entry.value().clone()))
    }
}

/// 一次调用的路由决策。
#[derive(Debug)]
pub enum Invocation {
    /// 没有脚本或脚本未采取动作，按常规路由继续。
    Continue,
    /// 脚本已经处理完请求，调用方不应再路由。
    Stop,
    /// PROXY 已分叉，后续事件经会话投递。
    Suspended(Arc<CplSession>),
    Failed(CplError),
}

/// 从头域中取出 (用户, 主机)。
fn owner_of(message: &dyn MessageContext, kind: HeaderKind) -> Option<(String, String)> {
    let header = message.header(kind)?;
    let (_, uri) = split_name_addr(header);
    let parts = parse_uri(uri).ok()?;
    let user = parts.user?;
    Some((user.to_owned(), parts.host.to_owned()))
}

/// 脚本调用入口。
///
/// # 教案式说明
/// - **意图 (Why)**：把脚本归属、脚本获取与执行结果映射集中在一处，宿主只需提供协作方；
/// - **契约 (What)**：任何失败都以 [`Invocation::Failed`] 返回，调用方据此退回常规路由；
/// - **风险 (Trade-offs)**：每次调用都从存储取脚本；`BinaryScript` 内部是 `Arc`，克隆无拷贝。
#[derive(Clone)]
pub struct ScriptInvoker {
    store: Arc<dyn ScriptStore>,
    ctx: ExternalContext,
}

impl core::fmt::Debug for ScriptInvoker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptInvoker")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl ScriptInvoker {
    pub fn new(store: Arc<dyn ScriptStore>, ctx: ExternalContext) -> Self {
        Self { store, ctx }
    }

    pub fn invoke(
        &self,
        message: Arc<dyn MessageContext>,
        direction: Direction,
        mode: ProcessingMode,
    ) -> Invocation {
        match self.prepare(message, direction, mode) {
            Ok(Some(session)) => {
                let session = Arc::new(session);
                match session.run() {
                    ScriptOutcome::Default => Invocation::Continue,
                    ScriptOutcome::End => Invocation::Stop,
                    ScriptOutcome::Suspended => Invocation::Suspended(session),
                    ScriptOutcome::RunError(err) | ScriptOutcome::FormatError(err) => {
                        Invocation::Failed(err)
                    }
                }
            }
            Ok(None) => Invocation::Continue,
            Err(err) => {
                tracing::warn!(?direction, error = %err, "cpl invocation failed");
                Invocation::Failed(err)
            }
        }
    }

    fn prepare(
        &self,
        message: Arc<dyn MessageContext>,
        direction: Direction,
        mode: ProcessingMode,
    ) -> Result<Option<CplSession>> {
        let config = &self.ctx.config;
        let owner = match direction {
            Direction::Incoming => owner_of(message.as_ref(), HeaderKind::RequestUri)
                .or_else(|| owner_of(message.as_ref(), HeaderKind::To)),
            Direction::Outgoing => owner_of(message.as_ref(), HeaderKind::From),
        };
        let (user, host) = owner.ok_or_else(|| CplError::Identity {
            detail: format!("no usable user in the {direction:?} owner header"),
        })?;
        let aor = build_user_aor(&user, &host, false, config);

        let script = self
            .store
            .fetch(&aor)
            .map_err(|err| CplError::collaborator("fetch_script", err))?;
        let Some(script) = script.filter(|script| !script.is_empty()) else {
            tracing::debug!(user = %aor, "no script, continuing");
            return Ok(None);
        };

        let seed = match direction {
            Direction::Incoming => None,
            Direction::Outgoing => {
                let (user, host) = owner_of(message.as_ref(), HeaderKind::RequestUri)
                    .or_else(|| owner_of(message.as_ref(), HeaderKind::To))
                    .ok_or_else(|| CplError::Identity {
                        detail: "no usable user in the Request-URI or To".to_owned(),
                    })?;
                Some(build_user_aor(&user, &host, true, config))
            }
        };

        let mut interpreter =
            Interpreter::new(message, script, direction, aor, self.ctx.clone())?.with_mode(mode);
        if let Some(destination) = seed {
            interpreter.seed_location(&destination);
        }
        Ok(Some(CplSession::new(interpreter)))
    }
}
