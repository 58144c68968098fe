//! # interpreter 模块说明
//!
//! ## 角色定位（Why）
//! - [`Interpreter`] 是调度循环：读取指令指针处的节点、交给求值函数、按 [`NextStep`] 决定去向；
//! - [`CplSession`] 把解释器放进互斥锁，供事务层在任意线程投递分支事件，
//!   并负责“恰好释放一次”的生命周期规则。
//!
//! ## 调用约定（What）
//! - 首次执行调用 [`CplSession::run`]；返回 [`ScriptOutcome::Suspended`] 后，
//!   事务层经 [`CplSession::on_proxy_event`] 推进 PROXY，恢复执行的结果同样以 `ScriptOutcome` 返回；
//! - 解释器内部不派生线程、不阻塞等待，所有外部调用对其而言都是原子的。

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::{ExternalContext, MessageContext};
use crate::error::{CplError, Result};
use crate::eval::{self, Eval, NextStep};
use crate::headers::HeaderCache;
use crate::location::{LocationEntry, LocationSet};
use crate::proxy::{self, ProxyContext, ProxyEvent, Resolution};
use crate::script::{BinaryScript, NodeKind};

/// 单次执行允许的最大调度步数，超过即视为 SUB 成环。
pub const MAX_DISPATCH_STEPS: usize = 16 * 1024;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// 解释器实例标识，随分叉请求交给事务层。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

/// 解释器运行标志位。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunFlags(u16);

impl RunFlags {
    pub const RUN_INCOMING: Self = Self(1 << 0);
    pub const RUN_OUTGOING: Self = Self(1 << 1);
    /// 请求已经拥有事务。
    pub const IS_STATEFUL: Self = Self(1 << 2);
    /// 调用方要求在发出任何信令前先创建事务。
    pub const FORCE_STATEFUL: Self = Self(1 << 3);
    /// 脚本修改过位置集。
    pub const LOC_SET_MODIFIED: Self = Self(1 << 4);
    /// PROXY 已经完成，默认动作不再重复代理。
    pub const PROXY_DONE: Self = Self(1 << 5);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// 脚本执行方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// 调用方给出的事务模式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessingMode {
    /// 请求尚无事务，信令以无状态方式发送。
    #[default]
    Stateless,
    /// 请求已经拥有事务。
    Stateful,
    /// 发出信令前必须先创建事务。
    ForceStateful,
}

/// 一次执行的可变状态。
#[derive(Debug)]
pub struct InterpreterState {
    pub ip: usize,
    pub flags: RunFlags,
    /// 脚本归属用户（不带 `sip:` 前缀的 AOR）。
    pub user: Arc<str>,
    pub location_set: LocationSet,
    pub headers: HeaderCache,
    /// 请求到达时刻，TIME_SWITCH 与联系地址过期判定都以此为准。
    pub received_at: DateTime<Utc>,
    pub(crate) proxy: Option<ProxyContext>,
}

/// 调用方可见的执行结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// 脚本未采取任何动作，调用方按无脚本的方式继续路由。
    Default,
    /// 脚本已经处理完请求。
    End,
    /// PROXY 已分叉，等待分支事件。
    Suspended,
    RunError(CplError),
    FormatError(CplError),
}

impl ScriptOutcome {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::RunError(_) | Self::FormatError(_))
    }

    fn from_error(err: CplError) -> Self {
        if err.is_format() {
            Self::FormatError(err)
        } else {
            Self::RunError(err)
        }
    }
}

/// 二进制脚本解释器。
///
/// # 教案式说明
/// - **意图 (Why)**：把节点求值与控制流分离，求值函数只返回去向，调度循环统一处理终止与挂起；
/// - **契约 (What)**：
///   - 构造时校验偏移 0 处为 CPL 节点，否则返回格式错误；
///   - `run` 在挂起期间再次调用直接返回 `Suspended`，不会重复分叉；
///   - 调度步数超过 [`MAX_DISPATCH_STEPS`] 时以格式错误终止；
/// - **设计权衡 (Trade-offs)**：`run` 返回结果而不是 `Result`，错误已经按两大族折叠进 [`ScriptOutcome`]。
#[derive(Debug)]
pub struct Interpreter {
    id: SessionId,
    script: BinaryScript,
    state: InterpreterState,
    ctx: ExternalContext,
}

impl Interpreter {
    pub fn new(
        message: Arc<dyn MessageContext>,
        script: BinaryScript,
        direction: Direction,
        user: impl Into<Arc<str>>,
        ctx: ExternalContext,
    ) -> Result<Self> {
        let root = script.node(0)?;
        if root.kind() != NodeKind::Cpl {
            return Err(root.malformed("script root is not a CPL node"));
        }
        let mut flags = RunFlags::empty();
        flags.insert(match direction {
            Direction::Incoming => RunFlags::RUN_INCOMING,
            Direction::Outgoing => RunFlags::RUN_OUTGOING,
        });
        let received_at = message.received_at();
        Ok(Self {
            id: SessionId::next(),
            script,
            state: InterpreterState {
                ip: 0,
                flags,
                user: user.into(),
                location_set: LocationSet::new(),
                headers: HeaderCache::new(message),
                received_at,
                proxy: None,
            },
            ctx,
        })
    }

    /// 按调用方的事务模式设置 `IS_STATEFUL` / `FORCE_STATEFUL`。
    #[must_use]
    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        match mode {
            ProcessingMode::Stateless => {}
            ProcessingMode::Stateful => self.state.flags.insert(RunFlags::IS_STATEFUL),
            ProcessingMode::ForceStateful => self.state.flags.insert(RunFlags::FORCE_STATEFUL),
        }
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    /// PROXY 分叉后、选出后续分支前为真。
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.state.proxy.is_some()
    }

    /// 预置一个目标（外呼时为被叫地址），不标记位置集已修改。
    pub fn seed_location(&mut self, uri: &str) {
        let mut entry = LocationEntry::new(uri, 10);
        entry.owned = true;
        self.state.location_set.insert(entry);
    }

    fn eval(&mut self) -> Eval<'_> {
        Eval {
            script: &self.script,
            state: &mut self.state,
            ctx: &self.ctx,
            session: self.id,
        }
    }

    /// 从当前指令指针开始执行，直到终止或挂起。
    pub fn run(&mut self) -> ScriptOutcome {
        if self.is_suspended() {
            return ScriptOutcome::Suspended;
        }
        for _ in 0..MAX_DISPATCH_STEPS {
            let ip = self.state.ip;
            let step = eval::dispatch(&mut self.eval(), ip);
            if let ControlFlow::Break(outcome) = self.settle(step) {
                return outcome;
            }
        }
        tracing::error!(session = self.id.0, limit = MAX_DISPATCH_STEPS, "script aborted");
        ScriptOutcome::FormatError(CplError::StepLimit {
            limit: MAX_DISPATCH_STEPS,
        })
    }

    /// 把一次求值的去向落实为继续执行或最终结果。
    fn settle(&mut self, step: NextStep) -> ControlFlow<ScriptOutcome> {
        match step {
            NextStep::Continue(next) => {
                self.state.ip = next;
                ControlFlow::Continue(())
            }
            NextStep::EndOfScript => ControlFlow::Break(ScriptOutcome::End),
            NextStep::FallThroughToDefault => ControlFlow::Break(self.default_action()),
            NextStep::Suspend => ControlFlow::Break(ScriptOutcome::Suspended),
            NextStep::ScriptFormatError(err) => {
                tracing::error!(session = self.id.0, ip = self.state.ip, error = %err, "script format error");
                ControlFlow::Break(ScriptOutcome::FormatError(err))
            }
            NextStep::RuntimeError(err) => {
                tracing::error!(session = self.id.0, ip = self.state.ip, error = %err, "script run error");
                ControlFlow::Break(ScriptOutcome::RunError(err))
            }
        }
    }

    /// 默认动作。
    ///
    /// - PROXY 已完成：什么也不做，最佳回复已经代表结果；
    /// - 位置集未修改：交还调用方，按无脚本的方式继续；
    /// - 否则把整个位置集交给事务层代理，失败为运行错误。
    pub fn default_action(&mut self) -> ScriptOutcome {
        let flags = self.state.flags;
        if flags.contains(RunFlags::PROXY_DONE) {
            return ScriptOutcome::End;
        }
        if !flags.contains(RunFlags::LOC_SET_MODIFIED) {
            return ScriptOutcome::Default;
        }
        let targets = self.state.location_set.drain_all();
        match self
            .ctx
            .transactions
            .proxy_to_location_set(&targets, self.ctx.config.proxy_route)
        {
            Ok(()) => {
                tracing::debug!(session = self.id.0, targets = targets.len(), "default action proxied");
                ScriptOutcome::End
            }
            Err(err) => {
                let err = CplError::collaborator("proxy_to_location_set", err);
                tracing::error!(session = self.id.0, error = %err, "default action failed");
                ScriptOutcome::RunError(err)
            }
        }
    }

    /// 推进挂起中的 PROXY；`None` 表示仍在等待或事件被忽略。
    pub fn on_proxy_event(&mut self, event: ProxyEvent) -> Option<ScriptOutcome> {
        match event {
            ProxyEvent::BranchCompleted(reply) => {
                let resolution = proxy::on_branch_completed(&mut self.eval(), reply);
                match resolution {
                    Ok(Resolution::Ignored | Resolution::Waiting) => None,
                    Ok(Resolution::Finished) => Some(ScriptOutcome::End),
                    Ok(Resolution::Resume(step)) => Some(match self.settle(step) {
                        ControlFlow::Continue(()) => self.run(),
                        ControlFlow::Break(outcome) => outcome,
                    }),
                    Err(err) => {
                        tracing::error!(session = self.id.0, error = %err, "proxy resumption failed");
                        Some(ScriptOutcome::from_error(err))
                    }
                }
            }
            ProxyEvent::Cancelled => {
                proxy::on_cancelled(&mut self.eval());
                None
            }
            ProxyEvent::TransactionFinished => None,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    interpreter: Option<Interpreter>,
    forked: bool,
}

impl SessionInner {
    /// 落实释放规则：错误总是释放；未分叉过的会话在终止时释放；挂起记为已分叉。
    fn observe(&mut self, outcome: &ScriptOutcome, id: SessionId) {
        let release = match outcome {
            ScriptOutcome::Suspended => {
                self.forked = true;
                false
            }
            outcome if outcome.is_error() => true,
            _ => !self.forked,
        };
        if release {
            self.release(id);
        }
    }

    fn release(&mut self, id: SessionId) {
        if self.interpreter.take().is_some() {
            tracing::debug!(session = id.0, "session released");
        }
    }
}

/// 跨线程共享的解释器会话。
///
/// # 教案式说明
/// - **意图 (Why)**：分支回复可能与首次执行或彼此之间并发到达，
///   以单个 `parking_lot::Mutex` 串行化同一实例上的全部操作；
/// - **契约 (What)**：
///   - 会话恰好释放一次：从未分叉的会话在终止时立即释放，分叉过的会话等到
///     [`ProxyEvent::TransactionFinished`]，恢复执行出错时立即释放；
///   - 释放后 `run` 返回 [`CplError::Released`] 运行错误，事件被忽略。
#[derive(Debug)]
pub struct CplSession {
    id: SessionId,
    inner: Mutex<SessionInner>,
}

impl CplSession {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            id: interpreter.id(),
            inner: Mutex::new(SessionInner {
                interpreter: Some(interpreter),
                forked: false,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn run(&self) -> ScriptOutcome {
        let mut inner = self.inner.lock();
        let Some(interpreter) = inner.interpreter.as_mut() else {
            return ScriptOutcome::RunError(CplError::Released);
        };
        let outcome = interpreter.run();
        inner.observe(&outcome, self.id);
        outcome
    }

    pub fn on_proxy_event(&self, event: ProxyEvent) -> Option<ScriptOutcome> {
        let mut inner = self.inner.lock();
        if matches!(event, ProxyEvent::TransactionFinished) {
            inner.release(self.id);
            return None;
        }
        let interpreter = inner.interpreter.as_mut()?;
        let outcome = interpreter.on_proxy_event(event)?;
        inner.observe(&outcome, self.id);
        Some(outcome)
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.lock().interpreter.is_none()
    }

    /// 在锁内读取解释器状态；会话已释放时返回 `None`。
    pub fn inspect<R>(&self, f: impl FnOnce(&InterpreterState) -> R) -> Option<R> {
        self.inner.lock().interpreter.as_ref().map(|i| f(i.state()))
    }
}
