//! # proxy 模块说明
//!
//! ## 角色定位（Why）
//! - PROXY 是解释器唯一的挂起点：节点分叉后 `run` 立即返回，
//!   后续由事务层投递的 [`ProxyEvent`] 驱动状态机，直到选出后续分支；
//! - 分支回复可能来自任意线程，本模块只描述状态迁移，互斥由 [`crate::interpreter::CplSession`] 负责。
//!
//! ## 状态机（How）
//! ```text
//! NotStarted --fork--> Forked --3xx 且仍有预算--> Recursing --fork--> Forked
//!                        |                                              |
//!                        +----------- 所有分支终结 / 无候选 -----------> Resolved
//! ```
//! - 2xx 直接结束脚本，不访问任何快捷子节点；
//! - 1xx 与过期句柄的回复被忽略；
//! - 取消后不再分叉，所有分支终结时直接结束。

use crate::error::{CplError, Result};
use crate::eval::{Eval, NextStep, ensure_stateful, first_child_or_default};
use crate::interpreter::{RunFlags, SessionId};
use crate::location::LocationEntry;
use crate::script::tree::{NO_VAL, YES_VAL, proxy};
use crate::script::{Node, NodeKind};
use crate::uri::{parse_uri, split_name_addr};

/// 分叉顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOrdering {
    /// 同时分叉到全部候选。
    Parallel,
    /// 逐个尝试，前一个失败后再试下一个。
    Sequential,
    /// 只尝试表头一个。
    FirstOnly,
}

impl ProxyOrdering {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            proxy::PARALLEL => Some(Self::Parallel),
            proxy::SEQUENTIAL => Some(Self::Sequential),
            proxy::FIRSTONLY => Some(Self::FirstOnly),
            _ => None,
        }
    }
}

/// 事务层返回的分叉句柄，用于把分支回复关联回发起它的那一次分叉。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForkHandle(pub u64);

/// 一次分叉请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkRequest {
    pub session: SessionId,
    pub targets: Vec<LocationEntry>,
    /// 每个分支的超时提示（秒），解释器自身不计时。
    pub timeout: Option<u16>,
    pub ordering: ProxyOrdering,
    pub route: Option<u32>,
}

/// 一个分支的回复。
///
/// - `contacts` 为 3xx 回复中 Contact 头的原文，每项一个联系地址；
/// - `branches_outstanding` 表示该次分叉是否仍有未终结的分支。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReply {
    pub fork: ForkHandle,
    pub status: u16,
    pub contacts: Vec<String>,
    pub branches_outstanding: bool,
}

/// 事务层投递给会话的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    BranchCompleted(BranchReply),
    /// 整个事务被取消（例如收到 CANCEL）。
    Cancelled,
    /// 整个事务的最终回复已经发出，会话可以释放。
    TransactionFinished,
}

/// PROXY 节点的快捷子节点偏移。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Shortcuts {
    busy: Option<usize>,
    noanswer: Option<usize>,
    redirection: Option<usize>,
    failure: Option<usize>,
    default: Option<usize>,
}

impl Shortcuts {
    fn collect(node: &Node<'_>) -> Result<Self> {
        let mut shortcuts = Self::default();
        for index in 0..node.kid_count() {
            let kid = node.child_node(index)?;
            let slot = match kid.kind() {
                NodeKind::Busy => &mut shortcuts.busy,
                NodeKind::NoAnswer => &mut shortcuts.noanswer,
                NodeKind::Redirection => &mut shortcuts.redirection,
                NodeKind::Failure => &mut shortcuts.failure,
                NodeKind::Default => &mut shortcuts.default,
                other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
            };
            *slot = Some(kid.offset());
        }
        Ok(shortcuts)
    }

    /// 按最终状态码挑选快捷子节点，缺失时回落到 DEFAULT。
    fn pick(&self, status: u16) -> Option<usize> {
        let bucket = match status {
            486 | 600 => self.busy,
            408 => self.noanswer,
            300..=399 => self.redirection,
            _ => self.failure,
        };
        bucket.or(self.default)
    }
}

/// 挂起期间保存的 PROXY 状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProxyContext {
    ordering: ProxyOrdering,
    timeout: Option<u16>,
    recurse_budget: u8,
    shortcuts: Shortcuts,
    /// 仍可能产生回复的分叉；并行模式下重新分叉不会使旧句柄失效。
    forks: Vec<ForkHandle>,
    best_status: Option<u16>,
    cancelled: bool,
}

/// 事件处理的结果，由会话决定是否恢复执行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// 事件与当前 PROXY 无关。
    Ignored,
    /// 仍在等待其他分支。
    Waiting,
    /// PROXY 已完成且不再执行脚本节点。
    Finished,
    /// 从给定去向恢复执行。
    Resume(NextStep),
}

fn read_yes_no(node: &Node<'_>, value: u16, what: &str) -> Result<bool> {
    match value {
        YES_VAL => Ok(true),
        NO_VAL => Ok(false),
        other => Err(node.malformed(format!("invalid {what} value {other}"))),
    }
}

fn fork(ev: &mut Eval<'_>, targets: Vec<LocationEntry>, ordering: ProxyOrdering, timeout: Option<u16>) -> Result<ForkHandle> {
    let request = ForkRequest {
        session: ev.session,
        targets,
        timeout,
        ordering,
        route: ev.ctx.config.proxy_route,
    };
    let handle = ev
        .ctx
        .transactions
        .fork(&request)
        .map_err(|err| CplError::collaborator("fork", err))?;
    tracing::debug!(
        session = ev.session.0,
        fork = handle.0,
        targets = request.targets.len(),
        ?ordering,
        "request forked"
    );
    Ok(handle)
}

/// 求值 PROXY 节点。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 属性 TIMEOUT（秒）、RECURSE（是/否，缺省是）、ORDERING（缺省并行），非法取值为格式错误；
///   - 子节点限 BUSY/NOANSWER/REDIRECTION/FAILURE/DEFAULT；
///   - 位置集为空时依次尝试 FAILURE、DEFAULT，都没有则走默认动作；
/// - **执行逻辑 (How)**：
///   1. 强制升级为有状态事务，重传直接结束；
///   2. 复制全部报文头，之后恢复执行不再访问原始报文；
///   3. 按顺序模式取出候选并分叉，保存上下文后挂起；
/// - **风险 (Trade-offs)**：候选在分叉前已从位置集移除，分叉失败时不会放回。
pub(crate) fn run_proxy(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    let mut timeout = None;
    let mut recurse = true;
    let mut ordering = ProxyOrdering::Parallel;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        let value = attrs.take_num()?;
        match code {
            proxy::TIMEOUT => timeout = Some(value),
            proxy::RECURSE => recurse = read_yes_no(node, value, "RECURSE")?,
            proxy::ORDERING => {
                ordering = ProxyOrdering::from_code(value)
                    .ok_or_else(|| node.malformed(format!("invalid ORDERING value {value}")))?;
            }
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    let shortcuts = Shortcuts::collect(node)?;

    if ev.state.location_set.is_empty() {
        tracing::info!(offset = node.offset(), "PROXY with empty location set");
        return match shortcuts.failure.or(shortcuts.default) {
            Some(kid) => first_child_or_default(&node.script().node(kid)?),
            None => Ok(NextStep::FallThroughToDefault),
        };
    }

    if let Some(step) = ensure_stateful(ev, true)? {
        return Ok(step);
    }
    ev.state.headers.detach();

    let targets = match ordering {
        ProxyOrdering::Parallel => ev.state.location_set.drain_all(),
        ProxyOrdering::Sequential | ProxyOrdering::FirstOnly => {
            ev.state.location_set.remove_first().into_iter().collect()
        }
    };
    let handle = fork(ev, targets, ordering, timeout)?;
    ev.state.proxy = Some(ProxyContext {
        ordering,
        timeout,
        recurse_budget: if recurse { ev.ctx.config.proxy_recurse } else { 0 },
        shortcuts,
        forks: vec![handle],
        best_status: None,
        cancelled: false,
    });
    Ok(NextStep::Suspend)
}

/// 6xx 优先，其余按类别越低越好；同级保留先到者。
fn preferred(candidate: u16, current: Option<u16>) -> bool {
    let rank = |status: u16| if status >= 600 { 0 } else { status / 100 };
    current.is_none_or(|current| rank(candidate) < rank(current))
}

/// 从 Contact 头值中解析 URI 与优先级（q 值乘 10，缺省 10）。
pub(crate) fn parse_contact(raw: &str) -> Option<(String, u8)> {
    let (_, uri) = split_name_addr(raw);
    parse_uri(uri).ok()?;
    let params = match raw.find('>') {
        Some(close) => &raw[close + 1..],
        None => raw.find(';').map_or("", |pos| &raw[pos..]),
    };
    let q = params
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .map(|(_, value)| value.trim());
    let priority = match q {
        None => 10,
        Some(value) => parse_q(value)?,
    };
    Some((uri.to_owned(), priority))
}

fn parse_q(value: &str) -> Option<u8> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let whole: u8 = whole.parse().ok()?;
    let tenth = match frac.bytes().next() {
        None => 0,
        Some(digit) if digit.is_ascii_digit() => digit - b'0',
        Some(_) => return None,
    };
    match whole {
        0 => Some(tenth),
        1 => Some(10),
        _ => None,
    }
}

/// 处理一个分支回复。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 不属于当前上下文的回复（句柄过期或 PROXY 已完成）返回 [`Resolution::Ignored`]；
///   - 2xx 设置 `PROXY_DONE` 并返回 [`Resolution::Finished`]；
///   - 其余终结回复在还有候选时继续分叉，否则等所有分支终结后选出快捷子节点；
/// - **执行逻辑 (How)**：3xx 且仍有递归预算时把 Contact 并入位置集，
///   再按顺序模式决定下一批候选：并行取出全部，顺序取表头，仅首个只在刚递归后取表头；
/// - **风险 (Trade-offs)**：无法解析的 Contact 被跳过并告警，不让整个 PROXY 失败。
pub(crate) fn on_branch_completed(ev: &mut Eval<'_>, reply: BranchReply) -> Result<Resolution> {
    let Some(mut context) = ev.state.proxy.take() else {
        return Ok(Resolution::Ignored);
    };
    if !context.forks.contains(&reply.fork) {
        tracing::debug!(fork = reply.fork.0, status = reply.status, "reply for stale fork ignored");
        ev.state.proxy = Some(context);
        return Ok(Resolution::Ignored);
    }
    if reply.status < 200 {
        ev.state.proxy = Some(context);
        return Ok(Resolution::Ignored);
    }
    if (200..300).contains(&reply.status) {
        ev.state.flags.insert(RunFlags::PROXY_DONE);
        tracing::debug!(session = ev.session.0, status = reply.status, "proxy answered");
        return Ok(Resolution::Finished);
    }

    if !reply.branches_outstanding {
        context.forks.retain(|fork| *fork != reply.fork);
    }
    if preferred(reply.status, context.best_status) {
        context.best_status = Some(reply.status);
    }

    let mut recursed = false;
    if (300..400).contains(&reply.status) && context.recurse_budget > 0 {
        context.recurse_budget -= 1;
        for raw in &reply.contacts {
            match parse_contact(raw) {
                Some((uri, priority)) => {
                    let mut entry = LocationEntry::new(uri, priority);
                    entry.owned = true;
                    ev.state.location_set.insert(entry);
                    recursed = true;
                }
                None => tracing::warn!(contact = %raw, "unusable Contact in redirect skipped"),
            }
        }
    }

    let next: Vec<LocationEntry> = match context.ordering {
        ProxyOrdering::Parallel if recursed => ev.state.location_set.drain_all(),
        ProxyOrdering::Parallel => Vec::new(),
        ProxyOrdering::Sequential => ev.state.location_set.remove_first().into_iter().collect(),
        ProxyOrdering::FirstOnly if recursed => {
            ev.state.location_set.remove_first().into_iter().collect()
        }
        ProxyOrdering::FirstOnly => Vec::new(),
    };
    if !next.is_empty() && !context.cancelled {
        let handle = fork(ev, next, context.ordering, context.timeout)?;
        context.forks.push(handle);
        ev.state.proxy = Some(context);
        return Ok(Resolution::Waiting);
    }
    if !context.forks.is_empty() {
        ev.state.proxy = Some(context);
        return Ok(Resolution::Waiting);
    }

    ev.state.flags.insert(RunFlags::PROXY_DONE);
    if context.cancelled {
        tracing::debug!(session = ev.session.0, "cancelled proxy completed");
        return Ok(Resolution::Finished);
    }
    let status = context.best_status.unwrap_or(reply.status);
    let step = match context.shortcuts.pick(status) {
        Some(kid) => first_child_or_default(&ev.script.node(kid)?)?,
        None => NextStep::FallThroughToDefault,
    };
    tracing::debug!(session = ev.session.0, status, ?step, "proxy resolved");
    Ok(Resolution::Resume(step))
}

/// 记录取消：此后不再分叉。
pub(crate) fn on_cancelled(ev: &mut Eval<'_>) {
    if let Some(context) = ev.state.proxy.as_mut() {
        context.cancelled = true;
        tracing::debug!(session = ev.session.0, "proxy cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_parsing_reads_q_values() {
        assert_eq!(
            parse_contact("<sip:a@x.com>;q=0.7"),
            Some(("sip:a@x.com".to_owned(), 7))
        );
        assert_eq!(
            parse_contact("\"B\" <sip:b@x.com;transport=tcp>;expires=60;q=1.0"),
            Some(("sip:b@x.com;transport=tcp".to_owned(), 10))
        );
        assert_eq!(parse_contact("sip:c@x.com"), Some(("sip:c@x.com".to_owned(), 10)));
        assert_eq!(parse_contact("sip:c@x.com;q=0"), Some(("sip:c@x.com".to_owned(), 0)));
        assert_eq!(parse_contact("<mailto:x@y>"), None);
        assert_eq!(parse_contact("<sip:d@x.com>;q=2.0"), None);
    }

    #[test]
    fn status_buckets_fall_back_to_default() {
        let shortcuts = Shortcuts {
            busy: Some(1),
            noanswer: None,
            redirection: Some(3),
            failure: None,
            default: Some(5),
        };
        assert_eq!(shortcuts.pick(486), Some(1));
        assert_eq!(shortcuts.pick(600), Some(1));
        assert_eq!(shortcuts.pick(408), Some(5));
        assert_eq!(shortcuts.pick(302), Some(3));
        assert_eq!(shortcuts.pick(404), Some(5));
    }

    #[test]
    fn global_failures_win_over_lower_classes() {
        assert!(preferred(404, None));
        assert!(preferred(302, Some(404)));
        assert!(!preferred(480, Some(404)));
        assert!(preferred(603, Some(302)));
        assert!(!preferred(302, Some(600)));
    }
}
