//! # eval 模块说明
//!
//! ## 角色定位（Why）
//! - 每种可执行节点对应一个求值函数，读取节点属性后要么修改解释器状态，
//!   要么给出下一步去向；
//! - 去向统一表达为 [`NextStep`]，取代以魔数指针区分“脚本结束/默认动作/出错”的做法。
//!
//! ## 共同契约（What）
//! - 求值函数签名为 `fn(Node, &mut Eval) -> Result<NextStep>`，错误经
//!   [`NextStep::from`] 按 [`CplError::is_format`] 分入格式错误或运行错误；
//! - 触碰属性前先校验子节点数量；
//! - 命中的分支若没有子节点，结果是默认动作。

mod flow;
mod location_ops;
mod nonsig;
mod signaling;
mod switches;

use crate::context::ExternalContext;
use crate::error::{CplError, Result};
use crate::interpreter::{InterpreterState, SessionId};
use crate::script::{BinaryScript, Node, NodeKind};

pub use switches::{PriorityLevel, PriorityOp, compare_priority};

/// 单个节点求值后的去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// 继续执行给定偏移处的节点。
    Continue(usize),
    EndOfScript,
    FallThroughToDefault,
    /// 仅 PROXY 产生：已分叉，等待分支回复。
    Suspend,
    ScriptFormatError(CplError),
    RuntimeError(CplError),
}

impl From<CplError> for NextStep {
    fn from(err: CplError) -> Self {
        if err.is_format() {
            NextStep::ScriptFormatError(err)
        } else {
            NextStep::RuntimeError(err)
        }
    }
}

/// 一次求值可访问的全部上下文。
pub(crate) struct Eval<'a> {
    pub script: &'a BinaryScript,
    pub state: &'a mut InterpreterState,
    pub ctx: &'a ExternalContext,
    pub session: SessionId,
}

/// 命中节点的首个子节点，没有子节点时走默认动作。
pub(crate) fn first_child_or_default(node: &Node<'_>) -> Result<NextStep> {
    Ok(match node.first_child()? {
        Some(offset) => NextStep::Continue(offset),
        None => NextStep::FallThroughToDefault,
    })
}

/// 解码并执行 `offset` 处的节点。
pub(crate) fn dispatch(ev: &mut Eval<'_>, offset: usize) -> NextStep {
    let script = ev.script;
    let node = match script.node(offset) {
        Ok(node) => node,
        Err(err) => return err.into(),
    };
    tracing::debug!(offset, node = node.kind().name(), "dispatch");
    let result = match node.kind() {
        NodeKind::Cpl => flow::run_cpl(&node, ev),
        NodeKind::Default => flow::run_label(&node),
        NodeKind::Sub => flow::run_sub(&node),
        NodeKind::AddressSwitch => switches::run_address_switch(&node, ev),
        NodeKind::StringSwitch => switches::run_string_switch(&node, ev),
        NodeKind::PrioritySwitch => switches::run_priority_switch(&node, ev),
        NodeKind::TimeSwitch => switches::run_time_switch(&node, ev),
        NodeKind::LanguageSwitch => switches::run_language_switch(&node, ev),
        NodeKind::Lookup => location_ops::run_lookup(&node, ev),
        NodeKind::Location => location_ops::run_location(&node, ev),
        NodeKind::RemoveLocation => location_ops::run_remove_location(&node, ev),
        NodeKind::Proxy => crate::proxy::run_proxy(&node, ev),
        NodeKind::Reject => signaling::run_reject(&node, ev),
        NodeKind::Redirect => signaling::run_redirect(&node, ev),
        NodeKind::Log => nonsig::run_log(&node, ev),
        NodeKind::Mail => nonsig::run_mail(&node, ev),
        other => Err(node.malformed(format!("{} is not executable", other.name()))),
    };
    result.unwrap_or_else(NextStep::from)
}

pub(crate) use signaling::ensure_stateful;
