//! 信令终结节点：REJECT 与 REDIRECT。
//!
//! 两者都以 `EndOfScript` 结束脚本；发送前可能需要先把请求升级为有状态事务。

use super::{Eval, NextStep};
use crate::context::TransactionState;
use crate::error::{CplError, Result};
use crate::interpreter::RunFlags;
use crate::script::Node;
use crate::script::tree::{NO_VAL, YES_VAL, redirect, reject};

/// 按需创建事务。
///
/// - **契约 (What)**：`force` 为真或调用方要求强制有状态时，若尚未有状态则创建事务；
///   返回 `Some(EndOfScript)` 表示请求是重传，调用方应静默结束；
/// - **错误**：事务创建失败为运行错误。
pub(crate) fn ensure_stateful(ev: &mut Eval<'_>, force: bool) -> Result<Option<NextStep>> {
    let flags = ev.state.flags;
    if flags.contains(RunFlags::IS_STATEFUL) || !(force || flags.contains(RunFlags::FORCE_STATEFUL)) {
        return Ok(None);
    }
    match ev
        .ctx
        .transactions
        .new_transaction()
        .map_err(|err| CplError::collaborator("new_transaction", err))?
    {
        TransactionState::Retransmission => {
            tracing::debug!("retransmission detected, ending script silently");
            Ok(Some(NextStep::EndOfScript))
        }
        TransactionState::Created => {
            ev.state.flags.insert(RunFlags::IS_STATEFUL);
            Ok(None)
        }
    }
}

fn send_reply(ev: &mut Eval<'_>, code: u16, reason: &str) -> Result<()> {
    let transactions = &ev.ctx.transactions;
    let sent = if ev.state.flags.contains(RunFlags::IS_STATEFUL) {
        transactions.send_stateful_reply(code, reason)
    } else {
        transactions.send_stateless_reply(code, reason)
    };
    sent.map_err(|err| CplError::collaborator("send_reply", err))
}

/// REJECT 的默认原因短语。
#[must_use]
pub fn default_reason(status: u16) -> &'static str {
    match status {
        reject::BUSY => "Busy Here",
        reject::NOTFOUND => "Not Found",
        reject::REJECT => "Decline",
        reject::ERROR => "Internal Server Error",
        _ => "Generic Error",
    }
}

/// 以最终回复拒绝请求。
///
/// # 教案式说明
/// - **契约 (What)**：无子节点；STATUS 必选且位于 `[400, 700)`；REASON 可选，
///   缺省时按状态码选择默认短语；
/// - **执行逻辑 (How)**：先校验全部属性，再升级事务、发送回复，
///   因此格式错误的节点永远不会发出回复。
pub(super) fn run_reject(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 0)?;
    let mut status = None;
    let mut reason = None;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            reject::STATUS => status = Some(attrs.take_num()?),
            reject::REASON => reason = Some(attrs.take_str(1)?),
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    let status = status.ok_or_else(|| node.malformed("STATUS attribute is mandatory"))?;
    if !(400..700).contains(&status) {
        return Err(node.malformed(format!("status {status} outside [400, 700)")));
    }
    let reason = reason.unwrap_or_else(|| default_reason(status));

    if let Some(step) = ensure_stateful(ev, false)? {
        return Ok(step);
    }
    send_reply(ev, status, reason)?;
    tracing::debug!(status, reason, "request rejected");
    Ok(NextStep::EndOfScript)
}

/// 渲染 REDIRECT 的 Contact 头：`Contact: <u1>;q=1.0 ,<u2>;q=0.5\r\n`。
pub(crate) fn render_contact_header<'e>(entries: impl IntoIterator<Item = &'e crate::location::LocationEntry>) -> String {
    let rendered: Vec<String> = entries
        .into_iter()
        .map(|entry| format!("<{}>;q={}", entry.uri, entry.q_value()))
        .collect();
    format!("Contact: {}\r\n", rendered.join(" ,"))
}

/// 以 3xx 回复把请求重定向到位置集中的全部地址。
pub(super) fn run_redirect(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 0)?;
    let mut permanent = false;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            redirect::PERMANENT => {
                permanent = match attrs.take_num()? {
                    YES_VAL => true,
                    NO_VAL => false,
                    other => return Err(node.malformed(format!("invalid PERMANENT value {other}"))),
                };
            }
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }

    if let Some(step) = ensure_stateful(ev, false)? {
        return Ok(step);
    }
    let header = render_contact_header(ev.state.location_set.iter());
    let handle = ev
        .ctx
        .transactions
        .add_reply_header(&header)
        .map_err(|err| CplError::collaborator("add_reply_header", err))?;
    let (code, reason) = if permanent {
        (301, "Moved permanently")
    } else {
        (302, "Moved temporarily")
    };
    let sent = send_reply(ev, code, reason);
    ev.ctx.transactions.remove_reply_header(handle);
    sent?;
    Ok(NextStep::EndOfScript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{LocationEntry, LocationSet};

    #[test]
    fn contact_header_follows_set_order() {
        let mut set = LocationSet::new();
        set.insert(LocationEntry::new("sip:low@x", 3));
        set.insert(LocationEntry::new("sip:top@x", 10));
        assert_eq!(
            render_contact_header(set.iter()),
            "Contact: <sip:top@x>;q=1.0 ,<sip:low@x>;q=0.3\r\n"
        );
    }

    #[test]
    fn default_reasons() {
        assert_eq!(default_reason(486), "Busy Here");
        assert_eq!(default_reason(404), "Not Found");
        assert_eq!(default_reason(603), "Decline");
        assert_eq!(default_reason(500), "Internal Server Error");
        assert_eq!(default_reason(488), "Generic Error");
    }
}
