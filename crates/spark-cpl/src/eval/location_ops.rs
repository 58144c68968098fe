//! 位置集操作节点：LOOKUP、LOCATION、REMOVE_LOCATION。

use std::sync::Arc;

use super::{Eval, NextStep, first_child_or_default};
use crate::error::{CplError, Result};
use crate::interpreter::RunFlags;
use crate::location::LocationEntry;
use crate::script::tree::{NO_VAL, YES_VAL, location, lookup, remove_location};
use crate::script::{Node, NodeKind};
use crate::uri::parse_uri;

fn yes_no(node: &Node<'_>, value: u16, what: &str) -> Option<bool> {
    match value {
        YES_VAL => Some(true),
        NO_VAL => Some(false),
        other => {
            tracing::warn!(offset = node.offset(), value = other, "invalid {what} value, using default");
            None
        }
    }
}

/// 查询注册表并把联系地址并入位置集。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 属性仅 CLEAR（是/否），非法取值告警后保持“否”；
///   - 子节点限 SUCCESS/NOTFOUND/FAILURE，各自可选；
///   - 未配置注册表域或查询失败走 FAILURE，缺少 FAILURE 时为运行错误；
///   - 无记录或全部过期走 NOTFOUND；
/// - **执行逻辑 (How)**：按注册顺序追加未过期的联系地址，
///   `lookup_append_branches` 关闭时只取第一个；优先级取 q 值乘 10；
/// - **风险 (Trade-offs)**：过期判定以请求到达时刻为准，长时间挂起的会话不会重新判定。
pub(super) fn run_lookup(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    let mut clear = false;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            lookup::CLEAR => {
                let value = attrs.take_num()?;
                clear = yes_no(node, value, "CLEAR").unwrap_or(clear);
            }
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }

    let (mut success, mut not_found, mut failure) = (None, None, None);
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        let slot = match kid.kind() {
            NodeKind::Success => &mut success,
            NodeKind::NotFound => &mut not_found,
            NodeKind::Failure => &mut failure,
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        };
        *slot = Some(kid);
    }

    let outcome = match ev.ctx.config.lookup_domain.as_deref() {
        None => Err("no lookup domain configured".to_owned()),
        Some(domain) => ev
            .ctx
            .locations
            .lookup(domain, &ev.state.user)
            .map_err(|err| err.to_string()),
    };
    let contacts = match outcome {
        Ok(contacts) => contacts,
        Err(detail) => {
            return match failure {
                Some(kid) => {
                    tracing::warn!(user = %ev.state.user, %detail, "lookup failed");
                    first_child_or_default(&kid)
                }
                None => Err(CplError::Collaborator {
                    context: "lookup",
                    detail,
                }),
            };
        }
    };

    let now = ev.state.received_at;
    let mut live = contacts
        .unwrap_or_default()
        .into_iter()
        .filter(|contact| contact.expires > now)
        .peekable();
    if live.peek().is_none() {
        return match not_found {
            Some(kid) => first_child_or_default(&kid),
            None => Ok(NextStep::FallThroughToDefault),
        };
    }

    if clear {
        ev.state.location_set.clear();
    }
    let take = if ev.ctx.config.lookup_append_branches {
        usize::MAX
    } else {
        1
    };
    for contact in live.take(take) {
        let priority = contact.priority();
        ev.state.location_set.insert(LocationEntry {
            uri: Arc::from(contact.uri),
            received: contact.received.map(Arc::from),
            priority,
            owned: true,
            nated: contact.nated,
        });
    }
    ev.state.flags.insert(RunFlags::LOC_SET_MODIFIED);
    match success {
        Some(kid) => first_child_or_default(&kid),
        None => Ok(NextStep::FallThroughToDefault),
    }
}

/// 把脚本给定的 URL 加入位置集。
pub(super) fn run_location(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 1)?;
    let mut url = None;
    let mut priority = 10u8;
    let mut clear = false;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            location::URL => url = Some(attrs.take_str(1)?),
            location::PRIORITY => {
                let value = attrs.take_num()?;
                match u8::try_from(value).ok().filter(|p| *p <= 10) {
                    Some(p) => priority = p,
                    None => tracing::warn!(
                        offset = node.offset(),
                        value,
                        "PRIORITY above 10, keeping 10"
                    ),
                }
            }
            location::CLEAR => {
                let value = attrs.take_num()?;
                clear = yes_no(node, value, "CLEAR").unwrap_or(clear);
            }
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    let url = url.ok_or_else(|| node.malformed("URL attribute is mandatory"))?;
    parse_uri(url).map_err(|_| node.malformed(format!("invalid URL `{url}`")))?;

    if clear {
        ev.state.location_set.clear();
    }
    ev.state.location_set.insert(LocationEntry::new(url, priority));
    ev.state.flags.insert(RunFlags::LOC_SET_MODIFIED);
    first_child_or_default(node)
}

/// 删除指定地址，或在未给出地址时清空位置集。
pub(super) fn run_remove_location(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 1)?;
    if ev.state.location_set.is_empty() {
        return first_child_or_default(node);
    }
    let mut target = None;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            remove_location::LOCATION => target = Some(attrs.take_str(1)?),
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    match target {
        Some(uri) => {
            ev.state.location_set.remove_by_uri(uri);
        }
        None => ev.state.location_set.clear(),
    }
    ev.state.flags.insert(RunFlags::LOC_SET_MODIFIED);
    first_child_or_default(node)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use crate::context::{
        ExternalContext, HeaderKind, MessageContext, ReplyHeaderHandle, TransactionApi,
        TransactionState,
    };
    use crate::error::CollaboratorError;
    use crate::interpreter::{Direction, Interpreter, ScriptOutcome};
    use crate::location::LocationEntry;
    use crate::proxy::{ForkHandle, ForkRequest};
    use crate::registrar::MemoryLocationService;
    use crate::script::tree::location;
    use crate::script::{NodeKind, NodeSpec};

    struct Bare;

    impl MessageContext for Bare {
        fn header(&self, _kind: HeaderKind) -> Option<&str> {
            None
        }

        fn received_at(&self) -> DateTime<Utc> {
            DateTime::UNIX_EPOCH
        }
    }

    /// 只记录默认动作代理目标的事务层。
    #[derive(Default)]
    struct ProxyOnly {
        proxied: Mutex<Vec<LocationEntry>>,
    }

    impl TransactionApi for ProxyOnly {
        fn new_transaction(&self) -> Result<TransactionState, CollaboratorError> {
            Ok(TransactionState::Created)
        }

        fn send_stateful_reply(&self, _code: u16, _reason: &str) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::new("unexpected reply"))
        }

        fn send_stateless_reply(&self, _code: u16, _reason: &str) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::new("unexpected reply"))
        }

        fn add_reply_header(&self, _text: &str) -> Result<ReplyHeaderHandle, CollaboratorError> {
            Err(CollaboratorError::new("unexpected header"))
        }

        fn remove_reply_header(&self, _handle: ReplyHeaderHandle) {}

        fn fork(&self, _request: &ForkRequest) -> Result<ForkHandle, CollaboratorError> {
            Err(CollaboratorError::new("unexpected fork"))
        }

        fn proxy_to_location_set(
            &self,
            targets: &[LocationEntry],
            _route: Option<u32>,
        ) -> Result<(), CollaboratorError> {
            self.proxied.lock().extend_from_slice(targets);
            Ok(())
        }
    }

    fn run(body: NodeSpec) -> (ScriptOutcome, Vec<LocationEntry>) {
        let script = NodeSpec::new(NodeKind::Cpl)
            .child(NodeSpec::new(NodeKind::Incoming).child(body))
            .script()
            .expect("测试脚本可编码");
        let transactions = std::sync::Arc::new(ProxyOnly::default());
        let ctx = ExternalContext::builder(
            transactions.clone(),
            std::sync::Arc::new(MemoryLocationService::new()),
        )
        .build();
        let outcome = Interpreter::new(std::sync::Arc::new(Bare), script, Direction::Incoming, "u", ctx)
            .expect("根节点为 CPL")
            .run();
        let proxied = transactions.proxied.lock().clone();
        (outcome, proxied)
    }

    #[tracing_test::traced_test]
    #[test]
    fn oversized_priority_is_clamped_with_a_warning() {
        let (outcome, proxied) = run(
            NodeSpec::new(NodeKind::Location)
                .string(location::URL, "sip:a@h.com")
                .numeric(location::PRIORITY, 12),
        );
        assert_eq!(outcome, ScriptOutcome::End);
        assert_eq!(proxied.len(), 1);
        assert_eq!(proxied[0].priority, 10);
        assert!(logs_contain("PRIORITY above 10"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn invalid_clear_keeps_existing_entries() {
        let (_, proxied) = run(
            NodeSpec::new(NodeKind::Location)
                .string(location::URL, "sip:a@h.com")
                .child(
                    NodeSpec::new(NodeKind::Location)
                        .string(location::URL, "sip:b@h.com")
                        .numeric(location::CLEAR, 7),
                ),
        );
        let uris: Vec<_> = proxied.iter().map(|entry| &*entry.uri).collect();
        assert_eq!(uris, ["sip:a@h.com", "sip:b@h.com"]);
        assert!(logs_contain("invalid CLEAR value"));
    }
}
