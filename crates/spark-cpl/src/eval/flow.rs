//! 结构性节点：脚本根、DEFAULT 标签与 SUB 跳转。

use super::{Eval, NextStep, first_child_or_default};
use crate::error::Result;
use crate::interpreter::RunFlags;
use crate::script::tree::sub;
use crate::script::{Node, NodeKind};

/// 根节点：按运行方向挑选 INCOMING 或 OUTGOING 分支。
///
/// SUBACTION、ANCILLARY 与相反方向的分支被跳过，其余子节点类型视为格式错误。
pub(super) fn run_cpl(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    let wanted = if ev.state.flags.contains(RunFlags::RUN_INCOMING) {
        NodeKind::Incoming
    } else {
        NodeKind::Outgoing
    };
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            kind if kind == wanted => return first_child_or_default(&kid),
            NodeKind::Incoming | NodeKind::Outgoing | NodeKind::Subaction | NodeKind::Ancillary => {}
            other => {
                return Err(node.malformed(format!("unexpected {} child", other.name())));
            }
        }
    }
    tracing::debug!(direction = wanted.name(), "no branch for this direction");
    Ok(NextStep::FallThroughToDefault)
}

/// DEFAULT 节点被直接执行时只是一个标签。
pub(super) fn run_label(node: &Node<'_>) -> Result<NextStep> {
    first_child_or_default(node)
}

/// SUB：按向后偏移跳到 SUBACTION 的首个子节点。
///
/// # 教案式说明
/// - **契约 (What)**：无子节点、恰好一个 REF 属性；目标必须位于缓冲区内、
///   类型为 SUBACTION 且没有属性；
/// - **风险 (Trade-offs)**：偏移大于 SUB 自身位置会向缓冲区起点之前下溢，
///   这里用 `checked_sub` 拒绝，而不是回绕。
pub(super) fn run_sub(node: &Node<'_>) -> Result<NextStep> {
    node.expect_kids(0, 0)?;
    if node.attr_count() != 1 {
        return Err(node.malformed("SUB requires exactly one attribute"));
    }
    let mut attrs = node.attrs();
    match attrs.next_code()? {
        Some(sub::REF) => {}
        other => return Err(node.malformed(format!("unknown attribute {other:?}"))),
    }
    let back = usize::from(attrs.take_num()?);
    let target = node
        .offset()
        .checked_sub(back)
        .ok_or_else(|| node.malformed(format!("reference {back} underflows the script")))?;
    let subaction = node.script().node(target)?;
    if subaction.kind() != NodeKind::Subaction {
        return Err(node.malformed(format!(
            "reference points to {}, not SUBACTION",
            subaction.kind().name()
        )));
    }
    if subaction.attr_count() != 0 {
        return Err(node.malformed("referenced SUBACTION carries attributes"));
    }
    first_child_or_default(&subaction)
}
