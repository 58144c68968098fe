//! 非信令动作：LOG 与 MAIL。
//!
//! 两者都是即发即弃：投递方失败不影响脚本流程，执行完毕后继续首个子节点。

use super::{Eval, NextStep, first_child_or_default};
use crate::context::{LogRecord, MailMessage};
use crate::error::Result;
use crate::script::Node;
use crate::script::tree::{log, mail};

/// 在不切断 UTF-8 字符的前提下截断到至多 `max` 字节。
fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// 记录一条用户日志。
///
/// # 教案式说明
/// - **契约 (What)**：至多一个子节点；NAME 与 COMMENT 均可选，
///   分别截断到 [`log::MAX_NAME_LEN`] 与 [`log::MAX_COMMENT_LEN`] 字节；
/// - **执行逻辑 (How)**：未配置日志目录时整个节点退化为直通，属性也不解析；
///   COMMENT 为空时只记一条提示，不投递。
pub(super) fn run_log(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 1)?;
    if !ev.ctx.config.logging_enabled() {
        return first_child_or_default(node);
    }
    let mut name = "";
    let mut comment = "";
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            log::NAME => name = truncate_at_boundary(attrs.take_str(1)?, log::MAX_NAME_LEN),
            log::COMMENT => {
                comment = truncate_at_boundary(attrs.take_str(1)?, log::MAX_COMMENT_LEN);
            }
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    if comment.is_empty() {
        tracing::info!(offset = node.offset(), "LOG without comment, nothing submitted");
    } else {
        ev.ctx.log_sink.submit(LogRecord {
            user: ev.state.user.to_string(),
            name: name.to_owned(),
            comment: comment.to_owned(),
        });
    }
    first_child_or_default(node)
}

/// 发送通知邮件。
///
/// - TO 必选；SUBJECT 与 BODY 可选，同时为空时告警并跳过投递；
/// - 三个字符串属性都不带结尾 NUL。
pub(super) fn run_mail(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    node.expect_kids(0, 1)?;
    let (mut to, mut subject, mut body) = (None, "", "");
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        match code {
            mail::TO => to = Some(attrs.take_str(0)?),
            mail::SUBJECT => subject = attrs.take_str(0)?,
            mail::BODY => body = attrs.take_str(0)?,
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }
    let to = to.ok_or_else(|| node.malformed("TO attribute is mandatory"))?;
    if subject.is_empty() && body.is_empty() {
        tracing::warn!(offset = node.offset(), to, "MAIL with empty subject and body skipped");
    } else {
        ev.ctx.mail_sink.submit(MailMessage {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
    }
    first_child_or_default(node)
}
