//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义解释器对外暴露的错误语义，让调用方只需区分“脚本格式错误”与“运行期错误”两大族；
//! - 协作方（事务层、注册表、日志/邮件投递）的失败统一折叠为 [`CplError::Collaborator`]，
//!   避免解释器内部泄漏外部实现细节。
//!
//! ## 设计要求（What）
//! - 所有变体派生 [`thiserror::Error`]，可直接参与 `?` 传播；
//! - [`CplError::is_format`] 是唯一的分类入口，调度循环据此把错误映射为
//!   `ScriptFormatError` 或 `ScriptRunError`。
//!
//! ## 扩展建议（How）
//! - 新增错误时先判断其归属族，再在 `is_format` 中登记，保持分类表与变体同步。

use thiserror::Error;

/// 解释器错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：二进制脚本来自不受信的编译产物，每一次偏移计算都可能越界；
///   通过细粒度变体把“哪个节点、哪个偏移、为什么失败”带回调用方。
/// - **契约 (What)**：
///   - 格式族：`OutOfBounds`、`UnknownNode`、`Malformed`、`Encode`；
///   - 运行族：`Collaborator`、`Identity`、`Released`；
///   - `StepLimit` 归入格式族：终止不了的脚本是编译产物自身的缺陷；
///   - `Config` 仅在加载配置时出现，脚本执行期间不会产生。
/// - **设计权衡 (Trade-offs)**：`detail` 使用 `String` 保存上下文，牺牲少量分配换取可读的诊断。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CplError {
    /// 读取越过脚本缓冲区边界。
    ///
    /// - **契约 (What)**：`offset`/`len` 描述试图读取的区间，`limit` 为缓冲区长度。
    #[error("script access out of bounds: {len} byte(s) at offset {offset}, buffer is {limit} byte(s)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        limit: usize,
    },

    /// 节点类型字节不在已知集合内。
    #[error("unknown node type {node_type} at offset {offset}")]
    UnknownNode { node_type: u8, offset: usize },

    /// 节点结构与其类型约定不符（子节点数、属性数、属性取值等）。
    ///
    /// - **契约 (What)**：`node` 为节点名称，`offset` 为节点起始偏移，`detail` 说明违反的约束。
    #[error("malformed {node} node at offset {offset}: {detail}")]
    Malformed {
        node: &'static str,
        offset: usize,
        detail: String,
    },

    /// 构造脚本时输入无法编码（偏移或长度超出 16 位字段）。
    #[error("cannot encode script: {detail}")]
    Encode { detail: String },

    /// 外部协作方失败。
    ///
    /// - **契约 (What)**：`context` 为失败的操作名（如 `"lookup"`、`"send_reply"`）。
    /// - **风险 (Trade-offs)**：上下文字符串应保持稳定，便于日志聚合。
    #[error("collaborator failure during `{context}`: {detail}")]
    Collaborator {
        context: &'static str,
        detail: String,
    },

    /// 无法从请求中确定脚本归属用户。
    #[error("cannot determine script owner: {detail}")]
    Identity { detail: String },

    /// 脚本执行步数超过上限，通常意味着 SUB 形成了环。
    #[error("script exceeded {limit} dispatch steps")]
    StepLimit { limit: usize },

    /// 会话已经释放，不能再执行脚本。
    #[error("interpreter session already released")]
    Released,

    /// 配置非法。
    #[error("invalid configuration: {detail}")]
    Config { detail: String },
}

impl CplError {
    /// 构造 [`CplError::Malformed`] 的便捷入口。
    pub(crate) fn malformed(node: &'static str, offset: usize, detail: impl Into<String>) -> Self {
        Self::Malformed {
            node,
            offset,
            detail: detail.into(),
        }
    }

    /// 以操作名包装协作方错误。
    pub(crate) fn collaborator(context: &'static str, err: CollaboratorError) -> Self {
        Self::Collaborator {
            context,
            detail: err.0,
        }
    }

    /// 判断错误是否属于脚本格式族。
    ///
    /// - **契约 (What)**：返回 `true` 表示脚本自身不一致，重试无意义；
    ///   `Config` 同样视为格式问题，因为它来自静态输入而非运行期协作。
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::UnknownNode { .. }
                | Self::Malformed { .. }
                | Self::Encode { .. }
                | Self::StepLimit { .. }
                | Self::Config { .. }
        )
    }
}

/// 外部协作方返回的失败描述。
///
/// 事务层、注册表等实现只需给出人类可读的原因，分类工作由解释器完成。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

pub type Result<T, E = CplError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_splits_format_and_runtime_families() {
        let format = CplError::malformed("REJECT", 12, "status out of range");
        assert!(format.is_format());
        assert!(format.to_string().contains("REJECT"));

        let runtime = CplError::collaborator("send_reply", CollaboratorError::new("socket closed"));
        assert!(!runtime.is_format());
        assert_eq!(
            runtime.to_string(),
            "collaborator failure during `send_reply`: socket closed"
        );
        assert!(!CplError::Released.is_format());
    }
}
