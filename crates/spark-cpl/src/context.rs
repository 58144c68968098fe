//! # context 模块说明
//!
//! ## 角色定位（Why）
//! - 解释器依赖的全部外部能力（报文头读取、事务层、注册表、日志/邮件投递、时间匹配）
//!   都以 trait 形式在此声明，由 [`ExternalContext`] 显式注入每一次求值；
//! - 测试只需提供伪实现即可驱动完整脚本，不依赖任何全局状态。
//!
//! ## 契约（What）
//! - 所有协作方都要求 `Send + Sync`：PROXY 分支回复可能在另一线程投递；
//! - 协作方调用对解释器而言是原子的：调用进、结果出，不存在部分状态。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::CplConfig;
use crate::error::CollaboratorError;
use crate::location::LocationEntry;
use crate::proxy::{ForkHandle, ForkRequest};
use crate::time::{DefaultTimeMatcher, TimeMatcher};

/// 解释器可能读取的报文头。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// 生效中的 Request-URI（若已被改写则为改写后的值）。
    RequestUri,
    From,
    To,
    Subject,
    Organization,
    UserAgent,
    AcceptLanguage,
    Priority,
}

impl HeaderKind {
    pub const ALL: [HeaderKind; 8] = [
        HeaderKind::RequestUri,
        HeaderKind::From,
        HeaderKind::To,
        HeaderKind::Subject,
        HeaderKind::Organization,
        HeaderKind::UserAgent,
        HeaderKind::AcceptLanguage,
        HeaderKind::Priority,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            HeaderKind::RequestUri => "Request-URI",
            HeaderKind::From => "From",
            HeaderKind::To => "To",
            HeaderKind::Subject => "Subject",
            HeaderKind::Organization => "Organization",
            HeaderKind::UserAgent => "User-Agent",
            HeaderKind::AcceptLanguage => "Accept-Language",
            HeaderKind::Priority => "Priority",
        }
    }
}

/// 被处理请求的只读视图。
pub trait MessageContext: Send + Sync {
    /// 头域原文；From/To 返回完整 name-addr 文本。
    fn header(&self, kind: HeaderKind) -> Option<&str>;

    /// 请求到达时间，TIME_SWITCH 以此为匹配时刻。
    fn received_at(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 创建事务的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    /// 该请求是已有事务的重传，原始请求的回复已经发出。
    Retransmission,
}

/// 回复头插入句柄，用于发送后撤销。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyHeaderHandle(pub u64);

/// 事务层接口。
///
/// # 教案式说明
/// - **意图 (Why)**：REJECT/REDIRECT/PROXY 与默认动作都需要有状态/无状态地发出信令；
/// - **契约 (What)**：
///   - `add_reply_header` 插入的文本只在紧随其后的一次回复中生效，调用方随后必须 `remove_reply_header`；
///   - `fork` 返回的句柄用于把后续分支回复关联回会话；
///   - `proxy_to_location_set` 供默认动作使用，一次性代理到全部候选目标。
pub trait TransactionApi: Send + Sync {
    fn new_transaction(&self) -> Result<TransactionState, CollaboratorError>;

    fn send_stateful_reply(&self, code: u16, reason: &str) -> Result<(), CollaboratorError>;

    fn send_stateless_reply(&self, code: u16, reason: &str) -> Result<(), CollaboratorError>;

    fn add_reply_header(&self, text: &str) -> Result<ReplyHeaderHandle, CollaboratorError>;

    fn remove_reply_header(&self, handle: ReplyHeaderHandle);

    fn fork(&self, request: &ForkRequest) -> Result<ForkHandle, CollaboratorError>;

    fn proxy_to_location_set(
        &self,
        targets: &[LocationEntry],
        route: Option<u32>,
    ) -> Result<(), CollaboratorError>;
}

/// 注册表中的一条联系地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub uri: String,
    /// q 值的千分制表示（`0..=1000`），未声明时为 `None`。
    pub q: Option<u16>,
    pub expires: DateTime<Utc>,
    pub received: Option<String>,
    pub nated: bool,
}

impl Contact {
    /// 换算为位置集优先级：q 值乘以 10，未声明 q 值时取最高优先级 10。
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.q.map_or(10, |q| u8::try_from(q.min(1000) / 100).unwrap_or(10))
    }
}

/// 注册表查询接口。
pub trait UserLocationApi: Send + Sync {
    /// `Ok(None)` 表示该 AOR 没有任何注册记录。
    fn lookup(&self, domain: &str, aor: &str) -> Result<Option<Vec<Contact>>, CollaboratorError>;
}

/// LOG 节点投递的一条记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub user: String,
    pub name: String,
    pub comment: String,
}

/// MAIL 节点投递的一封邮件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// 即发即弃的日志投递方，失败不回传脚本。
pub trait LogSink: Send + Sync {
    fn submit(&self, record: LogRecord);
}

/// 即发即弃的邮件投递方。
pub trait MailSink: Send + Sync {
    fn submit(&self, mail: MailMessage);
}

/// 以 `tracing` 事件落地的默认日志投递方。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn submit(&self, record: LogRecord) {
        tracing::info!(
            target: "spark_cpl::log",
            user = %record.user,
            name = %record.name,
            comment = %record.comment,
            "cpl log record"
        );
    }
}

/// 以 `tracing` 事件落地的默认邮件投递方。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailSink;

impl MailSink for TracingMailSink {
    fn submit(&self, mail: MailMessage) {
        tracing::info!(
            target: "spark_cpl::mail",
            to = %mail.to,
            subject = %mail.subject,
            body_len = mail.body.len(),
            "cpl mail queued"
        );
    }
}

/// 求值期间可用的全部外部能力。
///
/// 克隆只复制 `Arc`，会话之间可共享同一组协作方。
#[derive(Clone)]
pub struct ExternalContext {
    pub config: Arc<CplConfig>,
    pub transactions: Arc<dyn TransactionApi>,
    pub locations: Arc<dyn UserLocationApi>,
    pub log_sink: Arc<dyn LogSink>,
    pub mail_sink: Arc<dyn MailSink>,
    pub time_matcher: Arc<dyn TimeMatcher>,
}

impl core::fmt::Debug for ExternalContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExternalContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExternalContext {
    /// 以事务层与注册表为必选项开始构造，其余协作方使用默认实现。
    pub fn builder(
        transactions: Arc<dyn TransactionApi>,
        locations: Arc<dyn UserLocationApi>,
    ) -> ExternalContextBuilder {
        ExternalContextBuilder {
            config: CplConfig::default(),
            transactions,
            locations,
            log_sink: Arc::new(TracingLogSink),
            mail_sink: Arc::new(TracingMailSink),
            time_matcher: Arc::new(DefaultTimeMatcher),
        }
    }
}

pub struct ExternalContextBuilder {
    config: CplConfig,
    transactions: Arc<dyn TransactionApi>,
    locations: Arc<dyn UserLocationApi>,
    log_sink: Arc<dyn LogSink>,
    mail_sink: Arc<dyn MailSink>,
    time_matcher: Arc<dyn TimeMatcher>,
}

impl ExternalContextBuilder {
    #[must_use]
    pub fn config(mut self, config: CplConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    #[must_use]
    pub fn mail_sink(mut self, sink: Arc<dyn MailSink>) -> Self {
        self.mail_sink = sink;
        self
    }

    #[must_use]
    pub fn time_matcher(mut self, matcher: Arc<dyn TimeMatcher>) -> Self {
        self.time_matcher = matcher;
        self
    }

    pub fn build(self) -> ExternalContext {
        ExternalContext {
            config: Arc::new(self.config),
            transactions: self.transactions,
            locations: self.locations,
            log_sink: self.log_sink,
            mail_sink: self.mail_sink,
            time_matcher: self.time_matcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(q: Option<u16>) -> Contact {
        Contact {
            uri: "sip:a@b".to_owned(),
            q,
            expires: Utc::now(),
            received: None,
            nated: false,
        }
    }

    #[test]
    fn contact_priority_scales_q_value() {
        assert_eq!(contact(None).priority(), 10);
        assert_eq!(contact(Some(1000)).priority(), 10);
        assert_eq!(contact(Some(800)).priority(), 8);
        assert_eq!(contact(Some(55)).priority(), 0);
        assert_eq!(contact(Some(4000)).priority(), 10);
    }
}
