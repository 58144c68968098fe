//! 集成测试共用的伪协作方。
//!
//! # 设计动机（Why）
//! - 每个测试二进制都需要同一组“可记录、可注入失败”的事务层与投递方，集中在此避免样板重复；
//! - 伪实现只记录调用，不做任何协议处理，断言全部基于记录内容。

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use spark_cpl::config::CplConfig;
use spark_cpl::context::{
    Contact, ExternalContext, HeaderKind, LogRecord, LogSink, MailMessage, MailSink,
    MessageContext, ReplyHeaderHandle, TransactionApi, TransactionState,
};
use spark_cpl::error::CollaboratorError;
use spark_cpl::interpreter::{CplSession, Direction, Interpreter};
use spark_cpl::location::LocationEntry;
use spark_cpl::proxy::{ForkHandle, ForkRequest};
use spark_cpl::registrar::MemoryLocationService;
use spark_cpl::script::NodeSpec;
use spark_cpl::NodeKind;

/// 固定的请求到达时刻：2026-10-14（周三）10:00 UTC。
pub fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0)
        .single()
        .expect("固定时刻合法")
}

/// 以哈希表保存头域的请求视图。
#[derive(Debug, Clone)]
pub struct FakeMessage {
    headers: HashMap<HeaderKind, String>,
    at: DateTime<Utc>,
}

impl FakeMessage {
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            at: received_at(),
        }
    }

    pub fn with(mut self, kind: HeaderKind, value: &str) -> Self {
        self.headers.insert(kind, value.to_owned());
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    pub fn shared(self) -> Arc<dyn MessageContext> {
        Arc::new(self)
    }
}

impl MessageContext for FakeMessage {
    fn header(&self, kind: HeaderKind) -> Option<&str> {
        self.headers.get(&kind).map(String::as_str)
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// 一次回复的记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub code: u16,
    pub reason: String,
    pub stateful: bool,
    /// 发送时仍挂在回复上的附加头。
    pub headers: Vec<String>,
}

#[derive(Debug, Default)]
struct Journal {
    new_transactions: usize,
    replies: Vec<SentReply>,
    pending_headers: Vec<(ReplyHeaderHandle, String)>,
    forks: Vec<ForkRequest>,
    proxied: Vec<Vec<LocationEntry>>,
    next_handle: u64,
}

/// 记录全部调用的事务层。
#[derive(Debug)]
pub struct RecordingTransactions {
    journal: Mutex<Journal>,
    pub transaction_state: Mutex<TransactionState>,
    pub fail_new_transaction: Mutex<bool>,
    pub fail_replies: Mutex<bool>,
    pub fail_fork: Mutex<bool>,
    pub fail_proxy: Mutex<bool>,
}

impl Default for RecordingTransactions {
    fn default() -> Self {
        Self {
            journal: Mutex::new(Journal::default()),
            transaction_state: Mutex::new(TransactionState::Created),
            fail_new_transaction: Mutex::new(false),
            fail_replies: Mutex::new(false),
            fail_fork: Mutex::new(false),
            fail_proxy: Mutex::new(false),
        }
    }
}

impl RecordingTransactions {
    pub fn new_transactions(&self) -> usize {
        self.journal.lock().new_transactions
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.journal.lock().replies.clone()
    }

    /// 尚未撤销的附加头；正常流程结束后应为空。
    pub fn pending_headers(&self) -> Vec<String> {
        self.journal
            .lock()
            .pending_headers
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn forks(&self) -> Vec<ForkRequest> {
        self.journal.lock().forks.clone()
    }

    /// 第 `index` 次分叉的目标 URI。
    pub fn fork_targets(&self, index: usize) -> Vec<String> {
        self.journal.lock().forks[index]
            .targets
            .iter()
            .map(|entry| entry.uri.to_string())
            .collect()
    }

    pub fn proxied(&self) -> Vec<Vec<LocationEntry>> {
        self.journal.lock().proxied.clone()
    }
}

fn failure(flag: &Mutex<bool>, what: &str) -> Result<(), CollaboratorError> {
    if *flag.lock() {
        Err(CollaboratorError::new(format!("{what} refused")))
    } else {
        Ok(())
    }
}

impl TransactionApi for RecordingTransactions {
    fn new_transaction(&self) -> Result<TransactionState, CollaboratorError> {
        failure(&self.fail_new_transaction, "new_transaction")?;
        self.journal.lock().new_transactions += 1;
        Ok(*self.transaction_state.lock())
    }

    fn send_stateful_reply(&self, code: u16, reason: &str) -> Result<(), CollaboratorError> {
        self.reply(code, reason, true)
    }

    fn send_stateless_reply(&self, code: u16, reason: &str) -> Result<(), CollaboratorError> {
        self.reply(code, reason, false)
    }

    fn add_reply_header(&self, text: &str) -> Result<ReplyHeaderHandle, CollaboratorError> {
        let mut journal = self.journal.lock();
        journal.next_handle += 1;
        let handle = ReplyHeaderHandle(journal.next_handle);
        journal.pending_headers.push((handle, text.to_owned()));
        Ok(handle)
    }

    fn remove_reply_header(&self, handle: ReplyHeaderHandle) {
        self.journal
            .lock()
            .pending_headers
            .retain(|(existing, _)| *existing != handle);
    }

    fn fork(&self, request: &ForkRequest) -> Result<ForkHandle, CollaboratorError> {
        failure(&self.fail_fork, "fork")?;
        let mut journal = self.journal.lock();
        journal.forks.push(request.clone());
        journal.next_handle += 1;
        Ok(ForkHandle(journal.next_handle))
    }

    fn proxy_to_location_set(
        &self,
        targets: &[LocationEntry],
        _route: Option<u32>,
    ) -> Result<(), CollaboratorError> {
        failure(&self.fail_proxy, "proxy")?;
        self.journal.lock().proxied.push(targets.to_vec());
        Ok(())
    }
}

impl RecordingTransactions {
    fn reply(&self, code: u16, reason: &str, stateful: bool) -> Result<(), CollaboratorError> {
        failure(&self.fail_replies, "reply")?;
        let mut journal = self.journal.lock();
        let headers = journal
            .pending_headers
            .iter()
            .map(|(_, text)| text.clone())
            .collect();
        journal.replies.push(SentReply {
            code,
            reason: reason.to_owned(),
            stateful,
            headers,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogSink {
    pub records: Mutex<Vec<LogRecord>>,
}

impl LogSink for RecordingLogSink {
    fn submit(&self, record: LogRecord) {
        self.records.lock().push(record);
    }
}

#[derive(Debug, Default)]
pub struct RecordingMailSink {
    pub mails: Mutex<Vec<MailMessage>>,
}

impl MailSink for RecordingMailSink {
    fn submit(&self, mail: MailMessage) {
        self.mails.lock().push(mail);
    }
}

/// 一组伪协作方与配置。
pub struct Harness {
    pub transactions: Arc<RecordingTransactions>,
    pub locations: MemoryLocationService,
    pub logs: Arc<RecordingLogSink>,
    pub mails: Arc<RecordingMailSink>,
    pub config: CplConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RecordingTransactions::default()),
            locations: MemoryLocationService::new(),
            logs: Arc::new(RecordingLogSink::default()),
            mails: Arc::new(RecordingMailSink::default()),
            config: CplConfig::default(),
        }
    }

    pub fn context(&self) -> ExternalContext {
        ExternalContext::builder(self.transactions.clone(), Arc::new(self.locations.clone()))
            .config(self.config.clone())
            .log_sink(self.logs.clone())
            .mail_sink(self.mails.clone())
            .build()
    }

    pub fn interpreter(&self, script: &NodeSpec, message: FakeMessage, direction: Direction) -> Interpreter {
        Interpreter::new(
            message.shared(),
            script.script().expect("测试脚本可编码"),
            direction,
            "alice",
            self.context(),
        )
        .expect("根节点为 CPL")
    }

    pub fn session(&self, script: &NodeSpec, message: FakeMessage) -> CplSession {
        CplSession::new(self.interpreter(script, message, Direction::Incoming))
    }
}

/// `CPL { INCOMING { body } }`。
pub fn incoming(body: NodeSpec) -> NodeSpec {
    NodeSpec::new(NodeKind::Cpl).child(NodeSpec::new(NodeKind::Incoming).child(body))
}

/// 一条一小时后过期的注册记录。
pub fn contact(uri: &str, q: Option<u16>) -> Contact {
    Contact {
        uri: uri.to_owned(),
        q,
        expires: received_at() + chrono::Duration::hours(1),
        received: None,
        nated: false,
    }
}
