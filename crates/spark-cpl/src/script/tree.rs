//! 节点类型与属性编码常量。
//!
//! ## 契约（What）
//! - 节点类型为单字节，属性码与数值型属性值均为 16 位大端；
//! - 这些常量由编译器与解释器共享，一经发布即不可更改。
//!
//! ## 组织方式（How）
//! - [`NodeKind`] 负责节点类型字节与名称的双向映射；
//! - 每种带属性的节点拥有一个同名子模块，集中放置属性码与取值常量。

/// CPL 节点类型。
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Cpl = 1,
    Incoming = 2,
    Outgoing = 3,
    Ancillary = 4,
    Subaction = 5,
    AddressSwitch = 6,
    Address = 7,
    Busy = 8,
    Default = 9,
    Failure = 10,
    Log = 11,
    Lookup = 12,
    Location = 13,
    Language = 14,
    LanguageSwitch = 15,
    Mail = 16,
    NotFound = 17,
    NoAnswer = 18,
    Proxy = 19,
    Priority = 20,
    PrioritySwitch = 21,
    Reject = 22,
    Redirect = 23,
    Redirection = 24,
    RemoveLocation = 25,
    Sub = 26,
    Success = 27,
    String = 28,
    StringSwitch = 29,
    Time = 30,
    TimeSwitch = 31,
    Otherwise = 32,
    NotPresent = 33,
}

impl NodeKind {
    const ALL: [NodeKind; 33] = [
        NodeKind::Cpl,
        NodeKind::Incoming,
        NodeKind::Outgoing,
        NodeKind::Ancillary,
        NodeKind::Subaction,
        NodeKind::AddressSwitch,
        NodeKind::Address,
        NodeKind::Busy,
        NodeKind::Default,
        NodeKind::Failure,
        NodeKind::Log,
        NodeKind::Lookup,
        NodeKind::Location,
        NodeKind::Language,
        NodeKind::LanguageSwitch,
        NodeKind::Mail,
        NodeKind::NotFound,
        NodeKind::NoAnswer,
        NodeKind::Proxy,
        NodeKind::Priority,
        NodeKind::PrioritySwitch,
        NodeKind::Reject,
        NodeKind::Redirect,
        NodeKind::Redirection,
        NodeKind::RemoveLocation,
        NodeKind::Sub,
        NodeKind::Success,
        NodeKind::String,
        NodeKind::StringSwitch,
        NodeKind::Time,
        NodeKind::TimeSwitch,
        NodeKind::Otherwise,
        NodeKind::NotPresent,
    ];

    /// 由类型字节解析节点种类，未知字节返回 `None`。
    #[must_use]
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1..=33 => Some(Self::ALL[usize::from(raw) - 1]),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// 诊断用名称，与脚本源文本中的元素名保持一致。
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            NodeKind::Cpl => "CPL",
            NodeKind::Incoming => "INCOMING",
            NodeKind::Outgoing => "OUTGOING",
            NodeKind::Ancillary => "ANCILLARY",
            NodeKind::Subaction => "SUBACTION",
            NodeKind::AddressSwitch => "ADDRESS_SWITCH",
            NodeKind::Address => "ADDRESS",
            NodeKind::Busy => "BUSY",
            NodeKind::Default => "DEFAULT",
            NodeKind::Failure => "FAILURE",
            NodeKind::Log => "LOG",
            NodeKind::Lookup => "LOOKUP",
            NodeKind::Location => "LOCATION",
            NodeKind::Language => "LANGUAGE",
            NodeKind::LanguageSwitch => "LANGUAGE_SWITCH",
            NodeKind::Mail => "MAIL",
            NodeKind::NotFound => "NOTFOUND",
            NodeKind::NoAnswer => "NOANSWER",
            NodeKind::Proxy => "PROXY",
            NodeKind::Priority => "PRIORITY",
            NodeKind::PrioritySwitch => "PRIORITY_SWITCH",
            NodeKind::Reject => "REJECT",
            NodeKind::Redirect => "REDIRECT",
            NodeKind::Redirection => "REDIRECTION",
            NodeKind::RemoveLocation => "REMOVE_LOCATION",
            NodeKind::Sub => "SUB",
            NodeKind::Success => "SUCCESS",
            NodeKind::String => "STRING",
            NodeKind::StringSwitch => "STRING_SWITCH",
            NodeKind::Time => "TIME",
            NodeKind::TimeSwitch => "TIME_SWITCH",
            NodeKind::Otherwise => "OTHERWISE",
            NodeKind::NotPresent => "NOT_PRESENT",
        }
    }
}

/// 多个节点共享的是/否取值。
pub const NO_VAL: u16 = 0;
pub const YES_VAL: u16 = 1;

pub mod address_switch {
    pub const FIELD: u16 = 0;
    pub const SUBFIELD: u16 = 1;

    pub const ORIGIN: u16 = 0;
    pub const DESTINATION: u16 = 1;
    pub const ORIGINAL_DESTINATION: u16 = 2;

    pub const ADDRESS_TYPE: u16 = 0;
    pub const USER: u16 = 1;
    pub const HOST: u16 = 2;
    pub const PORT: u16 = 3;
    pub const TEL: u16 = 4;
    pub const DISPLAY: u16 = 5;
}

/// ADDRESS 与 STRING 子节点共用的比较运算符。
pub mod address {
    pub const IS: u16 = 0;
    pub const CONTAINS: u16 = 1;
    pub const SUBDOMAIN_OF: u16 = 2;
}

pub mod string_switch {
    pub const FIELD: u16 = 0;

    pub const SUBJECT: u16 = 0;
    pub const ORGANIZATION: u16 = 1;
    pub const USER_AGENT: u16 = 2;
    pub const DISPLAY: u16 = 5;
}

pub mod language {
    pub const MATCHES_TAG: u16 = 0;
    pub const MATCHES_SUBTAG: u16 = 1;
}

pub mod time_switch {
    pub const TZID: u16 = 0;
    pub const TZURL: u16 = 1;
}

pub mod time {
    pub const DTSTART: u16 = 0;
    pub const DTEND: u16 = 1;
    pub const DURATION: u16 = 2;
    pub const FREQ: u16 = 3;
    pub const INTERVAL: u16 = 4;
    pub const UNTIL: u16 = 5;
    pub const COUNT: u16 = 6;
    pub const BYSECOND: u16 = 7;
    pub const BYMINUTE: u16 = 8;
    pub const BYHOUR: u16 = 9;
    pub const BYDAY: u16 = 10;
    pub const BYMONTHDAY: u16 = 11;
    pub const BYYEARDAY: u16 = 12;
    pub const BYWEEKNO: u16 = 13;
    pub const BYMONTH: u16 = 14;
    pub const WKST: u16 = 15;
    pub const BYSETPOS: u16 = 16;
}

pub mod priority {
    pub const LESS: u16 = 0;
    pub const GREATER: u16 = 1;
    pub const EQUAL: u16 = 2;
    pub const PRIOSTR: u16 = 3;

    pub const EMERGENCY: u16 = 0;
    pub const URGENT: u16 = 1;
    pub const NORMAL: u16 = 2;
    pub const NON_URGENT: u16 = 3;
    pub const UNKNOWN: u16 = 4;
}

pub mod location {
    pub const URL: u16 = 0;
    pub const PRIORITY: u16 = 1;
    pub const CLEAR: u16 = 2;
}

pub mod lookup {
    pub const SOURCE: u16 = 0;
    pub const TIMEOUT: u16 = 1;
    pub const CLEAR: u16 = 2;
}

pub mod remove_location {
    pub const LOCATION: u16 = 0;
}

pub mod proxy {
    pub const TIMEOUT: u16 = 1;
    pub const RECURSE: u16 = 2;
    pub const ORDERING: u16 = 3;

    pub const PARALLEL: u16 = 0;
    pub const SEQUENTIAL: u16 = 1;
    pub const FIRSTONLY: u16 = 2;
}

pub mod redirect {
    pub const PERMANENT: u16 = 0;
}

pub mod reject {
    pub const STATUS: u16 = 0;
    pub const REASON: u16 = 1;

    pub const BUSY: u16 = 486;
    pub const NOTFOUND: u16 = 404;
    pub const ERROR: u16 = 500;
    pub const REJECT: u16 = 603;
}

pub mod log {
    pub const NAME: u16 = 0;
    pub const COMMENT: u16 = 1;

    pub const MAX_NAME_LEN: usize = 32;
    pub const MAX_COMMENT_LEN: usize = 128;
}

pub mod mail {
    pub const TO: u16 = 0;
    pub const SUBJECT: u16 = 1;
    pub const BODY: u16 = 2;
}

pub mod sub {
    pub const REF: u16 = 0;
}
