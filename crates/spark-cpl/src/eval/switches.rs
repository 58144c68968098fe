//! # 分支节点求值
//!
//! ## 共同流程（How）
//! 1. 读取 switch 自身属性，确定比较的报文字段；
//! 2. 按文档顺序遍历子节点，每个条件子节点只携带一个比较属性；
//! 3. 首个命中的子节点胜出；OTHERWISE 在轮到它时无条件命中，不假设它位于末尾；
//! 4. 全部未命中时走默认动作（PRIORITY_SWITCH 同样如此）。
//!
//! ## 比较语义（What）
//! - 字符串比较一律大小写不敏感；
//! - 报文值只在第一个条件子节点需要时读取，且经由头域缓存。

use std::sync::Arc;

use super::{Eval, NextStep, first_child_or_default};
use crate::context::HeaderKind;
use crate::error::{CollaboratorError, CplError, Result};
use crate::script::tree::{address, address_switch, language, priority, string_switch, time_switch};
use crate::script::{Node, NodeKind};
use crate::time::{RecurrenceBuilder, parse_tzid};
use crate::uri::{parse_uri, split_name_addr};

fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// 单属性条件子节点：读取 (属性码, 字符串值)。
fn read_condition<'s>(kid: &Node<'s>) -> Result<(u16, &'s str)> {
    if kid.attr_count() != 1 {
        return Err(kid.malformed("condition requires exactly one attribute"));
    }
    let mut attrs = kid.attrs();
    let code = attrs
        .next_code()?
        .ok_or_else(|| kid.malformed("missing condition attribute"))?;
    Ok((code, attrs.take_str(1)?))
}

// ---------------------------------------------------------------------------
// ADDRESS_SWITCH
// ---------------------------------------------------------------------------

/// 地址分支。
///
/// # 教案式说明
/// - **契约 (What)**：FIELD 必选，SUBFIELD 可选，二者都不得重复；
///   子节点为 ADDRESS（IS/CONTAINS/SUBDOMAIN_OF 之一）、OTHERWISE，NOT_PRESENT 被跳过；
/// - **执行逻辑 (How)**：From/To 取 name-addr 中的 URI，目的地址取生效中的 Request-URI；
///   无子字段时比较整个 URI 文本，有子字段时解析 URI 后取对应片段；
/// - **风险 (Trade-offs)**：CONTAINS 只对 DISPLAY 有意义，SUBDOMAIN_OF 只对 HOST/TEL 有意义，
///   用在其他子字段上时记录告警并视为不命中。
pub(super) fn run_address_switch(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    let mut field = None;
    let mut subfield = None;
    let mut attrs = node.attrs();
    while let Some(code) = attrs.next_code()? {
        let value = attrs.take_num()?;
        let slot = match code {
            address_switch::FIELD => &mut field,
            address_switch::SUBFIELD => &mut subfield,
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        };
        if slot.replace(value).is_some() {
            return Err(node.malformed(format!("attribute {code} repeated")));
        }
    }
    let field = field.ok_or_else(|| node.malformed("FIELD attribute is mandatory"))?;
    let header = match field {
        address_switch::ORIGIN => HeaderKind::From,
        address_switch::DESTINATION => HeaderKind::RequestUri,
        address_switch::ORIGINAL_DESTINATION => HeaderKind::To,
        other => return Err(node.malformed(format!("unknown FIELD value {other}"))),
    };
    if let Some(sub) = subfield {
        if sub > address_switch::DISPLAY {
            return Err(node.malformed(format!("unknown SUBFIELD value {sub}")));
        }
    }

    let mut message: Option<Option<String>> = None;
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            NodeKind::NotPresent => {}
            NodeKind::Otherwise => return first_child_or_default(&kid),
            NodeKind::Address => {
                let (op, pattern) = read_condition(&kid)?;
                if message.is_none() {
                    message = Some(address_value(ev, header, subfield)?);
                }
                let value = message.as_ref().and_then(Option::as_deref);
                if address_matches(op, pattern, value, subfield, &kid)? {
                    return first_child_or_default(&kid);
                }
            }
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

fn address_value(ev: &mut Eval<'_>, header: HeaderKind, subfield: Option<u16>) -> Result<Option<String>> {
    let raw: Arc<str> = ev.state.headers.get(header).ok_or_else(|| CplError::Collaborator {
        context: "address_switch",
        detail: format!("request has no {} header", header.name()),
    })?;
    let (display, uri_text) = if header == HeaderKind::RequestUri {
        (None, raw.trim())
    } else {
        split_name_addr(&raw)
    };
    let Some(sub) = subfield else {
        return Ok(Some(uri_text.to_owned()));
    };
    if sub == address_switch::DISPLAY {
        return Ok(display.map(str::to_owned));
    }
    let uri = parse_uri(uri_text).map_err(|err| CplError::Collaborator {
        context: "address_switch",
        detail: format!("{} header: {err}", header.name()),
    })?;
    Ok(match sub {
        address_switch::USER => uri.user.map(str::to_owned),
        address_switch::HOST => Some(uri.host.to_owned()),
        address_switch::PORT => Some(uri.port.unwrap_or(5060).to_string()),
        address_switch::TEL => uri.telephone().map(str::to_owned),
        _ => Some(uri.scheme.as_str().to_owned()),
    })
}

fn address_matches(
    op: u16,
    pattern: &str,
    value: Option<&str>,
    subfield: Option<u16>,
    kid: &Node<'_>,
) -> Result<bool> {
    match op {
        address::IS => Ok(value.is_some_and(|v| eq_ci(v, pattern))),
        address::CONTAINS => {
            if subfield != Some(address_switch::DISPLAY) {
                tracing::warn!(offset = kid.offset(), "CONTAINS applies only to the display subfield; ignored");
                return Ok(false);
            }
            Ok(value.is_some_and(|v| contains_ci(v, pattern)))
        }
        address::SUBDOMAIN_OF => match subfield {
            Some(address_switch::HOST) => Ok(value.is_some_and(|v| is_subdomain_of(v, pattern))),
            Some(address_switch::TEL) => Ok(value.is_some_and(|v| {
                v.len() >= pattern.len()
                    && v.is_char_boundary(pattern.len())
                    && eq_ci(&v[..pattern.len()], pattern)
            })),
            _ => {
                tracing::warn!(
                    offset = kid.offset(),
                    "SUBDOMAIN_OF applies only to host or tel subfields; ignored"
                );
                Ok(false)
            }
        },
        other => Err(kid.malformed(format!("unknown operator {other}"))),
    }
}

/// `host` 等于 `domain`，或以 `.domain` 结尾。
fn is_subdomain_of(host: &str, domain: &str) -> bool {
    let host = host.to_lowercase();
    let domain = domain.to_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|head| head.ends_with('.'))
}

// ---------------------------------------------------------------------------
// STRING_SWITCH / LANGUAGE_SWITCH 共用的 NOT_PRESENT 处理
// ---------------------------------------------------------------------------

/// 头域缺失时的去向：已见过的 NOT_PRESENT，否则向后查找，再否则默认动作。
fn not_present_branch(node: &Node<'_>, seen: Option<Node<'_>>, from: usize) -> Result<NextStep> {
    if let Some(kid) = seen {
        return first_child_or_default(&kid);
    }
    for index in from..node.kid_count() {
        let kid = node.child_node(index)?;
        if kid.kind() == NodeKind::NotPresent {
            return first_child_or_default(&kid);
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

fn remember_not_present<'s>(node: &Node<'s>, seen: &mut Option<Node<'s>>, kid: Node<'s>) -> Result<()> {
    if seen.replace(kid).is_some() {
        return Err(node.malformed("more than one NOT_PRESENT child"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// STRING_SWITCH
// ---------------------------------------------------------------------------

/// 字符串分支：比较 Subject/Organization/User-Agent 或 From 显示名。
pub(super) fn run_string_switch(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    if node.attr_count() != 1 {
        return Err(node.malformed("STRING_SWITCH requires exactly one attribute"));
    }
    let mut attrs = node.attrs();
    match attrs.next_code()? {
        Some(string_switch::FIELD) => {}
        other => return Err(node.malformed(format!("unknown attribute {other:?}"))),
    }
    let field = attrs.take_num()?;
    let header = match field {
        string_switch::SUBJECT => HeaderKind::Subject,
        string_switch::ORGANIZATION => HeaderKind::Organization,
        string_switch::USER_AGENT => HeaderKind::UserAgent,
        string_switch::DISPLAY => HeaderKind::From,
        other => return Err(node.malformed(format!("unknown FIELD value {other}"))),
    };

    let mut not_present = None;
    let mut message: Option<Option<String>> = None;
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            NodeKind::NotPresent => remember_not_present(node, &mut not_present, kid)?,
            NodeKind::Otherwise => return first_child_or_default(&kid),
            NodeKind::String => {
                let (op, pattern) = read_condition(&kid)?;
                if message.is_none() {
                    message = Some(ev.state.headers.get(header).and_then(|raw| {
                        if field == string_switch::DISPLAY {
                            split_name_addr(&raw).0.map(str::to_owned)
                        } else {
                            Some(raw.trim().to_owned())
                        }
                    }));
                }
                let Some(Some(value)) = message.as_ref() else {
                    return not_present_branch(node, not_present, index + 1);
                };
                let hit = match op {
                    address::IS => eq_ci(value, pattern),
                    address::CONTAINS => contains_ci(value, pattern),
                    other => return Err(kid.malformed(format!("unknown operator {other}"))),
                };
                if hit {
                    return first_child_or_default(&kid);
                }
            }
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

// ---------------------------------------------------------------------------
// PRIORITY_SWITCH
// ---------------------------------------------------------------------------

/// 优先级档位，按紧急程度由高到低排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityLevel {
    Emergency,
    Urgent,
    Normal,
    NonUrgent,
    Unknown,
}

impl PriorityLevel {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            priority::EMERGENCY => Self::Emergency,
            priority::URGENT => Self::Urgent,
            priority::NORMAL => Self::Normal,
            priority::NON_URGENT => Self::NonUrgent,
            priority::UNKNOWN => Self::Unknown,
            _ => return None,
        })
    }

    /// 按 Priority 头文本归类，大小写不敏感。
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("emergency") {
            Self::Emergency
        } else if text.eq_ignore_ascii_case("urgent") {
            Self::Urgent
        } else if text.eq_ignore_ascii_case("normal") {
            Self::Normal
        } else if text.eq_ignore_ascii_case("non-urgent") {
            Self::NonUrgent
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityOp {
    Less,
    Greater,
    Equal,
}

/// PRIORITY 条件判定。
///
/// - `Less`/`Greater` 表示报文优先级严格低于/高于 `wanted`；
/// - 报文为 `Unknown` 且运算符不是 `Equal` 时按 `Normal` 处理；
/// - `wanted == Unknown` 只与 `Equal` 搭配，比较报文原文与 `literal`。
#[must_use]
pub fn compare_priority(
    op: PriorityOp,
    wanted: PriorityLevel,
    literal: Option<&str>,
    message: PriorityLevel,
    message_text: &str,
) -> bool {
    use PriorityLevel::{Emergency, NonUrgent, Normal, Unknown, Urgent};
    let normalized = if message == Unknown && op != PriorityOp::Equal {
        Normal
    } else {
        message
    };
    match op {
        PriorityOp::Less => match wanted {
            Emergency => normalized != Emergency,
            Urgent => !matches!(normalized, Emergency | Urgent),
            Normal => normalized == NonUrgent,
            NonUrgent | Unknown => false,
        },
        PriorityOp::Greater => match wanted {
            Emergency | Unknown => false,
            Urgent => normalized == Emergency,
            Normal => matches!(normalized, Emergency | Urgent),
            NonUrgent => normalized != NonUrgent,
        },
        PriorityOp::Equal => match wanted {
            Unknown => {
                message == Unknown && literal.is_some_and(|l| eq_ci(l, message_text.trim()))
            }
            level => normalized == level,
        },
    }
}

/// 优先级分支。缺少 Priority 头时按 `normal` 处理。
pub(super) fn run_priority_switch(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    if node.attr_count() != 0 {
        return Err(node.malformed("PRIORITY_SWITCH takes no attributes"));
    }
    let mut message: Option<(PriorityLevel, String)> = None;
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            NodeKind::NotPresent => {}
            NodeKind::Otherwise => return first_child_or_default(&kid),
            NodeKind::Priority => {
                let (op, wanted, literal) = read_priority_condition(&kid)?;
                let (level, text) = message.get_or_insert_with(|| {
                    match ev.state.headers.get(HeaderKind::Priority) {
                        Some(raw) => (PriorityLevel::classify(&raw), raw.trim().to_owned()),
                        None => {
                            tracing::info!("no Priority header, assuming normal");
                            (PriorityLevel::Normal, "normal".to_owned())
                        }
                    }
                });
                if compare_priority(op, wanted, literal, *level, text) {
                    return first_child_or_default(&kid);
                }
            }
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

fn read_priority_condition<'s>(kid: &Node<'s>) -> Result<(PriorityOp, PriorityLevel, Option<&'s str>)> {
    if kid.attr_count() != 1 {
        return Err(kid.malformed("PRIORITY requires exactly one attribute"));
    }
    let mut attrs = kid.attrs();
    let op = match attrs.next_code()? {
        Some(priority::LESS) => PriorityOp::Less,
        Some(priority::GREATER) => PriorityOp::Greater,
        Some(priority::EQUAL) => PriorityOp::Equal,
        other => return Err(kid.malformed(format!("unknown operator {other:?}"))),
    };
    let code = attrs.take_num()?;
    let wanted =
        PriorityLevel::from_code(code).ok_or_else(|| kid.malformed(format!("unknown priority value {code}")))?;
    if wanted != PriorityLevel::Unknown {
        return Ok((op, wanted, None));
    }
    if op != PriorityOp::Equal {
        return Err(kid.malformed("unknown priority can only be compared for equality"));
    }
    if attrs.read_basic()? != priority::PRIOSTR {
        return Err(kid.malformed("unknown priority must carry its literal"));
    }
    Ok((op, wanted, Some(attrs.take_str(1)?)))
}

// ---------------------------------------------------------------------------
// TIME_SWITCH
// ---------------------------------------------------------------------------

/// 时间分支：以 TZID（或配置默认时区）解释请求到达时刻。
pub(super) fn run_time_switch(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    if node.attr_count() > 1 {
        return Err(node.malformed("TIME_SWITCH takes at most one attribute"));
    }
    let mut tz = ev.ctx.config.timezone()?;
    let mut attrs = node.attrs();
    if let Some(code) = attrs.next_code()? {
        let value = attrs.take_str(1)?;
        match code {
            time_switch::TZID => {
                tz = parse_tzid(value).ok_or_else(|| CplError::Collaborator {
                    context: "time_switch",
                    detail: format!("unknown timezone `{value}`"),
                })?;
            }
            time_switch::TZURL => tracing::debug!(tzurl = value, "TZURL is not fetched"),
            other => return Err(node.malformed(format!("unknown attribute {other}"))),
        }
    }

    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            NodeKind::NotPresent => {}
            NodeKind::Otherwise => return first_child_or_default(&kid),
            NodeKind::Time => {
                let mut builder = RecurrenceBuilder::new();
                let mut attrs = kid.attrs();
                while let Some(code) = attrs.next_code()? {
                    let value = attrs.take_str(1)?;
                    let known = builder
                        .set(code, value)
                        .map_err(|err| kid.malformed(err.to_string()))?;
                    if !known {
                        return Err(kid.malformed(format!("unknown attribute {code}")));
                    }
                }
                let rule = builder.build().map_err(|detail| kid.malformed(detail))?;
                let hit = ev
                    .ctx
                    .time_matcher
                    .matches(&rule, tz, ev.state.received_at)
                    .map_err(|err: CollaboratorError| CplError::collaborator("time_match", err))?;
                if hit {
                    return first_child_or_default(&kid);
                }
            }
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

// ---------------------------------------------------------------------------
// LANGUAGE_SWITCH
// ---------------------------------------------------------------------------

/// Accept-Language 中的一个语言区间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LanguageRange {
    pub tag: String,
    pub subtag: Option<String>,
}

/// 解析 Accept-Language：逗号分隔，跳过 `;q=` 参数与 `*`。
pub(crate) fn parse_accept_language(header: &str) -> core::result::Result<Vec<LanguageRange>, String> {
    let mut ranges = Vec::new();
    for item in header.split(',') {
        let range = item.split(';').next().unwrap_or_default().trim();
        if range.is_empty() {
            return Err(format!("empty language range in `{header}`"));
        }
        if range == "*" {
            continue;
        }
        if !range.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(format!("invalid language range `{range}`"));
        }
        let (tag, subtag) = match range.split_once('-') {
            Some((tag, subtag)) => (tag, Some(subtag.to_owned())),
            None => (range, None),
        };
        if tag.is_empty() || subtag.as_deref() == Some("") {
            return Err(format!("invalid language range `{range}`"));
        }
        ranges.push(LanguageRange {
            tag: tag.to_owned(),
            subtag,
        });
    }
    Ok(ranges)
}

fn language_matches(ranges: &[LanguageRange], tag: &str, subtag: Option<&str>) -> bool {
    ranges.iter().any(|range| {
        range.tag.eq_ignore_ascii_case(tag)
            && match (range.subtag.as_deref(), subtag) {
                (Some(have), Some(want)) => have.eq_ignore_ascii_case(want),
                _ => true,
            }
    })
}

/// 语言分支。
pub(super) fn run_language_switch(node: &Node<'_>, ev: &mut Eval<'_>) -> Result<NextStep> {
    if node.attr_count() != 0 {
        return Err(node.malformed("LANGUAGE_SWITCH takes no attributes"));
    }
    let mut not_present = None;
    let mut ranges: Option<Option<Vec<LanguageRange>>> = None;
    for index in 0..node.kid_count() {
        let kid = node.child_node(index)?;
        match kid.kind() {
            NodeKind::NotPresent => remember_not_present(node, &mut not_present, kid)?,
            NodeKind::Otherwise => return first_child_or_default(&kid),
            NodeKind::Language => {
                if !(1..=2).contains(&kid.attr_count()) {
                    return Err(kid.malformed("LANGUAGE requires one or two attributes"));
                }
                let mut tag = None;
                let mut subtag = None;
                let mut attrs = kid.attrs();
                while let Some(code) = attrs.next_code()? {
                    let value = attrs.take_str(0)?;
                    match code {
                        language::MATCHES_TAG => tag = Some(value),
                        language::MATCHES_SUBTAG => subtag = Some(value),
                        other => return Err(kid.malformed(format!("unknown attribute {other}"))),
                    }
                }
                let tag = tag.ok_or_else(|| kid.malformed("MATCHES_TAG is mandatory"))?;
                if ranges.is_none() {
                    ranges = Some(match ev.state.headers.get(HeaderKind::AcceptLanguage) {
                        Some(raw) => Some(parse_accept_language(&raw).map_err(|detail| {
                            CplError::Collaborator {
                                context: "language_switch",
                                detail,
                            }
                        })?),
                        None => None,
                    });
                }
                let Some(Some(ranges)) = ranges.as_ref() else {
                    return not_present_branch(node, not_present, index + 1);
                };
                if language_matches(ranges, tag, subtag) {
                    return first_child_or_default(&kid);
                }
            }
            other => return Err(node.malformed(format!("unexpected {} child", other.name()))),
        }
    }
    Ok(NextStep::FallThroughToDefault)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_requires_dot_boundary() {
        assert!(is_subdomain_of("sip.example.com", "example.com"));
        assert!(is_subdomain_of("EXAMPLE.com", "example.COM"));
        assert!(!is_subdomain_of("badexample.com", "example.com"));
        assert!(!is_subdomain_of("com", "example.com"));
    }

    #[test]
    fn accept_language_parsing() {
        let ranges = parse_accept_language("da, en-gb;q=0.8, *;q=0.1").expect("合法头域");
        assert_eq!(
            ranges,
            vec![
                LanguageRange {
                    tag: "da".into(),
                    subtag: None
                },
                LanguageRange {
                    tag: "en".into(),
                    subtag: Some("gb".into())
                },
            ]
        );
        assert!(language_matches(&ranges, "EN", Some("GB")));
        assert!(language_matches(&ranges, "en", None));
        assert!(!language_matches(&ranges, "en", Some("us")));
        assert!(parse_accept_language("en,,fr").is_err());
        assert!(parse_accept_language("en_US").is_err());
    }

    #[test]
    fn priority_classification() {
        assert_eq!(PriorityLevel::classify(" Non-Urgent "), PriorityLevel::NonUrgent);
        assert_eq!(PriorityLevel::classify("EMERGENCY"), PriorityLevel::Emergency);
        assert_eq!(PriorityLevel::classify("whenever"), PriorityLevel::Unknown);
    }

    #[test]
    fn unknown_priority_equality_uses_literal() {
        use PriorityLevel::Unknown;
        assert!(compare_priority(PriorityOp::Equal, Unknown, Some("Whenever"), Unknown, "whenever"));
        assert!(!compare_priority(PriorityOp::Equal, Unknown, Some("later"), Unknown, "whenever"));
        assert!(compare_priority(
            PriorityOp::Less,
            PriorityLevel::Urgent,
            None,
            Unknown,
            "whenever"
        ));
    }
}
