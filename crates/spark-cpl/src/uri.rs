//! 地址类头域的轻量解析。
//!
//! ## 定位（Why）
//! - 解释器只需从 From/To/Request-URI 中取出用户、主机、端口、显示名等片段，
//!   完整的 SIP 报文解析属于外部协作方；
//! - 这里提供与 SIP 编解码器同样“先裁空白、再拆 scheme、自右向左找 `@`”的切分方式，
//!   但只借用输入，不做任何分配。
//!
//! ## 契约（What）
//! - [`parse_uri`] 接受 `sip:`、`sips:` 与 `tel:` 三种 scheme；
//! - [`split_name_addr`] 从 `"Display" <uri>;tag=...` 或裸 `uri;tag=...` 中取出显示名与 URI 文本。

/// URI scheme。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Sip,
    Sips,
    Tel,
}

impl Scheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
            Scheme::Tel => "tel",
        }
    }
}

/// 借用输入的 URI 切片视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UriParts<'a> {
    pub scheme: Scheme,
    pub user: Option<&'a str>,
    pub host: &'a str,
    pub port: Option<u16>,
    /// 以 `;` 开头的参数串（不含 `?` 之后的头部）。
    pub params: Option<&'a str>,
}

impl<'a> UriParts<'a> {
    /// 查找 URI 参数值；无值参数返回空串。
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params?
            .split(';')
            .filter(|p| !p.is_empty())
            .find_map(|p| {
                let (key, value) = p.split_once('=').unwrap_or((p, ""));
                key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
            })
    }

    /// 电话号码：`tel:` URI 的号码部分，或带 `user=phone` 的 SIP URI 用户部分。
    #[must_use]
    pub fn telephone(&self) -> Option<&'a str> {
        match self.scheme {
            Scheme::Tel => Some(self.host),
            Scheme::Sip | Scheme::Sips => {
                let phone = self
                    .param("user")
                    .is_some_and(|v| v.eq_ignore_ascii_case("phone"));
                if phone { self.user } else { None }
            }
        }
    }
}

/// URI 语法错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid URI")]
pub struct InvalidUri;

/// 解析 SIP/SIPS/TEL URI。
///
/// - **执行逻辑 (How)**：裁掉首尾空白，拆出 scheme；对 SIP URI 依次剥离 `?` 头部、
///   `;` 参数，再以最右侧 `@` 拆出 userinfo，最后处理 IPv6 方括号与端口。
pub fn parse_uri(input: &str) -> Result<UriParts<'_>, InvalidUri> {
    let slice = input.trim();
    let (scheme_text, mut rest) = slice.split_once(':').ok_or(InvalidUri)?;
    let scheme = if scheme_text.eq_ignore_ascii_case("sip") {
        Scheme::Sip
    } else if scheme_text.eq_ignore_ascii_case("sips") {
        Scheme::Sips
    } else if scheme_text.eq_ignore_ascii_case("tel") {
        Scheme::Tel
    } else {
        return Err(InvalidUri);
    };
    if rest.is_empty() {
        return Err(InvalidUri);
    }

    if let Some(pos) = rest.find('?') {
        rest = &rest[..pos];
    }
    let mut params = None;
    if let Some(pos) = rest.find(';') {
        params = Some(&rest[pos..]);
        rest = &rest[..pos];
    }

    if scheme == Scheme::Tel {
        if rest.is_empty() {
            return Err(InvalidUri);
        }
        return Ok(UriParts {
            scheme,
            user: None,
            host: rest,
            port: None,
            params,
        });
    }

    let mut user = None;
    if let Some(at) = rest.rfind('@') {
        user = Some(&rest[..at]);
        rest = &rest[at + 1..];
    }
    // userinfo 中的密码部分不参与比较。
    let user = user.map(|u| u.split_once(':').map_or(u, |(name, _)| name));

    let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
        let closing = stripped.find(']').ok_or(InvalidUri)?;
        let host = &rest[..closing + 2];
        let tail = &stripped[closing + 1..];
        let port = match tail.strip_prefix(':') {
            Some(text) => Some(text.parse::<u16>().map_err(|_| InvalidUri)?),
            None if tail.is_empty() => None,
            None => return Err(InvalidUri),
        };
        (host, port)
    } else if let Some(pos) = rest.rfind(':') {
        let candidate = &rest[pos + 1..];
        let port = candidate.parse::<u16>().map_err(|_| InvalidUri)?;
        (&rest[..pos], Some(port))
    } else {
        (rest, None)
    };

    if host.is_empty() {
        return Err(InvalidUri);
    }
    Ok(UriParts {
        scheme,
        user,
        host,
        port,
        params,
    })
}

/// 从 name-addr 或 addr-spec 中拆出显示名与 URI 文本。
///
/// - `"Alice" <sip:alice@a.com>;tag=1` → (`Some("Alice")`, `"sip:alice@a.com"`)；
/// - `sip:alice@a.com;tag=1` → (`None`, `"sip:alice@a.com"`)，头部参数被剥离。
#[must_use]
pub fn split_name_addr(header: &str) -> (Option<&str>, &str) {
    let header = header.trim();
    if let Some(open) = header.find('<') {
        let display = header[..open].trim().trim_matches('"').trim();
        let after = &header[open + 1..];
        let uri = after.find('>').map_or(after, |close| &after[..close]);
        let display = (!display.is_empty()).then_some(display);
        return (display, uri.trim());
    }
    let uri = header.find(';').map_or(header, |pos| &header[..pos]);
    (None, uri.trim())
}
