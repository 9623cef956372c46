/// 已解析的 SIP 输入
///
/// 注册数据库不解析完整的 SIP 语法，只消费上游解析器产出的
/// AOR、Contact 列表、Call-ID 与 CSeq。这里提供这些值的类型，
/// 以及从 `rsip` 类型转换的辅助实现。
use crate::error::{RegistrarError, Result};
use rsip::headers::{ToTypedHeader, UntypedHeader};
use std::fmt;
use std::str::FromStr;

/// 地址记录 (Address of Record)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aor {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Aor {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            host: host.into(),
            port: None,
        }
    }

    /// 存储键 `user@host`，端口不参与
    pub fn key(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// 从任意 SIP URI 文本解析，允许 `<...>` 包裹
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim().trim_start_matches('<').trim_end_matches('>');
        let uri = rsip::Uri::try_from(trimmed)?;
        Aor::try_from(&uri)
    }
}

impl TryFrom<&rsip::Uri> for Aor {
    type Error = RegistrarError;

    fn try_from(uri: &rsip::Uri) -> Result<Self> {
        let host = uri.host_with_port.host.to_string();
        if host.is_empty() {
            return Err(RegistrarError::invalid_request(format!(
                "URI without host: {}",
                uri
            )));
        }
        Ok(Self {
            user: uri.auth.as_ref().map(|auth| auth.user.clone()),
            host,
            port: uri_port(uri),
        })
    }
}

impl FromStr for Aor {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        Aor::parse(s)
    }
}

impl fmt::Display for Aor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sip:{}", self.key())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// 一个 Contact 头条目
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEntry {
    /// Contact URI（不含头参数）
    pub uri: rsip::Uri,

    /// Contact 头参数，名称统一小写
    pub params: Vec<(String, Option<String>)>,
}

impl ContactEntry {
    pub fn new(uri: rsip::Uri) -> Self {
        Self {
            uri,
            params: Vec::new(),
        }
    }

    /// 追加一个头参数
    pub fn with_param(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.params.push((name.into().to_ascii_lowercase(), value));
        self
    }

    /// 解析 `<uri>;params` 或 `uri;params` 形式的 Contact 值
    ///
    /// 未使用尖括号时，第一个 `;` 之后的内容按头参数处理。
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (uri_part, param_part) = match (value.find('<'), value.find('>')) {
            (Some(open), Some(close)) if open < close => {
                (&value[open + 1..close], &value[close + 1..])
            }
            (None, None) => match value.find(';') {
                Some(idx) => (&value[..idx], &value[idx..]),
                None => (value, ""),
            },
            _ => {
                return Err(RegistrarError::invalid_request(format!(
                    "unbalanced contact value: {}",
                    value
                )))
            }
        };

        let uri = rsip::Uri::try_from(uri_part.trim())?;
        let params = param_part
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(split_param_text)
            .collect();

        Ok(Self { uri, params })
    }

    /// 按名称查找参数，先查头参数，再查 URI 参数
    pub fn param(&self, name: &str) -> Option<Option<String>> {
        let name = name.to_ascii_lowercase();
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.clone())
            .or_else(|| {
                self.uri
                    .params
                    .iter()
                    .map(split_param)
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value)
            })
    }

    /// 参数值（参数不存在或无值时为 None）
    pub fn param_value(&self, name: &str) -> Option<String> {
        self.param(name).flatten()
    }

    /// `expires` 参数（秒）
    ///
    /// 取值范围为 0..=2^32-1，超出范围或非数字时返回无效请求错误。
    pub fn expires(&self) -> Result<Option<u32>> {
        match self.param_value("expires") {
            Some(value) => value.trim().parse::<u32>().map(Some).map_err(|_| {
                RegistrarError::invalid_request(format!(
                    "malformed expires parameter in contact {}: {}",
                    self.uri, value
                ))
            }),
            None => Ok(None),
        }
    }

    /// `q` 参数
    pub fn q(&self) -> Option<f32> {
        self.param_value("q")
            .and_then(|value| value.trim().parse::<f32>().ok())
    }

    /// `transport` 参数，统一小写
    pub fn transport(&self) -> Option<String> {
        self.param_value("transport")
            .map(|value| value.to_ascii_lowercase())
    }

    pub fn user(&self) -> Option<&str> {
        self.uri.auth.as_ref().map(|auth| auth.user.as_str())
    }

    pub fn host(&self) -> String {
        self.uri.host_with_port.host.to_string()
    }

    pub fn port(&self) -> Option<u16> {
        uri_port(&self.uri)
    }

    /// 联系人身份键：`transport:user:host:port`，缺失部分省略
    pub fn contact_id(&self) -> String {
        let mut id = String::new();
        if let Some(transport) = self.transport() {
            id.push_str(&transport);
            id.push(':');
        }
        if let Some(user) = self.user() {
            id.push_str(user);
            id.push(':');
        }
        id.push_str(&self.host());
        if let Some(port) = self.port() {
            id.push(':');
            id.push_str(&port.to_string());
        }
        id
    }
}

impl TryFrom<&rsip::typed::Contact> for ContactEntry {
    type Error = RegistrarError;

    fn try_from(contact: &rsip::typed::Contact) -> Result<Self> {
        Ok(Self {
            uri: contact.uri.clone(),
            params: contact.params.iter().map(split_param).collect(),
        })
    }
}

/// 已解析的 REGISTER 请求中注册数据库关心的部分
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// From 头中的 AOR
    pub aor: Aor,

    /// Contact 列表
    pub contacts: Vec<ContactEntry>,

    /// Call-ID
    pub call_id: String,

    /// CSeq 序号
    pub cseq: u32,

    /// Expires 头（秒）
    pub expires: Option<u32>,
}

impl RegisterRequest {
    pub fn new(aor: Aor, call_id: impl Into<String>, cseq: u32) -> Self {
        Self {
            aor,
            contacts: Vec::new(),
            call_id: call_id.into(),
            cseq,
            expires: None,
        }
    }

    /// 追加一个 Contact
    pub fn with_contact(mut self, contact: ContactEntry) -> Self {
        self.contacts.push(contact);
        self
    }

    /// 设置 Expires 头
    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }
}

impl TryFrom<&rsip::Request> for RegisterRequest {
    type Error = RegistrarError;

    fn try_from(request: &rsip::Request) -> Result<Self> {
        let mut from_uri = None;
        let mut call_id = None;
        let mut cseq = None;
        let mut expires = None;
        let mut contacts = Vec::new();

        for header in request.headers.iter() {
            match header {
                rsip::Header::From(from) => {
                    from_uri = Some(from.typed()?.uri);
                }
                rsip::Header::CallId(value) => {
                    call_id = Some(value.value().trim().to_string());
                }
                rsip::Header::CSeq(value) => {
                    cseq = value
                        .value()
                        .split_whitespace()
                        .next()
                        .and_then(|seq| seq.parse::<u32>().ok());
                }
                rsip::Header::Expires(value) => {
                    expires = value.value().trim().parse::<u32>().ok();
                }
                rsip::Header::Contact(value) => {
                    let typed = value.typed()?;
                    contacts.push(ContactEntry::try_from(&typed)?);
                }
                _ => {}
            }
        }

        let from_uri = from_uri.ok_or_else(|| RegistrarError::invalid_request("missing From header"))?;

        Ok(Self {
            aor: Aor::try_from(&from_uri)?,
            contacts,
            call_id: call_id
                .ok_or_else(|| RegistrarError::invalid_request("missing Call-ID header"))?,
            cseq: cseq.ok_or_else(|| RegistrarError::invalid_request("missing or malformed CSeq header"))?,
            expires,
        })
    }
}

fn uri_port(uri: &rsip::Uri) -> Option<u16> {
    uri.host_with_port
        .port
        .as_ref()
        .and_then(|port| port.to_string().parse::<u16>().ok())
}

/// 将 `rsip::Param` 拆为 (名称, 值)
fn split_param(param: &rsip::Param) -> (String, Option<String>) {
    let rendered = param.to_string();
    split_param_text(rendered.trim_start_matches(';'))
}

fn split_param_text(text: &str) -> (String, Option<String>) {
    match text.split_once('=') {
        Some((name, value)) => (
            name.trim().to_ascii_lowercase(),
            Some(value.trim().trim_matches('"').to_string()),
        ),
        None => (text.trim().to_ascii_lowercase(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aor_key_ignores_port() {
        let aor = Aor::parse("sip:alice@example.com:5070").unwrap();
        assert_eq!(aor.user.as_deref(), Some("alice"));
        assert_eq!(aor.host, "example.com");
        assert_eq!(aor.port, Some(5070));
        assert_eq!(aor.key(), "alice@example.com");
    }

    #[test]
    fn test_contact_parse_bare_form() {
        let entry = ContactEntry::parse("sip:alice@192.0.2.1:5060;q=1.0;expires=3600").unwrap();
        assert_eq!(entry.user(), Some("alice"));
        assert_eq!(entry.host(), "192.0.2.1");
        assert_eq!(entry.port(), Some(5060));
        assert_eq!(entry.expires().unwrap(), Some(3600));
        assert_eq!(entry.q(), Some(1.0));
        assert_eq!(entry.contact_id(), "alice:192.0.2.1:5060");
    }

    #[test]
    fn test_contact_parse_bracket_form() {
        let entry =
            ContactEntry::parse("<sip:bob@198.51.100.7:5080;transport=TCP>;expires=60;line=abc")
                .unwrap();
        assert_eq!(entry.expires().unwrap(), Some(60));
        assert_eq!(entry.param_value("LINE").as_deref(), Some("abc"));
        assert_eq!(entry.transport().as_deref(), Some("tcp"));
        assert_eq!(entry.contact_id(), "tcp:bob:198.51.100.7:5080");
    }

    #[test]
    fn test_contact_parse_rejects_unbalanced() {
        assert!(ContactEntry::parse("<sip:bob@example.com").is_err());
    }

    fn register_message(headers: Vec<rsip::Header>) -> rsip::Request {
        rsip::Request {
            method: rsip::Method::Register,
            uri: rsip::Uri::try_from("sip:example.com").unwrap(),
            version: rsip::Version::V2,
            headers: headers.into(),
            body: vec![],
        }
    }

    #[test]
    fn test_register_request_from_rsip() {
        let message = register_message(vec![
            rsip::Header::From(rsip::headers::From::new("Bob <sip:bob@example.com>;tag=a73kszlfl")),
            rsip::Header::CallId(rsip::headers::CallId::new("1j9FpLxk3uxtm8tn@192.0.2.5")),
            rsip::Header::CSeq(rsip::headers::CSeq::new("7 REGISTER")),
            rsip::Header::Expires(rsip::headers::Expires::new("600")),
            rsip::Header::Contact(rsip::headers::Contact::new(
                "<sip:bob@192.0.2.5:5060;transport=tcp>;expires=120",
            )),
            rsip::Header::Contact(rsip::headers::Contact::new("<sip:bob@198.51.100.9>")),
        ]);

        let request = RegisterRequest::try_from(&message).unwrap();
        assert_eq!(request.aor.key(), "bob@example.com");
        assert_eq!(request.call_id, "1j9FpLxk3uxtm8tn@192.0.2.5");
        assert_eq!(request.cseq, 7);
        assert_eq!(request.expires, Some(600));
        assert_eq!(request.contacts.len(), 2);

        let first = &request.contacts[0];
        assert_eq!(first.expires().unwrap(), Some(120));
        assert_eq!(first.transport().as_deref(), Some("tcp"));
        assert_eq!(first.contact_id(), "tcp:bob:192.0.2.5:5060");

        let second = &request.contacts[1];
        assert_eq!(second.expires().unwrap(), None);
        assert_eq!(second.contact_id(), "bob:198.51.100.9");
    }

    #[test]
    fn test_register_request_requires_headers() {
        let missing_cseq = register_message(vec![
            rsip::Header::From(rsip::headers::From::new("<sip:bob@example.com>")),
            rsip::Header::CallId(rsip::headers::CallId::new("abc")),
        ]);
        let err = RegisterRequest::try_from(&missing_cseq).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");

        let missing_from = register_message(vec![
            rsip::Header::CallId(rsip::headers::CallId::new("abc")),
            rsip::Header::CSeq(rsip::headers::CSeq::new("1 REGISTER")),
        ]);
        assert!(RegisterRequest::try_from(&missing_from).unwrap_err().is_invalid());
    }

    #[test]
    fn test_register_request_builder() {
        let request = RegisterRequest::new(Aor::new("bob", "example.com"), "abc@host", 7)
            .with_contact(ContactEntry::parse("sip:bob@192.0.2.5").unwrap())
            .with_expires(600);
        assert_eq!(request.contacts.len(), 1);
        assert_eq!(request.expires, Some(600));
        assert_eq!(request.aor.to_string(), "sip:bob@example.com");
    }
}
