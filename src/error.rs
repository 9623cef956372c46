use thiserror::Error;

/// 注册数据库操作的Result类型别名
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// 注册数据库错误类型
///
/// 每个错误最终都会映射到监听器的三个回调之一：
/// `on_invalid`（请求本身不合法）或 `on_error`（后端故障）。
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// REGISTER 中的 Contact 数量超过每个 AOR 的上限
    #[error("too many contacts for {aor}: {count} > {max}")]
    TooManyContacts { aor: String, count: usize, max: usize },

    /// 同一 Call-ID 下 CSeq 未递增（重放或乱序）
    #[error("stale or replayed REGISTER for {aor}: call-id {call_id}, cseq {cseq}")]
    StaleRequest {
        aor: String,
        call_id: String,
        cseq: u32,
    },

    /// SIP 输入格式错误
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// SIP 解析错误
    #[error("SIP parse error: {0}")]
    Sip(#[from] rsip::Error),

    /// 存储后端不可达或返回错误
    #[error("backend failure: {0}")]
    Backend(String),

    /// 存储中的数据无法解析
    #[error("malformed stored record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    Missing(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("unsupported registrar db implementation: {0}")]
    UnsupportedBackend(String),
}

impl RegistrarError {
    /// 请求是否应以 `on_invalid` 上报
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            RegistrarError::TooManyContacts { .. }
                | RegistrarError::StaleRequest { .. }
                | RegistrarError::InvalidRequest(_)
                | RegistrarError::Sip(_)
        )
    }

    /// 判断错误是否可恢复（调用方可自行重试，核心本身不重试）
    pub fn is_recoverable(&self) -> bool {
        match self {
            RegistrarError::Backend(_) => true,
            RegistrarError::TooManyContacts { .. } => false,
            RegistrarError::StaleRequest { .. } => false,
            RegistrarError::InvalidRequest(_) => false,
            RegistrarError::Sip(_) => false,
            RegistrarError::Serialization(_) => false,
            RegistrarError::Config(_) => false,
        }
    }

    /// 获取标准错误代码，用于日志分析和监控
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistrarError::TooManyContacts { .. } => "TOO_MANY_CONTACTS",
            RegistrarError::StaleRequest { .. } => "STALE_REQUEST",
            RegistrarError::InvalidRequest(_) => "INVALID_REQUEST",
            RegistrarError::Sip(_) => "SIP_PARSE_ERROR",
            RegistrarError::Backend(_) => "BACKEND_FAILURE",
            RegistrarError::Serialization(_) => "MALFORMED_RECORD",
            RegistrarError::Config(_) => "CONFIGURATION_FAILURE",
        }
    }

    /// 创建后端错误
    pub fn backend(msg: impl Into<String>) -> Self {
        RegistrarError::Backend(msg.into())
    }

    /// 创建请求格式错误
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        RegistrarError::InvalidRequest(msg.into())
    }
}

impl From<tokio::task::JoinError> for RegistrarError {
    fn from(err: tokio::task::JoinError) -> Self {
        RegistrarError::Backend(format!("blocking store task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = RegistrarError::TooManyContacts {
            aor: "bob@example.com".into(),
            count: 3,
            max: 2,
        };
        assert!(err.is_invalid());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "TOO_MANY_CONTACTS");

        let err = RegistrarError::backend("connection refused");
        assert!(!err.is_invalid());
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "backend failure: connection refused");
    }

    #[test]
    fn test_malformed_record_is_backend_failure() {
        let err: RegistrarError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(!err.is_invalid());
        assert_eq!(err.error_code(), "MALFORMED_RECORD");
    }
}
