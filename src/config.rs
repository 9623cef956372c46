/// 注册数据库配置
///
/// 配置只在构造 `RegistrarDb` 时读取一次，之后以 `RecordLimits`
/// 的形式显式注入到每个 `Record`。
use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 配置键：后端实现
pub const KEY_DB_IMPLEMENTATION: &str = "db-implementation";
/// 配置键：每个 AOR 的最大 Contact 数
pub const KEY_MAX_CONTACTS_BY_AOR: &str = "max-contacts-by-aor";
/// 配置键：用于按线路替换的 Contact 参数名
pub const KEY_LINE_FIELD_NAME: &str = "line-field-name";
/// 配置键：别名递归解析的最大深度
pub const KEY_MAX_RECURSION_DEPTH: &str = "max-recursion-depth";

/// 默认的别名递归深度（跟随一跳）
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 1;

/// 后端实现类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbImplementation {
    /// 进程内哈希表
    Internal,

    /// 同步远程键值存储（阻塞调用在专用线程上执行）
    RedisSync,

    /// 异步远程键值存储
    RedisAsync,
}

impl DbImplementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbImplementation::Internal => "internal",
            DbImplementation::RedisSync => "redis-sync",
            DbImplementation::RedisAsync => "redis-async",
        }
    }
}

impl fmt::Display for DbImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbImplementation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "internal" => Ok(DbImplementation::Internal),
            "redis-sync" => Ok(DbImplementation::RedisSync),
            "redis-async" => Ok(DbImplementation::RedisAsync),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// 外部配置访问器
///
/// 由宿主进程的配置系统实现，核心只按键读取字符串值。
pub trait ConfigAccessor {
    fn read(&self, key: &str) -> Option<String>;
}

impl ConfigAccessor for HashMap<String, String> {
    fn read(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// 注册数据库配置
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// 后端实现
    pub db_implementation: DbImplementation,

    /// 每个 AOR 的最大 Contact 数
    pub max_contacts_by_aor: usize,

    /// 线路参数名，空串表示禁用按线路替换
    pub line_field_name: String,

    /// 别名递归解析的最大深度
    pub max_recursion_depth: u32,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            db_implementation: DbImplementation::Internal,
            max_contacts_by_aor: 12,
            line_field_name: String::new(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl RegistrarConfig {
    /// 创建新的配置
    pub fn new(db_implementation: DbImplementation, max_contacts_by_aor: usize) -> Self {
        Self {
            db_implementation,
            max_contacts_by_aor,
            ..Self::default()
        }
    }

    /// 设置线路参数名
    pub fn with_line_field_name(mut self, name: impl Into<String>) -> Self {
        self.line_field_name = name.into();
        self
    }

    /// 设置最大递归深度
    pub fn with_max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// 从外部配置访问器读取
    ///
    /// `db-implementation` 与 `max-contacts-by-aor` 为必填项，
    /// 不支持的后端名称直接报错，不做降级。
    pub fn from_accessor(accessor: &dyn ConfigAccessor) -> Result<Self, ConfigError> {
        let db_implementation = accessor
            .read(KEY_DB_IMPLEMENTATION)
            .ok_or_else(|| ConfigError::Missing(KEY_DB_IMPLEMENTATION.to_string()))?
            .parse::<DbImplementation>()?;

        let max_contacts_by_aor = accessor
            .read(KEY_MAX_CONTACTS_BY_AOR)
            .ok_or_else(|| ConfigError::Missing(KEY_MAX_CONTACTS_BY_AOR.to_string()))?
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::Parse(format!("{}: {}", KEY_MAX_CONTACTS_BY_AOR, e)))?;

        let line_field_name = accessor
            .read(KEY_LINE_FIELD_NAME)
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        let max_recursion_depth = match accessor.read(KEY_MAX_RECURSION_DEPTH) {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::Parse(format!("{}: {}", KEY_MAX_RECURSION_DEPTH, e)))?,
            None => DEFAULT_MAX_RECURSION_DEPTH,
        };

        let config = Self {
            db_implementation,
            max_contacts_by_aor,
            line_field_name,
            max_recursion_depth,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_contacts_by_aor == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be a positive integer",
                KEY_MAX_CONTACTS_BY_AOR
            )));
        }
        Ok(())
    }

    /// 线路参数名（未配置时为 None）
    pub fn line_field(&self) -> Option<&str> {
        let name = self.line_field_name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessor(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_accessor() {
        let values = accessor(&[
            ("db-implementation", "redis-async"),
            ("max-contacts-by-aor", "5"),
            ("line-field-name", "line"),
        ]);
        let config = RegistrarConfig::from_accessor(&values).unwrap();
        assert_eq!(config.db_implementation, DbImplementation::RedisAsync);
        assert_eq!(config.max_contacts_by_aor, 5);
        assert_eq!(config.line_field(), Some("line"));
        assert_eq!(config.max_recursion_depth, DEFAULT_MAX_RECURSION_DEPTH);
    }

    #[test]
    fn test_unsupported_backend_is_fatal() {
        let values = accessor(&[
            ("db-implementation", "mysql"),
            ("max-contacts-by-aor", "5"),
        ]);
        let err = RegistrarConfig::from_accessor(&values).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedBackend(name) if name == "mysql"));
    }

    #[test]
    fn test_missing_and_invalid_limits() {
        let values = accessor(&[("db-implementation", "internal")]);
        assert!(matches!(
            RegistrarConfig::from_accessor(&values),
            Err(ConfigError::Missing(_))
        ));

        let values = accessor(&[
            ("db-implementation", "internal"),
            ("max-contacts-by-aor", "0"),
        ]);
        assert!(matches!(
            RegistrarConfig::from_accessor(&values),
            Err(ConfigError::Invalid(_))
        ));

        let values = accessor(&[
            ("db-implementation", "internal"),
            ("max-contacts-by-aor", "many"),
        ]);
        assert!(matches!(
            RegistrarConfig::from_accessor(&values),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_line_field_disables_line_replacement() {
        let config = RegistrarConfig::default().with_line_field_name("  ");
        assert_eq!(config.line_field(), None);
    }
}
