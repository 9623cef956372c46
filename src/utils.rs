/// 工具函数模块
///
/// 时钟、日志初始化与标识符生成
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// 当前 unix 时间（秒）
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// 初始化日志输出
///
/// 无法识别的级别按 info 处理。
pub fn initialize_logging(level: &str) {
    let level = tracing::Level::from_str(level).unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// 生成递归解析请求 ID
pub fn make_request_id() -> Uuid {
    Uuid::new_v4()
}

/// 生成基于 UUID 的 Call-ID
///
/// # 参数
/// * `domain` - 可选的域名后缀
///
/// # 示例
/// ```rust
/// use sip_registrar::utils::make_call_id;
///
/// let call_id = make_call_id(Some("example.com"));
/// // 生成类似: "550e8400-e29b-41d4-a716-446655440000@example.com"
/// assert!(call_id.ends_with("@example.com"));
/// ```
pub fn make_call_id(domain: Option<&str>) -> String {
    let uuid = Uuid::new_v4();

    match domain {
        Some(d) => format!("{}@{}", uuid, d),
        None => uuid.to_string(),
    }
}
