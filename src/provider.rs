//! 对外部生成服务的出站适配器。
//! 每个适配器只做单次请求转发：无重试、无退避、无幂等键。
pub mod gemini;
pub mod gommo;
pub mod kie;

use serde_json::Value;
use std::fmt;

// Custom Error
#[derive(Debug, Clone)]
pub struct Error(pub String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for Error {}

/// 供应商的原样响应：状态码与载荷一并带回，由路由层决定如何转发。
/// 状态码以u16携带，与出站HTTP栈的类型解耦。
#[derive(Debug, Clone)]
pub struct Relay {
    pub status: u16,
    pub body: Value,
}

impl Relay {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
