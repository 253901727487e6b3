/// 定义了系统运行所需的核心实体类型以及组合模块需要遵循的行为协议
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// 账户角色。admin角色可以为其他用户充值。
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "admin")]
    Admin,
}

impl TryFrom<&str> for Role {
    type Error = &'static str;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            &_ => Err("Unknown account role"),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// 一名匿名访客。由客户端生成的guest_id标识。
/// 访客拥有独立的余额，以及一份以JSON数组存储的生成历史。
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Guest {
    pub guest_id: String,
    pub credits: i32,
}

/// 一名注册用户
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct User {
    pub email: String,
    pub role: Role,
    pub credits: i32,
}

/// 一次生成请求的归属方
#[derive(Debug, PartialEq, Clone)]
pub enum Owner {
    User(String),
    Guest(String),
}

/// 一条生成历史记录
/// output_images永远是一个URL数组，不允许退化为裸字符串。
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct GenerationRecord {
    pub history_id: String,
    pub tool_key: String,
    pub input_prompt: String,
    pub output_images: Vec<String>,
    pub share: bool,
    pub created_at: NaiveDateTime,
}

/// 一笔支付交易。由支付发起流程创建，此处仅供查询。
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct PaymentStatus {
    pub order_id: String,
    pub status: String,
    pub amount: f64,
    pub credits: i32,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

pub type StoreResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// 提供持久化能力的对象应当具备的行为
pub trait PersistStore {
    // 访客账户
    fn create_guest(&self, guest: &Guest) -> StoreResult<()>;
    fn get_guest(&self, guest_id: &str) -> StoreResult<Guest>;
    fn update_guest_credits(&self, guest_id: &str, credits: i32) -> StoreResult<()>;

    // 访客生成历史（guest_sessions.history，JSON数组文本）
    fn get_guest_history(&self, guest_id: &str) -> StoreResult<Option<String>>;
    fn set_guest_history(&self, guest_id: &str, history: &str) -> StoreResult<()>;

    // 注册用户
    fn create_user(&self, user: &User) -> StoreResult<()>;
    fn get_user(&self, email: &str) -> StoreResult<User>;
    fn update_user_credits(&self, email: &str, credits: i32) -> StoreResult<()>;

    // 生成历史
    fn append_record(&self, owner: &Owner, record: &GenerationRecord) -> StoreResult<()>;
    fn records_for(&self, owner: &Owner) -> StoreResult<Vec<GenerationRecord>>;
    fn mark_shared(&self, history_id: &str, share: bool) -> StoreResult<Option<String>>;
    fn mark_shared_by_image(&self, image_url: &str, share: bool) -> StoreResult<Option<String>>;

    // 支付交易
    fn get_payment(&self, order_id: &str) -> StoreResult<Option<PaymentStatus>>;
}

/// 用量计数的可插拔存储
pub trait UsageStore {
    fn fetch(&self, tier: &str) -> StoreResult<u32>;
    fn store(&self, tier: &str, used: u32) -> StoreResult<()>;
}
