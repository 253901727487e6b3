use super::{model, schema};
use crate::core::{self, Owner, PersistStore, StoreResult, UsageStore};
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// 新注册账户的默认赠送额度
pub const DEFAULT_CREDITS: i32 = 5;

// 访客类型转换
impl From<model::GuestSession> for core::Guest {
    fn from(value: model::GuestSession) -> Self {
        Self {
            guest_id: value.guest_id,
            credits: value.credits,
        }
    }
}

// 用户类型转换。角色字段非法时回退为普通用户。
impl From<model::User> for core::User {
    fn from(value: model::User) -> Self {
        Self {
            email: value.email,
            role: core::Role::try_from(value.role.as_str()).unwrap_or(core::Role::User),
            credits: value.current_credits,
        }
    }
}

impl From<model::PaymentTransaction> for core::PaymentStatus {
    fn from(value: model::PaymentTransaction) -> Self {
        Self {
            order_id: value.order_id,
            status: value.status,
            amount: value.amount,
            credits: value.credits,
            created_at: value.created_at,
            completed_at: value.completed_at,
        }
    }
}

// 数据库记录转换为核心类型。
// output_images列恒为JSON数组文本；解析失败按空数组处理。
impl From<&model::HistoryRow> for core::GenerationRecord {
    fn from(value: &model::HistoryRow) -> Self {
        Self {
            history_id: value.history_id.clone(),
            tool_key: value.tool_key.clone(),
            input_prompt: value.input_prompt.clone(),
            output_images: serde_json::from_str(&value.output_images).unwrap_or_default(),
            share: value.share,
            created_at: value.created_at,
        }
    }
}

pub struct Agent {
    connections: Pool<ConnectionManager<SqliteConnection>>,
}

impl Agent {
    /// 初始化数据库
    pub fn new(database_url: &str) -> StoreResult<Self> {
        // Init a db pool
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let connections = Pool::builder().build(manager)?;

        // 应用全部待执行的版本化迁移
        {
            let conn = &mut connections.get()?;
            conn.run_pending_migrations(MIGRATIONS)?;
        }

        Ok(Self { connections })
    }

    /// 记录一笔支付交易。由支付发起流程调用。
    pub fn create_payment(
        &self,
        order_id: &str,
        user_email: &str,
        status: &str,
        amount: f64,
        credits: i32,
    ) -> StoreResult<()> {
        use schema::payment_transactions;
        let conn = &mut self.connections.get()?;
        let new_tx = model::NewPaymentTransaction {
            order_id,
            user_email,
            status,
            amount,
            credits,
            created_at: Utc::now().naive_utc(),
            completed_at: None,
        };
        diesel::insert_into(payment_transactions::table)
            .values(&new_tx)
            .execute(conn)?;
        Ok(())
    }
}

// 实现存储特性
impl PersistStore for Agent {
    /// 注册新访客
    fn create_guest(&self, guest: &core::Guest) -> StoreResult<()> {
        use schema::guest_sessions::dsl::*;
        let conn = &mut self.connections.get()?;
        let timestamp = Utc::now().naive_utc();
        let new_session = model::NewGuestSession {
            guest_id: &guest.guest_id,
            credits: guest.credits,
            history: "[]",
            created_at: timestamp,
            updated_at: timestamp,
        };
        diesel::insert_into(guest_sessions)
            .values(&new_session)
            .execute(conn)?;
        Ok(())
    }

    /// 按照guest_id获取访客
    fn get_guest(&self, by_guest_id: &str) -> StoreResult<core::Guest> {
        use schema::guest_sessions::dsl::*;
        let conn = &mut self.connections.get()?;
        let session: model::GuestSession = guest_sessions
            .filter(guest_id.eq(by_guest_id))
            .select(model::GuestSession::as_select())
            .first(conn)?;
        Ok(session.into())
    }

    /// 更新访客余额
    fn update_guest_credits(&self, by_guest_id: &str, new_credits: i32) -> StoreResult<()> {
        use schema::guest_sessions::dsl::*;
        let conn = &mut self.connections.get()?;
        diesel::update(guest_sessions.filter(guest_id.eq(by_guest_id)))
            .set((
                credits.eq(new_credits),
                updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// 读取访客历史列。会话不存在时返回None。
    fn get_guest_history(&self, by_guest_id: &str) -> StoreResult<Option<String>> {
        use schema::guest_sessions::dsl::*;
        let conn = &mut self.connections.get()?;
        Ok(guest_sessions
            .filter(guest_id.eq(by_guest_id))
            .select(history)
            .first::<String>(conn)
            .optional()?)
    }

    /// 覆盖写入访客历史列
    fn set_guest_history(&self, by_guest_id: &str, new_history: &str) -> StoreResult<()> {
        use schema::guest_sessions::dsl::*;
        let conn = &mut self.connections.get()?;
        diesel::update(guest_sessions.filter(guest_id.eq(by_guest_id)))
            .set((
                history.eq(new_history),
                updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// 注册新用户
    fn create_user(&self, user: &core::User) -> StoreResult<()> {
        use schema::users::dsl::*;
        let conn = &mut self.connections.get()?;
        let timestamp = Utc::now().naive_utc();
        let role_name = user.role.to_string();
        let new_user = model::NewUser {
            email: &user.email,
            role: &role_name,
            current_credits: user.credits,
            created_at: timestamp,
            updated_at: timestamp,
        };
        diesel::insert_into(users).values(&new_user).execute(conn)?;
        Ok(())
    }

    /// 按照邮箱获取用户
    fn get_user(&self, by_email: &str) -> StoreResult<core::User> {
        use schema::users::dsl::*;
        let conn = &mut self.connections.get()?;
        let user: model::User = users
            .filter(email.eq(by_email))
            .select(model::User::as_select())
            .first(conn)?;
        Ok(user.into())
    }

    /// 更新用户余额
    fn update_user_credits(&self, by_email: &str, new_credits: i32) -> StoreResult<()> {
        use schema::users::dsl::*;
        let conn = &mut self.connections.get()?;
        diesel::update(users.filter(email.eq(by_email)))
            .set((
                current_credits.eq(new_credits),
                updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// 新增一条生成历史记录
    fn append_record(&self, owner: &Owner, record: &core::GenerationRecord) -> StoreResult<()> {
        use schema::generation_history;
        let conn = &mut self.connections.get()?;
        let timestamp = Utc::now().naive_utc();
        // 不变式：output_images以JSON数组形式落库
        let images = serde_json::to_string(&record.output_images)?;
        let (by_email, by_guest) = match owner {
            Owner::User(email) => (Some(email.as_str()), None),
            Owner::Guest(gid) => (None, Some(gid.as_str())),
        };
        let new_row = model::NewHistoryRow {
            history_id: &record.history_id,
            user_email: by_email,
            guest_id: by_guest,
            tool_key: &record.tool_key,
            input_prompt: &record.input_prompt,
            output_images: &images,
            share: record.share,
            created_at: timestamp,
            updated_at: timestamp,
        };
        diesel::insert_into(generation_history::table)
            .values(&new_row)
            .execute(conn)?;
        Ok(())
    }

    /// 获取归属方的全部生成记录，最新在前
    fn records_for(&self, owner: &Owner) -> StoreResult<Vec<core::GenerationRecord>> {
        use schema::generation_history::dsl::*;
        let conn = &mut self.connections.get()?;
        let rows: Vec<model::HistoryRow> = match owner {
            Owner::User(email) => generation_history
                .filter(user_email.eq(email))
                .order((created_at.desc(), id.desc()))
                .limit(500)
                .select(model::HistoryRow::as_select())
                .load(conn)?,
            Owner::Guest(gid) => generation_history
                .filter(guest_id.eq(gid))
                .order((created_at.desc(), id.desc()))
                .limit(500)
                .select(model::HistoryRow::as_select())
                .load(conn)?,
        };
        Ok(rows.iter().map(|r| r.into()).collect())
    }

    /// 按history_id切换共享标记。返回被更新记录的history_id。
    fn mark_shared(&self, by_history_id: &str, shared: bool) -> StoreResult<Option<String>> {
        use schema::generation_history::dsl::*;
        let conn = &mut self.connections.get()?;
        Ok(
            diesel::update(generation_history.filter(history_id.eq(by_history_id)))
                .set((share.eq(shared), updated_at.eq(Utc::now().naive_utc())))
                .returning(history_id)
                .get_result::<String>(conn)
                .optional()?,
        )
    }

    /// 按图片URL切换共享标记。仅更新首条匹配记录。
    /// LIKE仅用作预筛选，最终以解析后的JSON数组判定成员关系。
    fn mark_shared_by_image(&self, image_url: &str, shared: bool) -> StoreResult<Option<String>> {
        use schema::generation_history::dsl::*;
        let candidates: Vec<model::HistoryRow> = {
            let conn = &mut self.connections.get()?;
            generation_history
                .filter(output_images.like(format!("%{}%", image_url)))
                .order(id.asc())
                .select(model::HistoryRow::as_select())
                .load(conn)?
        };
        let hit = candidates.into_iter().find(|row| {
            serde_json::from_str::<Vec<String>>(&row.output_images)
                .map(|urls| urls.iter().any(|u| u == image_url))
                .unwrap_or(false)
        });
        match hit {
            Some(row) => self.mark_shared(&row.history_id, shared),
            None => Ok(None),
        }
    }

    /// 查询支付交易
    fn get_payment(&self, by_order_id: &str) -> StoreResult<Option<core::PaymentStatus>> {
        use schema::payment_transactions::dsl::*;
        let conn = &mut self.connections.get()?;
        Ok(payment_transactions
            .filter(order_id.eq(by_order_id))
            .select(model::PaymentTransaction::as_select())
            .first::<model::PaymentTransaction>(conn)
            .optional()?
            .map(|tx| tx.into()))
    }
}

// 用量计数的持久化实现
impl UsageStore for Agent {
    fn fetch(&self, by_tier: &str) -> StoreResult<u32> {
        use schema::usage_counters::dsl::*;
        let conn = &mut self.connections.get()?;
        let count = usage_counters
            .filter(tier.eq(by_tier))
            .select(used)
            .first::<i32>(conn)
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u32)
    }

    fn store(&self, by_tier: &str, new_used: u32) -> StoreResult<()> {
        use schema::usage_counters::dsl::*;
        let conn = &mut self.connections.get()?;
        let timestamp = Utc::now().naive_utc();
        let updated = diesel::update(usage_counters.filter(tier.eq(by_tier)))
            .set((used.eq(new_used as i32), updated_at.eq(timestamp)))
            .execute(conn)?;
        if updated == 0 {
            diesel::insert_into(usage_counters)
                .values((
                    tier.eq(by_tier),
                    used.eq(new_used as i32),
                    updated_at.eq(timestamp),
                ))
                .execute(conn)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Agent;
    use crate::core::{
        GenerationRecord, Guest, Owner, PersistStore, Role, StoreResult, UsageStore, User,
    };
    use chrono::Utc;

    fn agent() -> Agent {
        Agent::new(":memory:").expect("Database agent should be initialized")
    }

    fn record(images: &[&str]) -> GenerationRecord {
        GenerationRecord {
            history_id: uuid::Uuid::new_v4().to_string(),
            tool_key: "avatar-creator".to_string(),
            input_prompt: "a portrait".to_string(),
            output_images: images.iter().map(|s| s.to_string()).collect(),
            share: false,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_guest_create_get_update() {
        let agent = agent();
        let guest = Guest {
            guest_id: "guest-abc".to_string(),
            credits: 5,
        };
        agent
            .create_guest(&guest)
            .expect("Guest registration should succeed");
        assert_eq!(agent.get_guest("guest-abc").unwrap(), guest);

        agent.update_guest_credits("guest-abc", 3).unwrap();
        assert_eq!(agent.get_guest("guest-abc").unwrap().credits, 3);
    }

    #[test]
    fn test_guest_duplicate_register() {
        let agent = agent();
        let guest = Guest {
            guest_id: "guest-abc".to_string(),
            credits: 5,
        };
        agent.create_guest(&guest).unwrap();
        assert!(agent.create_guest(&guest).is_err());
    }

    #[test]
    fn test_guest_invalid_get() {
        let agent = agent();
        assert!(agent.get_guest("NotExisted").is_err());
    }

    #[test]
    fn test_guest_history_roundtrip() {
        let agent = agent();
        assert_eq!(agent.get_guest_history("guest-abc").unwrap(), None);

        agent
            .create_guest(&Guest {
                guest_id: "guest-abc".to_string(),
                credits: 5,
            })
            .unwrap();
        assert_eq!(
            agent.get_guest_history("guest-abc").unwrap(),
            Some("[]".to_string())
        );

        agent
            .set_guest_history("guest-abc", r#"[{"url":"https://a"}]"#)
            .unwrap();
        assert_eq!(
            agent.get_guest_history("guest-abc").unwrap(),
            Some(r#"[{"url":"https://a"}]"#.to_string())
        );
    }

    #[test]
    fn test_user_create_and_role() {
        let agent = agent();
        let user = User {
            email: "op@duky.ai".to_string(),
            role: Role::Admin,
            credits: 100,
        };
        agent.create_user(&user).unwrap();
        assert_eq!(agent.get_user("op@duky.ai").unwrap(), user);

        agent.update_user_credits("op@duky.ai", 42).unwrap();
        assert_eq!(agent.get_user("op@duky.ai").unwrap().credits, 42);
    }

    #[test]
    fn test_records_newest_first() {
        let agent = agent();
        let owner = Owner::Guest("guest-abc".to_string());
        agent
            .append_record(&owner, &record(&["https://a.img"]))
            .unwrap();
        agent
            .append_record(&owner, &record(&["https://b.img"]))
            .unwrap();

        let records = agent.records_for(&owner).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].output_images, vec!["https://b.img"]);
        assert_eq!(records[1].output_images, vec!["https://a.img"]);
    }

    #[test]
    fn test_records_scoped_to_owner() {
        let agent = agent();
        agent
            .append_record(&Owner::Guest("g1".to_string()), &record(&["https://a"]))
            .unwrap();
        agent
            .append_record(&Owner::User("u@x.io".to_string()), &record(&["https://b"]))
            .unwrap();

        assert_eq!(
            agent
                .records_for(&Owner::Guest("g1".to_string()))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            agent
                .records_for(&Owner::User("u@x.io".to_string()))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_mark_shared_by_id() {
        let agent = agent();
        let owner = Owner::Guest("g1".to_string());
        let rec = record(&["https://a.img"]);
        agent.append_record(&owner, &rec).unwrap();

        let updated = agent.mark_shared(&rec.history_id, true).unwrap();
        assert_eq!(updated, Some(rec.history_id.clone()));
        assert!(agent.records_for(&owner).unwrap()[0].share);

        assert_eq!(agent.mark_shared("no-such-id", true).unwrap(), None);
    }

    #[test]
    fn test_mark_shared_by_image_url() {
        let agent = agent();
        let owner = Owner::Guest("g1".to_string());
        let rec = record(&["https://cdn.duky.ai/a.png", "https://cdn.duky.ai/b.png"]);
        agent.append_record(&owner, &rec).unwrap();

        let updated = agent
            .mark_shared_by_image("https://cdn.duky.ai/b.png", true)
            .unwrap();
        assert_eq!(updated, Some(rec.history_id));

        // 子串命中但非数组成员时不得误更新
        assert_eq!(
            agent
                .mark_shared_by_image("https://cdn.duky.ai/b.pn", true)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_payment_lookup() {
        let agent = agent();
        agent
            .create_payment("DUKY-1001", "u@x.io", "pending", 9.9, 100)
            .unwrap();

        let tx = agent.get_payment("DUKY-1001").unwrap().unwrap();
        assert_eq!(tx.status, "pending");
        assert_eq!(tx.credits, 100);
        assert!(tx.completed_at.is_none());

        assert!(agent.get_payment("DUKY-9999").unwrap().is_none());
    }

    #[test]
    fn test_usage_counter_upsert() -> StoreResult<()> {
        let agent = agent();
        assert_eq!(agent.fetch("v2")?, 0);
        agent.store("v2", 1)?;
        agent.store("v2", 2)?;
        assert_eq!(agent.fetch("v2")?, 2);
        assert_eq!(agent.fetch("v3")?, 0);
        Ok(())
    }
}
