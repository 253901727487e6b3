//! Accountant专职账户余额与支付查询。
use crate::core::{Guest, PaymentStatus, PersistStore, User};
use crate::storage::agent::DEFAULT_CREDITS;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum Error {
    NotFound,
    Insufficient(i32),
    InvalidAmount,
    Forbidden,
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err_msg = match self {
            Self::NotFound => "账户不存在",
            Self::Insufficient(_) => "账户余额不足",
            Self::InvalidAmount => "充值金额非法",
            Self::Forbidden => "无权操作该账户",
            Self::Internal(s) => s,
        };
        write!(f, "{}", err_msg)
    }
}
impl std::error::Error for Error {}

// 单次充值上限
const MAX_GRANT: i32 = 1000;

/// 账户信息的数据库读取与更新
pub struct Accountant {
    storage: Arc<dyn PersistStore + Send + Sync>,
}

impl Accountant {
    pub fn new(storage: Arc<dyn PersistStore + Send + Sync>) -> Self {
        Self { storage }
    }

    /// 查询访客余额。未知访客按0处理。
    pub fn guest_credits(&self, guest_id: &str) -> Result<i32, Error> {
        match self.storage.get_guest(guest_id) {
            Ok(guest) => Ok(guest.credits),
            Err(_) => Ok(0),
        }
    }

    /// 获取访客，不存在则以默认额度开户
    pub fn ensure_guest(&self, guest_id: &str) -> Result<Guest, Error> {
        if let Ok(guest) = self.storage.get_guest(guest_id) {
            return Ok(guest);
        }
        tracing::info!("访客不存在，将注册：{guest_id}");
        let guest = Guest {
            guest_id: guest_id.to_owned(),
            credits: DEFAULT_CREDITS,
        };
        match self.storage.create_guest(&guest) {
            Ok(()) => Ok(guest),
            // 并发首访时另一请求可能已抢先开户，重读一次
            Err(create_err) => self
                .storage
                .get_guest(guest_id)
                .map_err(|_| Error::Internal(format!("注册访客失败。{create_err}"))),
        }
    }

    /// 调整访客余额。余额不得为负。返回调整后的余额。
    pub fn adjust_guest(&self, guest_id: &str, delta: i32) -> Result<i32, Error> {
        let guest = self.ensure_guest(guest_id)?;
        // delta来自客户端，溢出一律按非法金额拒绝
        let balance = guest
            .credits
            .checked_add(delta)
            .ok_or(Error::InvalidAmount)?;
        if balance < 0 {
            return Err(Error::Insufficient(guest.credits));
        }
        self.storage
            .update_guest_credits(guest_id, balance)
            .map_err(|e| Error::Internal(format!("更新访客余额失败。{e}")))?;
        Ok(balance)
    }

    /// 查询用户余额
    pub fn user_credits(&self, email: &str) -> Result<i32, Error> {
        self.storage
            .get_user(email)
            .map(|u| u.credits)
            .map_err(|_| Error::NotFound)
    }

    /// 为用户充值。
    /// 充值目标是他人时要求操作者具备admin角色。金额限定在(0, 1000]。
    pub fn grant_user(
        &self,
        actor_email: &str,
        target_email: Option<&str>,
        amount: i32,
    ) -> Result<i32, Error> {
        if amount <= 0 || amount > MAX_GRANT {
            return Err(Error::InvalidAmount);
        }
        let actor: User = self.storage.get_user(actor_email).map_err(|_| Error::NotFound)?;

        let target = match target_email {
            Some(email) if email != actor_email => {
                if actor.role != crate::core::Role::Admin {
                    return Err(Error::Forbidden);
                }
                self.storage.get_user(email).map_err(|_| Error::NotFound)?
            }
            _ => actor,
        };

        let balance = target
            .credits
            .checked_add(amount)
            .ok_or(Error::InvalidAmount)?;
        self.storage
            .update_user_credits(&target.email, balance)
            .map_err(|e| Error::Internal(format!("更新用户余额失败。{e}")))?;
        Ok(balance)
    }

    /// 查询支付交易状态
    pub fn check_payment(&self, order_id: &str) -> Result<PaymentStatus, Error> {
        self.storage
            .get_payment(order_id)
            .map_err(|e| Error::Internal(format!("查询支付交易失败。{e}")))?
            .ok_or(Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Role, StoreResult};
    use crate::storage::Agent as StorageAgent;
    use std::sync::Mutex;

    fn accountant() -> (Accountant, Arc<StorageAgent>) {
        let storage = Arc::new(StorageAgent::new(":memory:").unwrap());
        (Accountant::new(storage.clone()), storage)
    }

    #[test]
    fn unknown_guest_reads_as_zero() {
        let (accountant, _) = accountant();
        assert_eq!(accountant.guest_credits("nobody").unwrap(), 0);
    }

    #[test]
    fn ensure_guest_opens_account_with_default_credits() {
        let (accountant, _) = accountant();
        let guest = accountant.ensure_guest("g1").unwrap();
        assert_eq!(guest.credits, DEFAULT_CREDITS);
        // 再次调用不重复开户
        assert_eq!(accountant.ensure_guest("g1").unwrap(), guest);
    }

    #[test]
    fn adjust_guest_rejects_overdraw() {
        let (accountant, _) = accountant();
        accountant.ensure_guest("g1").unwrap();
        let result = accountant.adjust_guest("g1", -(DEFAULT_CREDITS + 1));
        assert!(matches!(result, Err(Error::Insufficient(c)) if c == DEFAULT_CREDITS));
        // 余额保持不变
        assert_eq!(accountant.guest_credits("g1").unwrap(), DEFAULT_CREDITS);
    }

    #[test]
    fn adjust_guest_rejects_overflowing_delta() {
        let (accountant, _) = accountant();
        accountant.ensure_guest("g1").unwrap();
        assert!(matches!(
            accountant.adjust_guest("g1", i32::MAX),
            Err(Error::InvalidAmount)
        ));
        // 余额保持不变
        assert_eq!(accountant.guest_credits("g1").unwrap(), DEFAULT_CREDITS);
    }

    #[test]
    fn adjust_guest_charges_and_grants() {
        let (accountant, _) = accountant();
        assert_eq!(accountant.adjust_guest("g1", -2).unwrap(), DEFAULT_CREDITS - 2);
        assert_eq!(accountant.adjust_guest("g1", 10).unwrap(), DEFAULT_CREDITS + 8);
    }

    #[test]
    fn grant_to_self_is_allowed_for_plain_users() {
        let (accountant, storage) = accountant();
        storage
            .create_user(&crate::core::User {
                email: "u@x.io".to_string(),
                role: Role::User,
                credits: 5,
            })
            .unwrap();
        assert_eq!(accountant.grant_user("u@x.io", None, 10).unwrap(), 15);
    }

    #[test]
    fn cross_user_grant_requires_admin() {
        let (accountant, storage) = accountant();
        for (email, role) in [("a@x.io", Role::User), ("b@x.io", Role::User)] {
            storage
                .create_user(&crate::core::User {
                    email: email.to_string(),
                    role,
                    credits: 5,
                })
                .unwrap();
        }
        assert!(matches!(
            accountant.grant_user("a@x.io", Some("b@x.io"), 10),
            Err(Error::Forbidden)
        ));
    }

    #[test]
    fn admin_can_grant_to_others() {
        let (accountant, storage) = accountant();
        storage
            .create_user(&crate::core::User {
                email: "admin@x.io".to_string(),
                role: Role::Admin,
                credits: 0,
            })
            .unwrap();
        storage
            .create_user(&crate::core::User {
                email: "u@x.io".to_string(),
                role: Role::User,
                credits: 5,
            })
            .unwrap();
        assert_eq!(
            accountant.grant_user("admin@x.io", Some("u@x.io"), 100).unwrap(),
            105
        );
    }

    #[test]
    fn grant_amount_is_bounded() {
        let (accountant, storage) = accountant();
        storage
            .create_user(&crate::core::User {
                email: "u@x.io".to_string(),
                role: Role::User,
                credits: 5,
            })
            .unwrap();
        assert!(matches!(
            accountant.grant_user("u@x.io", None, 0),
            Err(Error::InvalidAmount)
        ));
        assert!(matches!(
            accountant.grant_user("u@x.io", None, 1001),
            Err(Error::InvalidAmount)
        ));
    }

    #[test]
    fn grant_rejects_balance_overflow() {
        let (accountant, storage) = accountant();
        storage
            .create_user(&crate::core::User {
                email: "u@x.io".to_string(),
                role: Role::User,
                credits: i32::MAX,
            })
            .unwrap();
        assert!(matches!(
            accountant.grant_user("u@x.io", None, 1),
            Err(Error::InvalidAmount)
        ));
    }

    // 模拟并发首访：首次读未命中，插入因唯一约束失败，重读命中
    #[derive(Default)]
    struct ContendedStore {
        reads: Mutex<u32>,
    }

    impl PersistStore for ContendedStore {
        fn get_guest(&self, guest_id: &str) -> StoreResult<Guest> {
            let mut reads = self.reads.lock().unwrap();
            *reads += 1;
            if *reads == 1 {
                Err("not found".into())
            } else {
                Ok(Guest {
                    guest_id: guest_id.to_owned(),
                    credits: DEFAULT_CREDITS,
                })
            }
        }
        fn create_guest(&self, _guest: &Guest) -> StoreResult<()> {
            Err("UNIQUE constraint failed: guest_sessions.guest_id".into())
        }

        // 本测试不会触及以下操作
        fn update_guest_credits(&self, _: &str, _: i32) -> StoreResult<()> {
            unimplemented!()
        }
        fn get_guest_history(&self, _: &str) -> StoreResult<Option<String>> {
            unimplemented!()
        }
        fn set_guest_history(&self, _: &str, _: &str) -> StoreResult<()> {
            unimplemented!()
        }
        fn create_user(&self, _: &crate::core::User) -> StoreResult<()> {
            unimplemented!()
        }
        fn get_user(&self, _: &str) -> StoreResult<crate::core::User> {
            unimplemented!()
        }
        fn update_user_credits(&self, _: &str, _: i32) -> StoreResult<()> {
            unimplemented!()
        }
        fn append_record(
            &self,
            _: &crate::core::Owner,
            _: &crate::core::GenerationRecord,
        ) -> StoreResult<()> {
            unimplemented!()
        }
        fn records_for(
            &self,
            _: &crate::core::Owner,
        ) -> StoreResult<Vec<crate::core::GenerationRecord>> {
            unimplemented!()
        }
        fn mark_shared(&self, _: &str, _: bool) -> StoreResult<Option<String>> {
            unimplemented!()
        }
        fn mark_shared_by_image(&self, _: &str, _: bool) -> StoreResult<Option<String>> {
            unimplemented!()
        }
        fn get_payment(&self, _: &str) -> StoreResult<Option<PaymentStatus>> {
            unimplemented!()
        }
    }

    #[test]
    fn first_touch_race_falls_back_to_reread() {
        let accountant = Accountant::new(Arc::new(ContendedStore::default()));
        let guest = accountant.ensure_guest("g1").unwrap();
        assert_eq!(guest.credits, DEFAULT_CREDITS);
    }

    #[test]
    fn payment_check_reports_missing_order() {
        let (accountant, storage) = accountant();
        assert!(matches!(
            accountant.check_payment("DUKY-404"),
            Err(Error::NotFound)
        ));
        storage
            .create_payment("DUKY-1", "u@x.io", "completed", 19.9, 200)
            .unwrap();
        let tx = accountant.check_payment("DUKY-1").unwrap();
        assert_eq!(tx.status, "completed");
    }
}
