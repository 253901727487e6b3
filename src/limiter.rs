//! 模型档位的用量计数服务。
//! 计数仅作提示用途，并非服务端强制配额。存储后端可插拔。
use crate::core::{StoreResult, UsageStore};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_LIMIT: u32 = 50;

pub struct Limiter {
    limits: HashMap<String, u32>,
    store: Arc<dyn UsageStore + Send + Sync>,
}

impl Limiter {
    pub fn new(limits: HashMap<String, u32>, store: Arc<dyn UsageStore + Send + Sync>) -> Self {
        Self { limits, store }
    }

    /// 某档位的用量上限。未配置的档位使用默认上限。
    pub fn limit(&self, tier: &str) -> u32 {
        self.limits.get(tier).copied().unwrap_or(DEFAULT_LIMIT)
    }

    pub fn used(&self, tier: &str) -> StoreResult<u32> {
        self.store.fetch(tier)
    }

    pub fn remaining(&self, tier: &str) -> StoreResult<u32> {
        Ok(self.limit(tier).saturating_sub(self.used(tier)?))
    }

    pub fn can_use(&self, tier: &str) -> StoreResult<bool> {
        Ok(self.remaining(tier)? > 0)
    }

    /// 成功调用后计数加一。计数到上界后饱和。
    pub fn increment(&self, tier: &str) -> StoreResult<()> {
        let used = self.store.fetch(tier)?;
        self.store.store(tier, used.saturating_add(1))
    }

    pub fn reset(&self, tier: &str) -> StoreResult<()> {
        self.store.store(tier, 0)
    }

    pub fn reset_all(&self) -> StoreResult<()> {
        for tier in self.limits.keys() {
            self.store.store(tier, 0)?;
        }
        Ok(())
    }
}
