//! Curator专职生成历史与画廊的读写。
use crate::core::{GenerationRecord, Guest, Owner, PersistStore};
use crate::storage::agent::DEFAULT_CREDITS;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum Error {
    NotFound,
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err_msg = match self {
            Self::NotFound => "记录不存在",
            Self::Internal(s) => s,
        };
        write!(f, "{}", err_msg)
    }
}
impl std::error::Error for Error {}

/// 画廊内容的重建与生成记录的落库
pub struct Curator {
    storage: Arc<dyn PersistStore + Send + Sync>,
}

impl Curator {
    pub fn new(storage: Arc<dyn PersistStore + Send + Sync>) -> Self {
        Self { storage }
    }

    /// 重建访客画廊：历史列倒序展开，最新的在前。
    /// 会话不存在或历史列损坏时返回空画廊，而非报错。
    pub fn guest_gallery(&self, guest_id: &str) -> Result<Vec<String>, Error> {
        let raw = self
            .storage
            .get_guest_history(guest_id)
            .map_err(|e| Error::Internal(format!("读取访客历史失败。{e}")))?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(&raw) else {
            tracing::warn!("访客{guest_id}的历史列不是JSON数组，按空画廊处理。");
            return Ok(Vec::new());
        };

        let mut gallery: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry["url"].as_str().map(String::from))
            .collect();
        gallery.reverse();
        Ok(gallery)
    }

    /// 向访客历史列追加图片。会话不存在时顺带开户。
    pub fn append_guest_images(&self, guest_id: &str, images: &[String]) -> Result<usize, Error> {
        if self.storage.get_guest(guest_id).is_err() {
            self.storage
                .create_guest(&Guest {
                    guest_id: guest_id.to_owned(),
                    credits: DEFAULT_CREDITS,
                })
                .map_err(|e| Error::Internal(format!("注册访客失败。{e}")))?;
        }

        let raw = self
            .storage
            .get_guest_history(guest_id)
            .map_err(|e| Error::Internal(format!("读取访客历史失败。{e}")))?
            .unwrap_or_else(|| "[]".to_string());
        // 损坏的历史列重建为空数组
        let mut entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        for url in images {
            entries.push(json!({ "url": url }));
        }

        let serialized = serde_json::to_string(&Value::Array(entries))
            .map_err(|e| Error::Internal(format!("序列化访客历史失败。{e}")))?;
        self.storage
            .set_guest_history(guest_id, &serialized)
            .map_err(|e| Error::Internal(format!("写入访客历史失败。{e}")))?;
        Ok(images.len())
    }

    /// 记录一次生成。访客的记录同时进入其历史列。返回history_id。
    pub fn log_generation(
        &self,
        owner: &Owner,
        tool_key: &str,
        input_prompt: &str,
        output_images: &[String],
    ) -> Result<String, Error> {
        let record = GenerationRecord {
            history_id: uuid::Uuid::new_v4().to_string(),
            tool_key: tool_key.to_owned(),
            input_prompt: input_prompt.to_owned(),
            output_images: output_images.to_vec(),
            share: false,
            created_at: Utc::now().naive_utc(),
        };
        self.storage
            .append_record(owner, &record)
            .map_err(|e| Error::Internal(format!("写入生成记录失败。{e}")))?;

        if let Owner::Guest(guest_id) = owner {
            self.append_guest_images(guest_id, output_images)?;
        }
        Ok(record.history_id)
    }

    /// 用户画廊：最新在前，剔除base64与非HTTPS地址，滤空后的记录丢弃。
    pub fn user_gallery(&self, email: &str) -> Result<Vec<GenerationRecord>, Error> {
        let records = self
            .storage
            .records_for(&Owner::User(email.to_owned()))
            .map_err(|e| Error::Internal(format!("读取生成记录失败。{e}")))?;

        let filtered = records
            .into_iter()
            .map(|mut record| {
                record.output_images.retain(|url| {
                    !url.starts_with("data:") && url.starts_with("https://")
                });
                record
            })
            .filter(|record| !record.output_images.is_empty())
            .collect();
        Ok(filtered)
    }

    /// 切换共享标记。优先按history_id精确更新，其次按图片URL匹配首条记录。
    pub fn share(
        &self,
        history_id: Option<&str>,
        image_url: Option<&str>,
        share: bool,
    ) -> Result<String, Error> {
        let updated = if let Some(id) = history_id {
            self.storage
                .mark_shared(id, share)
                .map_err(|e| Error::Internal(format!("更新共享标记失败。{e}")))?
        } else if let Some(url) = image_url {
            self.storage
                .mark_shared_by_image(url, share)
                .map_err(|e| Error::Internal(format!("更新共享标记失败。{e}")))?
        } else {
            None
        };
        updated.ok_or(Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PersistStore;
    use crate::storage::Agent as StorageAgent;

    fn curator() -> (Curator, Arc<StorageAgent>) {
        let storage = Arc::new(StorageAgent::new(":memory:").unwrap());
        (Curator::new(storage.clone()), storage)
    }

    #[test]
    fn gallery_is_reversed_history() {
        let (curator, storage) = curator();
        storage
            .create_guest(&Guest {
                guest_id: "g1".to_string(),
                credits: 5,
            })
            .unwrap();
        storage
            .set_guest_history("g1", r#"[{"url":"a"},{"url":"b"}]"#)
            .unwrap();
        assert_eq!(curator.guest_gallery("g1").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn missing_session_yields_empty_gallery() {
        let (curator, _) = curator();
        assert_eq!(curator.guest_gallery("nobody").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn malformed_history_yields_empty_gallery() {
        let (curator, storage) = curator();
        storage
            .create_guest(&Guest {
                guest_id: "g1".to_string(),
                credits: 5,
            })
            .unwrap();
        storage.set_guest_history("g1", r#""not an array""#).unwrap();
        assert_eq!(curator.guest_gallery("g1").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn entries_without_url_are_skipped() {
        let (curator, storage) = curator();
        storage
            .create_guest(&Guest {
                guest_id: "g1".to_string(),
                credits: 5,
            })
            .unwrap();
        storage
            .set_guest_history("g1", r#"[{"url":"a"},{"note":"x"},{"url":"c"}]"#)
            .unwrap();
        assert_eq!(curator.guest_gallery("g1").unwrap(), vec!["c", "a"]);
    }

    #[test]
    fn append_creates_session_lazily() {
        let (curator, storage) = curator();
        let added = curator
            .append_guest_images("g-new", &["https://a.img".to_string()])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(storage.get_guest("g-new").unwrap().credits, DEFAULT_CREDITS);
        assert_eq!(curator.guest_gallery("g-new").unwrap(), vec!["https://a.img"]);
    }

    #[test]
    fn log_generation_feeds_guest_history() {
        let (curator, storage) = curator();
        let owner = Owner::Guest("g1".to_string());
        let id = curator
            .log_generation(&owner, "face-swap", "swap me", &["https://a.img".to_string()])
            .unwrap();
        assert!(!id.is_empty());

        let records = storage.records_for(&owner).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].history_id, id);
        assert_eq!(curator.guest_gallery("g1").unwrap(), vec!["https://a.img"]);
    }

    #[test]
    fn user_gallery_filters_invalid_urls() {
        let (curator, _storage) = curator();
        let owner = Owner::User("u@x.io".to_string());
        curator
            .log_generation(
                &owner,
                "avatar-creator",
                "",
                &[
                    "https://cdn.duky.ai/ok.png".to_string(),
                    "data:image/png;base64,AAAA".to_string(),
                    "http://insecure.example/x.png".to_string(),
                ],
            )
            .unwrap();
        curator
            .log_generation(&owner, "avatar-creator", "", &["data:only".to_string()])
            .unwrap();

        let gallery = curator.user_gallery("u@x.io").unwrap();
        // 第二条记录滤空后整体丢弃
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].output_images, vec!["https://cdn.duky.ai/ok.png"]);
    }

    #[test]
    fn share_prefers_history_id() {
        let (curator, _storage) = curator();
        let owner = Owner::Guest("g1".to_string());
        let id = curator
            .log_generation(&owner, "face-swap", "", &["https://a.img".to_string()])
            .unwrap();

        assert_eq!(curator.share(Some(&id), None, true).unwrap(), id);
        assert_eq!(
            curator.share(None, Some("https://a.img"), true).unwrap(),
            id
        );
        assert!(matches!(
            curator.share(None, Some("https://missing.img"), true),
            Err(Error::NotFound)
        ));
        assert!(matches!(curator.share(None, None, true), Err(Error::NotFound)));
    }
}
