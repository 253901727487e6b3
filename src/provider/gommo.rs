//! Gommo作为视频生成供应商。
//! 接口统一为POST x-www-form-urlencoded，嵌套对象需JSON字符串化后作为表单字段。
use super::{Error, Relay};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_API_URL: &str = "https://api.gommo.net";

// 供应商服务所需要的参数
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub domain: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Agent {
    config: Config,
    client: reqwest::Client,
}

// 表单字段值的编码规则：标量按字面转字符串，复合值JSON字符串化。
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).expect("JSON value should serialize")
        }
    }
}

impl Agent {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            client: reqwest::Client::new(),
        }
    }

    // 凭据字段 + 请求体字段
    fn form_fields(&self, payload: &Value) -> Vec<(String, String)> {
        let mut fields = vec![
            ("access_token".to_string(), self.config.api_key.clone()),
            ("domain".to_string(), self.config.domain.clone()),
        ];
        if let Some(body) = payload.as_object() {
            for (key, value) in body {
                fields.push((key.clone(), form_value(value)));
            }
        }
        fields
    }

    async fn post_form(&self, path: &str, fields: &[(String, String)]) -> Result<Relay, Error> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .post(&url)
            .form(fields)
            .send()
            .await
            .map_err(|e| Error(format!("发送供应商请求失败。{e}")))?;
        let status = response.status().as_u16();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| Error(format!("解析供应商返回失败。{e}")))?;
        Ok(Relay { status, body })
    }

    /// 创建视频生成任务
    pub async fn create_video(&self, payload: &Value) -> Result<Relay, Error> {
        self.post_form("/ai/create-video", &self.form_fields(payload))
            .await
    }

    /// 查询任务状态。
    /// 路由侧参数名是process_id，供应商文档要求videoId；在此归一化。
    pub async fn video_status(&self, process_id: &str) -> Result<Relay, Error> {
        let mut fields = self.form_fields(&Value::Null);
        fields.push(("videoId".to_string(), process_id.to_string()));
        // 供应商的状态查询同样要求POST表单
        self.post_form("/ai/video", &fields).await
    }

    /// 列出可用模型
    pub async fn list_models(&self, kind: &str) -> Result<Relay, Error> {
        let mut fields = self.form_fields(&Value::Null);
        fields.push(("type".to_string(), kind.to_string()));
        self.post_form("/ai/models", &fields).await
    }
}
