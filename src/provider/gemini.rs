//! Gemini作为图像生成供应商。请求体原样转发generateContent。
use super::{Error, Relay};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct Agent {
    config: Config,
    client: reqwest::Client,
}

impl Agent {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// 调用generateContent。parts与generationConfig由调用方给定。
    pub async fn generate_content(
        &self,
        model: Option<&str>,
        parts: &Value,
        generation_config: Option<&Value>,
    ) -> Result<Relay, Error> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url, model
        );
        let mut body = json!({ "contents": [{ "parts": parts }] });
        if let Some(config) = generation_config {
            body["generationConfig"] = config.clone();
        }
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
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
}
