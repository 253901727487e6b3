//! kie.ai作为图像/视频生成供应商。
//! Veo系列模型走独立端点，且对宽高比与参考图有额外约定。
use super::{Error, Relay};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_API_URL: &str = "https://api.kie.ai/api/v1";

const VALID_VEO_RATIOS: &[&str] = &["1:1", "16:9", "9:16"];
const DEFAULT_VEO_RATIO: &str = "16:9";

// 供应商服务所需要的参数
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub callback_url: Option<String>,
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

    /// 根据模型选择端点并构造请求体。纯函数，便于测试。
    pub fn task_request(&self, model: &str, input: &Value) -> (String, Value) {
        if !model.contains("veo") {
            // 常规模型走通用任务端点
            let mut body = json!({ "model": model, "input": input });
            if let Some(callback) = &self.config.callback_url {
                body["callBackUrl"] = json!(callback);
            }
            return (format!("{}/jobs/createTask", self.config.api_url), body);
        }

        // Veo端点只接受有限的宽高比
        let ratio = input["aspect_ratio"].as_str().unwrap_or(DEFAULT_VEO_RATIO);
        let ratio = if VALID_VEO_RATIOS.contains(&ratio) {
            ratio
        } else {
            tracing::warn!("Veo不支持宽高比{ratio}，回退为{DEFAULT_VEO_RATIO}");
            DEFAULT_VEO_RATIO
        };

        let image_urls = input["image_urls"].as_array().filter(|a| !a.is_empty());
        // 带参考图时固定切换到veo3_fast
        let model = if image_urls.is_some() { "veo3_fast" } else { model };

        let mut body = json!({
            "prompt": input["prompt"].as_str().unwrap_or(""),
            "model": model,
            "aspect_ratio": ratio,
            "enableTranslation": true,
        });
        if let Some(callback) = &self.config.callback_url {
            body["callBackUrl"] = json!(callback);
        }
        if let Some(urls) = image_urls {
            body["imageUrls"] = Value::Array(urls.clone());
            body["generationType"] = json!("REFERENCE_2_VIDEO");
        }
        (format!("{}/veo/generate", self.config.api_url), body)
    }

    /// 创建生成任务
    pub async fn create_task(&self, model: &str, input: &Value) -> Result<Relay, Error> {
        let (endpoint, body) = self.task_request(model, input);
        tracing::debug!("Creating kie.ai task with model {model}");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error(format!("发送供应商请求失败。{e}")))?;
        relay_from(response).await
    }

    /// 查询任务状态
    pub async fn status(&self, task_id: &str) -> Result<Relay, Error> {
        let url = format!("{}/jobs/recordInfo", self.config.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("taskId", task_id)])
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| Error(format!("发送供应商请求失败。{e}")))?;
        relay_from(response).await
    }
}

// 成功响应按JSON解析；失败响应保留原始文本以便排障。
async fn relay_from(response: reqwest::Response) -> Result<Relay, Error> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| Error(format!("接收供应商返回失败。{e}")))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(Relay { status, body })
}
