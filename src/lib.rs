pub mod accountant;
pub mod core;
pub mod curator;
pub mod limiter;
pub mod provider;
pub mod reception;
pub mod registry;
pub mod settings;
pub mod storage;

use accountant::Accountant;
use curator::Curator;
use limiter::Limiter;
use provider::{gemini, gommo, kie};
use reception::AppState;
use settings::Settings;

use axum::Router;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 服务配置，经envy从环境变量读取。
/// 供应商凭据均为可选：缺失的供应商对应的路由以配置错误响应。
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Configuration {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    pub bind_address: Option<String>,
    // Gommo视频供应商
    pub gommo_api_key: Option<String>,
    pub gommo_domain: Option<String>,
    pub gommo_api_url: Option<String>,
    // kie.ai供应商
    pub kie_api_key: Option<String>,
    pub kie_api_url: Option<String>,
    pub kie_callback_url: Option<String>,
    // Gemini供应商
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: Option<String>,
    // 模型档位的用量上限
    pub gemini_v2_limit: Option<u32>,
    pub gemini_v3_limit: Option<u32>,
    // 工具设置文件路径
    pub tool_settings_path: Option<String>,
}

fn default_database_url() -> String {
    "duky.sqlite3".to_string()
}

/// 组装完整服务：存储、各业务Agent、供应商与路由。
pub fn app(config: &Configuration) -> Result<Router, Box<dyn std::error::Error + Send + Sync>> {
    let storage = Arc::new(storage::Agent::new(&config.database_url)?);

    let settings = match &config.tool_settings_path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    let mut limits = HashMap::new();
    if let Some(limit) = config.gemini_v2_limit {
        limits.insert("v2".to_string(), limit);
    }
    if let Some(limit) = config.gemini_v3_limit {
        limits.insert("v3".to_string(), limit);
    }

    let gommo = match (&config.gommo_api_key, &config.gommo_domain) {
        (Some(api_key), Some(domain)) => Some(Arc::new(gommo::Agent::new(&gommo::Config {
            api_key: api_key.clone(),
            domain: domain.clone(),
            base_url: config
                .gommo_api_url
                .clone()
                .unwrap_or_else(|| gommo::DEFAULT_API_URL.to_string()),
        }))),
        _ => {
            tracing::warn!("Gommo凭据未配置，相关路由不可用");
            None
        }
    };

    let kie = config.kie_api_key.as_ref().map(|api_key| {
        Arc::new(kie::Agent::new(&kie::Config {
            api_key: api_key.clone(),
            api_url: config
                .kie_api_url
                .clone()
                .unwrap_or_else(|| kie::DEFAULT_API_URL.to_string()),
            callback_url: config.kie_callback_url.clone(),
        }))
    });

    let gemini = config.gemini_api_key.as_ref().map(|api_key| {
        Arc::new(gemini::Agent::new(&gemini::Config {
            api_key: api_key.clone(),
            api_url: config
                .gemini_api_url
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_API_URL.to_string()),
        }))
    });

    let state = AppState {
        accountant: Arc::new(Accountant::new(storage.clone())),
        curator: Arc::new(Curator::new(storage.clone())),
        limiter: Arc::new(Limiter::new(limits, storage)),
        settings: Arc::new(settings),
        gommo,
        kie,
        gemini,
    };

    Ok(reception::router(state).layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config() -> Configuration {
        Configuration {
            database_url: ":memory:".to_string(),
            ..Configuration::default()
        }
    }

    #[tokio::test]
    async fn app_starts_without_provider_credentials() {
        let app = app(&test_config()).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/data/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = app(&test_config()).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
