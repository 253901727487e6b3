//! Reception负责全部HTTP入口：参数校验、凭据检查、请求转发与错误包装。
//! 错误处理策略统一为：在路由边界捕获、记录日志、返回JSON错误。
use crate::accountant::{self, Accountant};
use crate::curator::{self, Curator};
use crate::limiter::Limiter;
use crate::provider::{gemini, gommo, kie, Relay};
use crate::registry;
use crate::settings::Settings;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// 各路由共享的应用状态。
/// 供应商凭据缺失时对应槽位为None，相关路由直接以配置错误收场。
#[derive(Clone)]
pub struct AppState {
    pub accountant: Arc<Accountant>,
    pub curator: Arc<Curator>,
    pub limiter: Arc<Limiter>,
    pub settings: Arc<Settings>,
    pub gommo: Option<Arc<gommo::Agent>>,
    pub kie: Option<Arc<kie::Agent>>,
    pub gemini: Option<Arc<gemini::Agent>>,
}

/// 路由边界的错误包装。状态码与响应体一并携带。
/// 不同路由族保留各自的信封字段（message/error），与既有客户端兼容。
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    // 缺少请求参数，数据路由信封
    fn missing(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": msg }),
        }
    }

    // 缺少请求参数，代理路由信封
    fn proxy_missing(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "message": msg }),
        }
    }

    // 服务端凭据未配置。宁可立即失败，不做任何出站调用。
    fn config(body: Value) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body,
        }
    }

    // 供应商的非成功响应：状态码原样转发
    fn upstream(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    fn not_found(body: Value) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body,
        }
    }

    fn forbidden(msg: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: json!({ "error": msg }),
        }
    }

    fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!("{context}：{err}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "message": "Internal Server Error", "error": err.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<accountant::Error> for ApiError {
    fn from(value: accountant::Error) -> Self {
        match value {
            accountant::Error::NotFound => Self::not_found(json!({ "error": "User not found" })),
            accountant::Error::Insufficient(credits) => Self {
                status: StatusCode::BAD_REQUEST,
                body: json!({ "error": "Insufficient credits", "credits": credits }),
            },
            accountant::Error::InvalidAmount => Self::missing("Invalid amount"),
            accountant::Error::Forbidden => Self::forbidden("Forbidden"),
            accountant::Error::Internal(e) => Self::internal("账户操作失败", e),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/proxy/models", get(list_models))
        .route("/api/proxy/video/create", post(create_video))
        .route("/api/proxy/video/status", get(video_status))
        .route("/api/proxy/kie/createTask", post(kie_create_task))
        .route("/api/proxy/kie/status", get(kie_status))
        .route("/api/gemini/generate-image", post(gemini_generate))
        .route("/api/guest/gallery", get(guest_gallery).post(guest_gallery_append))
        .route("/api/guest/credits", get(guest_credits).post(guest_credits_adjust))
        .route("/api/user/credits", get(user_credits).post(user_credits_grant))
        .route("/api/history", get(user_history).post(log_generation))
        .route("/api/gallery/share", post(share_image))
        .route("/api/payments/check", get(check_payment))
        .route("/api/usage", get(usage).post(usage_update))
        .route("/api/data/tools", get(list_tools))
        .with_state(state)
}

// ---------- 生成代理 ----------

fn upstream_status(relay: &Relay) -> StatusCode {
    StatusCode::from_u16(relay.status).unwrap_or(StatusCode::BAD_GATEWAY)
}

// Gommo的非成功响应转发：状态码不变，附上原始载荷便于排障
fn relay_gommo(relay: Relay) -> Result<Json<Value>, ApiError> {
    if relay.is_success() {
        return Ok(Json(relay.body));
    }
    let status = upstream_status(&relay);
    let message = relay.body["message"]
        .as_str()
        .unwrap_or("Error from Gommo API")
        .to_string();
    Err(ApiError::upstream(
        status,
        json!({ "message": message, "error": relay.body }),
    ))
}

fn relay_kie(relay: Relay) -> Result<Json<Value>, ApiError> {
    if relay.is_success() {
        return Ok(Json(relay.body));
    }
    let status = upstream_status(&relay);
    let reason = status.canonical_reason().unwrap_or("request failed");
    Err(ApiError::upstream(
        status,
        json!({ "error": format!("kie.ai API error: {reason}"), "details": relay.body }),
    ))
}

fn gommo_agent(state: &AppState) -> Result<&gommo::Agent, ApiError> {
    state.gommo.as_deref().ok_or_else(|| {
        ApiError::config(json!({
            "message": "Server configuration error: Missing Gommo credentials"
        }))
    })
}

fn kie_agent(state: &AppState) -> Result<&kie::Agent, ApiError> {
    state
        .kie
        .as_deref()
        .ok_or_else(|| ApiError::config(json!({ "error": "KIE_API_KEY not configured" })))
}

#[derive(Deserialize)]
struct ModelsParams {
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn list_models(
    State(state): State<AppState>,
    Query(params): Query<ModelsParams>,
) -> Result<Json<Value>, ApiError> {
    let agent = gommo_agent(&state)?;
    let kind = params.kind.as_deref().unwrap_or("video");
    let relay = agent
        .list_models(kind)
        .await
        .map_err(|e| ApiError::internal("Proxy Error (List Models)", e))?;
    relay_gommo(relay)
}

async fn create_video(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let agent = gommo_agent(&state)?;
    let relay = agent
        .create_video(&payload)
        .await
        .map_err(|e| ApiError::internal("Proxy Error (Create Video)", e))?;
    relay_gommo(relay)
}

#[derive(Deserialize)]
struct VideoStatusParams {
    process_id: Option<String>,
}

async fn video_status(
    State(state): State<AppState>,
    Query(params): Query<VideoStatusParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(process_id) = params.process_id else {
        return Err(ApiError::proxy_missing("Missing process_id"));
    };
    let agent = gommo_agent(&state)?;
    let relay = agent
        .video_status(&process_id)
        .await
        .map_err(|e| ApiError::internal("Proxy Error (Check Status)", e))?;
    relay_gommo(relay)
}

#[derive(Deserialize)]
struct KieTaskBody {
    model: Option<String>,
    #[serde(default)]
    input: Value,
}

async fn kie_create_task(
    State(state): State<AppState>,
    Json(body): Json<KieTaskBody>,
) -> Result<Json<Value>, ApiError> {
    let agent = kie_agent(&state)?;
    let Some(model) = body.model else {
        return Err(ApiError::missing("model is required"));
    };
    let relay = agent
        .create_task(&model, &body.input)
        .await
        .map_err(|e| ApiError::internal("[kie.ai] API error", e))?;
    relay_kie(relay)
}

#[derive(Deserialize)]
struct KieStatusParams {
    task_id: Option<String>,
}

async fn kie_status(
    State(state): State<AppState>,
    Query(params): Query<KieStatusParams>,
) -> Result<Json<Value>, ApiError> {
    let agent = kie_agent(&state)?;
    let Some(task_id) = params.task_id else {
        return Err(ApiError::missing("task_id is required"));
    };
    tracing::debug!("Checking kie.ai status for task {task_id}");
    let relay = agent
        .status(&task_id)
        .await
        .map_err(|e| ApiError::internal("[kie.ai] Status check error", e))?;
    relay_kie(relay)
}

#[derive(Deserialize)]
struct GeminiBody {
    parts: Value,
    model: Option<String>,
    config: Option<Value>,
}

async fn gemini_generate(
    State(state): State<AppState>,
    Json(body): Json<GeminiBody>,
) -> Result<Json<Value>, ApiError> {
    let agent = state.gemini.as_deref().ok_or_else(|| {
        ApiError::config(json!({ "error": "API Key not configured on server" }))
    })?;
    let relay = agent
        .generate_content(body.model.as_deref(), &body.parts, body.config.as_ref())
        .await
        .map_err(|e| ApiError::internal("Server-side Gemini generation error", e))?;
    if relay.is_success() {
        Ok(Json(relay.body))
    } else {
        let status = upstream_status(&relay);
        Err(ApiError::upstream(status, relay.body))
    }
}

// ---------- 访客画廊与余额 ----------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestParams {
    guest_id: Option<String>,
}

// 画廊内容在两次轮询之间可能变化，显式禁用缓存。
fn no_store(body: Value) -> impl IntoResponse {
    (
        [
            (header::CACHE_CONTROL, NO_STORE),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
}

async fn guest_gallery(
    State(state): State<AppState>,
    Query(params): Query<GuestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(guest_id) = params.guest_id else {
        return Err(ApiError::missing("Guest ID is required"));
    };
    let gallery = state
        .curator
        .guest_gallery(&guest_id)
        .map_err(|e| ApiError::internal("读取访客画廊失败", e))?;
    Ok(no_store(json!({ "gallery": gallery })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestGalleryAppendBody {
    guest_id: Option<String>,
    images: Option<Vec<String>>,
}

async fn guest_gallery_append(
    State(state): State<AppState>,
    Json(body): Json<GuestGalleryAppendBody>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(guest_id) = body.guest_id else {
        return Err(ApiError::missing("Guest ID required"));
    };
    let images = match body.images {
        Some(images) if !images.is_empty() => images,
        _ => return Err(ApiError::missing("Images array required")),
    };
    let count = state
        .curator
        .append_guest_images(&guest_id, &images)
        .map_err(|e| ApiError::internal("写入访客画廊失败", e))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "count": count })),
    ))
}

async fn guest_credits(
    State(state): State<AppState>,
    Query(params): Query<GuestParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(guest_id) = params.guest_id else {
        return Err(ApiError::missing("Guest ID is required"));
    };
    let credits = state.accountant.guest_credits(&guest_id)?;
    Ok(Json(json!({ "credits": credits })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestCreditsBody {
    guest_id: Option<String>,
    delta: Option<i32>,
}

async fn guest_credits_adjust(
    State(state): State<AppState>,
    Json(body): Json<GuestCreditsBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(guest_id) = body.guest_id else {
        return Err(ApiError::missing("Guest ID required"));
    };
    let Some(delta) = body.delta else {
        return Err(ApiError::missing("delta is required"));
    };
    let credits = state.accountant.adjust_guest(&guest_id, delta)?;
    Ok(Json(json!({ "success": true, "credits": credits })))
}

// ---------- 注册用户余额 ----------

#[derive(Deserialize)]
struct UserParams {
    email: Option<String>,
}

async fn user_credits(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(email) = params.email else {
        return Err(ApiError::missing("email is required"));
    };
    let credits = state.accountant.user_credits(&email)?;
    Ok(Json(json!({ "credits": credits })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantBody {
    email: Option<String>,
    target_email: Option<String>,
    amount: Option<i32>,
}

async fn user_credits_grant(
    State(state): State<AppState>,
    Json(body): Json<GrantBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(email) = body.email else {
        return Err(ApiError::missing("email is required"));
    };
    let Some(amount) = body.amount else {
        return Err(ApiError::missing("Invalid amount"));
    };
    let credits =
        state
            .accountant
            .grant_user(&email, body.target_email.as_deref(), amount)?;
    Ok(Json(json!({ "success": true, "credits": credits, "added": amount })))
}

// ---------- 生成历史 ----------

async fn user_history(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(email) = params.email else {
        return Err(ApiError::missing("email is required"));
    };
    let records = state
        .curator
        .user_gallery(&email)
        .map_err(|e| ApiError::internal("读取用户画廊失败", e))?;
    Ok(no_store(json!(records)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogGenerationBody {
    email: Option<String>,
    guest_id: Option<String>,
    tool_key: Option<String>,
    #[serde(default)]
    input_prompt: String,
    output_images: Option<Vec<String>>,
}

async fn log_generation(
    State(state): State<AppState>,
    Json(body): Json<LogGenerationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = match (&body.email, &body.guest_id) {
        (Some(email), _) => crate::core::Owner::User(email.clone()),
        (None, Some(guest_id)) => crate::core::Owner::Guest(guest_id.clone()),
        (None, None) => return Err(ApiError::missing("email or guestId is required")),
    };
    let Some(tool_key) = body.tool_key else {
        return Err(ApiError::missing("toolKey is required"));
    };
    let images = match body.output_images {
        Some(images) if !images.is_empty() => images,
        _ => return Err(ApiError::missing("outputImages array required")),
    };
    let history_id = state
        .curator
        .log_generation(&owner, &tool_key, &body.input_prompt, &images)
        .map_err(|e| ApiError::internal("写入生成记录失败", e))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "historyId": history_id })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareBody {
    history_id: Option<String>,
    image_url: Option<String>,
    share: Option<bool>,
}

async fn share_image(
    State(state): State<AppState>,
    Json(body): Json<ShareBody>,
) -> Result<Json<Value>, ApiError> {
    if body.history_id.is_none() && body.image_url.is_none() {
        return Err(ApiError::missing("Missing historyId or imageUrl"));
    }
    let share = body.share.unwrap_or(true);
    match state
        .curator
        .share(body.history_id.as_deref(), body.image_url.as_deref(), share)
    {
        Ok(updated_id) => Ok(Json(json!({ "success": true, "updatedId": updated_id }))),
        Err(curator::Error::NotFound) => Err(ApiError::not_found(
            json!({ "message": "Record not found", "updated": false }),
        )),
        Err(e) => Err(ApiError::internal("更新共享标记失败", e)),
    }
}

// ---------- 支付 ----------

#[derive(Deserialize)]
struct PaymentParams {
    order_id: Option<String>,
}

async fn check_payment(
    State(state): State<AppState>,
    Query(params): Query<PaymentParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(order_id) = params.order_id else {
        return Err(ApiError::missing("Missing order_id"));
    };
    match state.accountant.check_payment(&order_id) {
        Ok(tx) => Ok(Json(json!({
            "success": true,
            "status": tx.status,
            "amount": tx.amount,
            "credits": tx.credits,
            "created_at": tx.created_at,
            "completed_at": tx.completed_at,
        }))),
        Err(accountant::Error::NotFound) => Err(ApiError::not_found(
            json!({ "success": false, "error": "Transaction not found" }),
        )),
        Err(e) => Err(ApiError::internal("查询支付交易失败", e)),
    }
}

// ---------- 用量计数 ----------

#[derive(Deserialize)]
struct UsageParams {
    tier: Option<String>,
}

async fn usage(
    State(state): State<AppState>,
    Query(params): Query<UsageParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(tier) = params.tier else {
        return Err(ApiError::missing("tier is required"));
    };
    let used = state
        .limiter
        .used(&tier)
        .map_err(|e| ApiError::internal("读取用量计数失败", e))?;
    Ok(Json(json!({
        "tier": tier,
        "used": used,
        "limit": state.limiter.limit(&tier),
        "remaining": state.limiter.limit(&tier).saturating_sub(used),
    })))
}

#[derive(Deserialize)]
struct UsageUpdateBody {
    tier: Option<String>,
    action: Option<String>,
}

// 计数仅作提示用途，客户端在成功生成后上报
async fn usage_update(
    State(state): State<AppState>,
    Json(body): Json<UsageUpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(tier) = body.tier else {
        return Err(ApiError::missing("tier is required"));
    };
    let result = match body.action.as_deref().unwrap_or("increment") {
        "increment" => state.limiter.increment(&tier),
        "reset" => state.limiter.reset(&tier),
        other => return Err(ApiError::missing(&format!("Unknown action: {other}"))),
    };
    result.map_err(|e| ApiError::internal("更新用量计数失败", e))?;
    let used = state
        .limiter
        .used(&tier)
        .map_err(|e| ApiError::internal("读取用量计数失败", e))?;
    Ok(Json(json!({ "success": true, "tier": tier, "used": used })))
}

// ---------- 工具数据 ----------

/// 页面组合层消费的工具目录：静态注册表 + 各工具的设置切片
async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = registry::TOOLS
        .iter()
        .map(|spec| {
            json!({
                "id": spec.id,
                "titleKey": spec.title_key,
                "descriptionKey": spec.description_key,
                "uploaderCaptionKey": spec.uploader_caption_key,
                "minIdeas": spec.min_ideas,
                "maxIdeas": spec.max_ideas,
                "settings": state.settings.slice(spec.id),
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}
