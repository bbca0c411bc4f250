use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Scope the service appends to every key it creates.
pub const IMPLICIT_SCOPE: &str = "sender_verification_eligible";
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub api_key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub name: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyInput {
    pub name: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub generation: String,
    pub updated_at: String,
    #[serde(default)]
    pub versions: Vec<TemplateVersion>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateInput {
    pub name: Option<String>,
    pub generation: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: String,
    pub template_id: String,
    pub active: u8,
    pub name: String,
    pub html_content: String,
    pub plain_content: String,
    pub generate_plain_content: bool,
    pub subject: String,
    pub editor: String,
    pub test_data: String,
    pub updated_at: String,
    pub thumbnail_url: String,
}

/// Version fields a client may send. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateVersionInput {
    pub active: Option<u8>,
    pub name: Option<String>,
    pub html_content: Option<String>,
    pub plain_content: Option<String>,
    pub generate_plain_content: Option<bool>,
    pub subject: Option<String>,
    pub editor: Option<String>,
    pub test_data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page_size: Option<usize>,
    pub generations: Option<String>,
}

#[derive(Debug, Default)]
struct Store {
    api_keys: Vec<ApiKey>,
    templates: Vec<Template>,
    versions: Vec<TemplateVersion>,
}

impl Store {
    fn template_with_versions(&self, template: &Template) -> Template {
        let mut template = template.clone();
        template.versions = self
            .versions
            .iter()
            .filter(|v| v.template_id == template.id)
            .cloned()
            .collect();
        template
    }
}

/// Shared server state. Cloning shares the store and the throttle counter.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
    throttle: Arc<AtomicU32>,
}

impl AppState {
    /// State whose next `n` requests are answered with 429.
    pub fn throttled(n: u32) -> Self {
        let state = Self::default();
        state.throttle_next(n);
        state
    }

    pub fn throttle_next(&self, n: u32) {
        self.throttle.store(n, Ordering::SeqCst);
    }

    pub fn pending_throttles(&self) -> u32 {
        self.throttle.load(Ordering::SeqCst)
    }
}

/// JSON error body in the provider's `{"errors": [...]}` shape.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("unable to find {what}"))
    }

    fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = json!({ "errors": [{ "field": null, "message": self.message }] });
        (self.status, Json(body)).into_response()
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api_keys", get(list_api_keys).post(create_api_key))
        .route(
            "/api_keys/{id}",
            get(get_api_key)
                .put(replace_api_key)
                .patch(rename_api_key)
                .delete(delete_api_key),
        )
        .route("/templates", get(list_templates).post(create_template))
        .route(
            "/templates/{id}",
            get(get_template).patch(update_template).delete(delete_template),
        )
        .route("/templates/{id}/versions", post(create_version))
        .route(
            "/templates/{id}/versions/{version_id}",
            get(get_version).patch(update_version).delete(delete_version),
        )
        .layer(middleware::from_fn_with_state(state.clone(), throttle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let throttled = state
        .throttle
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if throttled {
        tracing::debug!(path = %request.uri(), "throttling request");
        return Failure::new(StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response();
    }
    next.run(request).await
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn required(value: Option<String>, message: &str) -> Result<String, Failure> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Failure::bad_request(message))
}

// --- API keys ---

async fn list_api_keys(State(state): State<AppState>) -> Json<Vec<ApiKey>> {
    let store = state.store.read().await;
    Json(store.api_keys.clone())
}

async fn create_api_key(
    State(state): State<AppState>,
    Json(input): Json<ApiKeyInput>,
) -> Result<(StatusCode, Json<ApiKey>), Failure> {
    let name = required(input.name, "name is required")?;
    let mut scopes = input.scopes;
    if !scopes.iter().any(|s| s == IMPLICIT_SCOPE) {
        scopes.push(IMPLICIT_SCOPE.to_string());
    }
    let key = ApiKey {
        api_key_id: Uuid::new_v4().simple().to_string(),
        api_key: None,
        name,
        scopes,
    };
    state.store.write().await.api_keys.push(key.clone());

    let created = ApiKey {
        api_key: Some(format!("SG.{}", Uuid::new_v4().simple())),
        ..key
    };
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiKey>, Failure> {
    let store = state.store.read().await;
    store
        .api_keys
        .iter()
        .find(|k| k.api_key_id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| Failure::not_found("API key"))
}

async fn replace_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ApiKeyInput>,
) -> Result<Json<ApiKey>, Failure> {
    let mut store = state.store.write().await;
    let key = store
        .api_keys
        .iter_mut()
        .find(|k| k.api_key_id == id)
        .ok_or_else(|| Failure::not_found("API key"))?;
    if let Some(name) = input.name.filter(|n| !n.is_empty()) {
        key.name = name;
    }
    key.scopes = input.scopes;
    if !key.scopes.iter().any(|s| s == IMPLICIT_SCOPE) {
        key.scopes.push(IMPLICIT_SCOPE.to_string());
    }
    Ok(Json(key.clone()))
}

async fn rename_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ApiKeyInput>,
) -> Result<Json<ApiKey>, Failure> {
    let mut store = state.store.write().await;
    let key = store
        .api_keys
        .iter_mut()
        .find(|k| k.api_key_id == id)
        .ok_or_else(|| Failure::not_found("API key"))?;
    if let Some(name) = input.name.filter(|n| !n.is_empty()) {
        key.name = name;
    }
    Ok(Json(key.clone()))
}

async fn delete_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Failure> {
    let mut store = state.store.write().await;
    let before = store.api_keys.len();
    store.api_keys.retain(|k| k.api_key_id != id);
    if store.api_keys.len() == before {
        return Err(Failure::not_found("API key"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- templates ---

async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, Failure> {
    let page_size = query.page_size.unwrap_or(MAX_PAGE_SIZE);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(Failure::bad_request("page_size must be between 1 and 200"));
    }
    let generations = query.generations.unwrap_or_else(|| "legacy".to_string());
    let wanted: Vec<&str> = generations.split(',').map(str::trim).collect();

    let store = state.store.read().await;
    let result: Vec<Template> = store
        .templates
        .iter()
        .filter(|t| wanted.contains(&t.generation.as_str()))
        .take(page_size)
        .map(|t| store.template_with_versions(t))
        .collect();
    Ok(Json(json!({ "result": result })))
}

async fn create_template(
    State(state): State<AppState>,
    Json(input): Json<TemplateInput>,
) -> Result<(StatusCode, Json<Template>), Failure> {
    let name = required(input.name, "name is required")?;
    let generation = input.generation.unwrap_or_else(|| "legacy".to_string());
    let id = match generation.as_str() {
        "dynamic" => format!("d-{}", Uuid::new_v4().simple()),
        "legacy" => Uuid::new_v4().to_string(),
        _ => return Err(Failure::bad_request("generation must be dynamic or legacy")),
    };
    let template = Template {
        id,
        name,
        generation,
        updated_at: now(),
        versions: Vec::new(),
    };
    state.store.write().await.templates.push(template.clone());
    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, Failure> {
    let store = state.store.read().await;
    store
        .templates
        .iter()
        .find(|t| t.id == id)
        .map(|t| Json(store.template_with_versions(t)))
        .ok_or_else(|| Failure::not_found("template"))
}

async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<TemplateInput>,
) -> Result<Json<Template>, Failure> {
    let name = required(input.name, "name is required")?;
    let mut store = state.store.write().await;
    let template = store
        .templates
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| Failure::not_found("template"))?;
    template.name = name;
    template.updated_at = now();
    let template = template.clone();
    Ok(Json(store.template_with_versions(&template)))
}

async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Failure> {
    let mut store = state.store.write().await;
    let before = store.templates.len();
    store.templates.retain(|t| t.id != id);
    if store.templates.len() == before {
        return Err(Failure::not_found("template"));
    }
    store.versions.retain(|v| v.template_id != id);
    Ok(StatusCode::NO_CONTENT)
}

// --- template versions ---

/// Crude tag stripper used when plain content is generated from HTML.
fn plain_from_html(html: &str) -> String {
    let mut plain = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => plain.push(c),
            _ => {}
        }
    }
    plain
}

fn apply(version: &mut TemplateVersion, input: TemplateVersionInput) {
    if let Some(active) = input.active {
        version.active = active;
    }
    if let Some(name) = input.name {
        version.name = name;
    }
    if let Some(html) = input.html_content {
        version.html_content = html;
    }
    if let Some(plain) = input.plain_content {
        version.plain_content = plain;
    }
    if let Some(generate) = input.generate_plain_content {
        version.generate_plain_content = generate;
    }
    if let Some(subject) = input.subject {
        version.subject = subject;
    }
    if let Some(editor) = input.editor {
        version.editor = editor;
    }
    if let Some(test_data) = input.test_data {
        version.test_data = test_data;
    }
    if version.generate_plain_content {
        version.plain_content = plain_from_html(&version.html_content);
    }
    version.updated_at = now();
}

fn activate(store: &mut Store, template_id: &str, id: &str) {
    for other in store
        .versions
        .iter_mut()
        .filter(|v| v.template_id == template_id && v.id != id)
    {
        other.active = 0;
    }
}

async fn create_version(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    Json(input): Json<TemplateVersionInput>,
) -> Result<(StatusCode, Json<TemplateVersion>), Failure> {
    let mut store = state.store.write().await;
    if !store.templates.iter().any(|t| t.id == template_id) {
        return Err(Failure::not_found("template"));
    }
    if input.name.as_deref().unwrap_or_default().is_empty() {
        return Err(Failure::bad_request("name is required"));
    }
    if input.subject.as_deref().unwrap_or_default().is_empty() {
        return Err(Failure::bad_request("subject is required"));
    }

    let id = Uuid::new_v4().to_string();
    let mut version = TemplateVersion {
        thumbnail_url: format!("//thumbnails.localhost/{id}.png"),
        id,
        template_id: template_id.clone(),
        editor: "code".to_string(),
        ..Default::default()
    };
    apply(&mut version, input);
    if version.active == 1 {
        activate(&mut store, &template_id, &version.id);
    }
    store.versions.push(version.clone());
    Ok((StatusCode::CREATED, Json(version)))
}

async fn get_version(
    State(state): State<AppState>,
    Path((template_id, id)): Path<(String, String)>,
) -> Result<Json<TemplateVersion>, Failure> {
    let store = state.store.read().await;
    store
        .versions
        .iter()
        .find(|v| v.template_id == template_id && v.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| Failure::not_found("template version"))
}

async fn update_version(
    State(state): State<AppState>,
    Path((template_id, id)): Path<(String, String)>,
    Json(input): Json<TemplateVersionInput>,
) -> Result<Json<TemplateVersion>, Failure> {
    let mut store = state.store.write().await;
    let version = store
        .versions
        .iter_mut()
        .find(|v| v.template_id == template_id && v.id == id)
        .ok_or_else(|| Failure::not_found("template version"))?;
    apply(version, input);
    let version = version.clone();
    if version.active == 1 {
        activate(&mut store, &template_id, &id);
    }
    Ok(Json(version))
}

async fn delete_version(
    State(state): State<AppState>,
    Path((template_id, id)): Path<(String, String)>,
) -> Result<StatusCode, Failure> {
    let mut store = state.store.write().await;
    let before = store.versions.len();
    store
        .versions
        .retain(|v| !(v.template_id == template_id && v.id == id));
    if store.versions.len() == before {
        return Err(Failure::not_found("template version"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_omits_secret_unless_set() {
        let key = ApiKey {
            api_key_id: "k1".to_string(),
            api_key: None,
            name: "ci".to_string(),
            scopes: vec!["mail.send".to_string()],
        };
        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["scopes"][0], "mail.send");
    }

    #[test]
    fn api_key_input_scopes_default_to_empty() {
        let input: ApiKeyInput = serde_json::from_str(r#"{"name":"ci"}"#).unwrap();
        assert_eq!(input.name.as_deref(), Some("ci"));
        assert!(input.scopes.is_empty());
    }

    #[test]
    fn version_input_all_fields_optional() {
        let input: TemplateVersionInput = serde_json::from_str("{}").unwrap();
        assert!(input.name.is_none());
        assert!(input.active.is_none());
    }

    #[test]
    fn plain_content_strips_tags() {
        assert_eq!(plain_from_html("<p>Hello <b>you</b></p>"), "Hello you");
    }

    #[test]
    fn apply_generates_plain_content() {
        let mut version = TemplateVersion::default();
        apply(
            &mut version,
            TemplateVersionInput {
                html_content: Some("<h1>Hi</h1>".to_string()),
                generate_plain_content: Some(true),
                ..Default::default()
            },
        );
        assert_eq!(version.plain_content, "Hi");
        assert!(!version.updated_at.is_empty());
    }

    #[test]
    fn throttle_counter_is_shared_between_clones() {
        let state = AppState::throttled(2);
        let clone = state.clone();
        clone.throttle_next(5);
        assert_eq!(state.pending_throttles(), 5);
    }
}
