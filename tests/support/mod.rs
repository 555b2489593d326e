//! In-process stand-in for the study tracker backend.
//!
//! Tokens are issued as `T1, T2, ...` (access) and `R1, R2, ...` (refresh) in
//! order, so tests can assert on exact bearer values.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use study_client::{ClientConfig, HttpTransport, MemoryTokenStore, SessionManager};
use tokio::sync::Mutex;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

#[derive(Debug, Clone)]
pub struct MockUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub has_seen_wizard: bool,
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub users: HashMap<String, MockUser>,
    pub access_tokens: HashMap<String, String>,
    pub refresh_tokens: HashMap<String, String>,
    issued_access: u32,
    issued_refresh: u32,
    next_id: u32,
    pub login_calls: u32,
    pub me_calls: u32,
    pub refresh_calls: u32,
    pub wizard_calls: u32,
    pub fail_wizard: bool,
    /// Refresh still answers 200, but the access token it hands out is refused.
    pub refresh_issues_dead_tokens: bool,
    /// Bearer seen on every protected study call, in order.
    pub protected_bearers: Vec<Option<String>>,
    pub tasks: Vec<Value>,
    pub logs: Vec<Value>,
    pub timetable: Vec<Value>,
    pub last_query: HashMap<String, String>,
}

impl BackendState {
    fn issue_access(&mut self, user_id: &str) -> String {
        self.issued_access += 1;
        let token = format!("T{}", self.issued_access);
        self.access_tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn issue_refresh(&mut self, user_id: &str) -> String {
        self.issued_refresh += 1;
        let token = format!("R{}", self.issued_refresh);
        self.refresh_tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<String, Response> {
        bearer(headers)
            .and_then(|token| self.access_tokens.get(&token).cloned())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "msg": "Token has expired" })),
                )
                    .into_response()
            })
    }

    fn auth_body(&mut self, user: &MockUser) -> Value {
        let access = self.issue_access(&user.id);
        let refresh = self.issue_refresh(&user.id);
        json!({
            "user": user_json(user),
            "accessToken": access,
            "refreshToken": refresh,
        })
    }
}

type Shared = Arc<Mutex<BackendState>>;

pub struct MockBackend {
    pub base_url: String,
    pub state: Shared,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        Lazy::force(&TRACING);
        let state: Shared = Arc::new(Mutex::new(BackendState::default()));
        let app = Router::new().nest("/api", routes()).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend crashed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
        }
    }

    /// Mock backend with the scenario student `a@x.com` / `secret` (id `u1`).
    pub async fn with_student() -> Self {
        let backend = Self::spawn().await;
        backend
            .add_user(MockUser {
                id: "u1".to_string(),
                name: "A".to_string(),
                email: "a@x.com".to_string(),
                password: "secret".to_string(),
                role: "student".to_string(),
                has_seen_wizard: false,
            })
            .await;
        backend
    }

    pub async fn add_user(&self, user: MockUser) {
        self.state.lock().await.users.insert(user.email.clone(), user);
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .expect("mock backend url")
    }

    pub fn manager(&self, store: &MemoryTokenStore) -> SessionManager {
        let transport = HttpTransport::new(&self.config()).expect("http transport");
        SessionManager::new(Arc::new(transport), Arc::new(store.clone()))
    }

    /// Every issued access token stops being accepted.
    pub async fn expire_access_tokens(&self) {
        self.state.lock().await.access_tokens.clear();
    }

    pub async fn revoke_refresh_tokens(&self) {
        self.state.lock().await.refresh_tokens.clear();
    }

    pub async fn issue_dead_tokens_on_refresh(&self) {
        self.state.lock().await.refresh_issues_dead_tokens = true;
    }

    pub async fn fail_wizard(&self) {
        self.state.lock().await.fail_wizard = true;
    }

    pub async fn snapshot<T>(&self, read: impl FnOnce(&BackendState) -> T) -> T {
        read(&*self.state.lock().await)
    }
}

fn routes() -> Router<Shared> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/update-wizard", put(update_wizard))
        .route("/stats/:student_id", get(stats))
        .route("/timetable/:student_id", get(timetable))
        .route("/timetable/", post(save_slot).delete(reset_timetable))
        .route("/daily-tasks/", get(list_tasks).post(create_task))
        .route("/daily-tasks/:task_id", patch(toggle_task).delete(delete_task))
        .route("/logs/", post(create_log).delete(reset_logs))
        .route("/chat/ask", post(ask))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn user_json(user: &MockUser) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
        "hasSeenWizard": user.has_seen_wizard,
    })
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().await;
    state.login_calls += 1;
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Missing email or password");
    }
    let Some(user) = state.users.get(email).cloned() else {
        return message(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };
    if user.password != password {
        return message(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }
    let body = state.auth_body(&user);
    (StatusCode::OK, Json(body)).into_response()
}

async fn register(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().await;
    let email = body["email"].as_str().unwrap_or_default().to_string();
    if email.is_empty() || body["password"].as_str().unwrap_or_default().is_empty() {
        return message(StatusCode::BAD_REQUEST, "Missing email or password");
    }
    if state.users.contains_key(&email) {
        return message(StatusCode::BAD_REQUEST, "User already exists");
    }
    let user = MockUser {
        id: state.next_id("u"),
        name: body["name"].as_str().unwrap_or_default().to_string(),
        email: email.clone(),
        password: body["password"].as_str().unwrap_or_default().to_string(),
        role: body["role"].as_str().unwrap_or("student").to_string(),
        has_seen_wizard: false,
    };
    state.users.insert(email, user.clone());
    let body = state.auth_body(&user);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().await;
    state.me_calls += 1;
    let user_id = match state.authorize(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.users.values().find(|user| user.id == user_id) {
        Some(user) => Json(user_json(user)).into_response(),
        None => message(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn refresh(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().await;
    state.refresh_calls += 1;
    let token = body["refreshToken"].as_str().unwrap_or_default();
    let Some(user_id) = state.refresh_tokens.get(token).cloned() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "Token has been revoked" })),
        )
            .into_response();
    };
    let access = state.issue_access(&user_id);
    if state.refresh_issues_dead_tokens {
        state.access_tokens.remove(&access);
    }
    Json(json!({ "accessToken": access })).into_response()
}

async fn update_wizard(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    state.wizard_calls += 1;
    let user_id = match state.authorize(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if state.fail_wizard {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable");
    }
    let seen = body["hasSeenWizard"].as_bool().unwrap_or(false);
    if let Some(user) = state.users.values_mut().find(|user| user.id == user_id) {
        user.has_seen_wizard = seen;
    }
    message(StatusCode::OK, "Wizard status updated successfully")
}

/// Records the bearer and rejects stale tokens, like every `@jwt_required` route.
fn protected(state: &mut BackendState, headers: &HeaderMap) -> Result<String, Response> {
    state.protected_bearers.push(bearer(headers));
    state.authorize(headers)
}

async fn stats(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    state.last_query = query.clone();
    let period = query.get("period").cloned().unwrap_or_else(|| "weekly".to_string());
    let hours: f64 = state
        .logs
        .iter()
        .filter(|log| log["subjectId"] == "Math")
        .filter_map(|log| log["hoursSpent"].as_f64())
        .sum();
    Json(json!({
        "studentId": student_id,
        "period": period,
        "totalHours": hours,
        "plannedHours": 2.0,
        "subjectBreakdown": [{ "subjectId": "Math", "hours": hours, "planned": 2.0 }]
    }))
    .into_response()
}

async fn timetable(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    state.last_query = query;
    Json(Value::Array(state.timetable.clone())).into_response()
}

async fn save_slot(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    if body["studentId"].is_null() || body["subjectId"].is_null() || body["dayOfWeek"].is_null() {
        return message(StatusCode::BAD_REQUEST, "Missing fields");
    }
    let id = state.next_id("slot");
    let mut slot = body;
    slot["_id"] = json!(id);
    slot["actualHours"] = json!(0);
    state.timetable.push(slot);
    message(StatusCode::OK, "Timetable updated")
}

async fn reset_timetable(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    state.last_query = query;
    state.timetable.clear();
    message(StatusCode::OK, "Timetable reset successfully")
}

async fn list_tasks(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    let Some(date) = query.get("date").cloned() else {
        return message(StatusCode::BAD_REQUEST, "Date is required");
    };
    state.last_query = query;
    let tasks: Vec<Value> = state
        .tasks
        .iter()
        .filter(|task| task["date"] == date.as_str())
        .cloned()
        .collect();
    Json(Value::Array(tasks)).into_response()
}

async fn create_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    let id = state.next_id("task");
    state.tasks.push(json!({
        "_id": id,
        "studentId": body["studentId"],
        "title": body["title"],
        "date": body["date"],
        "isCompleted": false,
    }));
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Task created", "id": id })),
    )
        .into_response()
}

async fn toggle_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    match state.tasks.iter_mut().find(|task| task["_id"] == task_id.as_str()) {
        Some(task) => {
            let completed = !task["isCompleted"].as_bool().unwrap_or(false);
            task["isCompleted"] = json!(completed);
            Json(json!({ "message": "Task updated", "isCompleted": completed })).into_response()
        }
        None => message(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn delete_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    let before = state.tasks.len();
    state.tasks.retain(|task| task["_id"] != task_id.as_str());
    if state.tasks.len() == before {
        return message(StatusCode::NOT_FOUND, "Task not found");
    }
    message(StatusCode::OK, "Task deleted")
}

async fn create_log(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    let id = state.next_id("log");
    state.logs.push(body);
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Log created", "id": id })),
    )
        .into_response()
}

async fn reset_logs(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    state.last_query = query;
    let count = state.logs.len();
    state.logs.clear();
    message(StatusCode::OK, &format!("Deleted {count} logs and reset usage."))
}

async fn ask(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = protected(&mut state, &headers) {
        return response;
    }
    let question = body["message"].as_str().unwrap_or_default();
    Json(json!({ "response": format!("Keep going! You asked: {question}") })).into_response()
}
