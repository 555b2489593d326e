use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Parent,
    Teacher,
    Admin,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated identity of this client instance.
///
/// Tokens are kept alongside the profile so callers can inspect what the
/// manager is sending, but they are never serialized and are redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
    pub has_seen_onboarding: bool,
}

impl Session {
    pub fn from_user(user: UserPayload, access_token: String, refresh_token: String) -> Self {
        Self {
            user_id: user.id,
            display_name: user.name,
            email: user.email,
            role: user.role,
            access_token,
            refresh_token,
            has_seen_onboarding: user.has_seen_wizard,
        }
    }

    /// Merges the present fields of `patch`; absent fields keep their value.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(seen) = patch.has_seen_onboarding {
            self.has_seen_onboarding = seen;
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("has_seen_onboarding", &self.has_seen_onboarding)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub has_seen_onboarding: Option<bool>,
}

impl SessionPatch {
    pub fn onboarding_seen() -> Self {
        Self {
            has_seen_onboarding: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub has_seen_wizard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserPayload,
}

/// `/auth/me` answers with the bare user; older deployments wrap it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MeResponse {
    Wrapped { user: UserPayload },
    Bare(UserPayload),
}

impl MeResponse {
    pub fn into_user(self) -> UserPayload {
        match self {
            MeResponse::Wrapped { user } => user,
            MeResponse::Bare(user) => user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfile {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardStatusRequest {
    pub has_seen_wizard: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub day_of_week: u8,
    pub subject_id: String,
    #[serde(default)]
    pub planned_hours: f64,
    #[serde(default)]
    pub actual_hours: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlotInput {
    pub subject_id: String,
    pub day_of_week: u8,
    pub planned_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyLogInput {
    pub subject_id: String,
    pub date: NaiveDate,
    pub hours_spent: f64,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Daily,
    #[default]
    Weekly,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Daily => "daily",
            StatsPeriod::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectBreakdown {
    pub subject_id: String,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub planned: f64,
}

impl SubjectBreakdown {
    /// True when adding `extra_hours` would push the subject past its plan.
    pub fn exceeds_plan(&self, extra_hours: f64) -> bool {
        self.planned > 0.0 && self.hours + extra_hours > self.planned
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    pub student_id: String,
    pub period: StatsPeriod,
    #[serde(default)]
    pub total_hours: f64,
    #[serde(default)]
    pub planned_hours: f64,
    #[serde(default)]
    pub subject_breakdown: Vec<SubjectBreakdown>,
}

impl StudyStats {
    pub fn subject(&self, subject_id: &str) -> Option<&SubjectBreakdown> {
        self.subject_breakdown
            .iter()
            .find(|entry| entry.subject_id.eq_ignore_ascii_case(subject_id))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub is_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}
