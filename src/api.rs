//! Typed study-tracking calls. Every call goes through the session manager's
//! decorator and is made on behalf of the signed-in student.

use crate::errors::{ClientError, Result};
use crate::models::{
    ChatRequest, ChatResponse, CreatedResponse, DailyTask, StatsPeriod, StudyLogInput, StudyStats,
    TimetableSlot, TimetableSlotInput, ToggleResponse,
};
use crate::session::SessionManager;
use crate::transport::ApiRequest;
use crate::week::date_key;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

pub const STOPWATCH_NOTE: &str = "Auto-logged via stopwatch";

#[derive(Clone)]
pub struct StudyApi {
    session: SessionManager,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentScoped<'a, T: Serialize> {
    student_id: &'a str,
    #[serde(flatten)]
    inner: T,
}

#[derive(Serialize)]
struct NewTask<'a> {
    title: &'a str,
    date: NaiveDate,
}

impl StudyApi {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn student_id(&self) -> Result<String> {
        self.session
            .current()
            .map(|session| session.user_id)
            .ok_or(ClientError::NotSignedIn)
    }

    /// Planned and logged hours for the week containing `week_of` (today when
    /// `None`).
    pub async fn timetable(&self, week_of: Option<NaiveDate>) -> Result<Vec<TimetableSlot>> {
        let student_id = self.student_id()?;
        let mut request =
            ApiRequest::get(format!("/timetable/{}", path_segment("student id", &student_id)?));
        if let Some(date) = week_of {
            request = request.query("date", date_key(date));
        }
        self.session.send_json(request).await
    }

    pub async fn save_timetable_slot(&self, slot: &TimetableSlotInput) -> Result<()> {
        if !(0..=6).contains(&slot.day_of_week) {
            return Err(ClientError::invalid_input("day of week must be between 0 (Monday) and 6 (Sunday)"));
        }
        validate_hours(slot.planned_hours, true)?;
        let student_id = self.student_id()?;
        let request = ApiRequest::post("/timetable/").json(&StudentScoped {
            student_id: &student_id,
            inner: slot,
        })?;
        self.session.send(request).await?;
        Ok(())
    }

    pub async fn reset_timetable(&self) -> Result<()> {
        let student_id = self.student_id()?;
        self.session
            .send(ApiRequest::delete("/timetable/").query("studentId", student_id))
            .await?;
        info!("timetable reset");
        Ok(())
    }

    pub async fn daily_tasks(&self, date: NaiveDate) -> Result<Vec<DailyTask>> {
        let student_id = self.student_id()?;
        let request = ApiRequest::get("/daily-tasks/")
            .query("studentId", student_id)
            .query("date", date_key(date));
        self.session.send_json(request).await
    }

    /// Returns the new task id.
    pub async fn add_daily_task(&self, title: &str, date: NaiveDate) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::invalid_input("task title must not be empty"));
        }
        let student_id = self.student_id()?;
        let request = ApiRequest::post("/daily-tasks/").json(&StudentScoped {
            student_id: &student_id,
            inner: NewTask { title, date },
        })?;
        let created: CreatedResponse = self.session.send_json(request).await?;
        Ok(created.id)
    }

    /// Flips completion; returns the new state.
    pub async fn toggle_daily_task(&self, task_id: &str) -> Result<bool> {
        let task_id = path_segment("task id", task_id)?;
        self.student_id()?;
        let toggled: ToggleResponse = self
            .session
            .send_json(ApiRequest::patch(format!("/daily-tasks/{task_id}")))
            .await?;
        Ok(toggled.is_completed)
    }

    pub async fn delete_daily_task(&self, task_id: &str) -> Result<()> {
        let task_id = path_segment("task id", task_id)?;
        self.student_id()?;
        self.session
            .send(ApiRequest::delete(format!("/daily-tasks/{task_id}")))
            .await?;
        Ok(())
    }

    /// Returns the new log id.
    pub async fn log_study(&self, log: &StudyLogInput) -> Result<String> {
        if log.subject_id.trim().is_empty() {
            return Err(ClientError::invalid_input("subject must not be empty"));
        }
        validate_hours(log.hours_spent, false)?;
        let student_id = self.student_id()?;
        let request = ApiRequest::post("/logs/").json(&StudentScoped {
            student_id: &student_id,
            inner: log,
        })?;
        let created: CreatedResponse = self.session.send_json(request).await?;
        info!(subject = %log.subject_id, hours = log.hours_spent, "study time logged");
        Ok(created.id)
    }

    pub async fn reset_logs(&self) -> Result<()> {
        let student_id = self.student_id()?;
        self.session
            .send(ApiRequest::delete("/logs/").query("studentId", student_id))
            .await?;
        info!("study logs reset");
        Ok(())
    }

    pub async fn stats(&self, period: StatsPeriod, date: Option<NaiveDate>) -> Result<StudyStats> {
        let student_id = self.student_id()?;
        let mut request = ApiRequest::get(format!("/stats/{}", path_segment("student id", &student_id)?))
            .query("period", period.as_str());
        if let Some(date) = date {
            request = request.query("date", date_key(date));
        }
        self.session.send_json(request).await
    }

    pub async fn ask_chat(&self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ClientError::invalid_input("message must not be empty"));
        }
        self.student_id()?;
        let request = ApiRequest::post("/chat/ask").json(&ChatRequest { message })?;
        let reply: ChatResponse = self.session.send_json(request).await?;
        Ok(reply.response)
    }
}

fn validate_hours(hours: f64, allow_zero: bool) -> Result<()> {
    let lower_ok = hours > 0.0 || (allow_zero && hours == 0.0);
    if hours.is_finite() && lower_ok {
        return Ok(());
    }
    let lower = if allow_zero { "at least 0" } else { "greater than 0" };
    Err(ClientError::invalid_input(format!(
        "hours must be a finite number {lower}, got {hours}"
    )))
}

/// Ids go into the URL path verbatim, so anything the URL parser would read
/// as a separator, an escape or a dot segment is refused.
fn path_segment<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let reserved = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
    };
    if value.is_empty() || value == "." || value == ".." || value.contains(reserved) {
        return Err(ClientError::invalid_input(format!("invalid {what}: {value:?}")));
    }
    Ok(value)
}
