use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::{error::Error, path::PathBuf, time::Duration};
use study_client::{
    ClientConfig, ClientError, Role, Session, SessionManager, StudyApi,
    api::STOPWATCH_NOTE,
    models::{RegisterProfile, StatsPeriod, StudyLogInput, TimetableSlotInput},
    stopwatch::{Stopwatch, format_hms, hours},
    week::{WeekRange, day_of_week, today},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "study_client", version, about = "Command-line client for the study tracker backend")]
struct Cli {
    /// Backend base URL (overrides STUDY_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Token file (overrides STUDY_TOKEN_PATH).
    #[arg(long, global = true)]
    token_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the tokens.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Student)]
        role: RoleArg,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        parent_id: Option<String>,
    },
    /// Forget the stored tokens.
    Logout,
    /// Restore the stored session and print it.
    Whoami,
    /// Record that the onboarding tour was seen.
    OnboardingDone,
    #[command(flatten)]
    Study(StudyCommand),
}

/// Commands that act on behalf of the signed-in student.
#[derive(Debug, Subcommand)]
enum StudyCommand {
    /// Show the timetable for the week containing DATE (this week by default).
    Timetable {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Step one week back.
        #[arg(long, conflicts_with = "next")]
        prev: bool,
        /// Step one week forward.
        #[arg(long)]
        next: bool,
    },
    /// Plan hours for a subject on a weekday (0 = Monday).
    Plan {
        #[arg(long)]
        subject: String,
        /// Defaults to the weekday of FROM, or of today.
        #[arg(long)]
        day: Option<u8>,
        #[arg(long)]
        hours: f64,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Remove every planned slot.
    ResetTimetable,
    /// List the daily tasks for DATE.
    Tasks {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    TaskAdd {
        #[arg(long)]
        title: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    TaskToggle {
        id: String,
    },
    TaskDelete {
        id: String,
    },
    /// Log study time by hand.
    Log {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        hours: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Remove every study log.
    ResetLogs,
    /// Run a stopwatch until Ctrl-C, then log the time.
    Track {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    Stats {
        #[arg(long, value_enum, default_value_t = PeriodArg::Weekly)]
        period: PeriodArg,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Ask the study assistant.
    Ask {
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Student,
    Parent,
    Teacher,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Student => Role::Student,
            RoleArg::Parent => Role::Parent,
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Daily,
    Weekly,
}

impl From<PeriodArg> for StatsPeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Daily => StatsPeriod::Daily,
            PeriodArg::Weekly => StatsPeriod::Weekly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config = config.with_base_url(url)?;
    }
    if let Some(path) = cli.token_path {
        config = config.with_token_path(path);
    }

    let session = SessionManager::from_config(&config)?;
    run(cli.command, session).await
}

async fn run(command: Command, session: SessionManager) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Login { email, password } => {
            let signed_in = session.login(&email, &password).await?;
            print_json(&signed_in)?;
        }
        Command::Register {
            name,
            email,
            password,
            role,
            phone,
            parent_id,
        } => {
            let profile = RegisterProfile {
                name,
                email,
                password,
                role: role.into(),
                phone_number: phone,
                linked_parent_id: parent_id,
            };
            let registered = session.register(&profile).await?;
            print_json(&registered)?;
        }
        Command::Logout => {
            session.logout().await?;
            print_json(&json!({ "signedOut": true }))?;
        }
        Command::Whoami => {
            let restored = require_session(&session).await?;
            print_json(&restored)?;
        }
        Command::OnboardingDone => {
            require_session(&session).await?;
            session.mark_onboarding_seen().await;
            print_json(&session.current())?;
        }
        Command::Study(command) => {
            require_session(&session).await?;
            study_command(command, &StudyApi::new(session)).await?;
        }
    }
    Ok(())
}

async fn study_command(command: StudyCommand, api: &StudyApi) -> Result<(), Box<dyn Error>> {
    match command {
        StudyCommand::Timetable { date, prev, next } => {
            let mut week = date.map_or_else(WeekRange::current, WeekRange::containing);
            if prev {
                week = week.previous();
            } else if next {
                week = week.next();
            }
            let slots: Vec<_> = api
                .timetable(Some(week.start))
                .await?
                .into_iter()
                .filter(|slot| week.overlaps(slot.start_date, slot.end_date))
                .collect();
            print_json(&json!({ "week": week, "label": week.label(), "slots": slots }))?;
        }
        StudyCommand::Plan {
            subject,
            day,
            hours,
            from,
            until,
        } => {
            let slot = TimetableSlotInput {
                subject_id: subject,
                day_of_week: day.unwrap_or_else(|| day_of_week(from.unwrap_or_else(today))),
                planned_hours: hours,
                start_date: from,
                end_date: until,
            };
            api.save_timetable_slot(&slot).await?;
            print_json(&json!({ "saved": true }))?;
        }
        StudyCommand::ResetTimetable => {
            api.reset_timetable().await?;
            print_json(&json!({ "reset": "timetable" }))?;
        }
        StudyCommand::Tasks { date } => {
            let tasks = api.daily_tasks(date.unwrap_or_else(today)).await?;
            print_json(&tasks)?;
        }
        StudyCommand::TaskAdd { title, date } => {
            let id = api.add_daily_task(&title, date.unwrap_or_else(today)).await?;
            print_json(&json!({ "id": id }))?;
        }
        StudyCommand::TaskToggle { id } => {
            let completed = api.toggle_daily_task(&id).await?;
            print_json(&json!({ "id": id, "isCompleted": completed }))?;
        }
        StudyCommand::TaskDelete { id } => {
            api.delete_daily_task(&id).await?;
            print_json(&json!({ "id": id, "deleted": true }))?;
        }
        StudyCommand::Log {
            subject,
            hours,
            date,
            notes,
        } => {
            let log = StudyLogInput {
                subject_id: subject,
                date: date.unwrap_or_else(today),
                hours_spent: hours,
                notes,
            };
            let id = api.log_study(&log).await?;
            print_json(&json!({ "id": id }))?;
        }
        StudyCommand::ResetLogs => {
            api.reset_logs().await?;
            print_json(&json!({ "reset": "logs" }))?;
        }
        StudyCommand::Track {
            subject,
            date,
            notes,
        } => track(api, subject, date.unwrap_or_else(today), notes).await?,
        StudyCommand::Stats { period, date } => {
            let stats = api.stats(period.into(), date).await?;
            print_json(&stats)?;
        }
        StudyCommand::Ask { message } => {
            let reply = api.ask_chat(&message.join(" ")).await?;
            println!("{reply}");
        }
    }
    Ok(())
}

async fn track(
    api: &StudyApi,
    subject: String,
    date: NaiveDate,
    notes: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut stopwatch = Stopwatch::started();
    info!("tracking {subject}, press Ctrl-C to stop and log");

    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = ticker.tick() => info!("{subject}: {}", format_hms(stopwatch.elapsed())),
        }
    }

    let elapsed = stopwatch.stop();
    let logged_hours = hours(elapsed);
    info!("stopped {subject} after {}", format_hms(elapsed));
    if logged_hours <= 0.0 {
        warn!("only {} tracked, nothing logged", format_hms(elapsed));
        return Ok(());
    }

    match api.stats(StatsPeriod::Daily, Some(date)).await {
        Ok(stats) => {
            if let Some(entry) = stats.subject(&subject).filter(|entry| entry.exceeds_plan(logged_hours)) {
                warn!(
                    "{subject}: {:.2}h logged against {:.2}h planned",
                    entry.hours + logged_hours,
                    entry.planned
                );
            }
        }
        Err(err) => warn!("could not check today's plan: {err}"),
    }

    let log = StudyLogInput {
        subject_id: subject,
        date,
        hours_spent: logged_hours,
        notes: notes.unwrap_or_else(|| STOPWATCH_NOTE.to_string()),
    };
    let id = match api.log_study(&log).await {
        Ok(id) => id,
        Err(err) => {
            warn!(
                "{logged_hours:.2}h of {} not logged; record it with `study_client log`",
                log.subject_id
            );
            return Err(err.into());
        }
    };
    print_json(&json!({
        "id": id,
        "subjectId": log.subject_id,
        "elapsed": format_hms(elapsed),
        "hoursSpent": logged_hours,
    }))?;
    Ok(())
}

async fn require_session(session: &SessionManager) -> Result<Session, ClientError> {
    session.restore_session().await?.ok_or(ClientError::NotSignedIn)
}

fn print_json(value: &impl Serialize) -> Result<(), ClientError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
