//! Reporting pipeline — per-member mood reports and the project rollup
//!
//! One tick walks every project and every member in membership order,
//! strictly sequentially. Sequencing is load-bearing: each member's
//! baseline must be the report persisted on a previous tick, so no two
//! units of work for the same pair may run concurrently.
//!
//! Per member: resolve the unprocessed window, aggregate emotions, fetch
//! commit and chat signals, synthesize, persist. The persisted report's
//! end time is the watermark the next tick resumes from, so skipping the
//! persist (no data, no email, failed generation) leaves the member's
//! window open and the same entries are retried next tick.
//!
//! After all members, a single group report rolls up everything processed
//! this tick. No individual report means no group report.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

use vigil_core::chat::ChatClient;
use vigil_core::config::VigilConfig;
use vigil_core::generation::{GeminiGenerationClient, GenerationError, TextGenerator};
use vigil_core::models::{MoodReport, Project, ReportKind, User};

use super::{aggregate, chatlog, commits, store, synth, window};
use crate::subsystems::window::TelemetryWindow;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Everything one reporting tick needs. Cheap to clone; handed to the loop,
/// the HTTP trigger, and tests alike.
#[derive(Clone)]
pub struct ReporterDeps {
    pub pool: PgPool,
    pub config: VigilConfig,
    pub generator: Arc<dyn TextGenerator>,
    pub chat: Option<Arc<dyn ChatClient>>,
}

/// Counters from one reporting tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub projects_processed: usize,
    pub members_processed: usize,
    pub individual_reports: usize,
    pub group_reports: usize,
    pub alarms_raised: usize,
    pub members_skipped_no_data: usize,
    pub members_skipped_no_email: usize,
    pub generation_failures: usize,
    /// Failed project and member passes plus failed signal sources
    /// (repositories, chat channels, author lookups).
    pub errors: usize,
}

/// How one member's pass ended.
pub enum MemberOutcome {
    /// Missing user row or no email on file; skipped and logged.
    NoEmail,
    /// Nothing new since the watermark; nothing to do.
    NoNewData,
    /// Generation produced nothing usable; watermark untouched.
    GenerationFailed,
    /// Individual report persisted.
    Produced(ProcessedMember),
}

/// A member whose individual report was persisted this tick, carrying the
/// data the group rollup absorbs.
pub struct ProcessedMember {
    pub user: User,
    pub window: TelemetryWindow,
    pub commit_messages: Vec<String>,
    pub summary: String,
    pub is_alarm: bool,
}

/// Build the production generator from configuration. Fatal at startup if
/// no API key is available.
pub fn create_generator(config: &VigilConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let mut settings =
        vigil_core::generation::GenerationConfig::new(None, config.generation.model.clone());
    settings.max_retries = config.generation.max_retries;
    settings.retry_delay_ms = config.generation.retry_delay_ms;

    let client = GeminiGenerationClient::new(settings)?;
    Ok(Arc::new(client))
}

/// Called from the HTTP surface to run one tick outside the schedule.
pub async fn trigger_report_run(deps: &ReporterDeps, reason: Option<String>) -> Result<TickReport> {
    tracing::info!("Manual report run triggered: reason={:?}", reason);
    run_reporting_tick(deps).await
}

/// Called from main.rs to start the background reporting loop.
pub async fn run_reporting_loop(deps: ReporterDeps, mut shutdown: broadcast::Receiver<()>) {
    let interval = tokio::time::Duration::from_secs(deps.config.reporting.run_interval_secs);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        "Reporting loop started (interval: {}s)",
        deps.config.reporting.run_interval_secs
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_reporting_tick(&deps).await {
                    Ok(report) => {
                        tracing::info!(
                            "Reporting tick complete: {} projects, {} individual, {} group, {} alarms, {} errors",
                            report.projects_processed,
                            report.individual_reports,
                            report.group_reports,
                            report.alarms_raised,
                            report.errors
                        );
                    }
                    Err(e) => tracing::error!("Reporting tick error: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Reporting loop shutting down");
                break;
            }
        }
    }
}

/// One full pass over all projects.
pub async fn run_reporting_tick(deps: &ReporterDeps) -> Result<TickReport> {
    let now = Utc::now();
    let mut tick = TickReport::default();

    let projects = store::list_projects(&deps.pool).await?;

    for project in &projects {
        tick.projects_processed += 1;
        if let Err(e) = process_project(deps, project, now, &mut tick).await {
            tracing::error!(project = %project.name, error = %e, "Project pass failed");
            tick.errors += 1;
        }
    }

    Ok(tick)
}

// ============================================================================
// PROJECT PASS
// ============================================================================

/// Running totals for the project rollup, fed by each persisted individual
/// report. The group window is the envelope of the member windows.
#[derive(Default)]
struct GroupAccumulator {
    entries: Vec<vigil_core::models::EmotionSample>,
    commit_messages: Vec<String>,
    member_summaries: Vec<String>,
    processed_users: usize,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl GroupAccumulator {
    fn absorb(&mut self, member: ProcessedMember) {
        self.start = Some(match self.start {
            Some(start) => start.min(member.window.start),
            None => member.window.start,
        });
        self.end = Some(match self.end {
            Some(end) => end.max(member.window.end),
            None => member.window.end,
        });

        self.entries.extend(member.window.entries);
        self.commit_messages.extend(member.commit_messages);
        self.member_summaries
            .push(format!("{}: {}", member.user.username, member.summary));
        self.processed_users += 1;
    }

    fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start?, self.end?))
    }
}

/// One project's full pass: every member, then the rollup. Counters land
/// in `tick`. Callable on its own so a single project can be exercised
/// without touching the rest of the directory.
pub async fn process_project(
    deps: &ReporterDeps,
    project: &Project,
    now: DateTime<Utc>,
    tick: &mut TickReport,
) -> Result<()> {
    let mut group = GroupAccumulator::default();

    for member_id in &project.members {
        tick.members_processed += 1;

        match process_member(deps, project, *member_id, now, tick).await {
            Ok(MemberOutcome::NoEmail) => tick.members_skipped_no_email += 1,
            Ok(MemberOutcome::NoNewData) => tick.members_skipped_no_data += 1,
            Ok(MemberOutcome::GenerationFailed) => tick.generation_failures += 1,
            Ok(MemberOutcome::Produced(member)) => {
                tick.individual_reports += 1;
                if member.is_alarm {
                    tick.alarms_raised += 1;
                }
                group.absorb(member);
            }
            Err(e) => {
                tracing::error!(
                    project = %project.name,
                    user_id = %member_id,
                    error = %e,
                    "Member pass failed"
                );
                tick.errors += 1;
            }
        }
    }

    // No individual reports this tick means no group report either
    if group.processed_users == 0 {
        tracing::debug!(project = %project.name, "No individual reports produced; skipping group rollup");
        return Ok(());
    }
    let Some((start, end)) = group.window() else {
        return Ok(());
    };

    let group_emotions = aggregate::average_emotions(&group.entries);
    let input = synth::SynthesisInput {
        subject: &project.name,
        emotions: &group_emotions,
        commits: &group.commit_messages,
        chat_messages: &[],
        scope: synth::SynthesisScope::Group {
            member_summaries: &group.member_summaries,
        },
    };

    let Some(synthesized) =
        synth::synthesize(deps.generator.as_ref(), &input, deps.config.generation.temperature)
            .await
    else {
        // Individual reports already persisted stand; only the rollup is lost
        tracing::warn!(project = %project.name, "Group synthesis failed; skipping group report this tick");
        tick.generation_failures += 1;
        return Ok(());
    };

    let report = MoodReport {
        report_id: Uuid::new_v4(),
        project_id: project.project_id,
        user_id: None,
        report_type: ReportKind::Group.as_str().to_string(),
        report_timestamp: Utc::now(),
        start_time: start,
        end_time: end,
        average_emotions: aggregate::emotions_to_json(&group_emotions),
        mood_summary: synthesized.summary,
        processed_entries: group.entries.len() as i32,
        commit_count: group.commit_messages.len() as i32,
        processed_user_count: Some(group.processed_users as i32),
        is_alarm: false,
        alarm_message: None,
    };

    store::insert_report(&deps.pool, &report).await?;
    tick.group_reports += 1;

    tracing::info!(
        project = %project.name,
        users = group.processed_users,
        "Group report persisted"
    );

    Ok(())
}

// ============================================================================
// MEMBER PASS
// ============================================================================

async fn process_member(
    deps: &ReporterDeps,
    project: &Project,
    member_id: Uuid,
    now: DateTime<Utc>,
    tick: &mut TickReport,
) -> Result<MemberOutcome> {
    let Some(user) = store::find_user(&deps.pool, member_id).await? else {
        tracing::warn!(project = %project.name, user_id = %member_id, "Project member has no user row; skipping");
        return Ok(MemberOutcome::NoEmail);
    };

    let email = match user.email.as_deref() {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => {
            tracing::warn!(project = %project.name, user = %user.username, "Member has no email on file; skipping");
            return Ok(MemberOutcome::NoEmail);
        }
    };

    let Some(window) =
        window::resolve_window(&deps.pool, member_id, project.project_id, now).await?
    else {
        tracing::debug!(project = %project.name, user = %user.username, "No new telemetry; skipping");
        return Ok(MemberOutcome::NoNewData);
    };

    let emotions = aggregate::average_emotions(&window.entries);

    let commit_scan = commits::commits_for_user(
        &deps.config.repos,
        &project.repos,
        &email,
        window.start,
        window.end,
    )
    .await;
    tick.errors += commit_scan.failed_repos;
    let commit_messages = commit_scan.messages;

    let chat_scan = match &deps.chat {
        Some(chat) => chatlog::messages_in_window(chat.as_ref(), window.start, window.end).await,
        None => chatlog::ChatScan::default(),
    };
    tick.errors += chat_scan.failed_sources;
    let chat_messages = chat_scan.messages;

    let history =
        store::recent_individual_reports(&deps.pool, member_id, project.project_id, 2).await?;

    let input = synth::SynthesisInput {
        subject: &user.username,
        emotions: &emotions,
        commits: &commit_messages,
        chat_messages: &chat_messages,
        scope: synth::SynthesisScope::Individual { history: &history },
    };

    let Some(synthesized) =
        synth::synthesize(deps.generator.as_ref(), &input, deps.config.generation.temperature)
            .await
    else {
        // Nothing persisted, so the watermark stays put and this window is
        // retried on the next tick
        return Ok(MemberOutcome::GenerationFailed);
    };

    let report = MoodReport {
        report_id: Uuid::new_v4(),
        project_id: project.project_id,
        user_id: Some(member_id),
        report_type: ReportKind::Individual.as_str().to_string(),
        report_timestamp: Utc::now(),
        start_time: window.start,
        end_time: window.end,
        average_emotions: aggregate::emotions_to_json(&emotions),
        mood_summary: synthesized.summary.clone(),
        processed_entries: window.entries.len() as i32,
        commit_count: commit_messages.len() as i32,
        processed_user_count: None,
        is_alarm: synthesized.is_alarm,
        alarm_message: synthesized.alarm_message.clone(),
    };

    store::insert_report(&deps.pool, &report).await?;

    if synthesized.is_alarm {
        tracing::warn!(
            project = %project.name,
            user = %user.username,
            reason = synthesized.alarm_message.as_deref().unwrap_or(""),
            "Mood alarm raised"
        );
    }

    Ok(MemberOutcome::Produced(ProcessedMember {
        user,
        window,
        commit_messages,
        summary: synthesized.summary,
        is_alarm: synthesized.is_alarm,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
