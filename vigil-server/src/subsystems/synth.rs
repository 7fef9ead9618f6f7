//! Mood synthesis — prompt construction and the alarm-decision contract
//!
//! The generator signals an alarm by starting its reply with a fixed literal
//! marker. That string convention is fragile, so it is isolated here behind
//! one parser seam (`parse_generation`) producing a tagged outcome, and a
//! hard eligibility gate (`finalize_outcome`) applied after parsing:
//!
//! - alarms are possible only for individual reports with at least one prior
//!   report; group and first-ever reports get the marker stripped and the
//!   flag forced false, whatever the generator said
//! - the comparison baseline is the single most recent prior report; older
//!   history is context only
//!
//! A failed or empty generation yields `None` from [`synthesize`]: the
//! caller must not persist anything for that unit of work this tick.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use vigil_core::models::MoodReport;
use vigil_core::TextGenerator;

/// Literal prefix the generator uses to signal an alarm.
pub const ALARM_MARKER: &str = "ALARM:";

// ============================================================================
// PUBLIC API
// ============================================================================

/// What kind of report is being synthesized, with its comparison context.
#[derive(Debug)]
pub enum SynthesisScope<'a> {
    /// One member. `history` holds up to the 2 most recent prior individual
    /// reports, oldest first; the last entry is the immediate baseline.
    Individual { history: &'a [MoodReport] },
    /// Project rollup over the member summaries produced this tick.
    Group { member_summaries: &'a [String] },
}

/// Everything the prompt builder needs for one synthesis call.
#[derive(Debug)]
pub struct SynthesisInput<'a> {
    pub subject: &'a str,
    pub emotions: &'a BTreeMap<String, f64>,
    pub commits: &'a [String],
    pub chat_messages: &'a [String],
    pub scope: SynthesisScope<'a>,
}

/// Parsed generator output, before eligibility gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Reply began with the alarm marker. `reason` is the rest of the marker
    /// line; `body` is the full reply with the leading marker stripped.
    Alarm { reason: String, body: String },
    Summary(String),
}

/// Final synthesis result ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedReport {
    pub summary: String,
    pub is_alarm: bool,
    pub alarm_message: Option<String>,
}

/// Whether this scope may ever raise an alarm.
pub fn alarm_eligible(scope: &SynthesisScope<'_>) -> bool {
    matches!(scope, SynthesisScope::Individual { history } if !history.is_empty())
}

/// Split a raw generator reply on the alarm marker.
pub fn parse_generation(raw: &str) -> GenerationOutcome {
    let text = raw.trim();
    match text.strip_prefix(ALARM_MARKER) {
        Some(rest) => {
            let body = rest.trim_start();
            let reason = body.lines().next().unwrap_or("").trim().to_string();
            GenerationOutcome::Alarm {
                reason,
                body: body.to_string(),
            }
        }
        None => GenerationOutcome::Summary(text.to_string()),
    }
}

/// Apply the eligibility gate. An alarm outcome on an ineligible report is
/// demoted: the marker stays stripped but the flag is forced false.
pub fn finalize_outcome(outcome: GenerationOutcome, eligible: bool) -> SynthesizedReport {
    match outcome {
        GenerationOutcome::Alarm { reason, body } if eligible => SynthesizedReport {
            summary: body,
            is_alarm: true,
            alarm_message: Some(reason),
        },
        GenerationOutcome::Alarm { body, .. } => SynthesizedReport {
            summary: body,
            is_alarm: false,
            alarm_message: None,
        },
        GenerationOutcome::Summary(text) => SynthesizedReport {
            summary: text,
            is_alarm: false,
            alarm_message: None,
        },
    }
}

/// Run one synthesis call end to end. `None` means no usable summary was
/// produced and nothing must be persisted for this unit of work.
pub async fn synthesize(
    generator: &dyn TextGenerator,
    input: &SynthesisInput<'_>,
    temperature: f32,
) -> Option<SynthesizedReport> {
    let eligible = alarm_eligible(&input.scope);
    let prompt = build_prompt(input);
    let system = system_instruction(&input.scope);

    let raw = match generator.generate(&prompt, &system, temperature).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                subject = %input.subject,
                backend = generator.name(),
                error = %e,
                "Generation failed; no summary for this unit of work"
            );
            return None;
        }
    };

    let report = finalize_outcome(parse_generation(&raw), eligible);

    if report.summary.is_empty() {
        tracing::warn!(
            subject = %input.subject,
            "Generator returned a bare alarm marker with no text; treating as failed"
        );
        return None;
    }

    Some(report)
}

// ============================================================================
// PROMPT CONSTRUCTION
// ============================================================================

/// Build the structured prompt for one synthesis call.
pub fn build_prompt(input: &SynthesisInput<'_>) -> String {
    let mut prompt = String::new();

    match &input.scope {
        SynthesisScope::Individual { history } => {
            let _ = writeln!(prompt, "Mood analysis request for {}.", input.subject);
            prompt.push('\n');

            let _ = writeln!(
                prompt,
                "1. Average emotion scores in the current window (0 to 1 scale):"
            );
            push_emotion_lines(&mut prompt, input.emotions);
            prompt.push('\n');

            let _ = writeln!(
                prompt,
                "2. Commits authored by {} in the window:",
                input.subject
            );
            push_item_lines(&mut prompt, input.commits);
            prompt.push('\n');

            let _ = writeln!(prompt, "3. Team chat messages in the window:");
            push_item_lines(&mut prompt, input.chat_messages);
            prompt.push('\n');

            if history.is_empty() {
                let _ = writeln!(
                    prompt,
                    "4. Prior mood reports: (none; this is the first report for this user)"
                );
            } else {
                let _ = writeln!(
                    prompt,
                    "4. Prior mood reports, oldest first. The last one is the immediate baseline:"
                );
                for (index, prior) in history.iter().enumerate() {
                    let tag = if index + 1 == history.len() {
                        "[baseline]"
                    } else {
                        "[earlier]"
                    };
                    let _ = writeln!(
                        prompt,
                        "  {} {} | emotions: {} | {}",
                        tag,
                        prior.end_time.format("%Y-%m-%d %H:%M UTC"),
                        render_emotions_inline(&prior.average_emotions),
                        prior.mood_summary
                    );
                }
            }
        }
        SynthesisScope::Group { member_summaries } => {
            let _ = writeln!(
                prompt,
                "Team mood analysis request for project {}.",
                input.subject
            );
            prompt.push('\n');

            let _ = writeln!(
                prompt,
                "1. Project-wide average emotion scores in the window (0 to 1 scale):"
            );
            push_emotion_lines(&mut prompt, input.emotions);
            prompt.push('\n');

            let _ = writeln!(prompt, "2. Commits across the project in the window:");
            push_item_lines(&mut prompt, input.commits);
            prompt.push('\n');

            let _ = writeln!(prompt, "3. Individual member summaries from this run:");
            push_item_lines(&mut prompt, member_summaries);
        }
    }

    prompt
}

/// System instruction matched to the scope's alarm eligibility.
pub fn system_instruction(scope: &SynthesisScope<'_>) -> String {
    const ROLE: &str = "You are a wellbeing assistant for a software team. \
        Write a short prose summary (two to four sentences) of the mood \
        described by the data provided.";

    match scope {
        SynthesisScope::Individual { history } if !history.is_empty() => format!(
            "{} Compare the current emotions only against the immediate \
             baseline report; earlier reports are context, never a baseline. \
             If and only if there is a substantial increase in a negative \
             emotion (such as anger, sadness, or fear) or a substantial \
             decrease in a positive emotion (such as happiness) relative to \
             that baseline (as a guide, a shift of roughly 0.3 or more), \
             start your reply with the exact prefix '{} ' followed by a \
             one-line reason, then continue the summary on the next line. \
             Stable mood, small shifts, and improvement must never be \
             flagged. Otherwise reply with the summary only.",
            ROLE, ALARM_MARKER
        ),
        SynthesisScope::Individual { .. } => format!(
            "{} There is no prior report to compare against, so never flag \
             an alarm and do not use the '{}' prefix.",
            ROLE, ALARM_MARKER
        ),
        SynthesisScope::Group { .. } => format!(
            "{} Synthesize the team's overall mood for the project from the \
             member summaries and project-wide signals. Never flag an alarm \
             and do not use the '{}' prefix.",
            ROLE, ALARM_MARKER
        ),
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn push_emotion_lines(prompt: &mut String, emotions: &BTreeMap<String, f64>) {
    if emotions.is_empty() {
        prompt.push_str("  (none)\n");
        return;
    }
    for (name, score) in emotions {
        let _ = writeln!(prompt, "  - {}: {:.2}", name, score);
    }
}

fn push_item_lines(prompt: &mut String, items: &[String]) {
    if items.is_empty() {
        prompt.push_str("  (none)\n");
        return;
    }
    for item in items {
        let _ = writeln!(prompt, "  - {}", item);
    }
}

fn render_emotions_inline(emotions: &serde_json::Value) -> String {
    let Some(map) = emotions.as_object() else {
        return "(none)".to_string();
    };
    if map.is_empty() {
        return "(none)".to_string();
    }
    map.iter()
        .filter_map(|(name, value)| value.as_f64().map(|v| format!("{} {:.2}", name, v)))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// TESTS
// ============================================================================
