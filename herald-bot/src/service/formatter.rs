//! Message formatter
//!
//! Renders one activity snapshot into a notification payload. Rendering is
//! pure: the same snapshot, user and dashboard URL always produce the same
//! payload, which is what lets the correlator skip no-op edits by hash.

use herald_core::domain::activity::{ActivityStatus, PipelineActivity, Stage};
use herald_core::domain::user::ResolvedUser;
use herald_core::dto::message::{Attachment, Block, Payload};

/// Emoji shown next to a status
pub fn status_icon(status: ActivityStatus) -> &'static str {
    match status {
        ActivityStatus::Pending => ":clock1:",
        ActivityStatus::Running => ":hourglass_flowing_sand:",
        ActivityStatus::Succeeded => ":white_check_mark:",
        ActivityStatus::Failed => ":x:",
        ActivityStatus::Aborted => ":no_entry_sign:",
        ActivityStatus::NotExecuted => ":white_circle:",
        ActivityStatus::Unknown => ":grey_question:",
    }
}

/// Attachment side-bar color for an overall status
pub fn status_color(status: ActivityStatus) -> &'static str {
    match status {
        ActivityStatus::Succeeded => "#2eb886",
        ActivityStatus::Failed => "#a30200",
        ActivityStatus::Aborted => "#8d8d8d",
        ActivityStatus::Running | ActivityStatus::Pending => "#3aa3e3",
        ActivityStatus::NotExecuted | ActivityStatus::Unknown => "#dddddd",
    }
}

/// Formats activities with a fixed dashboard base URL
#[derive(Debug, Clone, Default)]
pub struct MessageFormatter {
    dashboard_url: String,
}

impl MessageFormatter {
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        Self {
            dashboard_url: dashboard_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn format(&self, activity: &PipelineActivity, user: &ResolvedUser) -> Payload {
        format(activity, user, &self.dashboard_url)
    }
}

/// Renders a notification payload
///
/// # Arguments
/// * `activity` - The snapshot to render
/// * `user` - The commit author, mentioned when resolved
/// * `dashboard_url` - Dashboard base URL; empty omits the link
pub fn format(activity: &PipelineActivity, user: &ResolvedUser, dashboard_url: &str) -> Payload {
    let repository = &activity.repository;
    let header = format!(
        "{} *{}* `{}` build #{} {}",
        status_icon(activity.status),
        repository.full_name(),
        repository.branch,
        activity.build,
        activity.status
    );

    let mut blocks = vec![Block::section(header)];

    let stages: Vec<String> = activity.stages_in_order().into_iter().map(stage_line).collect();
    if !stages.is_empty() {
        blocks.push(Block::section(stages.join("\n")));
    }

    let mut context = vec![format!("Author: {}", mention(user))];
    if let Some(commit) = commit_line(activity) {
        context.push(commit);
    }
    let dashboard_url = dashboard_url.trim_end_matches('/');
    if !dashboard_url.is_empty() {
        context.push(format!(
            "<{}/{}/{}/{}/{}|View build #{}>",
            dashboard_url,
            repository.owner,
            repository.repo,
            repository.branch,
            activity.build,
            activity.build
        ));
    }
    blocks.push(Block::context(context.join(" | ")));

    Payload {
        text: format!(
            "{} {} #{} {}",
            repository.full_name(),
            repository.branch,
            activity.build,
            activity.status
        ),
        attachments: vec![Attachment {
            color: status_color(activity.status).to_string(),
            blocks,
        }],
    }
}

fn stage_line(stage: &Stage) -> String {
    match stage.duration() {
        Some(duration) => format!(
            "{} {} ({})",
            status_icon(stage.status),
            stage.name,
            format_duration(duration)
        ),
        None => format!("{} {}", status_icon(stage.status), stage.name),
    }
}

fn mention(user: &ResolvedUser) -> String {
    match &user.user_id {
        Some(id) if user.is_resolved() => format!("<@{}>", id),
        _ => user.display_name.clone(),
    }
}

fn commit_line(activity: &PipelineActivity) -> Option<String> {
    let commit = &activity.commit;
    if commit.sha.is_empty() {
        return None;
    }

    let short: String = commit.sha.chars().take(7).collect();
    let subject = commit.message.lines().next().unwrap_or("").trim();
    if subject.is_empty() {
        Some(format!("`{}`", short))
    } else {
        Some(format!("`{}` {}", short, subject))
    }
}

/// `1h 2m 3s`, `4m 5s` or `6s`
fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
