//! Markdown codec for task files
//!
//! Each task is a markdown file named `{id}-{slug}.md` with YAML frontmatter
//! for metadata and a fixed set of `##` sections for the free text:
//!
//! ```text
//! ---
//! id: T1.2
//! title: Wire up the parser
//! status: todo
//! ...
//! ---
//!
//! ## Description
//!
//! ## Acceptance Criteria
//! <!-- AC:BEGIN -->
//! - [ ] #1 Parses the happy path
//! <!-- AC:END -->
//!
//! ## Implementation Plan
//!
//! ## Implementation Notes
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::{one_or_many, AcceptanceCriterion, HistoryEntry, Priority, Status, Task, TaskId};

const DESCRIPTION_HEADER: &str = "## Description";
const CRITERIA_HEADER: &str = "## Acceptance Criteria";
const PLAN_HEADER: &str = "## Implementation Plan";
const NOTES_HEADER: &str = "## Implementation Notes";
const CRITERIA_BEGIN: &str = "<!-- AC:BEGIN -->";
const CRITERIA_END: &str = "<!-- AC:END -->";

const MAX_SLUG_LEN: usize = 50;
const UNTITLED_SLUG: &str = "untitled_task";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Missing frontmatter (must start with ---)")]
    MissingFrontmatter,

    #[error("Missing frontmatter end delimiter (---)")]
    UnterminatedFrontmatter,

    #[error("Failed to parse frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// YAML header of a task file
#[derive(Debug, Serialize, Deserialize)]
struct TaskFrontmatter {
    id: TaskId,
    title: String,
    #[serde(default)]
    status: Status,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    parent: Option<TaskId>,
    #[serde(default, deserialize_with = "one_or_many")]
    assigned: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    labels: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    dependencies: Vec<TaskId>,
    #[serde(default)]
    priority: Priority,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<HistoryEntry>,
}

impl From<&Task> for TaskFrontmatter {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            parent: task.parent.clone(),
            assigned: task.assigned.clone(),
            labels: task.labels.clone(),
            dependencies: task.dependencies.clone(),
            priority: task.priority,
            created_at: task.created_at,
            updated_at: Some(task.updated_at),
            history: task.history.clone(),
        }
    }
}

/// Accepts a missing, null or blank parent as "no parent"
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<TaskId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Renders a task to the on-disk format
pub fn render(task: &Task) -> Result<String, CodecError> {
    let yaml = serde_yaml::to_string(&TaskFrontmatter::from(task))?;

    let mut content = String::new();
    content.push_str("---\n");
    content.push_str(&yaml);
    content.push_str("---\n\n");

    push_section(&mut content, DESCRIPTION_HEADER, &task.description);

    content.push_str(CRITERIA_HEADER);
    content.push('\n');
    content.push_str(CRITERIA_BEGIN);
    content.push('\n');
    for (i, ac) in task.acceptance_criteria.iter().enumerate() {
        let mark = if ac.checked { 'x' } else { ' ' };
        content.push_str(&format!("- [{}] #{} {}\n", mark, i + 1, ac.text));
    }
    content.push_str(CRITERIA_END);
    content.push_str("\n\n");

    push_section(&mut content, PLAN_HEADER, &task.plan);
    push_section(&mut content, NOTES_HEADER, &task.notes);

    while content.ends_with("\n\n") {
        content.pop();
    }

    Ok(content)
}

fn push_section(content: &mut String, header: &str, text: &str) {
    content.push_str(header);
    content.push_str("\n\n");
    if !text.is_empty() {
        content.push_str(text);
        content.push_str("\n\n");
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Description,
    Criteria,
    Plan,
    Notes,
}

/// Parses the on-disk format into a task
pub fn parse(content: &str) -> Result<Task, CodecError> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or(CodecError::MissingFrontmatter)?;

    let (yaml, body) = split_frontmatter(rest).ok_or(CodecError::UnterminatedFrontmatter)?;
    let fm: TaskFrontmatter = serde_yaml::from_str(yaml)?;

    let mut description = Vec::new();
    let mut plan = Vec::new();
    let mut notes = Vec::new();
    let mut criteria = Vec::new();
    let mut section = Section::Preamble;

    for line in body.lines() {
        match line.trim_end() {
            DESCRIPTION_HEADER => section = Section::Description,
            CRITERIA_HEADER => section = Section::Criteria,
            PLAN_HEADER => section = Section::Plan,
            NOTES_HEADER => section = Section::Notes,
            other => match section {
                Section::Preamble => {}
                Section::Description => description.push(line),
                Section::Plan => plan.push(line),
                Section::Notes => notes.push(line),
                Section::Criteria => {
                    if let Some(ac) = parse_criterion(other) {
                        criteria.push(ac);
                    }
                }
            },
        }
    }

    Ok(Task {
        id: fm.id,
        title: fm.title,
        status: fm.status,
        priority: fm.priority,
        labels: fm.labels,
        assigned: fm.assigned,
        parent: fm.parent,
        dependencies: fm.dependencies,
        description: join_trimmed(&description),
        acceptance_criteria: criteria,
        plan: join_trimmed(&plan),
        notes: join_trimmed(&notes),
        created_at: fm.created_at,
        updated_at: fm.updated_at.unwrap_or(fm.created_at),
        history: fm.history,
    })
}

/// Splits `yaml\n---\nbody` at the first closing delimiter line
fn split_frontmatter(rest: &str) -> Option<(&str, &str)> {
    if let Some(body) = rest.strip_prefix("---") {
        return Some(("", body));
    }

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if offset > 0 && line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parses `- [ ] #1 text` / `- [x] #2 text`; the number is optional
fn parse_criterion(line: &str) -> Option<AcceptanceCriterion> {
    let rest = line.trim_start().strip_prefix("- [")?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let rest = chars.as_str().strip_prefix(']')?;

    let checked = match mark {
        'x' | 'X' => true,
        ' ' => false,
        _ => return None,
    };

    let mut text = rest.trim();
    if let Some(numbered) = text.strip_prefix('#') {
        let digits = numbered.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            text = numbered[digits..].trim_start();
        }
    }

    Some(AcceptanceCriterion {
        text: text.to_string(),
        checked,
    })
}

fn join_trimmed(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

/// Builds the file-name slug from a title
pub fn slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_sep = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '(' | ')' | '[' | ']') {
            slug.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    let mut slug: String = slug.trim_matches('_').chars().take(MAX_SLUG_LEN).collect();
    if slug.is_empty() {
        slug.push_str(UNTITLED_SLUG);
    }
    slug
}

/// File name for a task: `{id}-{slug}.md`
pub fn file_name(task: &Task) -> String {
    format!("{}-{}.md", task.id, slug(&task.title))
}

/// Recovers the ID encoded in a task file name
///
/// Returns None for files that are not task files.
pub fn id_from_file_name(name: &str) -> Option<TaskId> {
    let stem = name.strip_suffix(".md")?;
    let (id, _) = stem.split_once('-')?;
    if !id.starts_with('T') {
        return None;
    }
    id.parse().ok()
}
