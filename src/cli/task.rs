//! Task CLI commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::output::Output;
use super::session::Session;
use crate::domain::{Patch, Priority, Status, Task, TaskId};
use crate::storage::{CreateParams, ListParams, ListResult, SortKey, UpdateParams};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    ///
    /// Examples:
    ///   backlog task create "Fix login"
    ///   backlog task create "Write tests" --parent T1 --ac "covers errors"
    Create {
        /// Task title
        title: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, short = 's')]
        status: Option<Status>,

        #[arg(long)]
        priority: Option<Priority>,

        /// Parent task; the new ID is allocated under it
        #[arg(long, short = 'p')]
        parent: Option<TaskId>,

        #[arg(long, short = 'a', value_delimiter = ',')]
        assigned: Vec<String>,

        #[arg(long, short = 'l', value_delimiter = ',')]
        labels: Vec<String>,

        /// Tasks that must be done first
        #[arg(long = "dep", value_delimiter = ',')]
        dependencies: Vec<TaskId>,

        /// Acceptance criterion (repeatable)
        #[arg(long = "ac")]
        acceptance_criteria: Vec<String>,

        #[arg(long)]
        plan: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List tasks
    List {
        #[command(flatten)]
        filters: ListArgs,
    },

    /// Show a task
    View {
        /// Task ID (T1.2, 1.2 and t1.2 are equivalent)
        id: String,
    },

    /// Edit a task
    Edit(EditArgs),

    /// Move a task into the archive
    Archive {
        id: String,
    },

    /// Search task text
    Search {
        query: String,

        #[command(flatten)]
        filters: ListArgs,
    },
}

/// Filters shared by `list` and `search`
#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, short = 's', value_delimiter = ',')]
    status: Vec<Status>,

    #[arg(long, short = 'a', value_delimiter = ',')]
    assigned: Vec<String>,

    #[arg(long, short = 'l', value_delimiter = ',')]
    labels: Vec<String>,

    #[arg(long, short = 'p')]
    parent: Option<TaskId>,

    #[arg(long)]
    priority: Option<Priority>,

    /// Only tasks nobody is assigned to
    #[arg(long)]
    unassigned: bool,

    /// Only tasks with at least one dependency
    #[arg(long)]
    has_dependency: bool,

    /// Only tasks another task depends on
    #[arg(long)]
    depended_on: bool,

    /// Sort keys: id, title, status, priority, created, updated
    #[arg(long)]
    sort: Option<String>,

    #[arg(long)]
    reverse: bool,

    /// Page size (0 lists everything)
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    id: String,

    #[arg(long, short = 't')]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long, short = 's')]
    status: Option<Status>,

    #[arg(long)]
    priority: Option<Priority>,

    #[arg(long, short = 'p', conflicts_with = "no_parent")]
    parent: Option<TaskId>,

    /// Remove the declared parent
    #[arg(long)]
    no_parent: bool,

    /// Replace the dependency list
    #[arg(long = "dep", value_delimiter = ',', conflicts_with = "no_deps")]
    dependencies: Option<Vec<TaskId>>,

    /// Clear all dependencies
    #[arg(long)]
    no_deps: bool,

    #[arg(long, value_delimiter = ',')]
    add_assigned: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    remove_assigned: Vec<String>,

    #[arg(long = "add-label", value_delimiter = ',')]
    add_labels: Vec<String>,

    #[arg(long = "remove-label", value_delimiter = ',')]
    remove_labels: Vec<String>,

    /// Replace the notes
    #[arg(long)]
    notes: Option<String>,

    /// Append a paragraph to the notes (repeatable)
    #[arg(long)]
    append_notes: Vec<String>,

    #[arg(long)]
    plan: Option<String>,

    /// Add an acceptance criterion (repeatable)
    #[arg(long = "ac")]
    add_criteria: Vec<String>,

    /// Remove criterion by number
    #[arg(long = "remove-ac")]
    remove_criteria: Vec<usize>,

    /// Check criterion by number
    #[arg(long = "check-ac")]
    check_criteria: Vec<usize>,

    /// Uncheck criterion by number
    #[arg(long = "uncheck-ac")]
    uncheck_criteria: Vec<usize>,
}

impl EditArgs {
    fn into_params(self) -> UpdateParams {
        let parent = if self.no_parent {
            Patch::Set(None)
        } else {
            self.parent.map(Some).into()
        };
        let dependencies = if self.no_deps {
            Patch::Set(Vec::new())
        } else {
            self.dependencies.into()
        };

        UpdateParams {
            title: self.title.into(),
            description: self.description.into(),
            status: self.status.into(),
            priority: self.priority.into(),
            parent,
            dependencies,
            add_assigned: self.add_assigned,
            remove_assigned: self.remove_assigned,
            add_labels: self.add_labels,
            remove_labels: self.remove_labels,
            notes: self.notes.into(),
            append_notes: self.append_notes,
            plan: self.plan.into(),
            remove_criteria: self.remove_criteria,
            check_criteria: self.check_criteria,
            uncheck_criteria: self.uncheck_criteria,
            add_criteria: self.add_criteria,
        }
    }
}

impl ListArgs {
    fn into_params(self, session: &Session) -> ListParams {
        let defaults = &session.config().project;
        let sort = self.sort.unwrap_or_else(|| defaults.default_sort.clone());

        ListParams {
            statuses: self.status,
            assigned: self.assigned,
            labels: self.labels,
            parent: self.parent,
            priority: self.priority,
            unassigned: self.unassigned,
            has_dependency: self.has_dependency,
            depended_on: self.depended_on,
            sort: SortKey::parse_list(&sort),
            reverse: self.reverse,
            limit: self.limit.unwrap_or(defaults.page_size),
            offset: self.offset,
        }
    }
}

pub fn run(cmd: TaskCommands, session: &Session, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Create {
            title,
            description,
            status,
            priority,
            parent,
            assigned,
            labels,
            dependencies,
            acceptance_criteria,
            plan,
            notes,
        } => {
            let params = CreateParams {
                title,
                description: description.unwrap_or_default(),
                status,
                priority,
                parent,
                assigned,
                labels,
                dependencies,
                acceptance_criteria,
                plan: plan.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
            };
            create_task(session, output, params)
        }
        TaskCommands::List { filters } => {
            let params = filters.into_params(session);
            let result = session.store().list(&params)?;
            print_list(output, &result);
            Ok(())
        }
        TaskCommands::View { id } => view_task(session, output, &id),
        TaskCommands::Edit(args) => edit_task(session, output, args),
        TaskCommands::Archive { id } => archive_task(session, output, &id),
        TaskCommands::Search { query, filters } => {
            let params = filters.into_params(session);
            let result = session.store().search(&query, &params)?;
            print_list(output, &result);
            Ok(())
        }
    }
}

fn create_task(session: &Session, output: &Output, params: CreateParams) -> Result<()> {
    if params.title.trim().is_empty() {
        anyhow::bail!("Task title cannot be empty");
    }

    let store = session.store();
    let task = store.create(params).context("Failed to create task")?;
    let path = store.path(&task);

    session.record("create", &task.id.to_string(), &[path.clone()], &[]);

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": task.id,
            "title": task.title,
            "file": path,
        }));
    } else {
        output.success(&format!("Created task {}: {}", task.id, task.title));
    }
    Ok(())
}

fn print_list(output: &Output, result: &ListResult) {
    if output.is_json() {
        output.data(result);
        return;
    }

    if result.tasks.is_empty() {
        output.line("No tasks");
        return;
    }

    output.line(&format!("{:<12} {:<12} {:<9} TITLE", "ID", "STATUS", "PRIORITY"));
    output.line(&"-".repeat(60));
    for task in &result.tasks {
        output.line(&format!(
            "{:<12} {:<12} {:<9} {}",
            task.id.to_string(),
            task.status.as_str(),
            task.priority.as_str(),
            task.title
        ));
    }

    let page = &result.pagination;
    if page.has_more || page.offset > 0 {
        output.blank();
        output.line(&format!(
            "Showing {} of {} (offset {})",
            page.displayed_results, page.total_results, page.offset
        ));
    }
}

fn view_task(session: &Session, output: &Output, id: &str) -> Result<()> {
    let task = session.store().get(id)?;

    if output.is_json() {
        output.data(&task);
        return Ok(());
    }

    print_task(output, &task);
    Ok(())
}

fn print_task(output: &Output, task: &Task) {
    output.line(&format!("Task: {}", task.id));
    output.line(&format!("Title: {}", task.title));
    output.line(&format!("Status: {}", task.status));
    output.line(&format!("Priority: {}", task.priority));
    if let Some(parent) = &task.parent {
        output.line(&format!("Parent: {}", parent));
    }
    if !task.assigned.is_empty() {
        output.line(&format!("Assigned: {}", task.assigned.join(", ")));
    }
    if !task.labels.is_empty() {
        output.line(&format!("Labels: {}", task.labels.join(", ")));
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        output.line(&format!("Depends on: {}", deps.join(", ")));
    }
    output.line(&format!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M")));
    output.line(&format!("Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M")));

    if !task.description.is_empty() {
        output.line("\nDescription:");
        output.line(&task.description);
    }

    if !task.acceptance_criteria.is_empty() {
        output.line(&format!(
            "\nAcceptance criteria ({}/{}):",
            task.checked_criteria(),
            task.acceptance_criteria.len()
        ));
        for (i, ac) in task.acceptance_criteria.iter().enumerate() {
            let mark = if ac.checked { "x" } else { " " };
            output.line(&format!("  [{}] #{} {}", mark, i + 1, ac.text));
        }
    }

    if !task.plan.is_empty() {
        output.line("\nPlan:");
        output.line(&task.plan);
    }

    if !task.notes.is_empty() {
        output.line("\nNotes:");
        output.line(&task.notes);
    }
}

fn edit_task(session: &Session, output: &Output, args: EditArgs) -> Result<()> {
    let store = session.store();
    let task = store.get(&args.id)?;
    let old_path = store
        .find(&task.id)?
        .unwrap_or_else(|| store.path(&task));

    let updated = store
        .update(&task, args.into_params())
        .with_context(|| format!("Failed to update task {}", task.id))?;
    let new_path = store.path(&updated);

    if updated.history.len() == task.history.len() {
        output.success(&format!("No changes to task {}", updated.id));
        return Ok(());
    }

    let removed = if old_path != new_path { vec![old_path] } else { Vec::new() };
    session.record("edit", &updated.id.to_string(), &[new_path], &removed);

    if output.is_json() {
        output.data(&updated);
    } else {
        output.success(&format!("Updated task {}", updated.id));
    }
    Ok(())
}

fn archive_task(session: &Session, output: &Output, id: &str) -> Result<()> {
    let store = session.store();
    let id: TaskId = id.parse()?;
    let old_path = store.find(&id)?;

    let archived = store.archive(&id)?;
    let removed: Vec<_> = old_path.into_iter().collect();
    session.record("archive", &id.to_string(), &[archived.clone()], &removed);

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id,
            "file": archived,
        }));
    } else {
        output.success(&format!("Archived task {}", id));
    }
    Ok(())
}
