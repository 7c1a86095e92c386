//! Filtering, sorting and pagination for task listings
//!
//! Everything here works on an in-memory slice; [`super::TaskStore::list`]
//! loads the folder and hands the tasks over.

use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::domain::{DependencyGraph, Priority, Status, Task, TaskId};

/// Field a listing can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Title,
    Status,
    /// Highest priority first
    Priority,
    Created,
    Updated,
}

impl FromStr for SortKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(SortKey::Id),
            "title" => Ok(SortKey::Title),
            "status" => Ok(SortKey::Status),
            "priority" => Ok(SortKey::Priority),
            "created" | "created_at" => Ok(SortKey::Created),
            "updated" | "updated_at" => Ok(SortKey::Updated),
            _ => Err(()),
        }
    }
}

impl SortKey {
    /// Parses a comma separated key list, skipping unknown names
    pub fn parse_list(raw: &str) -> Vec<SortKey> {
        raw.split(',').filter_map(|k| k.parse().ok()).collect()
    }

    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Status => a.status.cmp(&b.status),
            SortKey::Priority => b.priority.cmp(&a.priority),
            SortKey::Created => a.created_at.cmp(&b.created_at),
            SortKey::Updated => a.updated_at.cmp(&b.updated_at),
        }
    }
}

/// Filters, ordering and paging for `list` and `search`
///
/// Set-valued filters match when the task shares at least one value with
/// the filter. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub statuses: Vec<Status>,
    pub assigned: Vec<String>,
    pub labels: Vec<String>,
    pub parent: Option<TaskId>,
    pub priority: Option<Priority>,
    pub unassigned: bool,
    pub has_dependency: bool,
    pub depended_on: bool,
    pub sort: Vec<SortKey>,
    pub reverse: bool,
    /// Zero means no limit
    pub limit: usize,
    pub offset: usize,
}

/// Paging metadata for a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total_results: usize,
    pub displayed_results: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// A page of tasks plus its metadata
#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}

/// Applies filters, ordering and paging
pub fn apply(tasks: Vec<Task>, params: &ListParams) -> ListResult {
    let graph = params
        .depended_on
        .then(|| DependencyGraph::from_tasks(&tasks));

    let mut filtered: Vec<Task> = tasks
        .into_iter()
        .filter(|t| matches_filters(t, params, graph.as_ref()))
        .collect();

    sort(&mut filtered, &params.sort, params.reverse);
    paginate(filtered, params.limit, params.offset)
}

fn matches_filters(task: &Task, params: &ListParams, graph: Option<&DependencyGraph>) -> bool {
    if !params.statuses.is_empty() && !params.statuses.contains(&task.status) {
        return false;
    }
    if let Some(parent) = &params.parent {
        if task.parent.as_ref() != Some(parent) {
            return false;
        }
    }
    if let Some(priority) = params.priority {
        if task.priority != priority {
            return false;
        }
    }
    if params.unassigned && !task.is_unassigned() {
        return false;
    }
    if !params.assigned.is_empty() && !intersects(&task.assigned, &params.assigned) {
        return false;
    }
    if !params.labels.is_empty() && !intersects(&task.labels, &params.labels) {
        return false;
    }
    if params.has_dependency && task.dependencies.is_empty() {
        return false;
    }
    if let Some(graph) = graph {
        if !graph.has_dependents(&task.id) {
            return false;
        }
    }
    true
}

fn intersects(have: &[String], want: &[String]) -> bool {
    have.iter().any(|h| want.iter().any(|w| w.trim() == h.trim()))
}

/// Case-insensitive substring match over every text field
pub fn matches_query(task: &Task, query: &str) -> bool {
    let needle = query.to_lowercase();
    let hit = |s: &str| s.to_lowercase().contains(&needle);

    hit(&task.title)
        || hit(&task.description)
        || hit(&task.plan)
        || hit(&task.notes)
        || task.acceptance_criteria.iter().any(|ac| hit(&ac.text))
        || task.labels.iter().any(|l| hit(l))
        || task.assigned.iter().any(|a| hit(a))
}

/// Stable multi-key sort; ties always fall back to ID ascending
///
/// `reverse` flips the keys, not the tie-break. With no keys the ID itself
/// is the key.
pub fn sort(tasks: &mut [Task], keys: &[SortKey], reverse: bool) {
    let keys = if keys.is_empty() { &[SortKey::Id][..] } else { keys };

    tasks.sort_by(|a, b| {
        let by_keys = keys
            .iter()
            .map(|k| k.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal);
        let by_keys = if reverse { by_keys.reverse() } else { by_keys };
        by_keys.then_with(|| a.id.cmp(&b.id))
    });
}

pub fn paginate(tasks: Vec<Task>, limit: usize, offset: usize) -> ListResult {
    let total = tasks.len();
    let start = offset.min(total);
    let end = if limit == 0 { total } else { (start + limit).min(total) };

    let page: Vec<Task> = tasks.into_iter().skip(start).take(end - start).collect();

    ListResult {
        pagination: Pagination {
            total_results: total,
            displayed_results: page.len(),
            offset,
            limit,
            has_more: end < total,
        },
        tasks: page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn task(i: &str, title: &str) -> Task {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Task::new(id(i), title, created)
    }

    fn ids(result: &ListResult) -> Vec<String> {
        result.tasks.iter().map(|t| t.id.to_string()).collect()
    }

    fn fixture() -> Vec<Task> {
        let mut a = task("T2", "Beta");
        a.priority = Priority::High;
        a.labels = vec!["api".into()];
        a.assigned = vec!["ana".into()];

        let mut b = task("T1", "alpha");
        b.status = Status::Done;
        b.dependencies = vec![id("T2")];

        let mut c = task("T1.1", "Gamma");
        c.parent = Some(id("T1"));
        c.priority = Priority::High;
        c.labels = vec!["ui".into(), "api".into()];
        c.notes = "Talk to the Design team".into();

        vec![a, b, c]
    }

    #[test]
    fn default_order_is_by_id() {
        let result = apply(fixture(), &ListParams::default());
        assert_eq!(ids(&result), vec!["T1", "T1.1", "T2"]);
    }

    #[test]
    fn priority_sorts_high_first_with_id_tiebreak() {
        let params = ListParams {
            sort: SortKey::parse_list("priority,bogus"),
            ..Default::default()
        };
        let result = apply(fixture(), &params);
        assert_eq!(ids(&result), vec!["T1.1", "T2", "T1"]);
    }

    #[test]
    fn title_sort_ignores_case_and_reverse_flips() {
        let params = ListParams {
            sort: vec![SortKey::Title],
            reverse: true,
            ..Default::default()
        };
        let result = apply(fixture(), &params);
        assert_eq!(ids(&result), vec!["T1.1", "T2", "T1"]);
    }

    #[test]
    fn reverse_keeps_ties_in_id_order() {
        let params = ListParams {
            sort: vec![SortKey::Priority],
            reverse: true,
            ..Default::default()
        };
        let result = apply(fixture(), &params);
        assert_eq!(ids(&result), vec!["T1", "T1.1", "T2"]);

        let params = ListParams {
            reverse: true,
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T2", "T1.1", "T1"]);
    }

    #[test]
    fn filters_combine() {
        let params = ListParams {
            labels: vec!["api".into()],
            priority: Some(Priority::High),
            parent: Some(id("T1")),
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T1.1"]);

        let params = ListParams {
            statuses: vec![Status::Done],
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T1"]);

        let params = ListParams {
            unassigned: true,
            has_dependency: true,
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T1"]);

        let params = ListParams {
            assigned: vec!["ana".into()],
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T2"]);
    }

    #[test]
    fn depended_on_filter() {
        let params = ListParams {
            depended_on: true,
            ..Default::default()
        };
        assert_eq!(ids(&apply(fixture(), &params)), vec!["T2"]);
    }

    #[test]
    fn query_matches_any_text_field() {
        let tasks = fixture();
        assert!(matches_query(&tasks[2], "design TEAM"));
        assert!(matches_query(&tasks[0], "AP"));
        assert!(!matches_query(&tasks[1], "gamma"));
    }

    #[test]
    fn pagination_metadata() {
        let params = ListParams {
            limit: 2,
            offset: 1,
            ..Default::default()
        };
        let result = apply(fixture(), &params);

        assert_eq!(ids(&result), vec!["T1.1", "T2"]);
        assert_eq!(
            result.pagination,
            Pagination {
                total_results: 3,
                displayed_results: 2,
                offset: 1,
                limit: 2,
                has_more: false,
            }
        );

        let result = paginate(fixture(), 1, 0);
        assert!(result.pagination.has_more);

        let result = paginate(fixture(), 0, 10);
        assert!(result.tasks.is_empty());
        assert_eq!(result.pagination.total_results, 3);
    }
}
