//! `backlog doctor`: report and repair ID conflicts

use anyhow::{Context, Result};

use super::output::Output;
use super::session::Session;
use crate::conflict::{ConflictDetector, ConflictResolver};
use crate::domain::{ActionKind, Strategy};

pub fn run(
    session: &Session,
    output: &Output,
    fix: bool,
    strategy: Option<Strategy>,
    dry_run: bool,
) -> Result<()> {
    let store = session.store();
    let detector = ConflictDetector::new(&store);
    let scan = detector.scan().context("Failed to scan task folder")?;
    let summary = detector.summarize_conflicts(&scan.conflicts);

    if !fix {
        if output.is_json() {
            output.data(&serde_json::json!({
                "conflicts": scan.conflicts,
                "malformed": scan.malformed,
                "summary": summary,
            }));
            return Ok(());
        }

        if scan.is_clean() {
            output.success(&format!("No conflicts in {} tasks", scan.scanned));
            return Ok(());
        }

        output.line(&format!(
            "Found {} conflict(s): {} duplicate ID, {} orphaned, {} invalid hierarchy",
            summary.total, summary.duplicate_ids, summary.orphaned_children, summary.invalid_hierarchy
        ));
        for conflict in &scan.conflicts {
            output.line(&format!("  [{}] {}", conflict.kind, conflict.description));
        }
        for bad in &scan.malformed {
            output.line(&format!("  [malformed] {}: {}", bad.path.display(), bad.reason));
        }
        if !scan.conflicts.is_empty() {
            output.blank();
            output.line("Run 'backlog doctor --fix' to repair");
        }
        return Ok(());
    }

    let strategy = strategy.unwrap_or(session.config().project.default_strategy);
    let resolver = ConflictResolver::new(&store);
    let plan = resolver
        .create_resolution_plan(&scan.conflicts, strategy)
        .context("Failed to create resolution plan")?;

    if plan.is_empty() {
        if output.is_json() {
            output.data(&serde_json::json!({ "plan": plan, "results": [] }));
        } else {
            output.success("Nothing to fix");
        }
        return Ok(());
    }

    let outcome = resolver.execute_with_references(&plan, dry_run);
    let (lines, failure) = match outcome {
        Ok(lines) => (lines, None),
        Err(e) => (e.completed.clone(), Some(e)),
    };

    if !dry_run && !plan.is_manual_only() {
        let dir = store.dir().to_path_buf();
        session.record("doctor", plan.strategy.as_str(), &[dir.clone()], &[dir]);
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "plan": plan,
            "results": lines,
            "dry_run": dry_run,
        }));
    } else {
        output.line(&plan.summary);
        for line in &lines {
            output.line(&format!("  {}", line));
        }
    }

    if let Some(e) = failure {
        return Err(anyhow::Error::new(e)
            .context("Resolution stopped partway; run 'backlog doctor' again before retrying"));
    }

    let manual = plan.count(ActionKind::Manual);
    if manual > 0 {
        anyhow::bail!("{} conflict(s) need manual resolution", manual);
    }

    Ok(())
}
