//! Quick action inspection.

use std::collections::HashMap;

use colored::Colorize;
use serde_json::json;

use super::Context;
use crate::cli::args::{ActionsCommands, OutputFormat};
use crate::error::ResyncError;
use crate::features::dispatch::{ActionKind, ActionRegistry};
use crate::output::to_json;

/// Execute actions subcommands.
///
/// # Errors
///
/// Returns an error if the registry cannot be loaded, an id is unknown or
/// the usage store fails.
pub fn actions(ctx: &Context, cmd: ActionsCommands, format: OutputFormat) -> Result<String, ResyncError> {
    let registry = ActionRegistry::load(&ctx.paths.actions_file)?;

    match cmd {
        ActionsCommands::List => list_actions(ctx, &registry, format),
        ActionsCommands::Top { limit } => top_actions(ctx, &registry, limit, format),
        ActionsCommands::Pin { id } => {
            require_known(&registry, &id)?;
            ctx.usage.pin(&id)?;
            match format {
                OutputFormat::Json => to_json(&json!({ "pinned": ctx.usage.pinned()? })),
                OutputFormat::Pretty => Ok(format!("Pinned {id}")),
            }
        }
        ActionsCommands::Unpin { id } => {
            let removed = ctx.usage.unpin(&id)?;
            match format {
                OutputFormat::Json => to_json(&json!({ "pinned": ctx.usage.pinned()? })),
                OutputFormat::Pretty if removed => Ok(format!("Unpinned {id}")),
                OutputFormat::Pretty => Ok(format!("{id} was not pinned")),
            }
        }
    }
}

fn require_known(registry: &ActionRegistry, id: &str) -> Result<(), ResyncError> {
    registry
        .get(id)
        .map(|_| ())
        .ok_or_else(|| ResyncError::NotFound(format!("quick action '{id}'")))
}

fn list_actions(ctx: &Context, registry: &ActionRegistry, format: OutputFormat) -> Result<String, ResyncError> {
    let pinned = ctx.usage.pinned()?;
    let counts: HashMap<String, usize> = ctx
        .usage
        .prioritized(usize::MAX)?
        .into_iter()
        .map(|u| (u.action_id, u.count))
        .collect();

    if format == OutputFormat::Json {
        let items: Vec<_> = registry
            .list()
            .iter()
            .map(|action| {
                json!({
                    "action": action,
                    "uses": counts.get(&action.id).copied().unwrap_or(0),
                    "pinned": pinned.contains(&action.id),
                })
            })
            .collect();
        return to_json(&json!({ "count": items.len(), "items": items }));
    }

    if registry.list().is_empty() {
        return Ok(format!(
            "No quick actions registered ({})",
            ctx.paths.actions_file.display()
        ));
    }

    let mut output = format!("Quick actions ({})\n", registry.list().len());
    output.push_str(&"─".repeat(60));
    for action in registry.list() {
        let pin = if pinned.contains(&action.id) {
            "★".yellow()
        } else {
            " ".normal()
        };
        let target = match &action.kind {
            ActionKind::Navigate { route } => format!("→ {route}"),
            ActionKind::Server { action } => format!("⚡ {action}"),
        };
        let online = if action.requires_online {
            " (online)".dimmed().to_string()
        } else {
            String::new()
        };
        let uses = counts.get(&action.id).copied().unwrap_or(0);

        output.push_str(&format!(
            "\n{pin} {:<20} {:<24} {}{online}",
            action.id.bold(),
            target,
            format!("{uses} uses").dimmed()
        ));
    }

    Ok(output)
}

fn top_actions(
    ctx: &Context,
    registry: &ActionRegistry,
    limit: usize,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    // Usage of actions since removed from the registry is not shown
    let ranked: Vec<_> = ctx
        .usage
        .prioritized(usize::MAX)?
        .into_iter()
        .filter(|u| registry.get(&u.action_id).is_some())
        .take(limit)
        .collect();

    match format {
        OutputFormat::Json => to_json(&ranked),
        OutputFormat::Pretty if ranked.is_empty() => Ok("No quick action usage yet.".to_string()),
        OutputFormat::Pretty => Ok(ranked
            .iter()
            .enumerate()
            .map(|(i, usage)| {
                let label = registry
                    .get(&usage.action_id)
                    .map_or(usage.action_id.as_str(), |a| a.label.as_str());
                format!(
                    "{}. {label} {}",
                    i + 1,
                    format!(
                        "({} uses, last {})",
                        usage.count,
                        usage.last_used.format("%Y-%m-%d %H:%M")
                    )
                    .dimmed()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REGISTRY: &str = r"
actions:
  - id: new-note
    label: New note
    kind: navigate
    route: /notes/new
  - id: share
    label: Share property
    requires_online: true
    kind: server
    action: share_property
";

    fn context() -> (TempDir, Context) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("actions.yaml"), REGISTRY).unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        (temp, ctx)
    }

    #[test]
    fn test_list_includes_usage_and_pins() {
        let (_temp, ctx) = context();
        ctx.usage.record("share").unwrap();
        ctx.usage.record("share").unwrap();
        actions(&ctx, ActionsCommands::Pin { id: "new-note".to_string() }, OutputFormat::Pretty).unwrap();

        let output = actions(&ctx, ActionsCommands::List, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["items"][0]["action"]["id"], "new-note");
        assert_eq!(parsed["items"][0]["pinned"], true);
        assert_eq!(parsed["items"][1]["uses"], 2);
        assert_eq!(parsed["items"][1]["action"]["kind"], "server");
    }

    #[test]
    fn test_top_ranks_and_skips_unknown() {
        let (_temp, ctx) = context();
        ctx.usage.record("new-note").unwrap();
        ctx.usage.record("removed-action").unwrap();
        ctx.usage.record("removed-action").unwrap();
        ctx.usage.record("share").unwrap();

        let output = actions(&ctx, ActionsCommands::Top { limit: 5 }, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let ids: Vec<_> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["action_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["share", "new-note"]);
    }

    #[test]
    fn test_pin_unknown_action() {
        let (_temp, ctx) = context();
        let result = actions(&ctx, ActionsCommands::Pin { id: "nope".to_string() }, OutputFormat::Pretty);
        assert!(matches!(result, Err(ResyncError::NotFound(_))));
    }

    #[test]
    fn test_unpin() {
        let (_temp, ctx) = context();
        ctx.usage.pin("share").unwrap();

        let output = actions(&ctx, ActionsCommands::Unpin { id: "share".to_string() }, OutputFormat::Pretty).unwrap();
        assert_eq!(output, "Unpinned share");
        let output = actions(&ctx, ActionsCommands::Unpin { id: "share".to_string() }, OutputFormat::Pretty).unwrap();
        assert_eq!(output, "share was not pinned");
    }

    #[test]
    fn test_empty_registry() {
        let temp = TempDir::new().unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        let output = actions(&ctx, ActionsCommands::Top { limit: 3 }, OutputFormat::Pretty).unwrap();
        assert_eq!(output, "No quick action usage yet.");
    }
}
