//! Prefix command plugin.
//!
//! `prefix` shows the active prefixes, `prefix+ ! #` adds, `prefix- #`
//! removes. Changes are persisted in the settings store under `prefix` and
//! restored by the preload hook on the next start.

use std::sync::Arc;

use tracing::debug;

use super::{Plugin, PluginError, PluginUnit};
use crate::bot::Handler;
use crate::events::{Ctx, EventName};
use crate::permissions::midware::{event_is, from_me, from_owner};
use crate::permissions::{midware_and, midware_or};
use crate::store::StoreExt;

pub const LOCATION: &str = "builtin://prefix";
pub const SETTINGS_KEY: &str = "prefix";

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .commands(["prefix", "prefix+", "prefix-", "pre", "pre+", "pre-"])
        .timeout(15)
        .cat("system")
        .tags(["system"])
        .desc("Show, add or remove command prefixes (split with space).")
        .midware(midware_and([
            event_is(&[EventName::MessagesUpsert]),
            midware_or([from_me(), from_owner()]),
        ]))
        .exec(prefix_command)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]).with_preload(preload))
}

/// Restore persisted prefixes, or seed the store with the configured ones.
fn preload(handler: &Handler) -> anyhow::Result<()> {
    match handler.settings().get_as::<Vec<String>>(SETTINGS_KEY)? {
        Some(saved) if !saved.is_empty() => {
            debug!("Restoring prefixes {:?}", saved);
            handler.set_prefix(saved);
        }
        _ => {
            let current = handler.prefixes();
            handler.settings().set_as(SETTINGS_KEY, &current)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Show,
    Add,
    Remove,
}

async fn prefix_command(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let pattern = ctx.pattern.as_deref().unwrap_or("prefix");
    let change = if pattern.ends_with('+') {
        Change::Add
    } else if pattern.ends_with('-') {
        Change::Remove
    } else {
        Change::Show
    };
    let base = pattern.trim_end_matches(['+', '-']);

    let mut requested: Vec<String> = Vec::new();
    for p in ctx.args.as_deref().unwrap_or("").split_whitespace() {
        if !requested.iter().any(|r| r == p) {
            requested.push(p.to_string());
        }
    }

    let handler = ctx.handler();
    let current = handler.prefixes();
    let updated = apply_change(&current, &requested, change);

    if change != Change::Show && !requested.is_empty() {
        if updated.is_empty() {
            ctx.reply("At least one prefix must remain.").await?;
            return Ok(());
        }
        handler.settings().set_as(SETTINGS_KEY, &updated)?;
        handler.set_prefix(updated.clone());
    }

    let list = updated
        .iter()
        .map(|p| format!("`{}`", p))
        .collect::<Vec<_>>()
        .join(", ");

    let header = match change {
        Change::Add if !requested.is_empty() => format!("Prefix *added* : {}", requested.join(", ")),
        Change::Remove if !requested.is_empty() => {
            format!("Prefix *removed* : {}", requested.join(", "))
        }
        _ => "Current prefix list :".to_string(),
    };

    ctx.reply(format!(
        "{}\n{}\n\nNB :\n  *{}+* _to add_\n  *{}-* _to remove_\n\n_Split multiple prefix with space_",
        header, list, base, base
    ))
    .await?;

    Ok(())
}

fn apply_change(current: &[String], requested: &[String], change: Change) -> Vec<String> {
    match change {
        Change::Show => current.to_vec(),
        Change::Add => {
            let mut updated = current.to_vec();
            updated.extend(requested.iter().filter(|r| !current.contains(r)).cloned());
            updated
        }
        Change::Remove => current
            .iter()
            .filter(|p| !requested.contains(p))
            .cloned()
            .collect(),
    }
}
