//! Menu command plugin.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Plugin, PluginError, PluginUnit};
use crate::bot::Handler;
use crate::events::Ctx;
use crate::permissions::midware::from_me;
use crate::utils::{format_elapse, now_millis};

pub const LOCATION: &str = "builtin://menu";

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .command("menu")
        .timeout(15)
        .cat("info")
        .desc("Show the menu of commands")
        .midware(from_me())
        .exec(menu_command)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]))
}

async fn menu_command(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let text = render_menu(ctx.handler(), ctx.pattern.as_deref().unwrap_or(""));
    ctx.reply(text).await?;
    Ok(())
}

/// Build the menu, showing commands with the prefix the caller used.
fn render_menu(handler: &Handler, pattern: &str) -> String {
    let registry = handler.registry().read();

    let prefix = registry
        .prefixes()
        .iter()
        .find(|p| pattern.starts_with(p.as_str()))
        .or_else(|| registry.prefixes().first())
        .cloned()
        .unwrap_or_default();

    let mut categories: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let commands = registry.commands();
    let mut count = 0;
    for plugin in &commands {
        if plugin.hidden || plugin.disabled {
            continue;
        }
        let Some(literal) = plugin.commands().first() else {
            continue;
        };
        let shown = if plugin.no_prefix {
            literal.clone()
        } else {
            format!("{}{}", prefix, literal)
        };
        categories.entry(plugin.cat.as_str()).or_default().push(shown);
        count += 1;
    }

    let mut lines = vec!["*# Available menu*".to_string()];
    lines.push(String::new());
    lines.push(format!(
        "Uptime: {}",
        format_elapse(now_millis() - handler.started_at())
    ));

    for (cat, entries) in &categories {
        lines.push(String::new());
        lines.push(format!("*# {}*", cat));
        lines.extend(entries.iter().map(|e| format!("  {}", e)));
    }

    lines.push(String::new());
    lines.push(format!(
        "{} cmd & {} listener",
        count,
        registry.listeners().len()
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::testing::RecordingSocket;

    #[test]
    fn test_menu_groups_by_category() {
        let handler = Handler::builder(Arc::new(RecordingSocket::new("1@s.whatsapp.net", "1@lid")))
            .prefixes(vec![".".into(), "/".into()])
            .build();
        handler.install(unit().unwrap());
        handler.install(PluginUnit::new(
            "mem://extra",
            vec![
                Plugin::builder().command("secret").hidden(true).exec(|_| async { Ok(()) }).build().unwrap(),
                Plugin::builder().command("raw").no_prefix(true).cat("fun").exec(|_| async { Ok(()) }).build().unwrap(),
                Plugin::builder().exec(|_| async { Ok(()) }).build().unwrap(),
            ],
        ));

        let text = render_menu(&handler, "/menu");
        assert!(text.contains("*# info*\n  /menu"));
        assert!(text.contains("*# fun*\n  raw"));
        assert!(!text.contains("secret"));
        assert!(text.ends_with("2 cmd & 1 listener"));
    }
}
