//! Plugin units and TOML manifests.
//!
//! A unit is what one location contributes: a list of plugins plus an
//! optional preload hook. Units come from two places, built-ins compiled
//! into the binary and `*.toml` manifests found under the plugin directory.
//!
//! A manifest holds one plugin at the top level:
//!
//! ```toml
//! cmd = ["hello", "hi"]
//! desc = "Say hello"
//! cat = "fun"
//! midware = { any = ["from_me", "from_owner"] }
//! action = "reply"
//! text = "Hello {name}!"
//! ```
//!
//! or several under `[[plugin]]` tables.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::{Plugin, PluginError};
use crate::bot::Handler;
use crate::events::{Ctx, EventName};
use crate::permissions::midware::{self, Midware};
use crate::socket::RelayOptions;

/// Hook run once when a unit is installed.
pub type PreloadFn = Arc<dyn Fn(&Handler) -> anyhow::Result<()> + Send + Sync>;

/// Everything one location contributes.
pub struct PluginUnit {
    pub location: String,
    pub plugins: Vec<Plugin>,
    pub preload: Option<PreloadFn>,
}

impl PluginUnit {
    pub fn new(location: impl Into<String>, plugins: Vec<Plugin>) -> Self {
        Self {
            location: location.into(),
            plugins,
            preload: None,
        }
    }

    #[must_use]
    pub fn with_preload<F>(mut self, preload: F) -> Self
    where
        F: Fn(&Handler) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.preload = Some(Arc::new(preload));
        self
    }
}

/// A string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// Gate expression in a manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GateSpec {
    /// A predefined gate such as `from_me`.
    Named(String),
    Expr(GateExpr),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateExpr {
    All(Vec<GateSpec>),
    Any(Vec<GateSpec>),
    Not(Box<GateSpec>),
    Event(Vec<String>),
    Chat(Vec<String>),
    Type(Vec<String>),
}

impl GateSpec {
    pub fn compile(&self) -> Result<Midware, String> {
        match self {
            Self::Named(name) => {
                midware::named(name).ok_or_else(|| format!("unknown gate `{}`", name))
            }
            Self::Expr(GateExpr::All(gates)) => Ok(midware::midware_and(compile_all(gates)?)),
            Self::Expr(GateExpr::Any(gates)) => Ok(midware::midware_or(compile_all(gates)?)),
            Self::Expr(GateExpr::Not(inner)) => Ok(midware::not(inner.compile()?)),
            Self::Expr(GateExpr::Event(names)) => {
                let names = names
                    .iter()
                    .map(|n| n.parse::<EventName>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(midware::event_is(&names))
            }
            Self::Expr(GateExpr::Chat(chats)) => {
                let chats: Vec<&str> = chats.iter().map(String::as_str).collect();
                Ok(midware::chat_is(&chats))
            }
            Self::Expr(GateExpr::Type(types)) => {
                let types: Vec<&str> = types.iter().map(String::as_str).collect();
                Ok(midware::type_is(&types))
            }
        }
    }
}

fn compile_all(gates: &[GateSpec]) -> Result<Vec<Midware>, String> {
    gates.iter().map(GateSpec::compile).collect()
}

#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    cmd: Option<OneOrMany>,
    #[serde(default)]
    no_prefix: bool,
    #[serde(default)]
    desc: String,
    cat: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    timeout: u64,
    midware: Option<GateSpec>,
    action: Option<String>,
    text: Option<String>,
    emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Many { plugin: Vec<Manifest> },
    One(Manifest),
}

/// What a manifest plugin does when it runs.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Reply(String),
    React(String),
    RelayQuoted,
}

impl Action {
    fn from_manifest(manifest: &Manifest) -> Result<Self, String> {
        match manifest.action.as_deref() {
            Some("reply") => manifest
                .text
                .clone()
                .map(Self::Reply)
                .ok_or_else(|| "`reply` needs `text`".to_string()),
            Some("react") => manifest
                .emoji
                .clone()
                .map(Self::React)
                .ok_or_else(|| "`react` needs `emoji`".to_string()),
            Some("relay-quoted") => Ok(Self::RelayQuoted),
            Some(other) => Err(format!("unknown action `{}`", other)),
            None => Err("missing `action`".to_string()),
        }
    }

    async fn run(self, ctx: Arc<Ctx>) -> anyhow::Result<()> {
        match self {
            Self::Reply(template) => {
                ctx.reply(render(&template, &ctx)).await?;
            }
            Self::React(emoji) => {
                ctx.react(&emoji).await?;
            }
            Self::RelayQuoted => {
                let (Some(chat), Some(quoted)) = (ctx.chat.as_deref(), ctx.quoted_message.clone())
                else {
                    ctx.reply("Reply to a message.").await?;
                    return Ok(());
                };
                ctx.relay_message(chat, quoted, RelayOptions::default()).await?;
            }
        }
        Ok(())
    }
}

/// Fill `{name}`, `{sender}`, `{chat}` and `{args}` placeholders.
fn render(template: &str, ctx: &Ctx) -> String {
    template
        .replace("{name}", ctx.sender_name.as_deref().unwrap_or(""))
        .replace("{sender}", ctx.sender.as_deref().unwrap_or(""))
        .replace("{chat}", ctx.chat_name.as_deref().or(ctx.chat.as_deref()).unwrap_or(""))
        .replace("{args}", ctx.args.as_deref().unwrap_or(""))
}

fn build_plugin(manifest: Manifest) -> Result<Plugin, String> {
    let action = Action::from_manifest(&manifest)?;
    let midware = manifest.midware.as_ref().map(GateSpec::compile).transpose()?;

    let mut builder = Plugin::builder()
        .no_prefix(manifest.no_prefix)
        .desc(manifest.desc)
        .tags(manifest.tags)
        .disabled(manifest.disabled)
        .hidden(manifest.hidden)
        .timeout(manifest.timeout)
        .exec(move |ctx| action.clone().run(ctx));

    if let Some(cmd) = manifest.cmd {
        builder = builder.commands(cmd.into_vec());
    }
    if let Some(cat) = manifest.cat {
        builder = builder.cat(cat);
    }
    if let Some(midware) = midware {
        builder = builder.midware(midware);
    }

    builder.build().map_err(|e| e.to_string())
}

/// Parse a manifest into plugins.
pub fn parse_manifest(source: &str, location: &str) -> Result<Vec<Plugin>, PluginError> {
    let file: ManifestFile = toml::from_str(source).map_err(|source| PluginError::Manifest {
        location: location.to_string(),
        source,
    })?;

    let manifests = match file {
        ManifestFile::Many { plugin } => plugin,
        ManifestFile::One(manifest) => vec![manifest],
    };

    manifests
        .into_iter()
        .enumerate()
        .map(|(i, manifest)| {
            build_plugin(manifest).map_err(|reason| PluginError::Invalid {
                location: format!("{}#{}", location, i),
                reason,
            })
        })
        .collect()
}

/// Load one manifest file.
pub fn load_file(path: &Path) -> Result<PluginUnit, PluginError> {
    let location = path.display().to_string();
    let source = fs::read_to_string(path).map_err(|source| PluginError::Io {
        location: location.clone(),
        source,
    })?;
    let plugins = parse_manifest(&source, &location)?;
    Ok(PluginUnit::new(location, plugins))
}

pub fn is_manifest(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

/// Find every manifest under `dir`, sorted.
pub fn scan_dir(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read plugin directory {}: {}", current.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_manifest(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

/// Load every manifest under `dir` into `handler`.
///
/// A unit that fails to load is logged and skipped.
pub fn load_dir(handler: &Handler, dir: &Path) -> usize {
    let mut loaded = 0;
    for path in scan_dir(dir) {
        match load_file(&path) {
            Ok(unit) => loaded += handler.install(unit),
            Err(e) => warn!("Skipping plugin unit: {}", e),
        }
    }
    info!("Loaded {} plugin(s) from {}", loaded, dir.display());
    loaded
}
