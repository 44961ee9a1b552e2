//! Plugin descriptors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use super::PluginError;
use crate::events::Ctx;
use crate::permissions::{Midware, Reason};
use crate::utils::now_millis;

/// A plugin action.
pub type ExecFn = Arc<dyn Fn(Arc<Ctx>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// What triggers a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginKind {
    /// Runs when the text's first token matches one of the literals.
    Command(Vec<String>),
    /// Runs on every event its gate lets through.
    Listener,
}

/// A registered unit of behavior.
#[derive(Clone)]
pub struct Plugin {
    pub kind: PluginKind,
    pub no_prefix: bool,
    pub desc: String,
    pub cat: String,
    pub tags: Vec<String>,
    pub disabled: bool,
    pub hidden: bool,
    /// Staleness limit in seconds; 0 disables it.
    pub timeout: u64,
    pub midware: Option<Midware>,
    /// Origin unit, set on registration.
    pub location: String,
    exec: ExecFn,
}

impl Plugin {
    pub fn builder() -> PluginBuilder {
        PluginBuilder::default()
    }

    pub fn is_listener(&self) -> bool {
        matches!(self.kind, PluginKind::Listener)
    }

    /// Command literals, empty for listeners.
    pub fn commands(&self) -> &[String] {
        match &self.kind {
            PluginKind::Command(literals) => literals,
            PluginKind::Listener => &[],
        }
    }

    /// Decide whether the plugin may run for `ctx`.
    pub fn check(&self, ctx: &Ctx) -> Reason {
        self.check_at(ctx, now_millis())
    }

    /// [`check`](Self::check) with an explicit clock.
    pub fn check_at(&self, ctx: &Ctx, now: i64) -> Reason {
        if self.disabled {
            return Reason::fail("plugin-disabled")
                .author(&self.location)
                .message("plugin is disabled");
        }

        if let Some(limit) = self.timeout_millis() {
            let age = now.saturating_sub(ctx.timestamp);
            if age > limit {
                return Reason::fail("plugin-timeout")
                    .author(&self.location)
                    .message(format!("event is {}ms old", age))
                    .data(json!({ "age_ms": age, "limit_ms": limit }));
            }
        }

        if let Some(midware) = &self.midware {
            return midware(ctx);
        }

        Reason::pass("plugin-checker").author(&self.location)
    }

    /// Staleness limit in milliseconds. `None` when unset or too large to
    /// represent, both of which mean no limit.
    fn timeout_millis(&self) -> Option<i64> {
        if self.timeout == 0 {
            return None;
        }
        i64::try_from(self.timeout).ok()?.checked_mul(1000)
    }

    pub async fn exec(&self, ctx: Arc<Ctx>) -> anyhow::Result<()> {
        (self.exec)(ctx).await
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("kind", &self.kind)
            .field("no_prefix", &self.no_prefix)
            .field("cat", &self.cat)
            .field("disabled", &self.disabled)
            .field("timeout", &self.timeout)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Builder validating a plugin before it can be registered.
#[derive(Default)]
pub struct PluginBuilder {
    commands: Option<Vec<String>>,
    no_prefix: bool,
    desc: String,
    cat: Option<String>,
    tags: Vec<String>,
    disabled: bool,
    hidden: bool,
    timeout: u64,
    midware: Option<Midware>,
    exec: Option<ExecFn>,
}

impl PluginBuilder {
    /// Add a command literal. Without any, the plugin is a listener.
    pub fn command(mut self, literal: impl Into<String>) -> Self {
        self.commands.get_or_insert_with(Vec::new).push(literal.into());
        self
    }

    pub fn commands<I, S>(mut self, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands
            .get_or_insert_with(Vec::new)
            .extend(literals.into_iter().map(Into::into));
        self
    }

    pub fn no_prefix(mut self, no_prefix: bool) -> Self {
        self.no_prefix = no_prefix;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn cat(mut self, cat: impl Into<String>) -> Self {
        self.cat = Some(cat.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn midware(mut self, midware: Midware) -> Self {
        self.midware = Some(midware);
        self
    }

    pub fn exec<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.exec = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    pub fn build(self) -> Result<Plugin, PluginError> {
        let exec = self.exec.ok_or(PluginError::MissingExec)?;

        let kind = match self.commands {
            None => PluginKind::Listener,
            Some(literals) => {
                let literals: Vec<String> = literals
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                if literals.is_empty() {
                    return Err(PluginError::EmptyCommand);
                }
                PluginKind::Command(literals)
            }
        };

        Ok(Plugin {
            kind,
            no_prefix: self.no_prefix,
            desc: self.desc,
            cat: self.cat.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            tags: self.tags,
            disabled: self.disabled,
            hidden: self.hidden,
            timeout: self.timeout,
            midware: self.midware,
            location: String::new(),
            exec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Handler;
    use crate::events::{EventName, EventType};
    use crate::permissions::midware::{from_me, gate};
    use crate::socket::testing::RecordingSocket;
    use serde_json::json;

    fn ctx_at(timestamp_secs: i64, from_me: bool) -> Ctx {
        let handler = Handler::builder(Arc::new(RecordingSocket::new(
            "628000@s.whatsapp.net",
            "9000@lid",
        )))
        .build();
        Ctx::build(
            json!({
                "key": {"remoteJid": "628111@s.whatsapp.net", "fromMe": from_me, "id": "3EB0AA"},
                "message": {"conversation": ".ping"},
                "messageTimestamp": timestamp_secs
            }),
            EventName::MessagesUpsert,
            Some(EventType::Notify),
            &handler,
        )
    }

    fn noop() -> PluginBuilder {
        Plugin::builder().exec(|_| async { Ok(()) })
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            Plugin::builder().command("ping").build(),
            Err(PluginError::MissingExec)
        ));
        assert!(matches!(
            noop().commands(Vec::<String>::new()).build(),
            Err(PluginError::EmptyCommand)
        ));
        assert!(matches!(noop().command("  ").build(), Err(PluginError::EmptyCommand)));

        let listener = noop().build().unwrap();
        assert!(listener.is_listener());
        assert_eq!(listener.cat, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_disabled_fails_first() {
        let plugin = noop().disabled(true).timeout(1).build().unwrap();
        let ctx = ctx_at(0, false);
        assert_eq!(plugin.check(&ctx).code, "plugin-disabled");
    }

    #[test]
    fn test_timeout_rejects_stale_events() {
        let plugin = noop()
            .timeout(5)
            .midware(gate(|_: &Ctx| Reason::pass("reached-midware")))
            .build()
            .unwrap();
        let ctx = ctx_at(1_700_000_000, false);
        let sent = ctx.timestamp;

        let stale = plugin.check_at(&ctx, sent + 6000);
        assert!(!stale.success);
        assert_eq!(stale.code, "plugin-timeout");
        assert_eq!(stale.data, Some(json!({"age_ms": 6000, "limit_ms": 5000})));

        let fresh = plugin.check_at(&ctx, sent + 4000);
        assert!(fresh.success);
        assert_eq!(fresh.code, "reached-midware");
    }

    #[test]
    fn test_huge_timeout_means_no_limit() {
        let ctx = ctx_at(1_700_000_000, false);
        for secs in [u64::MAX, i64::MAX as u64, i64::MAX as u64 / 1000 + 1] {
            let plugin = noop().timeout(secs).build().unwrap();
            let reason = plugin.check_at(&ctx, i64::MAX);
            assert!(reason.success, "timeout {} rejected the event", secs);
        }

        let plugin = noop().timeout(5).build().unwrap();
        let reason = plugin.check_at(&ctx, i64::MIN);
        assert!(reason.success);
        assert_eq!(plugin.check_at(&ctx, i64::MAX).code, "plugin-timeout");
    }

    #[test]
    fn test_midware_reason_is_returned_verbatim() {
        let plugin = noop().midware(from_me()).build().unwrap();
        let reason = plugin.check(&ctx_at(1_700_000_000, false));
        assert!(!reason.success);
        assert_eq!(reason.code, "from-me");

        let open = noop().build().unwrap();
        assert_eq!(open.check(&ctx_at(1_700_000_000, false)).code, "plugin-checker");
    }
}
