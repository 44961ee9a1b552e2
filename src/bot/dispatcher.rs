//! Event dispatcher.
//!
//! The [`Handler`] owns everything one dispatch pass needs: the plugin
//! registry, the derived caches and the send wrapper. Per raw event it
//! builds a [`Ctx`], refreshes derived state, runs every listener and then
//! the matching command, if any.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::recent::{DEFAULT_WINDOW, RecentIds};
use super::sender::Sender;
use super::updates::update_data;
use crate::cache::CacheRegistry;
use crate::events::{ContentKind, Ctx, EventBatch, EventName, EventType, jid};
use crate::permissions::Permissions;
use crate::plugins::{Plugin, PluginUnit, Registry};
use crate::socket::{BotIdentity, Socket};
use crate::store::{ContactRepo, GroupRepo, MemoryStore, Store, TimerRepo};
use crate::utils::now_millis;

/// Backing stores for the handler's caches.
#[derive(Clone)]
pub struct Stores {
    pub groups: Arc<dyn Store>,
    pub contacts: Arc<dyn Store>,
    pub timers: Arc<dyn Store>,
    pub settings: Arc<dyn Store>,
}

impl Stores {
    /// In-memory stores, nothing survives a restart.
    pub fn memory() -> Self {
        Self {
            groups: Arc::new(MemoryStore::new("group_metadata")),
            contacts: Arc::new(MemoryStore::new("contacts")),
            timers: Arc::new(MemoryStore::new("timer")),
            settings: Arc::new(MemoryStore::new("settings")),
        }
    }
}

/// Shared dispatch state.
#[derive(Clone)]
pub struct Handler {
    registry: Arc<RwLock<Registry>>,
    socket: Arc<dyn Socket>,
    sender: Sender,
    groups: Arc<GroupRepo>,
    contacts: Arc<ContactRepo>,
    timers: Arc<TimerRepo>,
    settings: Arc<dyn Store>,
    permissions: Permissions,
    cache: Arc<CacheRegistry>,
    recent: Arc<Mutex<RecentIds>>,
    started_at: i64,
}

/// Builder for [`Handler`].
pub struct HandlerBuilder {
    socket: Arc<dyn Socket>,
    stores: Option<Stores>,
    prefixes: Vec<String>,
    owners: Vec<String>,
    recent_window: usize,
}

impl HandlerBuilder {
    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    pub fn owners(mut self, owners: Vec<String>) -> Self {
        self.owners = owners;
        self
    }

    pub fn recent_window(mut self, size: usize) -> Self {
        self.recent_window = size;
        self
    }

    pub fn build(self) -> Handler {
        let stores = self.stores.unwrap_or_else(Stores::memory);
        let cache = Arc::new(CacheRegistry::new());

        let groups = Arc::new(GroupRepo::new(stores.groups, &cache));
        let contacts = Arc::new(ContactRepo::new(stores.contacts, &cache));
        let timers = Arc::new(TimerRepo::new(stores.timers));
        let sender = Sender::new(self.socket.clone(), timers.clone());

        Handler {
            registry: Arc::new(RwLock::new(Registry::new(self.prefixes))),
            socket: self.socket,
            sender,
            groups,
            contacts,
            timers,
            settings: stores.settings,
            permissions: Permissions::with_owners(self.owners),
            cache,
            recent: Arc::new(Mutex::new(RecentIds::new(self.recent_window))),
            started_at: now_millis(),
        }
    }
}

impl Handler {
    /// Start building a handler around a socket. Stores default to memory.
    pub fn builder(socket: Arc<dyn Socket>) -> HandlerBuilder {
        HandlerBuilder {
            socket,
            stores: None,
            prefixes: Vec::new(),
            owners: Vec::new(),
            recent_window: DEFAULT_WINDOW,
        }
    }

    pub fn identity(&self) -> BotIdentity {
        self.socket.identity()
    }

    pub fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn groups(&self) -> &GroupRepo {
        &self.groups
    }

    pub fn contacts(&self) -> &ContactRepo {
        &self.contacts
    }

    pub fn timers(&self) -> &TimerRepo {
        &self.timers
    }

    pub fn settings(&self) -> &dyn Store {
        self.settings.as_ref()
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    pub fn cache(&self) -> &CacheRegistry {
        &self.cache
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn is_command(&self, pattern: &str) -> bool {
        self.registry.read().is_command(pattern)
    }

    pub fn resolve(&self, pattern: &str) -> Option<Arc<Plugin>> {
        self.registry.read().resolve(pattern)
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.registry.read().prefixes().to_vec()
    }

    pub fn set_prefix(&self, prefixes: Vec<String>) {
        self.registry.write().set_prefix(prefixes);
    }

    /// Run a unit's preload hook and register its plugins.
    pub fn install(&self, unit: PluginUnit) -> usize {
        if let Some(preload) = &unit.preload
            && let Err(e) = preload(self)
        {
            warn!("Preload of {} failed: {:#}", unit.location, e);
        }
        self.registry
            .write()
            .register(&unit.location, unit.plugins)
            .len()
    }

    /// Drop every plugin registered from `location`.
    pub fn uninstall(&self, location: &str) -> usize {
        self.registry.write().unregister(location)
    }

    /// Dispatch every item of a batch, one after another.
    pub async fn handle(&self, batch: EventBatch) {
        debug!("Dispatching {} ({} item(s))", batch.name, batch.len());
        for item in batch.items {
            self.handle_event(item, batch.name, batch.event_type.clone())
                .await;
        }
    }

    /// Dispatch one raw event. Never fails; every step is caught and logged.
    pub async fn handle_event(
        &self,
        raw: Value,
        event_name: EventName,
        event_type: Option<EventType>,
    ) {
        // Warm the group cache so the context can resolve admin status.
        if event_name.is_message()
            && let Some(chat) = raw.pointer("/key/remoteJid").and_then(Value::as_str)
            && jid::is_group(chat)
        {
            self.groups.get_or_fetch(self.socket.as_ref(), chat).await;
        }

        let mut ctx = Ctx::build(raw, event_name, event_type, self);
        if event_name == EventName::MessagesUpsert
            && let Some(id) = ctx.id.as_deref()
        {
            ctx.duplicate = self.recent.lock().observe(id);
        }
        let ctx = Arc::new(ctx);

        if let Err(e) = update_data(self, &ctx).await {
            warn!("Failed to update derived data for {}: {:#}", event_name, e);
        }

        let listeners = self.registry.read().listeners();
        for plugin in listeners {
            run_plugin(&plugin, ctx.clone()).await;
        }

        if !ctx.is_cmd || is_unsafe(&ctx) {
            return;
        }
        let Some(plugin) = ctx.pattern.as_deref().and_then(|p| self.resolve(p)) else {
            return;
        };
        run_plugin(&plugin, ctx).await;
    }
}

/// Whether an event must not trigger a command.
fn is_unsafe(ctx: &Ctx) -> bool {
    ctx.event_type == Some(EventType::Append)
        || matches!(
            ctx.content_type,
            None | Some(ContentKind::SenderKeyDistribution)
        )
        || ctx.duplicate
}

/// Gate and execute one plugin, logging instead of propagating.
async fn run_plugin(plugin: &Plugin, ctx: Arc<Ctx>) {
    let reason = plugin.check(&ctx);
    if !reason.success {
        debug!(
            "Plugin {} skipped: {} {}",
            plugin.location, reason.code, reason.message
        );
        return;
    }

    if let Err(e) = plugin.exec(ctx).await {
        error!("Plugin {} failed: {:#}", plugin.location, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::midware::{from_me, gate};
    use crate::socket::testing::{RecordingSocket, SocketCall};
    use crate::store::{GroupMetadata, Participant, StoreExt};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ME: &str = "628000@s.whatsapp.net";
    const GROUP: &str = "120363@g.us";

    struct Counters {
        listener: Arc<AtomicUsize>,
        command: Arc<AtomicUsize>,
    }

    fn handler_with(socket: Arc<RecordingSocket>) -> (Handler, Counters) {
        let handler = Handler::builder(socket)
            .prefixes(vec![".".into()])
            .build();

        let listener = Arc::new(AtomicUsize::new(0));
        let command = Arc::new(AtomicUsize::new(0));
        let (l, c) = (listener.clone(), command.clone());

        handler.install(PluginUnit::new(
            "test://counters",
            vec![
                Plugin::builder()
                    .exec(move |_| {
                        let l = l.clone();
                        async move {
                            l.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build()
                    .unwrap(),
                Plugin::builder()
                    .command("count")
                    .exec(move |_| {
                        let c = c.clone();
                        async move {
                            c.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build()
                    .unwrap(),
            ],
        ));

        (handler, Counters { listener, command })
    }

    async fn boom(_: Arc<Ctx>) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn echo(ctx: Arc<Ctx>) -> anyhow::Result<()> {
        ctx.reply(ctx.args.clone().unwrap_or_default()).await?;
        Ok(())
    }

    fn message(id: &str, text: &str) -> Value {
        json!({
            "key": {"remoteJid": "628111@s.whatsapp.net", "fromMe": false, "id": id},
            "message": {"conversation": text}
        })
    }

    fn upsert(items: Vec<Value>, kind: &str) -> EventBatch {
        EventBatch::from_raw(
            EventName::MessagesUpsert,
            json!({"type": kind, "messages": items}),
        )
    }

    #[tokio::test]
    async fn test_duplicate_id_suppresses_command_only() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let (handler, counters) = handler_with(socket);

        handler
            .handle(upsert(vec![message("3EB0A1", ".count"), message("3EB0A1", ".count")], "notify"))
            .await;

        assert_eq!(counters.listener.load(Ordering::SeqCst), 2);
        assert_eq!(counters.command.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_append_and_housekeeping_do_not_trigger_commands() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let (handler, counters) = handler_with(socket);

        handler.handle(upsert(vec![message("3EB0A2", ".count")], "append")).await;
        handler
            .handle(upsert(
                vec![json!({
                    "key": {"remoteJid": "628111@s.whatsapp.net", "id": "3EB0A3"},
                    "message": {"senderKeyDistributionMessage": {"groupId": GROUP}}
                })],
                "notify",
            ))
            .await;

        assert_eq!(counters.listener.load(Ordering::SeqCst), 2);
        assert_eq!(counters.command.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let handler = Handler::builder(socket).prefixes(vec![".".into()]).build();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();

        handler.install(PluginUnit::new(
            "test://failing",
            vec![
                Plugin::builder().exec(boom).build().unwrap(),
                Plugin::builder()
                    .midware(gate(|_: &Ctx| false))
                    .exec(boom)
                    .build()
                    .unwrap(),
                Plugin::builder()
                    .exec(move |_| {
                        let r = r.clone();
                        async move {
                            r.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build()
                    .unwrap(),
            ],
        ));

        handler
            .handle(upsert(vec![message("3EB0A4", "hello")], "notify"))
            .await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gated_command_replies() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let handler = Handler::builder(socket.clone()).prefixes(vec![".".into()]).build();
        handler.install(PluginUnit::new(
            "test://echo",
            vec![Plugin::builder()
                .command("echo")
                .midware(from_me())
                .exec(echo)
                .build()
                .unwrap()],
        ));

        handler
            .handle(upsert(vec![message("3EB0A5", ".echo not mine")], "notify"))
            .await;
        assert!(socket.calls().is_empty());

        handler
            .handle(upsert(
                vec![json!({
                    "key": {"remoteJid": "628111@s.whatsapp.net", "fromMe": true, "id": "3EB0A6"},
                    "message": {"conversation": ".ECHO hi"}
                })],
                "notify",
            ))
            .await;

        let calls = socket.calls();
        assert_eq!(calls.len(), 1);
        let SocketCall::Send { jid, content, options } = &calls[0] else {
            panic!("expected a send");
        };
        assert_eq!(jid, "628111@s.whatsapp.net");
        assert_eq!(content, &json!({"text": "hi"}));
        assert!(options.quoted.is_some());
    }

    #[tokio::test]
    async fn test_group_events_refresh_metadata_and_timer() {
        let socket = Arc::new(
            RecordingSocket::new(ME, "9000@lid").with_group(GroupMetadata {
                id: GROUP.into(),
                subject: "Rust ID".into(),
                ephemeral_duration: Some(86400),
                participants: vec![Participant {
                    id: Some("628111@s.whatsapp.net".into()),
                    admin: Some("superadmin".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        );
        let handler = Handler::builder(socket.clone()).build();

        handler
            .handle(EventBatch::from_raw(
                EventName::GroupsUpdate,
                json!([{"id": GROUP, "ephemeralDuration": 86400}]),
            ))
            .await;

        assert_eq!(handler.timers().get(GROUP), Some(86400));
        assert_eq!(handler.groups().get(GROUP).unwrap().subject, "Rust ID");
    }

    #[tokio::test]
    async fn test_failed_group_refresh_still_runs_listeners() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let (handler, counters) = handler_with(socket.clone());

        handler
            .handle(EventBatch::from_raw(
                EventName::GroupsUpdate,
                json!([{"id": GROUP, "ephemeralDuration": 86400}]),
            ))
            .await;

        assert_eq!(socket.metadata_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.listener.load(Ordering::SeqCst), 1);
        assert!(handler.groups().get(GROUP).is_none());
        assert_eq!(handler.timers().get(GROUP), None);
    }

    #[tokio::test]
    async fn test_message_prefetches_group_once() {
        let socket = Arc::new(
            RecordingSocket::new(ME, "9000@lid").with_group(GroupMetadata {
                id: GROUP.into(),
                participants: vec![Participant {
                    id: Some("628111@s.whatsapp.net".into()),
                    admin: Some("admin".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        );
        let handler = Handler::builder(socket.clone()).prefixes(vec![".".into()]).build();
        let admin_seen = Arc::new(AtomicUsize::new(0));
        let seen = admin_seen.clone();
        handler.install(PluginUnit::new(
            "test://admin",
            vec![Plugin::builder()
                .exec(move |ctx: Arc<Ctx>| {
                    let seen = seen.clone();
                    async move {
                        if ctx.is_admin {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(())
                    }
                })
                .build()
                .unwrap()],
        ));

        for id in ["3EB0B1", "3EB0B2"] {
            handler
                .handle(upsert(
                    vec![json!({
                        "key": {"remoteJid": GROUP, "participant": "628111@s.whatsapp.net", "id": id},
                        "message": {"conversation": "hi"}
                    })],
                    "notify",
                ))
                .await;
        }

        assert_eq!(socket.metadata_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(admin_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_contacts_and_timers_from_messages() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let handler = Handler::builder(socket).build();

        handler
            .handle(EventBatch::from_raw(
                EventName::ContactsUpsert,
                json!([{"id": "628222@s.whatsapp.net", "notify": "Sari"}]),
            ))
            .await;
        assert_eq!(handler.contacts().name("628222@s.whatsapp.net").as_deref(), Some("Sari"));

        handler
            .handle(upsert(
                vec![json!({
                    "key": {"remoteJid": "628333@s.whatsapp.net", "fromMe": true, "id": "3EB0C1"},
                    "message": {"extendedTextMessage": {"text": "hi", "contextInfo": {"expiration": 604800}}}
                })],
                "notify",
            ))
            .await;
        assert_eq!(handler.timers().get("628333@s.whatsapp.net"), Some(604800));

        handler
            .handle(upsert(
                vec![json!({
                    "key": {"remoteJid": "628333@s.whatsapp.net", "fromMe": false, "id": "3EB0C2"},
                    "message": {"protocolMessage": {"type": "EPHEMERAL_SETTING", "ephemeralExpiration": 0}},
                    "pushName": "Budi"
                })],
                "notify",
            ))
            .await;
        assert_eq!(handler.timers().get("628333@s.whatsapp.net"), Some(0));
        assert_eq!(handler.contacts().name("628333@s.whatsapp.net").as_deref(), Some("Budi"));
    }

    #[tokio::test]
    async fn test_hot_unload_during_runtime() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let (handler, counters) = handler_with(socket);

        handler.uninstall("test://counters");
        handler
            .handle(upsert(vec![message("3EB0D1", ".count")], "notify"))
            .await;

        assert_eq!(counters.listener.load(Ordering::SeqCst), 0);
        assert_eq!(counters.command.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settings_store_is_shared() {
        let socket = Arc::new(RecordingSocket::new(ME, "9000@lid"));
        let handler = Handler::builder(socket).build();
        handler.settings().set_as("k", &1u8).unwrap();
        assert_eq!(handler.clone().settings().get_as::<u8>("k").unwrap(), Some(1));
    }
}
