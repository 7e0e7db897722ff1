//! Tag registration table, polling loop and change broadcasting.
//!
//! The engine owns one long running poll task. Every tick it makes sure the
//! session is initialized, walks the tag table, reads each tag and publishes
//! changed values to the tag's own channel and the aggregate channel. All
//! per-tag failures are published to the error channel and never stop the
//! loop; only cancellation does.

use crate::codec::TagCodec;
use crate::error::{DriverError, DriverResult};
use crate::protocol::frame::addr::FinsAddress;
use crate::protocol::session::Session;
use crate::protocol::Error as ProtocolError;
use crate::value::{TagKind, TagValue};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Buffer depth for the tag, aggregate and error channels. Subscribers that
/// fall further behind lose the oldest events first.
const CHANNEL_CAPACITY: usize = 256;

/// One change published on the aggregate stream.
#[derive(Debug, Clone)]
pub struct TagChange {
    /// Tag name as registered.
    pub name: Arc<str>,
    /// The new value.
    pub value: TagValue,
}

/// One error published on the error stream.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Tag the failure belongs to, when the work was tag-scoped.
    pub tag: Option<Arc<str>>,
    pub error: Arc<DriverError>,
}

struct TagEntry {
    /// Name in original casing, for display and events.
    name: Arc<str>,
    address: FinsAddress,
    kind: TagKind,
    cached: Option<TagValue>,
    tx: broadcast::Sender<Option<TagValue>>,
}

/// Polling engine shared between the client facade and the poll task.
pub(crate) struct TagEngine {
    session: Arc<Session>,
    /// Registration table keyed by the lower-cased tag name.
    tags: DashMap<String, TagEntry>,
    changes_tx: broadcast::Sender<TagChange>,
    errors_tx: broadcast::Sender<ErrorEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl TagEngine {
    pub fn new(
        session: Arc<Session>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (changes_tx, _rx_unused) = broadcast::channel(CHANNEL_CAPACITY);
        let (errors_tx, _rx_unused) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            session,
            tags: DashMap::new(),
            changes_tx,
            errors_tx,
            cancel,
            poll_interval,
        })
    }

    /// Spawn the poll task.
    pub fn spawn_poll(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run().await })
    }

    /// Upsert a tag. Re-registering a name with a different kind or address
    /// replaces the entry and clears the cache, so the next poll republishes.
    pub fn register(&self, name: &str, raw_address: &str, kind: TagKind) -> DriverResult<()> {
        let address = FinsAddress::parse(raw_address)
            .map_err(|reason| DriverError::address_invalid(raw_address, reason))?;
        if address.bit.is_some() && kind != TagKind::Bool {
            return Err(DriverError::address_invalid(
                raw_address,
                format!("bit suffix requires a bool tag, not {kind:?}"),
            ));
        }
        if address.length.is_some() && kind != TagKind::String {
            return Err(DriverError::address_invalid(
                raw_address,
                format!("length bracket requires a string tag, not {kind:?}"),
            ));
        }

        let key = name.to_lowercase();
        match self.tags.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.kind != kind || entry.address != address {
                    debug!(name, ?kind, "tag re-registered, cache cleared");
                    entry.address = address;
                    entry.kind = kind;
                    entry.cached = None;
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, _rx_unused) = broadcast::channel(CHANNEL_CAPACITY);
                vacant.insert(TagEntry {
                    name: Arc::from(name),
                    address,
                    kind,
                    cached: None,
                    tx,
                });
            }
        }
        Ok(())
    }

    /// Cached value plus a live receiver for a tag, `None` for unknown names.
    pub fn observe_raw(
        &self,
        name: &str,
    ) -> Option<(Option<TagValue>, broadcast::Receiver<Option<TagValue>>)> {
        let entry = self.tags.get(&name.to_lowercase())?;
        Some((entry.cached.clone(), entry.tx.subscribe()))
    }

    /// Latest cached value for a tag.
    pub fn cached(&self, name: &str) -> Option<TagValue> {
        self.tags.get(&name.to_lowercase())?.cached.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<TagChange> {
        self.changes_tx.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors_tx.subscribe()
    }

    fn publish_error(&self, tag: Option<Arc<str>>, error: DriverError) {
        let _ = self.errors_tx.send(ErrorEvent {
            tag,
            error: Arc::new(error),
        });
    }

    /// Fire-and-forget write. The caller returns immediately; failures reach
    /// the error stream.
    pub fn write(self: &Arc<Self>, name: &str, value: TagValue) {
        let engine = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            let tag: Arc<str> = Arc::from(name.as_str());
            if let Err(e) = engine.write_now(&name, value).await {
                engine.publish_error(Some(tag), e);
            }
        });
    }

    async fn write_now(&self, name: &str, value: TagValue) -> DriverResult<()> {
        let key = name.to_lowercase();
        let (address, kind) = {
            let entry = self
                .tags
                .get(&key)
                .ok_or_else(|| DriverError::address_invalid(name, "tag is not registered"))?;
            (entry.address.clone(), entry.kind)
        };
        if !value.matches_kind(kind) {
            return Err(DriverError::TypeMismatch {
                expected: kind.value_kind(),
                actual: value.kind(),
            });
        }
        match (kind, address.bit) {
            (TagKind::Bool, Some(bit)) => {
                let v = matches!(value, TagValue::Bool(true));
                self.session
                    .write_bits(address.area, address.word, bit, &[v])
                    .await
            }
            _ => {
                let words = TagCodec::encode(kind, &value, address.length)?;
                self.session
                    .write_words(address.area, address.word, &words)
                    .await
            }
        }
    }

    async fn run(self: Arc<Self>) {
        debug!(interval = ?self.poll_interval, "poll loop started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Initialization is retried once per tick until it succeeds.
            // Cancellation is honored at every suspension point, including
            // inside an in-flight exchange.
            if !self.session.is_initialized() {
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    r = self.session.initialize() => r,
                };
                if let Err(e) = result {
                    self.publish_error(None, e);
                    if self.sleep_or_cancelled().await {
                        break;
                    }
                    continue;
                }
            }

            let keys: Vec<String> = self.tags.iter().map(|e| e.key().clone()).collect();
            for key in keys {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = self.poll_tag(&key) => {}
                }
            }

            if self.sleep_or_cancelled().await {
                break;
            }
        }
        debug!("poll loop exited");
    }

    async fn sleep_or_cancelled(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(self.poll_interval) => false,
        }
    }

    /// Poll one tag; publish on change, publish errors, never propagate.
    async fn poll_tag(&self, key: &str) {
        // Copy what the read needs out of the map, the guard must not be
        // held across the session await.
        let Some((name, address, kind, cached, tx)) = self.tags.get(key).map(|e| {
            (
                e.name.clone(),
                e.address.clone(),
                e.kind,
                e.cached.clone(),
                e.tx.clone(),
            )
        }) else {
            return;
        };

        let value = match self.read_value(&address, kind).await {
            Ok(v) => v,
            Err(e) => {
                self.publish_error(Some(name), e);
                return;
            }
        };

        if cached.as_ref() == Some(&value) {
            trace!(%name, "unchanged");
            return;
        }

        // The entry may have been replaced while the read was in flight; a
        // changed kind means the value no longer belongs to this tag.
        match self.tags.get_mut(key) {
            Some(mut entry) if entry.kind == kind => entry.cached = Some(value.clone()),
            _ => return,
        }

        let _ = tx.send(Some(value.clone()));
        let _ = self.changes_tx.send(TagChange { name, value });
    }

    async fn read_value(&self, address: &FinsAddress, kind: TagKind) -> DriverResult<TagValue> {
        if let (TagKind::Bool, Some(bit)) = (kind, address.bit) {
            let bits = self
                .session
                .read_bits(address.area, address.word, bit, 1)
                .await?;
            let v = bits.first().copied().ok_or(DriverError::Protocol(
                ProtocolError::Framing {
                    context: "empty bit payload",
                },
            ))?;
            return Ok(TagValue::Bool(v));
        }
        let len = TagCodec::words_for_kind(kind, address.length);
        let words = self
            .session
            .read_words(address.area, address.word, len)
            .await?;
        TagCodec::decode(kind, &words, address.length)
    }
}
