//! Public client facade.

use crate::engine::{ErrorEvent, TagChange, TagEngine};
use crate::error::DriverResult;
use crate::protocol::frame::pdu::{ClockReading, CycleTimeReading};
use crate::protocol::session::{Session, SessionConfig, SessionLifecycleState, SessionStats};
use crate::types::{FinsClientConfig, PlcType};
use crate::value::{FromTagValue, IntoTagValue, TagKind};
use chrono::NaiveDateTime;
use futures::future::Either;
use futures::{stream, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// Async Omron FINS client with a reactive polled-tag layer.
///
/// Construction validates the configuration and spawns the polling task, so a
/// client must be created inside a Tokio runtime. Registered tags are polled
/// on the configured interval; changed values fan out to per-tag streams and
/// one aggregate stream. Failures of background work surface on the error
/// stream.
///
/// ```no_run
/// use fins_driver::{FinsClient, FinsClientConfig, Transport};
/// use futures::StreamExt;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FinsClientConfig::new("192.168.250.1", 11, 1)
///     .with_transport(Transport::Tcp);
/// let client = FinsClient::new(config)?;
///
/// client.register_tag::<i16>("speed", "D100")?;
/// let mut speed = client.observe::<i16>("speed");
/// while let Some(value) = speed.next().await {
///     println!("speed = {value:?}");
/// }
/// client.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct FinsClient {
    session: Arc<Session>,
    engine: Arc<TagEngine>,
    cancel: CancellationToken,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl FinsClient {
    /// Validate the configuration and start the polling engine.
    ///
    /// No I/O happens here; the first poll tick initializes the session and
    /// reports failures through [`FinsClient::errors`] until it succeeds.
    pub fn new(config: FinsClientConfig) -> DriverResult<Self> {
        config.validate()?;
        let session = Session::new(SessionConfig::from(&config));
        let cancel = CancellationToken::new();
        let engine = TagEngine::new(
            Arc::clone(&session),
            Duration::from_millis(config.poll_interval_ms),
            cancel.child_token(),
        );
        let poll_task = engine.spawn_poll();
        Ok(Self {
            session,
            engine,
            cancel,
            poll_task: StdMutex::new(Some(poll_task)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Register a tag with the kind the Rust type maps onto.
    ///
    /// Registration is an idempotent upsert keyed by the case-insensitive
    /// name; a different kind or address replaces the prior entry. BCD kinds
    /// have no dedicated Rust type and go through
    /// [`FinsClient::register_tag_kind`].
    pub fn register_tag<T: IntoTagValue>(&self, name: &str, address: &str) -> DriverResult<()> {
        self.register_tag_kind(name, address, T::KIND)
    }

    /// Register a tag with an explicit value kind.
    pub fn register_tag_kind(&self, name: &str, address: &str, kind: TagKind) -> DriverResult<()> {
        self.engine.register(name, address, kind)
    }

    /// Stream of values for one tag.
    ///
    /// The latest cached value (or `None` before the first poll) is re-emitted
    /// to every new subscriber, then changes follow. A kind mismatch between
    /// `T` and the stored value yields `None` items. Unknown names produce an
    /// empty stream.
    pub fn observe<T: FromTagValue>(&self, name: &str) -> impl Stream<Item = Option<T>> + Send
    where
        T: Send + 'static,
    {
        match self.engine.observe_raw(name) {
            Some((initial, rx)) => {
                let first = initial.as_ref().and_then(T::from_tag_value);
                let rest = broadcast_stream(rx)
                    .map(|value| value.and_then(|v| T::from_tag_value(&v)));
                Either::Left(stream::iter([first]).chain(rest))
            }
            None => Either::Right(stream::empty()),
        }
    }

    /// Aggregate stream of every tag change.
    pub fn observe_all(&self) -> impl Stream<Item = TagChange> + Send {
        broadcast_stream(self.engine.subscribe_changes())
    }

    /// Stream of errors from the poll loop and fire-and-forget writes.
    pub fn errors(&self) -> impl Stream<Item = ErrorEvent> + Send {
        broadcast_stream(self.engine.subscribe_errors())
    }

    /// Synchronous read of the cached value, `None` when the tag is unknown,
    /// not yet polled, or of a different kind.
    pub fn value<T: FromTagValue>(&self, name: &str) -> Option<T> {
        self.engine
            .cached(name)
            .as_ref()
            .and_then(T::from_tag_value)
    }

    /// Fire-and-forget write. The call never blocks; failures surface on the
    /// error stream.
    pub fn write<T: IntoTagValue>(&self, name: &str, value: T) {
        self.engine.write(name, value.into_tag_value());
    }

    /// Read the controller clock.
    pub async fn read_clock(&self) -> DriverResult<ClockReading> {
        self.session.read_clock().await
    }

    /// Set the controller clock; the day of week is derived from the date
    /// when omitted.
    pub async fn write_clock(
        &self,
        datetime: NaiveDateTime,
        day_of_week: Option<u8>,
    ) -> DriverResult<()> {
        self.session.write_clock(datetime, day_of_week).await
    }

    /// Read scan cycle statistics.
    pub async fn read_cycle_time(&self) -> DriverResult<CycleTimeReading> {
        self.session.read_cycle_time().await
    }

    /// Detected controller family, `None` until initialization completes.
    pub fn plc_type(&self) -> Option<PlcType> {
        self.session.identity().map(|i| i.plc_type)
    }

    /// Controller model string, `None` until initialization completes.
    pub fn controller_model(&self) -> Option<String> {
        self.session.identity().map(|i| i.model.clone())
    }

    /// Controller version string, `None` until initialization completes.
    pub fn controller_version(&self) -> Option<String> {
        self.session.identity().map(|i| i.version.clone())
    }

    /// Session lifecycle watch; always carries the latest state.
    pub fn connection_state(&self) -> watch::Receiver<SessionLifecycleState> {
        self.session.lifecycle()
    }

    /// Rolling request counters.
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Direct session access for clock-free typed reads and writes outside
    /// the tag table.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Stop the poll task, join it within two seconds and close the channel.
    /// Safe to call more than once.
    #[instrument(level = "info", skip_all)]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let handle = self
            .poll_task
            .lock()
            .expect("poll task slot is never poisoned")
            .take();
        if let Some(handle) = handle {
            if time::timeout(Duration::from_secs(2), handle).await.is_err() {
                warn!("poll task did not stop within 2s, detaching");
            }
        }
        self.session.shutdown().await;
    }
}

impl Drop for FinsClient {
    /// Best effort cancellation. Relying on drop alone leaks the channel
    /// until the poll task notices; call [`FinsClient::dispose`] instead.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Adapt a broadcast receiver into a stream. Lagged subscribers skip the
/// overwritten backlog and continue with the newest events.
fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> impl Stream<Item = T> + Send {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(value) => return Some((value, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream subscriber lagged, dropping oldest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}
