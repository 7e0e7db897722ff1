//! FINS session: request pipeline and typed operations.
//!
//! A session owns at most one channel and serializes every FINS exchange
//! through a single-permit semaphore. FINS carries no correlation beyond the
//! service id, and the TCP envelope is not multiplexed, so one request in
//! flight per channel is a hard protocol constraint, not a tuning choice.

mod state;
pub use state::{SessionConfig, SessionEvent, SessionLifecycleState};

use crate::error::{DriverError, DriverResult};
use crate::protocol::error::{Error, Result as ProtoResult};
use crate::protocol::frame::{
    area::MemoryArea,
    builder::{
        build_clock_read, build_clock_write, build_cpu_unit_data_read, build_cycle_time_read,
        build_read_bits, build_read_words, build_write_bits, build_write_words,
    },
    header::FinsHeader,
    pdu::{parse_response, ClockReading, CycleTimeReading, FinsResponse},
    FinsRequest,
};
use crate::protocol::transport::Channel;
use crate::types::PlcType;
use arc_swap::ArcSwapOption;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Identity of the controller detected during initialization.
#[derive(Debug, Clone)]
pub struct ControllerIdentity {
    /// Classified controller family.
    pub plc_type: PlcType,
    /// Raw model string.
    pub model: String,
    /// Raw version string.
    pub version: String,
}

/// Accounting for one completed exchange.
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// FINS message bytes written, excluding transport framing.
    pub bytes_sent: usize,
    /// FINS message bytes read, excluding transport framing.
    pub bytes_received: usize,
    /// Messages written, counting retried attempts.
    pub packets_sent: u32,
    /// Messages read, counting retried attempts.
    pub packets_received: u32,
    /// Wall clock time from pipeline entry to parsed response.
    pub duration: Duration,
    /// The validated response.
    pub response: FinsResponse,
}

/// Snapshot of the session's rolling counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Smoothed response time over recent successful exchanges.
    pub avg_response_time_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Default)]
struct ExchangeAccounting {
    bytes_sent: usize,
    bytes_received: usize,
    packets_sent: u32,
    packets_received: u32,
}

/// FINS session over one channel.
pub struct Session {
    config: SessionConfig,
    /// The channel slot; `None` between teardown and the next attempt.
    channel: Mutex<Option<Channel>>,
    /// Single-permit gate serializing all exchanges.
    request_semaphore: Semaphore,
    /// Wrapping service id counter.
    service_id: AtomicU8,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    identity: ArcSwapOption<ControllerIdentity>,
    lifecycle_tx: watch::Sender<SessionLifecycleState>,
    lifecycle_rx: watch::Receiver<SessionLifecycleState>,
    events_tx: broadcast::Sender<SessionEvent>,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    last_avg_response_time_ms: AtomicU64,
    bytes_sent_total: AtomicU64,
    bytes_received_total: AtomicU64,
}

impl Session {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        let (lifecycle_tx, lifecycle_rx) = watch::channel(SessionLifecycleState::Idle);
        let (events_tx, _rx_unused) = broadcast::channel::<SessionEvent>(64);
        Arc::new(Self {
            config,
            channel: Mutex::new(None),
            request_semaphore: Semaphore::new(1),
            service_id: AtomicU8::new(0),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            identity: ArcSwapOption::from(None),
            lifecycle_tx,
            lifecycle_rx,
            events_tx,
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            last_avg_response_time_ms: AtomicU64::new(0),
            bytes_sent_total: AtomicU64::new(0),
            bytes_received_total: AtomicU64::new(0),
        })
    }

    /// Lifecycle watch receiver; always carries the latest state.
    pub fn lifecycle(&self) -> watch::Receiver<SessionLifecycleState> {
        self.lifecycle_rx.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Detected controller identity, if initialization completed.
    pub fn identity(&self) -> Option<Arc<ControllerIdentity>> {
        self.identity.load_full()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_response_time_ms: self.last_avg_response_time_ms.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent_total.load(Ordering::Relaxed),
            bytes_received: self.bytes_received_total.load(Ordering::Relaxed),
        }
    }

    fn publish_lifecycle(&self, state: SessionLifecycleState) {
        let _ = self.events_tx.send(SessionEvent::LifecycleChanged(state));
        let _ = self.lifecycle_tx.send(state);
    }

    /// Close the channel and refuse further exchanges.
    pub async fn shutdown(&self) {
        self.request_semaphore.close();
        let mut guard = self.channel.lock().await;
        guard.take();
        self.publish_lifecycle(SessionLifecycleState::Closed);
    }

    /// Run one FINS exchange through the pipeline.
    ///
    /// The request's header is rewritten per attempt with the rotating
    /// service id and, on TCP, the negotiated node addresses. Transient
    /// failures tear the channel down and retry up to the configured count;
    /// protocol failures surface immediately, with one buffer purge after a
    /// service-id mismatch.
    pub async fn exchange(&self, request: FinsRequest) -> ProtoResult<ExchangeOutcome> {
        let _permit = self
            .request_semaphore
            .acquire()
            .await
            .map_err(|_| Error::ChannelClosed)?;
        let start = Instant::now();
        let mut acct = ExchangeAccounting::default();
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.attempt(&request, &mut acct).await {
                Ok(response) => {
                    let duration = start.elapsed();
                    self.record_success(duration, &acct);
                    return Ok(ExchangeOutcome {
                        bytes_sent: acct.bytes_sent,
                        bytes_received: acct.bytes_received,
                        packets_sent: acct.packets_sent,
                        packets_received: acct.packets_received,
                        duration,
                        response,
                    });
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %e, "FINS exchange failed, rebuilding channel");
                    let _ = self.events_tx.send(SessionEvent::TransportError);
                    self.channel.lock().await.take();
                }
                Err(e) => {
                    self.record_failure(&acct);
                    if e.is_transient() {
                        let _ = self.events_tx.send(SessionEvent::TransportError);
                        self.channel.lock().await.take();
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &FinsRequest,
        acct: &mut ExchangeAccounting,
    ) -> ProtoResult<FinsResponse> {
        let mut guard = self.channel.lock().await;
        if guard.is_none() {
            self.publish_lifecycle(SessionLifecycleState::Connecting);
            match Channel::open(&self.config).await {
                Ok(ch) => {
                    *guard = Some(ch);
                    self.publish_lifecycle(SessionLifecycleState::Ready);
                }
                Err(e) => {
                    self.publish_lifecycle(SessionLifecycleState::Idle);
                    return Err(e);
                }
            }
        }
        let channel = guard.as_mut().expect("channel was just opened");

        let (local, remote) = channel
            .negotiated_nodes()
            .unwrap_or((self.config.local_node, self.config.remote_node));
        let sid = self.service_id.fetch_add(1, Ordering::Relaxed);

        let mut request = request.clone();
        request.header = FinsHeader::command(remote, local, sid);
        let encoded = request.encode();

        channel.send(encoded.clone()).await?;
        acct.bytes_sent += encoded.len();
        acct.packets_sent += 1;

        let raw = channel.receive(self.config.request_timeout).await?;
        acct.bytes_received += raw.len();
        acct.packets_received += 1;

        match parse_response(&raw, &request) {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_service_id_mismatch() {
                    debug!("service id mismatch, purging channel buffer");
                    channel.purge(self.config.request_timeout).await;
                }
                Err(e)
            }
        }
    }

    fn record_success(&self, duration: Duration, acct: &ExchangeAccounting) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent_total
            .fetch_add(acct.bytes_sent as u64, Ordering::Relaxed);
        self.bytes_received_total
            .fetch_add(acct.bytes_received as u64, Ordering::Relaxed);
        let elapsed_ms = duration.as_millis() as u64;
        let prev = self.last_avg_response_time_ms.load(Ordering::Relaxed);
        let new_avg = if prev == 0 {
            elapsed_ms
        } else {
            (prev.saturating_mul(9) + elapsed_ms) / 10
        };
        self.last_avg_response_time_ms
            .store(new_avg, Ordering::Relaxed);
    }

    fn record_failure(&self, acct: &ExchangeAccounting) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent_total
            .fetch_add(acct.bytes_sent as u64, Ordering::Relaxed);
        self.bytes_received_total
            .fetch_add(acct.bytes_received as u64, Ordering::Relaxed);
    }

    /// Open the channel and identify the controller. Runs once; concurrent
    /// and repeated calls return after the first success.
    #[instrument(level = "info", skip_all)]
    pub async fn initialize(&self) -> DriverResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let request = build_cpu_unit_data_read(self.placeholder_header());
        let outcome = self.exchange(request).await?;
        let data = outcome.response.controller_data()?;
        let plc_type = PlcType::classify(&data.model);
        info!(
            model = %data.model,
            version = %data.version,
            ?plc_type,
            "controller identified"
        );
        self.identity.store(Some(Arc::new(ControllerIdentity {
            plc_type,
            model: data.model,
            version: data.version,
        })));
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Headers are rewritten inside the pipeline; builders get a placeholder.
    fn placeholder_header(&self) -> FinsHeader {
        FinsHeader::command(self.config.remote_node, self.config.local_node, 0)
    }

    fn ensure_initialized(&self) -> DriverResult<Arc<ControllerIdentity>> {
        if !self.is_initialized() {
            return Err(DriverError::NotInitialized);
        }
        self.identity.load_full().ok_or(DriverError::NotInitialized)
    }

    fn check_area(&self, plc: PlcType, area: MemoryArea, addr: u16, len: u16) -> DriverResult<()> {
        let ceiling = plc.area_ceiling(area).ok_or_else(|| {
            DriverError::RangeInvalid(format!("area {area} is not available on {plc:?}"))
        })?;
        let last = addr as u32 + len.saturating_sub(1) as u32;
        if last >= ceiling {
            return Err(DriverError::RangeInvalid(format!(
                "{area}{addr} plus {len} words exceeds the {area} ceiling {ceiling}"
            )));
        }
        Ok(())
    }

    fn check_bit_access(
        &self,
        plc: PlcType,
        area: MemoryArea,
        addr: u16,
        bit: u8,
        len: u16,
    ) -> DriverResult<()> {
        if bit > 15 {
            return Err(DriverError::RangeInvalid(format!(
                "bit index {bit} out of range 0..=15"
            )));
        }
        if len == 0 {
            return Err(DriverError::RangeInvalid("bit count must be positive".into()));
        }
        if bit as u16 + len > 16 {
            return Err(DriverError::RangeInvalid(format!(
                "bit {bit} plus {len} bits crosses the word boundary"
            )));
        }
        if area == MemoryArea::DataMemory && !plc.supports_bit_data_memory() {
            return Err(DriverError::RangeInvalid(format!(
                "data memory is not bit addressable on {plc:?}"
            )));
        }
        self.check_area(plc, area, addr, 1)
    }

    /// Read consecutive bits out of a single word.
    pub async fn read_bits(
        &self,
        area: MemoryArea,
        addr: u16,
        bit: u8,
        len: u16,
    ) -> DriverResult<Vec<bool>> {
        let plc = self.ensure_initialized()?.plc_type;
        self.check_bit_access(plc, area, addr, bit, len)?;
        let request = build_read_bits(self.placeholder_header(), area, addr, bit, len);
        let outcome = self.exchange(request).await?;
        Ok(outcome.response.bits())
    }

    /// Read consecutive words.
    pub async fn read_words(
        &self,
        area: MemoryArea,
        addr: u16,
        len: u16,
    ) -> DriverResult<Vec<u16>> {
        let plc = self.ensure_initialized()?.plc_type;
        if len == 0 {
            return Err(DriverError::RangeInvalid("word count must be positive".into()));
        }
        if len > plc.max_read_words() {
            return Err(DriverError::RangeInvalid(format!(
                "read of {len} words exceeds the {} word limit of {plc:?}",
                plc.max_read_words()
            )));
        }
        self.check_area(plc, area, addr, len)?;
        let request = build_read_words(self.placeholder_header(), area, addr, len);
        let outcome = self.exchange(request).await?;
        Ok(outcome.response.words()?)
    }

    /// Write consecutive bits into a single word.
    pub async fn write_bits(
        &self,
        area: MemoryArea,
        addr: u16,
        bit: u8,
        values: &[bool],
    ) -> DriverResult<()> {
        let plc = self.ensure_initialized()?.plc_type;
        self.check_bit_access(plc, area, addr, bit, values.len() as u16)?;
        let request = build_write_bits(self.placeholder_header(), area, addr, bit, values);
        self.exchange(request).await?;
        Ok(())
    }

    /// Write consecutive words.
    pub async fn write_words(
        &self,
        area: MemoryArea,
        addr: u16,
        values: &[u16],
    ) -> DriverResult<()> {
        let plc = self.ensure_initialized()?.plc_type;
        let len = values.len() as u16;
        if values.is_empty() {
            return Err(DriverError::RangeInvalid("word count must be positive".into()));
        }
        if len > plc.max_write_words() {
            return Err(DriverError::RangeInvalid(format!(
                "write of {len} words exceeds the {} word limit of {plc:?}",
                plc.max_write_words()
            )));
        }
        self.check_area(plc, area, addr, len)?;
        let request = build_write_words(self.placeholder_header(), area, addr, values);
        self.exchange(request).await?;
        Ok(())
    }

    /// Read the controller clock.
    pub async fn read_clock(&self) -> DriverResult<ClockReading> {
        self.ensure_initialized()?;
        let request = build_clock_read(self.placeholder_header());
        let outcome = self.exchange(request).await?;
        Ok(outcome.response.clock()?)
    }

    /// Set the controller clock. The day of week is derived from the date
    /// when not supplied, with 0 meaning Sunday.
    pub async fn write_clock(
        &self,
        datetime: NaiveDateTime,
        day_of_week: Option<u8>,
    ) -> DriverResult<()> {
        self.ensure_initialized()?;
        let min = NaiveDate::from_ymd_opt(1998, 1, 1)
            .expect("valid constant date")
            .and_hms_opt(0, 0, 0)
            .expect("valid constant time");
        let max = NaiveDate::from_ymd_opt(2069, 12, 31)
            .expect("valid constant date")
            .and_hms_opt(23, 59, 59)
            .expect("valid constant time");
        if datetime < min || datetime > max {
            return Err(DriverError::RangeInvalid(format!(
                "clock value {datetime} outside 1998-01-01..=2069-12-31"
            )));
        }
        let dow = match day_of_week {
            Some(d) if d > 6 => {
                return Err(DriverError::RangeInvalid(format!(
                    "day of week {d} out of range 0..=6"
                )));
            }
            Some(d) => d,
            None => datetime.weekday().num_days_from_sunday() as u8,
        };
        let request = build_clock_write(self.placeholder_header(), datetime, dow);
        self.exchange(request).await?;
        Ok(())
    }

    /// Read scan cycle statistics. Rejected without wire traffic on models
    /// that do not implement the service.
    pub async fn read_cycle_time(&self) -> DriverResult<CycleTimeReading> {
        let plc = self.ensure_initialized()?.plc_type;
        if !plc.supports_cycle_time() {
            return Err(DriverError::Unsupported(format!(
                "cycle time read is not available on {plc:?}"
            )));
        }
        let request = build_cycle_time_read(self.placeholder_header());
        let outcome = self.exchange(request).await?;
        Ok(outcome.response.cycle_time()?)
    }
}
