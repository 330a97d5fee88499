//! Request processor, admin operations and controller task wiring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::dispatcher::{Admission, Dispatcher, PassReport, ServiceRequest};
use crate::core::fleet::SlotSnapshot;
use crate::core::lifecycle::LifecycleManager;
use crate::core::schedule::{Decision, ScheduleEntry};
use crate::core::sessions::ClientSession;
use crate::core::state::ControllerState;
use crate::core::vehicle::VehicleLauncher;
use crate::core::DispatchError;
use crate::infra::message::{ClientCommand, Message, ReplyKind};
use crate::infra::outbox::Outbox;
use crate::util::types::{ClientPid, Km, ServiceId, Tick};

/// Upper bound on the reconciliation period for long ticks.
const RECONCILE_MAX_PERIOD: Duration = Duration::from_secs(1);

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelSummary {
    /// Pending entries deactivated.
    pub pending: usize,
    /// Running services signalled.
    pub running: usize,
}

impl CancelSummary {
    /// Total services affected.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.running
    }
}

/// The fleet-dispatch controller.
///
/// Shared by reference between the request listener, the admin console, the
/// clock task and the reconciliation loop.
pub struct Controller {
    config: ControllerConfig,
    state: Arc<ControllerState>,
    lifecycle: Arc<LifecycleManager>,
    dispatcher: Dispatcher,
    outbox: Arc<dyn Outbox>,
    audit: Option<Arc<dyn AuditSink>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl Controller {
    /// Assemble a controller. Prefer [`ControllerBuilder`](crate::builders::ControllerBuilder).
    pub fn new(
        config: ControllerConfig,
        outbox: Arc<dyn Outbox>,
        launcher: Arc<dyn VehicleLauncher>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let state = Arc::new(ControllerState::new(&config));
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&state),
            launcher,
            audit.clone(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&state),
            Arc::clone(&lifecycle),
            Arc::clone(&outbox),
            config.renegotiation.clone(),
            audit.clone(),
        );
        Self {
            config,
            state,
            lifecycle,
            dispatcher,
            outbox,
            audit,
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Shared state regions.
    #[must_use]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Token cancelled when shutdown starts.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ------------------------------------------------------------------
    // Client requests
    // ------------------------------------------------------------------

    /// Process one inbound client message and deliver the replies.
    ///
    /// Failures become a single `erro` reply; nothing propagates to the caller.
    pub async fn handle_message(&self, message: Message) {
        let pid = message.origin_id;
        debug!(pid, command = %message.command, username = %message.username, "request");
        let replies = match self.process(&message).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(pid, command = %message.command, error = %e, "request rejected");
                vec![Message::error(&e)]
            }
        };
        for reply in replies {
            self.send(pid, reply).await;
        }
    }

    async fn process(&self, message: &Message) -> Result<Vec<Message>, DispatchError> {
        let pid = message.origin_id;
        let command = ClientCommand::from_tag(&message.command).ok_or_else(|| {
            DispatchError::SyntaxError(format!("unknown command '{}'", message.command))
        })?;

        let reply = match command {
            ClientCommand::Login => self.login(pid, &message.username)?,
            ClientCommand::Schedule => self.schedule(&self.session(pid)?, &message.payload)?,
            ClientCommand::Query => return Ok(self.query(&self.session(pid)?)),
            ClientCommand::Cancel => self.cancel(&self.session(pid)?, &message.payload).await?,
            ClientCommand::Decision => self.decision(&self.session(pid)?, &message.payload)?,
            ClientCommand::Logout => self.logout(&self.session(pid)?)?,
        };
        Ok(vec![reply])
    }

    fn session(&self, pid: ClientPid) -> Result<ClientSession, DispatchError> {
        self.state
            .sessions
            .get(pid)
            .ok_or_else(|| DispatchError::PreconditionFailed("not logged in".into()))
    }

    fn login(&self, pid: ClientPid, username: &str) -> Result<Message, DispatchError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DispatchError::SyntaxError("empty username".into()));
        }
        self.state.sessions.try_register(pid, username)?;
        info!(pid, username, sessions = self.state.sessions.len(), "client logged in");
        Ok(Message::reply(ReplyKind::LoginOk, format!("Welcome, {username}.")))
    }

    fn schedule(&self, session: &ClientSession, payload: &str) -> Result<Message, DispatchError> {
        let request = ServiceRequest::parse(payload)?;
        let text = match self.dispatcher.admit(session.pid, &session.username, &request)? {
            Admission::Dispatched {
                service_id,
                vehicle_id,
            } => format!("Service {service_id} accepted: vehicle {vehicle_id} dispatched."),
            Admission::Scheduled {
                service_id,
                trigger_tick,
            } => format!("Service {service_id} scheduled for t={trigger_tick}."),
            Admission::Offered { service_id, offer } => Dispatcher::offer_text(service_id, offer),
        };
        Ok(Message::reply(ReplyKind::Info, text))
    }

    fn query(&self, session: &ClientSession) -> Vec<Message> {
        let running = self.state.fleet.running_for(session.pid);
        let pending = self.state.schedule.pending_for(session.pid);

        let mut items: Vec<String> = running
            .iter()
            .map(|s| {
                format!(
                    "ID {} | running | dest {} | {} km | {}",
                    s.service_id, s.destination, s.distance, s.status
                )
            })
            .collect();
        items.extend(pending.iter().map(|e| match e.proposed_tick {
            Some(offer) if e.awaiting_confirmation => format!(
                "ID {} | awaiting | offer t={offer} | dest {} | {} km",
                e.service_id, e.destination, e.distance
            ),
            _ => format!(
                "ID {} | pending | t={} | dest {} | {} km",
                e.service_id, e.trigger_tick, e.destination, e.distance
            ),
        }));

        if items.is_empty() {
            return vec![Message::reply(ReplyKind::Answer, "none")];
        }
        items
            .into_iter()
            .map(|item| Message::reply(ReplyKind::Answer, item))
            .collect()
    }

    async fn cancel(&self, session: &ClientSession, payload: &str) -> Result<Message, DispatchError> {
        let id = parse_service_id(payload)?;
        let summary = self.cancel_scoped(Some(session.pid), id, false).await;
        if summary.total() == 0 {
            return Err(DispatchError::NotFound(match id {
                Some(id) => format!("service {id}"),
                None => "no active services".into(),
            }));
        }
        Ok(Message::reply(
            ReplyKind::Info,
            format!(
                "{} service(s) cancelled ({} pending, {} running).",
                summary.total(),
                summary.pending,
                summary.running
            ),
        ))
    }

    fn decision(&self, session: &ClientSession, payload: &str) -> Result<Message, DispatchError> {
        let syntax = || DispatchError::SyntaxError("expected: decisao <id> <y|n>".into());
        let mut parts = payload.split_whitespace();
        let (Some(id), Some(answer), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(syntax());
        };
        let service_id: ServiceId = id.parse().map_err(|_| syntax())?;
        let accept = match answer.to_ascii_lowercase().as_str() {
            "y" => true,
            "n" => false,
            _ => return Err(syntax()),
        };

        let text = match self
            .dispatcher
            .decide(session.pid, &session.username, service_id, accept)?
        {
            Decision::Accepted(tick) => format!("Service {service_id} confirmed for t={tick}."),
            Decision::Rejected => format!("Service {service_id} cancelled."),
        };
        Ok(Message::reply(ReplyKind::Info, text))
    }

    fn logout(&self, session: &ClientSession) -> Result<Message, DispatchError> {
        if self.state.fleet.owner_has_running(session.pid) {
            return Err(DispatchError::PreconditionFailed(
                "a service is still running, try again later".into(),
            ));
        }
        let dropped = self.state.schedule.cancel(Some(session.pid), None);
        for entry in &dropped {
            self.record(entry.service_id, &entry.username, AuditAction::Cancel, Some("logout".into()));
        }
        // A due entry may have reached a vehicle between the first check and the cancel.
        if self.state.fleet.owner_has_running(session.pid) {
            info!(
                pid = session.pid,
                pending_cancelled = dropped.len(),
                "logout refused, a service started meanwhile"
            );
            return Err(DispatchError::PreconditionFailed(
                "a service is still running, try again later".into(),
            ));
        }
        self.state.sessions.remove(session.pid);
        info!(
            pid = session.pid,
            username = %session.username,
            pending_cancelled = dropped.len(),
            "client logged out"
        );
        Ok(Message::reply(ReplyKind::ExitOk, "Goodbye."))
    }

    // ------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------

    /// Active schedule entries in table order.
    #[must_use]
    pub fn pending(&self) -> Vec<ScheduleEntry> {
        self.state.schedule.snapshot()
    }

    /// Logged-in clients.
    #[must_use]
    pub fn sessions(&self) -> Vec<ClientSession> {
        self.state.sessions.list()
    }

    /// Occupied fleet slots.
    #[must_use]
    pub fn fleet(&self) -> Vec<SlotSnapshot> {
        self.state.fleet.snapshot()
    }

    /// Total distance reported by workers.
    #[must_use]
    pub fn total_km(&self) -> Km {
        self.state.odometer.total()
    }

    /// Current simulated tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.state.clock.now()
    }

    /// Admin-scope cancellation across all owners; `0` means everything.
    ///
    /// Owners of cancelled pending entries are notified individually.
    pub async fn admin_cancel(&self, service_id: ServiceId) -> CancelSummary {
        let filter = (service_id != 0).then_some(service_id);
        let summary = self.cancel_scoped(None, filter, true).await;
        info!(service_id, pending = summary.pending, running = summary.running, "admin cancel");
        summary
    }

    async fn cancel_scoped(
        &self,
        owner: Option<ClientPid>,
        service: Option<ServiceId>,
        notify_owners: bool,
    ) -> CancelSummary {
        let cancelled = self.state.schedule.cancel(owner, service);
        let mut running = self.lifecycle.preempt(owner, service);

        // A claimed entry is a vehicle being started: count it once, as running.
        let (claimed, pending): (Vec<_>, Vec<_>) =
            cancelled.into_iter().partition(|e| e.dispatching);
        for entry in &claimed {
            if !running.iter().any(|(id, _)| *id == entry.service_id) {
                running.push((entry.service_id, entry.owner_pid));
            }
        }

        for entry in &pending {
            self.record(entry.service_id, &entry.username, AuditAction::Cancel, Some("pending".into()));
            if notify_owners {
                let notice = Message::reply(
                    ReplyKind::Cancelled,
                    format!("Service {} was cancelled by the controller.", entry.service_id),
                );
                self.send(entry.owner_pid, notice).await;
            }
        }
        for (id, pid) in &running {
            let username = self
                .state
                .sessions
                .get(*pid)
                .map(|s| s.username)
                .unwrap_or_default();
            self.record(*id, &username, AuditAction::Cancel, Some("running".into()));
        }

        CancelSummary {
            pending: pending.len(),
            running: running.len(),
        }
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Run one reconciliation pass now.
    pub async fn reconcile(&self) -> PassReport {
        self.dispatcher.run_pass().await
    }

    /// Advance the simulated clock once per tick until shutdown.
    pub fn spawn_clock(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let tick = this.config.tick();
            let mut interval = interval_at(Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = this.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let now = this.state.clock.advance();
                        debug!(tick = now, "tick");
                    }
                }
            }
        })
    }

    /// Run reconciliation passes on the tick cadence until shutdown.
    pub fn spawn_reconciler(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.tick().min(RECONCILE_MAX_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = this.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        this.reconcile().await;
                    }
                }
            }
        })
    }

    /// Notify every session, stop every worker, and end the background tasks.
    ///
    /// Runs once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(tick = self.now(), "controller shutting down");
        self.shutdown.cancel();

        for session in self.state.sessions.list() {
            let notice = Message::reply(ReplyKind::ExitOk, "Controller shutting down.");
            self.send(session.pid, notice).await;
        }
        self.lifecycle.terminate_all().await;
        info!(total_km = self.total_km(), "controller stopped");
    }

    async fn send(&self, pid: ClientPid, message: Message) {
        if let Err(e) = self.outbox.deliver(pid, message).await {
            warn!(pid, error = %e, "reply not delivered");
        }
    }

    fn record(&self, service_id: ServiceId, username: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(service_id, username, action, self.now(), detail));
        }
    }
}

/// Parse a cancel payload; `0` selects every service in scope.
fn parse_service_id(payload: &str) -> Result<Option<ServiceId>, DispatchError> {
    let id: ServiceId = payload
        .trim()
        .parse()
        .map_err(|_| DispatchError::SyntaxError("expected: cancelar <id|0>".into()))?;
    Ok((id != 0).then_some(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_id() {
        assert_eq!(parse_service_id("0").unwrap(), None);
        assert_eq!(parse_service_id(" 7 ").unwrap(), Some(7));
        assert!(matches!(parse_service_id("x"), Err(DispatchError::SyntaxError(_))));
        assert!(matches!(parse_service_id(""), Err(DispatchError::SyntaxError(_))));
    }

    #[test]
    fn test_cancel_summary_total() {
        let s = CancelSummary {
            pending: 2,
            running: 1,
        };
        assert_eq!(s.total(), 3);
    }
}
