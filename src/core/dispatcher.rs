//! Dispatch scheduler: admission policy, reconciliation pass, renegotiation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RenegotiationConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::fleet::ProjectedFree;
use crate::core::lifecycle::LifecycleManager;
use crate::core::schedule::{Decision, ScheduleEntry};
use crate::core::state::ControllerState;
use crate::core::vehicle::TripOrder;
use crate::core::DispatchError;
use crate::infra::message::{Message, ReplyKind};
use crate::infra::outbox::Outbox;
use crate::util::types::{ClientPid, Km, ServiceId, Tick, VehicleId};

/// A parsed `agendar` payload: `<hour> <place> <km>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Requested tick.
    pub hour: Tick,
    /// Destination name.
    pub destination: String,
    /// Trip distance.
    pub distance: Km,
}

impl ServiceRequest {
    /// Parse a schedule payload.
    ///
    /// # Errors
    ///
    /// Returns `SyntaxError` unless the payload has a non-negative hour, a
    /// place token and a positive distance.
    pub fn parse(payload: &str) -> Result<Self, DispatchError> {
        let syntax = || DispatchError::SyntaxError("expected: agendar <hour> <place> <km>".into());
        let mut parts = payload.split_whitespace();
        let (Some(hour), Some(place), Some(km), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(syntax());
        };
        let hour: Tick = hour.parse().map_err(|_| syntax())?;
        let distance: Km = km.parse().map_err(|_| syntax())?;
        if distance == 0 {
            return Err(DispatchError::SyntaxError("distance must be greater than 0".into()));
        }
        Ok(Self {
            hour,
            destination: place.to_string(),
            distance,
        })
    }
}

/// Outcome of admitting a fresh schedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Placed in a fleet slot right away.
    Dispatched {
        /// Assigned service id.
        service_id: ServiceId,
        /// Worker identity.
        vehicle_id: VehicleId,
    },
    /// Queued for the reconciliation pass.
    Scheduled {
        /// Assigned service id.
        service_id: ServiceId,
        /// Tick at which it becomes due.
        trigger_tick: Tick,
    },
    /// Queued awaiting the owner's answer to an offer.
    Offered {
        /// Assigned service id.
        service_id: ServiceId,
        /// Offered tick.
        offer: Tick,
    },
}

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Finished slots recycled.
    pub reaped: usize,
    /// Due entries placed in a slot.
    pub dispatched: usize,
    /// Offers sent.
    pub offered: usize,
    /// Entries dropped after their last offer.
    pub dropped: usize,
}

/// Time-driven admission of schedule entries into the fleet.
pub struct Dispatcher {
    state: Arc<ControllerState>,
    lifecycle: Arc<LifecycleManager>,
    outbox: Arc<dyn Outbox>,
    policy: RenegotiationConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        state: Arc<ControllerState>,
        lifecycle: Arc<LifecycleManager>,
        outbox: Arc<dyn Outbox>,
        policy: RenegotiationConfig,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            state,
            lifecycle,
            outbox,
            policy,
            audit,
        }
    }

    /// Admit a fresh request from `owner` and assign its service id.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed` if the requested hour is already past
    /// - `CapacityExceeded` if the schedule queue is full
    /// - any non-transient dispatch error
    pub fn admit(
        &self,
        owner_pid: ClientPid,
        username: &str,
        request: &ServiceRequest,
    ) -> Result<Admission, DispatchError> {
        let now = self.state.clock.now();
        if request.hour < now {
            return Err(DispatchError::PreconditionFailed(format!(
                "requested time {} is in the past (now t={now})",
                request.hour
            )));
        }

        let service_id = self.state.next_service_id();
        let entry = ScheduleEntry::new(
            service_id,
            username,
            owner_pid,
            request.hour,
            request.distance,
            request.destination.as_str(),
        );

        if request.hour == now {
            match self.lifecycle.dispatch(&order_for(&entry)) {
                Ok(placed) => {
                    return Ok(Admission::Dispatched {
                        service_id,
                        vehicle_id: placed.vehicle_id,
                    })
                }
                Err(e) if e.is_transient_capacity() => {
                    debug!(service_id, error = %e, "no vehicle for immediate request");
                }
                Err(e) => return Err(e),
            }
            return self.enqueue_with_offer(entry, now);
        }

        if self.state.fleet.saturated_at(request.hour) {
            return self.enqueue_with_offer(entry, now);
        }

        self.state.schedule.insert(entry)?;
        info!(tick = now, service_id, username, trigger_tick = request.hour, "service scheduled");
        Ok(Admission::Scheduled {
            service_id,
            trigger_tick: request.hour,
        })
    }

    /// Run one pass: reap finished slots, then try every due entry in table order.
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport {
            reaped: self.lifecycle.reap_finished().await,
            ..PassReport::default()
        };
        let now = self.state.clock.now();

        for due in self.state.schedule.due(now) {
            // Claimed entries leave the pending view before a slot exists.
            let Some(entry) = self.state.schedule.claim(due.service_id) else {
                continue;
            };
            match self.lifecycle.dispatch(&order_for(&entry)) {
                Ok(placed) => {
                    if !self.state.schedule.complete(entry.service_id) {
                        // Cancelled while the vehicle was starting.
                        self.lifecycle.preempt(None, Some(entry.service_id));
                        info!(service_id = entry.service_id, "cancelled during dispatch, preempting");
                        continue;
                    }
                    report.dispatched += 1;
                    let notice = Message::reply(
                        ReplyKind::Info,
                        format!(
                            "Service {}: vehicle {} en route to {}.",
                            entry.service_id, placed.vehicle_id, entry.destination
                        ),
                    );
                    self.notify(entry.owner_pid, notice).await;
                }
                Err(e) if e.is_transient_capacity() => {
                    if !self.state.schedule.unclaim(entry.service_id)
                        || !entry.notice_allowed(now, self.policy.notice_interval_ticks)
                    {
                        continue;
                    }
                    if entry.offers >= self.policy.max_rounds {
                        if self.drop_entry(&entry, now).await {
                            report.dropped += 1;
                        }
                    } else if self.offer(&entry, now).await {
                        report.offered += 1;
                    }
                }
                Err(e) => {
                    self.state.schedule.unclaim(entry.service_id);
                    warn!(service_id = entry.service_id, error = %e, "dispatch failed");
                }
            }
        }

        if report != PassReport::default() {
            debug!(tick = now, ?report, "reconciliation pass");
        }
        report
    }

    /// Apply `owner`'s answer to an offer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the entry belongs to `owner` and awaits an answer.
    pub fn decide(
        &self,
        owner_pid: ClientPid,
        username: &str,
        service_id: ServiceId,
        accept: bool,
    ) -> Result<Decision, DispatchError> {
        let decision = self.state.schedule.decide(owner_pid, service_id, accept)?;
        let now = self.state.clock.now();
        info!(tick = now, service_id, username, ?decision, "offer answered");
        self.record(
            service_id,
            username,
            AuditAction::Decision,
            Some(String::from(if accept { "accepted" } else { "rejected" })),
        );
        Ok(decision)
    }

    /// Tick to offer at `now`: the projected free tick, never sooner than the
    /// minimum lead.
    #[must_use]
    pub fn compute_offer(&self, now: Tick) -> Tick {
        let projected = match self
            .state
            .fleet
            .projected_free_tick(now, self.policy.default_horizon_ticks)
        {
            ProjectedFree::Now => now,
            ProjectedFree::At(tick) => tick,
        };
        projected.max(now.saturating_add(self.policy.min_offer_lead_ticks))
    }

    /// Text of an offer for `service_id`.
    #[must_use]
    pub fn offer_text(service_id: ServiceId, offer: Tick) -> String {
        format!(
            "No vehicle available for service {service_id}. Proposed time t={offer}. \
             Reply: decisao {service_id} <y|n>"
        )
    }

    fn enqueue_with_offer(&self, entry: ScheduleEntry, now: Tick) -> Result<Admission, DispatchError> {
        let offer = self.compute_offer(now);
        let service_id = entry.service_id;
        let username = entry.username.clone();
        self.state.schedule.insert(entry.with_offer(offer, now))?;
        info!(tick = now, service_id, username = %username, offer, "service queued with offer");
        self.record(service_id, &username, AuditAction::Offer, Some(format!("t={offer}")));
        Ok(Admission::Offered { service_id, offer })
    }

    async fn offer(&self, entry: &ScheduleEntry, now: Tick) -> bool {
        let offer = self.compute_offer(now);
        let Some(updated) = self.state.schedule.propose(entry.service_id, offer, now) else {
            return false;
        };
        info!(
            tick = now,
            service_id = updated.service_id,
            offer,
            round = updated.offers,
            "renegotiation offer"
        );
        self.record(
            updated.service_id,
            &updated.username,
            AuditAction::Offer,
            Some(format!("t={offer}")),
        );
        let message = Message::reply(ReplyKind::Info, Self::offer_text(updated.service_id, offer));
        self.notify(updated.owner_pid, message).await;
        true
    }

    async fn drop_entry(&self, entry: &ScheduleEntry, now: Tick) -> bool {
        if self.state.schedule.deactivate(entry.service_id).is_none() {
            return false;
        }
        warn!(tick = now, service_id = entry.service_id, offers = entry.offers, "service dropped");
        self.record(
            entry.service_id,
            &entry.username,
            AuditAction::Drop,
            Some(format!("after {} offers", entry.offers)),
        );
        let err = DispatchError::CapacityExceeded(format!(
            "service {} dropped: no vehicle after {} offers",
            entry.service_id, entry.offers
        ));
        self.notify(entry.owner_pid, Message::error(&err)).await;
        true
    }

    async fn notify(&self, pid: ClientPid, message: Message) {
        if let Err(e) = self.outbox.deliver(pid, message).await {
            warn!(pid, error = %e, "notification not delivered");
        }
    }

    fn record(&self, service_id: ServiceId, username: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            let tick = self.state.clock.now();
            sink.record(build_audit_event(service_id, username, action, tick, detail));
        }
    }
}

fn order_for(entry: &ScheduleEntry) -> TripOrder {
    TripOrder {
        service_id: entry.service_id,
        username: entry.username.clone(),
        owner_pid: entry.owner_pid,
        distance: entry.distance,
        destination: entry.destination.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let req = ServiceRequest::parse("12 porto 7").unwrap();
        assert_eq!(req.hour, 12);
        assert_eq!(req.destination, "porto");
        assert_eq!(req.distance, 7);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for payload in ["", "12 porto", "x porto 3", "-1 porto 3", "1 porto 0", "1 porto 3 extra"] {
            assert!(
                matches!(ServiceRequest::parse(payload), Err(DispatchError::SyntaxError(_))),
                "{payload:?}"
            );
        }
    }

    #[test]
    fn test_offer_text_names_reply_format() {
        let text = Dispatcher::offer_text(4, 17);
        assert!(text.contains("t=17"));
        assert!(text.contains("decisao 4 <y|n>"));
    }
}
