//! Admin console: command parsing, execution and text rendering.

use std::fmt::Write as _;

use crate::core::{ClientSession, Controller, DispatchError, ScheduleEntry, SlotSnapshot};
use crate::util::types::{Km, ServiceId, Tick};

/// Command list printed once at startup.
pub const BANNER: &str = "\
Admin commands:
  listar          list pending schedule
  utiliz          list logged-in clients
  frota           list fleet
  km              total distance travelled
  hora            current simulated time
  cancelar <id>   cancel a service (0 = all)
  terminar        shut the controller down";

/// A parsed admin console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// `listar`
    ListSchedule,
    /// `utiliz`
    ListSessions,
    /// `frota`
    ListFleet,
    /// `km`
    TotalKm,
    /// `hora`
    Time,
    /// `cancelar <id|0>`
    Cancel(ServiceId),
    /// `terminar`
    Shutdown,
}

impl AdminCommand {
    /// Parse one console line. Returns `Ok(None)` for a blank line.
    ///
    /// # Errors
    ///
    /// Returns `SyntaxError` naming the unknown command, or describing a bad
    /// `cancelar` argument.
    pub fn parse(line: &str) -> Result<Option<Self>, DispatchError> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };
        let command = match word {
            "listar" => Self::ListSchedule,
            "utiliz" => Self::ListSessions,
            "frota" => Self::ListFleet,
            "km" => Self::TotalKm,
            "hora" => Self::Time,
            "terminar" => Self::Shutdown,
            "cancelar" => {
                let id = parts
                    .next()
                    .and_then(|raw| raw.parse().ok())
                    .ok_or_else(|| DispatchError::SyntaxError("usage: cancelar <id|0>".into()))?;
                Self::Cancel(id)
            }
            other => {
                return Err(DispatchError::SyntaxError(format!(
                    "unknown admin command '{other}'"
                )))
            }
        };
        Ok(Some(command))
    }
}

/// What the console should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// Print this text.
    Output(String),
    /// Start shutdown.
    Shutdown,
}

/// Run `command` against `controller`.
pub async fn execute(controller: &Controller, command: AdminCommand) -> AdminOutcome {
    let text = match command {
        AdminCommand::ListSchedule => render_schedule(&controller.pending()),
        AdminCommand::ListSessions => render_sessions(&controller.sessions()),
        AdminCommand::ListFleet => {
            render_fleet(&controller.fleet(), controller.config().max_vehicles)
        }
        AdminCommand::TotalKm => render_km(controller.total_km()),
        AdminCommand::Time => render_time(controller.now()),
        AdminCommand::Cancel(id) => {
            let summary = controller.admin_cancel(id).await;
            format!(
                "{} service(s) cancelled ({} pending, {} running).",
                summary.total(),
                summary.pending,
                summary.running
            )
        }
        AdminCommand::Shutdown => return AdminOutcome::Shutdown,
    };
    AdminOutcome::Output(text)
}

/// Render the pending schedule.
#[must_use]
pub fn render_schedule(entries: &[ScheduleEntry]) -> String {
    if entries.is_empty() {
        return "(empty)".into();
    }
    let mut out = String::new();
    for e in entries {
        let _ = write!(
            out,
            "ID {} | client {} | t={} | dest {} | {} km",
            e.service_id, e.username, e.trigger_tick, e.destination, e.distance
        );
        if let (true, Some(offer)) = (e.awaiting_confirmation, e.proposed_tick) {
            let _ = write!(out, " | awaiting offer t={offer}");
        }
        out.push('\n');
    }
    out.pop();
    out
}

/// Render the session list.
#[must_use]
pub fn render_sessions(sessions: &[ClientSession]) -> String {
    if sessions.is_empty() {
        return "(empty)".into();
    }
    sessions
        .iter()
        .map(|s| format!("- {} (PID {})", s.username, s.pid))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render every one of `capacity` fleet slots, free ones included.
#[must_use]
pub fn render_fleet(slots: &[SlotSnapshot], capacity: usize) -> String {
    if capacity == 0 {
        return "(empty)".into();
    }
    (0..capacity)
        .map(|index| match slots.iter().find(|s| s.index == index) {
            Some(s) => {
                let vehicle = s
                    .vehicle_id
                    .map_or_else(|| "-".to_string(), |v| v.to_string());
                format!(
                    "slot {index} | vehicle {vehicle} | client {} | service {} | {}",
                    s.owner_pid, s.service_id, s.status
                )
            }
            None => format!("slot {index} | free"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the aggregate distance.
#[must_use]
pub fn render_km(total: Km) -> String {
    format!("Total distance: {total} km")
}

/// Render the simulated time.
#[must_use]
pub fn render_time(now: Tick) -> String {
    format!("Current time: t={now}")
}
