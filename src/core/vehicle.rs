//! Vehicle workers: the launch seam, the trip-line wire format, and the
//! simulated worker used by the controller.
//!
//! A worker writes newline-terminated text lines into a one-way byte stream
//! that the controller's monitor task reads:
//!
//! ```text
//! Inicio: porto (3 km)
//! Progresso: 33% (1/3 km)
//! Progresso: 66% (2/3 km)
//! Progresso: 100% (3/3 km)
//! [RELATORIO] 3
//! Viagem concluida com sucesso.
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::DispatchError;
use crate::infra::message::{Message, ReplyKind};
use crate::infra::outbox::Outbox;
use crate::util::types::{ClientPid, Km, ServiceId, VehicleId};

/// Prefix of the line written when a trip starts.
pub const START_MARKER: &str = "Inicio:";
/// Prefix of periodic progress lines.
pub const PROGRESS_MARKER: &str = "Progresso:";
/// Prefix of the final distance report.
pub const REPORT_MARKER: &str = "[RELATORIO]";
/// Prefix of the line written after a completed trip.
pub const COMPLETED_MARKER: &str = "Viagem concluida";
/// Prefix of the line written after a preempted trip.
pub const CANCELLED_MARKER: &str = "Viagem cancelada";

const TRIP_STREAM_CAPACITY: usize = 4096;

/// Everything a worker needs to run one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripOrder {
    /// Service being run.
    pub service_id: ServiceId,
    /// Owning client's name.
    pub username: String,
    /// Owning client, notified directly by the worker.
    pub owner_pid: ClientPid,
    /// Distance to travel.
    pub distance: Km,
    /// Destination name.
    pub destination: String,
}

/// Read end of a worker's output stream.
pub type TripOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A worker that has been started.
pub struct LaunchedVehicle {
    /// Worker identity.
    pub vehicle_id: VehicleId,
    /// Stream the worker writes its trip lines into.
    pub output: TripOutput,
    /// Cooperative preemption token.
    pub preempt: CancellationToken,
    /// Worker task.
    pub worker: JoinHandle<()>,
}

/// Abstraction for starting a vehicle worker.
///
/// Called without any controller lock held. A failure here is treated as a
/// transient capacity failure.
pub trait VehicleLauncher: Send + Sync + 'static {
    /// Start a worker for `order`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnFailure` if the worker or its stream cannot be created.
    fn launch(&self, order: &TripOrder) -> Result<LaunchedVehicle, DispatchError>;
}

/// A recognised line of worker output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripLine<'a> {
    /// Trip started.
    Start(&'a str),
    /// Progress update.
    Progress(&'a str),
    /// Final distance actually travelled.
    Report(Km),
    /// Trip completed.
    Completed(&'a str),
    /// Trip preempted.
    Cancelled(&'a str),
    /// Anything else.
    Other(&'a str),
}

impl<'a> TripLine<'a> {
    /// Classify one line (trailing newline ignored).
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(rest) = line.strip_prefix(REPORT_MARKER) {
            return rest
                .trim()
                .parse()
                .map_or(Self::Other(line), Self::Report);
        }
        if line.starts_with(START_MARKER) {
            Self::Start(line)
        } else if line.starts_with(PROGRESS_MARKER) {
            Self::Progress(line)
        } else if line.starts_with(COMPLETED_MARKER) {
            Self::Completed(line)
        } else if line.starts_with(CANCELLED_MARKER) {
            Self::Cancelled(line)
        } else {
            Self::Other(line)
        }
    }
}

/// In-process worker: one tokio task per trip, advancing one km per step.
pub struct SimulatedVehicle {
    outbox: Arc<dyn Outbox>,
    step: Duration,
    progress_step_percent: u32,
    next_id: AtomicU32,
}

impl SimulatedVehicle {
    /// Create a launcher whose trips take `step` of wall-clock time per km.
    pub fn new(outbox: Arc<dyn Outbox>, step: Duration, progress_step_percent: u32) -> Self {
        Self {
            outbox,
            step,
            progress_step_percent: progress_step_percent.clamp(1, 100),
            next_id: AtomicU32::new(1),
        }
    }
}

impl VehicleLauncher for SimulatedVehicle {
    fn launch(&self, order: &TripOrder) -> Result<LaunchedVehicle, DispatchError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DispatchError::SpawnFailure(e.to_string()))?;
        let (output, input) = tokio::io::duplex(TRIP_STREAM_CAPACITY);
        let preempt = CancellationToken::new();
        let vehicle_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let trip = Trip {
            order: order.clone(),
            vehicle_id,
            step: self.step,
            progress_step: u64::from(self.progress_step_percent),
            outbox: Arc::clone(&self.outbox),
            preempt: preempt.clone(),
        };
        let worker = runtime.spawn(trip.run(input));

        Ok(LaunchedVehicle {
            vehicle_id,
            output: Box::new(output),
            preempt,
            worker,
        })
    }
}

struct Trip {
    order: TripOrder,
    vehicle_id: VehicleId,
    step: Duration,
    progress_step: u64,
    outbox: Arc<dyn Outbox>,
    preempt: CancellationToken,
}

impl Trip {
    async fn run(self, mut out: DuplexStream) {
        let owner = self.order.owner_pid;
        let km = self.order.distance;

        let arrived = Message::reply(
            ReplyKind::Status,
            format!(
                "Vehicle {} arrived at {}. Starting trip...",
                self.vehicle_id, self.order.destination
            ),
        );
        if let Err(e) = self.outbox.deliver(owner, arrived).await {
            warn!(vehicle_id = self.vehicle_id, pid = owner, error = %e, "client unreachable, aborting trip");
            Self::emit(&mut out, "Erro: cliente incontactavel. A abortar.").await;
            Self::emit(&mut out, &format!("{REPORT_MARKER} 0")).await;
            return;
        }

        Self::emit(&mut out, &format!("{START_MARKER} {} ({km} km)", self.order.destination)).await;

        let mut travelled: Km = 0;
        let mut last_pct: u64 = 0;
        while travelled < km {
            tokio::select! {
                biased;
                () = self.preempt.cancelled() => {
                    Self::emit(&mut out, &format!("{REPORT_MARKER} {travelled}")).await;
                    Self::emit(&mut out, &format!("{CANCELLED_MARKER} pelo controlador!")).await;
                    self.notify_end("Trip cancelled by the controller.").await;
                    return;
                }
                () = tokio::time::sleep(self.step) => {}
            }
            travelled += 1;
            let pct = travelled * 100 / km;
            if pct / self.progress_step > last_pct / self.progress_step {
                Self::emit(&mut out, &format!("{PROGRESS_MARKER} {pct}% ({travelled}/{km} km)")).await;
            }
            last_pct = pct;
        }

        Self::emit(&mut out, &format!("{REPORT_MARKER} {travelled}")).await;
        Self::emit(&mut out, &format!("{COMPLETED_MARKER} com sucesso.")).await;
        self.notify_end("Arrived at destination.").await;
    }

    async fn notify_end(&self, text: &str) {
        let end = Message::reply(ReplyKind::TripEnd, text);
        if let Err(e) = self.outbox.deliver(self.order.owner_pid, end).await {
            debug!(vehicle_id = self.vehicle_id, error = %e, "trip end notice not delivered");
        }
    }

    async fn emit(out: &mut DuplexStream, line: &str) {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        if let Err(e) = out.write_all(&bytes).await {
            debug!(error = %e, "trip output closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::outbox::InMemoryOutbox;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn test_parse_lines() {
        assert_eq!(TripLine::parse("[RELATORIO] 12\n"), TripLine::Report(12));
        assert_eq!(TripLine::parse("[RELATORIO] x"), TripLine::Other("[RELATORIO] x"));
        assert_eq!(
            TripLine::parse("Progresso: 50% (1/2 km)\n"),
            TripLine::Progress("Progresso: 50% (1/2 km)")
        );
        assert_eq!(TripLine::parse("Inicio: porto (2 km)"), TripLine::Start("Inicio: porto (2 km)"));
        assert!(matches!(TripLine::parse("Viagem concluida com sucesso."), TripLine::Completed(_)));
        assert!(matches!(TripLine::parse("Viagem cancelada pelo controlador!"), TripLine::Cancelled(_)));
        assert!(matches!(TripLine::parse("hello"), TripLine::Other(_)));
    }

    fn order(distance: Km) -> TripOrder {
        TripOrder {
            service_id: 1,
            username: "ana".into(),
            owner_pid: 10,
            distance,
            destination: "porto".into(),
        }
    }

    async fn collect(output: TripOutput) -> Vec<String> {
        let mut lines = BufReader::new(output).lines();
        let mut out = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn test_completed_trip_output() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let launcher = SimulatedVehicle::new(outbox.clone(), Duration::from_millis(1), 50);

        let vehicle = launcher.launch(&order(2)).unwrap();
        let lines = collect(vehicle.output).await;
        vehicle.worker.await.unwrap();

        assert_eq!(
            lines,
            vec![
                "Inicio: porto (2 km)",
                "Progresso: 50% (1/2 km)",
                "Progresso: 100% (2/2 km)",
                "[RELATORIO] 2",
                "Viagem concluida com sucesso.",
            ]
        );
        assert_eq!(outbox.fetch_kind(10, ReplyKind::Status).len(), 1);
        assert_eq!(outbox.fetch_kind(10, ReplyKind::TripEnd).len(), 1);
    }

    #[tokio::test]
    async fn test_preempted_trip_reports_partial_distance() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let launcher = SimulatedVehicle::new(outbox.clone(), Duration::from_secs(60), 10);

        let vehicle = launcher.launch(&order(5)).unwrap();
        vehicle.preempt.cancel();
        let lines = collect(vehicle.output).await;

        assert_eq!(lines[0], "Inicio: porto (5 km)");
        assert_eq!(lines[1], "[RELATORIO] 0");
        assert!(lines[2].starts_with(CANCELLED_MARKER));
        assert_eq!(outbox.fetch_kind(10, ReplyKind::TripEnd).len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_client_aborts() {
        let outbox = Arc::new(InMemoryOutbox::new());
        outbox.disconnect(10);
        let launcher = SimulatedVehicle::new(outbox, Duration::from_millis(1), 10);

        let vehicle = launcher.launch(&order(5)).unwrap();
        let lines = collect(vehicle.output).await;
        assert_eq!(lines.last().map(String::as_str), Some("[RELATORIO] 0"));
    }
}
