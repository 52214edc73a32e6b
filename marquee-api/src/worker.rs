use std::sync::Arc;
use marquee_booking::AdmissionOrchestrator;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Periodically applies the time-driven transitions
/// (`confirmed → in_progress → completed`).
pub async fn start_lifecycle_worker(orchestrator: Arc<AdmissionOrchestrator>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Lifecycle worker started, ticking every {:?}", every);

    loop {
        ticker.tick().await;
        match orchestrator.advance_schedule().await {
            Ok(report) if report.failed > 0 => {
                error!(failed = report.failed, "some scheduled transitions failed");
            }
            Ok(_) => {}
            Err(e) => error!("Schedule pass failed: {}", e),
        }
    }
}
