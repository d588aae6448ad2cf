use std::time::Duration;

use super::aggregator::SurveyAggregator;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Periodically removes accumulation states abandoned for longer than `max_age`, and job
/// records that finished longer ago than that.
pub fn start_sweeper(aggregator: SurveyAggregator, max_age: Duration) {
    log::info!(
        "Starting abandoned-survey sweeper (max age {}s, every {}s)",
        max_age.as_secs(),
        SWEEP_INTERVAL.as_secs()
    );
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match aggregator.sweep_abandoned(max_age).await {
                Ok(0) => log::debug!("Sweeper found no abandoned surveys"),
                Ok(removed) => log::info!("Sweeper removed {} abandoned survey(s)", removed),
                Err(e) => log::error!("Sweeper failed: {}", e),
            }
            let pruned = aggregator.prune_finished_jobs(max_age);
            if pruned > 0 {
                log::info!("Sweeper forgot {} finished job record(s)", pruned);
            }
        }
    });
}
