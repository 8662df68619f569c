//! Fixed-interval ticks delivered over channels.
//!
//! Both binaries build their snapshot before starting the scheduler, so the
//! first tick always lands one full interval after `start`.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    pub tick: mpsc::Sender<()>,
}

/// Spawn one ticker task per job. A task ends when its receiver is dropped.
pub fn start(jobs: Vec<JobSpec>) -> Vec<JoinHandle<()>> {
    jobs.into_iter()
        .map(|job| {
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(Instant::now() + job.interval, job.interval);
                // A slow reload should not cause a burst of catch-up reloads.
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    interval.tick().await;
                    tracing::debug!(job = %job.name, "scheduler tick");
                    if job.tick.send(()).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(interval: Duration, tick: mpsc::Sender<()>) -> JobSpec {
        JobSpec {
            name: "ledger_refresh".to_string(),
            interval,
            tick,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fires_at_intervals() {
        let (tx, mut rx) = mpsc::channel(16);
        let _handles = start(vec![job(Duration::from_secs(300), tx)]);

        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(299)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_ok());

        tokio::time::advance(Duration::from_secs(300)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_at_start() {
        let (tx, mut rx) = mpsc::channel(16);
        let _handles = start(vec![job(Duration::from_secs(60), tx)]);

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let handles = start(vec![job(Duration::from_secs(1), tx)]);
        drop(rx);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        assert!(handles[0].is_finished());
    }
}
