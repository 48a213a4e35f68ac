use std::time::Duration;

use checkout_engine::{db_types::Order, CheckoutDatabase, CheckoutFlowApi};
use log::*;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};

/// Controls a running expiry worker.
pub struct ExpiryWorkerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ExpiryWorkerHandle {
    /// Stops the worker after any pass in progress and waits for it to exit.
    pub async fn shutdown(self) {
        let Self { stop, task } = self;
        // The worker may already have exited, in which case there is nobody to tell
        let _ = stop.send(());
        if let Err(e) = task.await {
            error!("🕰️ Expiry worker did not shut down cleanly. {e}");
        }
    }
}

/// Starts the expiry worker. Every `interval` it runs one reaper pass, expiring pending orders whose hold has elapsed
/// and returning their tickets to the pool.
///
/// Running the worker on several replicas at once is safe. An order that another replica (or a late payment) gets to
/// first is reported as skipped.
pub fn start_expiry_worker<B>(api: CheckoutFlowApi<B>, interval: Duration) -> ExpiryWorkerHandle
where B: CheckoutDatabase + 'static {
    let (stop, mut stop_signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Order expiry worker started. Running every {}s", interval.as_secs_f64());
        loop {
            tokio::select! {
                _ = &mut stop_signal => break,
                _ = timer.tick() => {
                    trace!("🕰️ Running order expiry job");
                    match api.expire_stale_orders().await {
                        Ok(result) if result.is_empty() => trace!("🕰️ No orders were due to expire"),
                        Ok(result) => {
                            info!(
                                "🕰️ {} orders expired, {} skipped, {} unclaimed reservations released",
                                result.expired_count(),
                                result.skipped_count(),
                                result.released_count()
                            );
                            debug!("🕰️ Expired orders: {}", order_list(&result.expired));
                        },
                        Err(e) => {
                            error!("🕰️ Error running order expiry job: {e}");
                        },
                    }
                },
            }
        }
        info!("🕰️ Order expiry worker stopped");
    });
    ExpiryWorkerHandle { stop, task }
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] {} reservation: {}", o.order_number, o.id, o.reservation_id))
        .collect::<Vec<String>>()
        .join(", ")
}
