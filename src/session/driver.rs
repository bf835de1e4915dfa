//! Wall-clock ticker for game timers.

use super::service::SessionService;
use crate::gateway::SettlementGateway;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Spawns a task that feeds elapsed wall-clock time into the active session.
///
/// Returns `None` when no session is active. The task ends by itself once
/// its token goes stale, i.e. on the first status change after spawning.
pub async fn spawn_ticker<G>(service: Arc<SessionService<G>>) -> Option<JoinHandle<()>>
where
    G: SettlementGateway + 'static,
{
    let token = service.tick_token().await?;
    let period = service.tick_interval();

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        let mut last = Instant::now();

        loop {
            interval.tick().await;
            let now = Instant::now();
            let elapsed = now - last;
            last = now;

            match service.tick(&token, elapsed).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(session_id = %token.session_id, "ticker stopped");
                    break;
                }
                Err(e) => {
                    warn!(session_id = %token.session_id, error = %e, "ticker stopped on error");
                    break;
                }
            }
        }
    }))
}
