// queuebot-core/src/tasks/token_refresh.rs

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::auth::twitch_token::REFRESH_WINDOW;
use crate::auth::TokenSource;

/// How long to wait after a failed refresh before trying again.
const RETRY_AFTER_FAILURE: StdDuration = StdDuration::from_secs(30);

/// Time until the next validity check: sleep until ten minutes before
/// expiry, then check every minute, then every second inside the
/// five-minute refresh window. Unknown expiry is checked every minute.
pub fn calculate_check_interval(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> StdDuration {
    let Some(expires_at) = expires_at else {
        return StdDuration::from_secs(60);
    };
    let until_expiry = expires_at - now;

    if until_expiry <= REFRESH_WINDOW {
        return StdDuration::from_secs(1);
    }

    let until_first_check = until_expiry - Duration::minutes(10);
    if until_first_check <= Duration::zero() {
        return StdDuration::from_secs(60);
    }

    until_first_check
        .to_std()
        .unwrap_or(StdDuration::from_secs(60))
}

fn refresh_due(tokens: &dyn TokenSource, now: DateTime<Utc>) -> bool {
    match tokens.expires_at() {
        Some(exp) => exp - now <= REFRESH_WINDOW,
        None => true,
    }
}

/// Spawns a background task that keeps `tokens` refreshed until `shutdown_rx`
/// flips to true.
pub fn spawn_token_refresh_task(
    tokens: Arc<dyn TokenSource>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Token refresh task started.");
        loop {
            let now = Utc::now();
            let wait = if refresh_due(tokens.as_ref(), now) {
                match tokens.refresh().await {
                    Ok(()) => calculate_check_interval(tokens.expires_at(), Utc::now()),
                    Err(e) => {
                        error!("Token refresh failed: {:?}", e);
                        RETRY_AFTER_FAILURE
                    }
                }
            } else {
                calculate_check_interval(tokens.expires_at(), now)
            };

            tokio::select! {
                _ = sleep(wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Token refresh task stopped.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockTokenSource;

    #[test]
    fn interval_far_from_expiry_waits_until_ten_minutes_left() {
        let now = Utc::now();
        let interval = calculate_check_interval(Some(now + Duration::hours(1)), now);
        assert_eq!(interval, StdDuration::from_secs(50 * 60));
    }

    #[test]
    fn interval_inside_ten_minutes_is_one_minute() {
        let now = Utc::now();
        let interval = calculate_check_interval(Some(now + Duration::minutes(8)), now);
        assert_eq!(interval, StdDuration::from_secs(60));
    }

    #[test]
    fn interval_inside_refresh_window_is_one_second() {
        let now = Utc::now();
        assert_eq!(
            calculate_check_interval(Some(now + Duration::minutes(4)), now),
            StdDuration::from_secs(1)
        );
        assert_eq!(
            calculate_check_interval(Some(now - Duration::minutes(4)), now),
            StdDuration::from_secs(1)
        );
    }

    #[test]
    fn unknown_expiry_checks_every_minute() {
        assert_eq!(
            calculate_check_interval(None, Utc::now()),
            StdDuration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn task_refreshes_when_due_and_stops_on_shutdown() {
        let mut mock = MockTokenSource::new();
        let soon = Utc::now() + Duration::minutes(2);

        mock.expect_expires_at().returning(move || Some(soon));
        mock.expect_last_refresh().returning(|| None);
        // After the refresh the next check is a second away, past the shutdown below.
        mock.expect_refresh().times(1).returning(|| Ok(()));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_token_refresh_task(Arc::new(mock), rx);

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
