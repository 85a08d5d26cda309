//! Reconnect loop around [`SessionClient::connect`].

use std::time::Duration;

use crate::{ConnectOutcome, SessionClient, SessionError};

const MIN_RECONNECT_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Connections that lasted at least this long reset the backoff.
const STABLE_CONNECTION: Duration = Duration::from_secs(30);

/// Keep the session alive across disconnects until shutdown.
///
/// # Errors
/// Returns the discovery error if the gateway endpoint cannot be looked up.
pub async fn run_session(client: &SessionClient) -> Result<(), SessionError> {
    let shutdown = client.shutdown_token();
    let mut resume = false;
    let mut backoff = MIN_RECONNECT_BACKOFF;

    loop {
        let started = tokio::time::Instant::now();
        match client.connect(resume).await? {
            ConnectOutcome::Terminate => {
                tracing::info!("Session terminated");
                return Ok(());
            }
            ConnectOutcome::Resume => resume = true,
            ConnectOutcome::Restart => resume = false,
        }

        if started.elapsed() >= STABLE_CONNECTION {
            backoff = MIN_RECONNECT_BACKOFF;
        }
        tracing::debug!(
            resume,
            backoff_ms = backoff.as_millis(),
            "Reconnecting after backoff"
        );

        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("Session terminated");
                return Ok(());
            }
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = std::cmp::min(backoff.saturating_mul(2), MAX_RECONNECT_BACKOFF);
    }
}
