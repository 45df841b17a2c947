//! Reachability probing of relay targets.

use std::sync::Weak;
use std::time::Duration;

use log::{debug, info};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::proxy_registry::ProxyRegistry;

/// Timeout of one periodic probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens and immediately closes a TCP connection to `host:port`.
pub async fn probe_target(host: &str, port: u16, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}

/// Probes every relay target each `period` until the registry goes away or
/// the returned task is aborted.
pub fn spawn_health_monitor(registry: Weak<ProxyRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Health monitor started, probing every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                debug!("registry dropped, health monitor exiting");
                break;
            };
            registry.check_health().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_reports_reachable_and_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert_eq!(probe_target("127.0.0.1", port, PROBE_TIMEOUT).await, Ok(()));

        drop(listener);
        let err = probe_target("127.0.0.1", port, PROBE_TIMEOUT).await.unwrap_err();
        assert!(!err.is_empty());
    }
}
