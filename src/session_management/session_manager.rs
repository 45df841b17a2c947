use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use tokio::task::AbortHandle;

use super::session::{ActiveSession, SessionInfo};

/// Keeps every live relay session reachable for cancellation.
///
/// A session is registered before its task is spawned and attached to the
/// task's abort handle afterwards. The task calls [`SessionManager::finish`]
/// when it ends, so a session that completes before it was attached leaves no
/// stale entry behind.
///
/// Sessions outlive the listener that accepted them: removing a proxy does not
/// touch this map, only [`SessionManager::abort_all`] does.
pub struct SessionManager {
    active_sessions: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            active_sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.active_sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, info: SessionInfo) {
        debug!(
            "[{}] session registered on port {}",
            info.connection_id, info.local_port
        );
        self.sessions().insert(
            info.connection_id.clone(),
            ActiveSession { info, abort: None },
        );
    }

    /// Binds the task handle to a registered session. Ignored when the session
    /// already finished.
    pub fn attach(&self, connection_id: &str, abort: AbortHandle) {
        if let Some(session) = self.sessions().get_mut(connection_id) {
            session.abort = Some(abort);
        }
    }

    pub fn finish(&self, connection_id: &str) {
        if self.sessions().remove(connection_id).is_some() {
            debug!("[{}] session released", connection_id);
        }
    }

    pub fn get_active_session_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn count_for(&self, local_port: u16) -> usize {
        self.sessions()
            .values()
            .filter(|s| s.info.local_port == local_port)
            .count()
    }

    /// Live sessions ordered by port, then start time.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self.sessions().values().map(|s| s.info.clone()).collect();
        list.sort_by(|a, b| {
            a.local_port
                .cmp(&b.local_port)
                .then(a.start_time.cmp(&b.start_time))
        });
        list
    }

    /// Cancels every tracked session task and forgets them.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<ActiveSession> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in &drained {
            if let Some(abort) = &session.abort {
                abort.abort();
            }
        }
        if !drained.is_empty() {
            info!("aborted {} relay sessions", drained.len());
        }
        drained.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn info(id: &str, port: u16) -> SessionInfo {
        SessionInfo {
            connection_id: id.to_string(),
            local_port: port,
            proxy_name: "Test".to_string(),
            client_addr: "127.0.0.1:50000".parse().unwrap(),
            start_time: Utc::now(),
        }
    }

    #[test]
    fn counts_sessions_per_port() {
        let manager = SessionManager::new();
        manager.register(info("a", 9000));
        manager.register(info("b", 9000));
        manager.register(info("c", 9001));

        assert_eq!(manager.get_active_session_count(), 3);
        assert_eq!(manager.count_for(9000), 2);
        assert_eq!(manager.count_for(9001), 1);

        manager.finish("a");
        assert_eq!(manager.count_for(9000), 1);
        assert_eq!(manager.list()[0].local_port, 9000);
    }

    #[tokio::test]
    async fn attach_after_finish_leaves_no_entry() {
        let manager = SessionManager::new();
        manager.register(info("a", 9000));
        let task = tokio::spawn(async {});
        manager.finish("a");
        manager.attach("a", task.abort_handle());
        assert_eq!(manager.get_active_session_count(), 0);
    }

    #[tokio::test]
    async fn abort_all_cancels_tasks() {
        let manager = SessionManager::new();
        manager.register(info("a", 9000));
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        manager.attach("a", task.abort_handle());

        assert_eq!(manager.abort_all(), 1);
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(manager.get_active_session_count(), 0);
    }
}
