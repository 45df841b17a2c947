use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use tokio::sync::Notify;
use warp::{Filter, Reply};

use super::routes::*;
use crate::controller::Engine;
use crate::error_handling::types::WebError;

/// Web server for the HTTP API, the live feed and the dashboard
pub struct WebServer {
    engine: Arc<Engine>,
    shutdown: Arc<Notify>,
}

impl WebServer {
    /// `shutdown` is notified when a client calls `POST /api/shutdown`.
    pub fn new(engine: Arc<Engine>, shutdown: Arc<Notify>) -> Self {
        Self { engine, shutdown }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        dashboard_route()
            .or(list_proxies_route(Arc::clone(&self.engine)))
            .or(create_proxy_route(Arc::clone(&self.engine)))
            .or(test_target_route())
            .or(delete_proxy_route(Arc::clone(&self.engine)))
            .or(history_route(Arc::clone(&self.engine)))
            .or(sessions_route(Arc::clone(&self.engine)))
            .or(shutdown_route(Arc::clone(&self.shutdown)))
            .or(monitor_route(Arc::clone(&self.engine)))
            .recover(handle_rejection)
            .with(warp::log("relayscope::web"))
    }

    /// Binds `addr` and serves until the task running it is dropped.
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_ephemeral(addr)
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        info!("Web interface listening on http://{}", bound);
        server.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::RelaySettings;
    use crate::data_capture::{Direction, PacketDraft};
    use crate::event_bus::{Event, StatusEvent, TargetStatus};
    use crate::protocol_decoding::PacketCodec;
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use warp::http::StatusCode;

    fn server() -> (WebServer, Arc<Engine>, Arc<Notify>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let settings = RelaySettings {
            bind_address: "127.0.0.1".to_string(),
            ..RelaySettings::default()
        };
        let engine = Arc::new(Engine::new(
            settings,
            PacketCodec::with_builtin_decoders().unwrap(),
        ));
        let shutdown = Arc::new(Notify::new());
        (
            WebServer::new(Arc::clone(&engine), Arc::clone(&shutdown)),
            engine,
            shutdown,
        )
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn body<B: AsRef<[u8]>>(resp: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(resp.body().as_ref()).unwrap()
    }

    fn record(engine: &Engine, proxy_name: &str, text: &str) {
        engine.history().append(PacketDraft {
            timestamp: Utc::now(),
            proxy_name: proxy_name.to_string(),
            local_port: 9000,
            connection_id: "abcd1234".to_string(),
            direction: Direction::Tx,
            raw_bytes: text.as_bytes().to_vec(),
            semantic: None,
        });
    }

    #[tokio::test]
    async fn dashboard_is_served() {
        let (server, _, _) = server();
        let resp = warp::test::request().path("/").reply(&server.routes()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(String::from_utf8_lossy(resp.body().as_ref()).contains("/ws/monitor"));
    }

    #[tokio::test]
    async fn proxy_lifecycle_over_http() {
        let (server, engine, _) = server();
        let routes = server.routes();
        let port = free_port().await;
        let create = json!({
            "local_port": port,
            "target_host": "127.0.0.1",
            "target_port": 4532,
            "name": "Radio",
            "protocol": "hamlib"
        });

        let resp = warp::test::request()
            .method("POST")
            .path("/api/proxies")
            .json(&create)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(&resp)["status"], "success");

        let resp = warp::test::request()
            .method("POST")
            .path("/api/proxies")
            .json(&create)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(body(&resp)["message"].as_str().unwrap().contains("already in use"));

        let resp = warp::test::request().path("/api/proxies").reply(&routes).await;
        let listed = body(&resp);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["local_port"], port);
        assert_eq!(listed[0]["protocol"], "hamlib");
        assert_eq!(listed[0]["status"], "unknown");

        let path = format!("/api/proxies/{}", port);
        let resp = warp::test::request()
            .method("DELETE")
            .path(&path)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("DELETE")
            .path(&path)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(engine.list_proxies().is_empty());
    }

    #[tokio::test]
    async fn invalid_proxy_is_a_bad_request() {
        let (server, _, _) = server();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/proxies")
            .json(&json!({
                "local_port": 0,
                "target_host": "127.0.0.1",
                "target_port": 80,
                "name": "Zero"
            }))
            .reply(&server.routes())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn connection_test_always_answers_ok() {
        let (server, _, _) = server();
        let routes = server.routes();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let resp = warp::test::request()
            .method("POST")
            .path("/api/proxies/test")
            .json(&json!({ "target_host": "127.0.0.1", "target_port": open }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(&resp)["status"], "success");

        drop(listener);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/proxies/test")
            .json(&json!({ "target_host": "127.0.0.1", "target_port": open }))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = body(&resp);
        assert_eq!(outcome["status"], "error");
        assert!(outcome["message"].as_str().unwrap().starts_with("Connection failed"));
    }

    #[tokio::test]
    async fn history_queries() {
        let (server, engine, _) = server();
        let routes = server.routes();
        for i in 0..12 {
            record(&engine, if i % 2 == 0 { "Even" } else { "Odd" }, &format!("msg{}", i));
        }

        let resp = warp::test::request().path("/api/history").reply(&routes).await;
        let latest = body(&resp);
        assert_eq!(latest.as_array().unwrap().len(), 10);
        assert_eq!(latest[0]["sequence"], 12);
        assert_eq!(latest[0]["data_str"], "msg11");
        assert_eq!(latest[0]["direction"], "TX");
        assert!(latest[0]["timestamp"].is_f64());

        let resp = warp::test::request()
            .path("/api/history?limit=3&proxy_name=Even")
            .reply(&routes)
            .await;
        let even = body(&resp);
        assert_eq!(even.as_array().unwrap().len(), 3);
        assert!(even.as_array().unwrap().iter().all(|r| r["proxy_name"] == "Even"));

        let resp = warp::test::request()
            .path("/api/history?since=10")
            .reply(&routes)
            .await;
        let newer = body(&resp);
        assert_eq!(newer.as_array().unwrap().len(), 2);
        assert_eq!(newer[0]["sequence"], 11);
        assert_eq!(newer[1]["sequence"], 12);

        let resp = warp::test::request()
            .path("/api/history?limit=lots")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sessions_start_empty() {
        let (server, _, _) = server();
        let resp = warp::test::request().path("/api/sessions").reply(&server.routes()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(&resp), json!([]));
    }

    #[tokio::test]
    async fn shutdown_endpoint_notifies_controller() {
        let (server, _, shutdown) = server();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/shutdown")
            .reply(&server.routes())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        tokio::time::timeout(Duration::from_secs(1), shutdown.notified())
            .await
            .expect("shutdown was not signalled");
    }

    #[tokio::test]
    async fn live_feed_streams_bus_events() {
        let (server, engine, _) = server();
        let mut client = warp::test::ws()
            .path("/ws/monitor")
            .handshake(server.routes())
            .await
            .expect("handshake");

        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.bus().observer_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("observer never subscribed");

        engine.bus().publish(Event::Status(StatusEvent {
            local_port: 9000,
            status: TargetStatus::Offline,
            error_msg: Some("refused".to_string()),
        }));

        let msg = client.recv().await.expect("frame");
        let event: Value = serde_json::from_str(msg.to_str().unwrap()).unwrap();
        assert_eq!(event["type"], "status");
        assert_eq!(event["local_port"], 9000);
        assert_eq!(event["status"], "offline");
    }
}
