use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::Notify;
use warp::filters::body::BodyDeserializeError;
use warp::filters::ws::{Message, WebSocket, Ws};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::*;
use crate::controller::Engine;
use crate::error_handling::types::RegistryError;
use crate::network::probe_target;

/// Timeout of `POST /api/proxies/test`.
const TEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>relayscope</title></head>
<body>
<h1>relayscope is running</h1>
<p>Relays: <a href="/api/proxies">/api/proxies</a>,
history: <a href="/api/history?limit=50">/api/history</a>,
sessions: <a href="/api/sessions">/api/sessions</a>.</p>
<pre id="feed"></pre>
<script>
const feed = document.getElementById("feed");
const ws = new WebSocket(`ws://${location.host}/ws/monitor`);
ws.onmessage = (msg) => {
  const ev = JSON.parse(msg.data);
  const line = ev.type === "packet"
    ? `#${ev.sequence} ${ev.proxy_name} ${ev.direction} ${ev.data_str}${ev.semantic ? "  [" + ev.semantic + "]" : ""}`
    : `${ev.type} ${JSON.stringify(ev)}`;
  feed.textContent = line + "\n" + feed.textContent.slice(0, 20000);
};
</script>
</body></html>"#;

fn with_engine(
    engine: Arc<Engine>,
) -> impl Filter<Extract = (Arc<Engine>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&engine))
}

fn error_reply(message: impl Into<String>, status: StatusCode) -> reply::WithStatus<reply::Json> {
    reply::with_status(reply::json(&ApiError::new(message)), status)
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .map(|| reply::html(DASHBOARD_HTML))
}

/// GET /api/proxies
pub fn list_proxies_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "proxies")
        .and(warp::get())
        .and(with_engine(engine))
        .map(|engine: Arc<Engine>| reply::json(&engine.proxy_statuses()))
}

/// POST /api/proxies
pub fn create_proxy_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "proxies")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine))
        .and_then(|req: CreateProxyRequest, engine: Arc<Engine>| async move {
            let name = req.name.clone();
            let port = req.local_port;
            let res = match engine.add_proxy(req.into()).await {
                Ok(()) => reply::with_status(
                    reply::json(&ApiMessage::success(format!(
                        "Proxy '{}' started on port {}",
                        name, port
                    ))),
                    StatusCode::OK,
                ),
                Err(e @ RegistryError::PortInUse(_)) => error_reply(e.to_string(), StatusCode::CONFLICT),
                Err(e) => error_reply(e.to_string(), StatusCode::BAD_REQUEST),
            };
            Ok::<_, Rejection>(res)
        })
}

/// DELETE /api/proxies/:port
pub fn delete_proxy_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "proxies" / u16)
        .and(warp::delete())
        .and(with_engine(engine))
        .and_then(|port: u16, engine: Arc<Engine>| async move {
            let res = match engine.remove_proxy(port).await {
                Ok(()) => reply::with_status(
                    reply::json(&ApiMessage::success(format!("Proxy on port {} stopped", port))),
                    StatusCode::OK,
                ),
                Err(e @ RegistryError::NotFound(_)) => error_reply(e.to_string(), StatusCode::NOT_FOUND),
                Err(e) => error_reply(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
            };
            Ok::<_, Rejection>(res)
        })
}

/// POST /api/proxies/test
///
/// Always answers 200; the outcome is in the `status` field.
pub fn test_target_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "proxies" / "test")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(|req: TestTargetRequest| async move {
            let outcome =
                match probe_target(&req.target_host, req.target_port, TEST_CONNECT_TIMEOUT).await {
                    Ok(()) => ApiMessage::success("Connection successful"),
                    Err(e) => ApiMessage::error(format!("Connection failed: {}", e)),
                };
            Ok::<_, Rejection>(reply::json(&outcome))
        })
}

/// GET /api/history?limit=&proxy_name=&since=
///
/// Newest first, unless `since` is given: then every newer packet in
/// ascending order, capped by `limit` when present.
pub fn history_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "history")
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(with_engine(engine))
        .map(|query: HistoryQuery, engine: Arc<Engine>| {
            let records = match query.since {
                Some(since) => {
                    let mut records = engine.get_history_since(since);
                    if let Some(name) = &query.proxy_name {
                        records.retain(|r| &r.proxy_name == name);
                    }
                    if let Some(limit) = query.limit {
                        records.truncate(limit);
                    }
                    records
                }
                None => {
                    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
                    match &query.proxy_name {
                        Some(name) => engine.get_history_for(name, limit),
                        None => engine.get_history(limit),
                    }
                }
            };
            reply::json(&records)
        })
}

/// GET /api/sessions
pub fn sessions_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "sessions")
        .and(warp::get())
        .and(with_engine(engine))
        .map(|engine: Arc<Engine>| reply::json(&engine.sessions()))
}

/// POST /api/shutdown
pub fn shutdown_route(
    shutdown: Arc<Notify>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "shutdown")
        .and(warp::post())
        .map(move || {
            info!("Shutdown requested through the web interface");
            shutdown.notify_one();
            reply::json(&ApiMessage::success("Server shutting down..."))
        })
}

/// GET /ws/monitor
pub fn monitor_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("ws" / "monitor")
        .and(warp::ws())
        .and(with_engine(engine))
        .map(|ws: Ws, engine: Arc<Engine>| ws.on_upgrade(move |socket| live_feed(socket, engine)))
}

/// Forwards every bus event to one WebSocket client as a JSON text frame.
async fn live_feed(socket: WebSocket, engine: Arc<Engine>) {
    let mut subscription = engine.subscribe();
    let (mut outgoing, mut incoming) = socket.split();
    info!("Live feed observer {} connected", subscription.id());

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("unable to serialize event: {}", e);
                        continue;
                    }
                };
                if outgoing.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("live feed socket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    engine.unsubscribe(&mut subscription);
    info!(
        "Live feed observer {} disconnected ({} events dropped)",
        subscription.id(),
        subscription.dropped()
    );
}

/// Renders rejections as JSON `ApiError`s.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (message, status) = if err.is_not_found() {
        ("Not found".to_string(), StatusCode::NOT_FOUND)
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (e.to_string(), StatusCode::BAD_REQUEST)
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (e.to_string(), StatusCode::BAD_REQUEST)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("Method not allowed".to_string(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        warn!("unhandled rejection: {:?}", err);
        ("Internal error".to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    };
    Ok(error_reply(message, status))
}
