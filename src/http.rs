//! HTTP API and WebSocket event stream.
//!
//! Responses use the envelope `{"success": true, "data": ...}` or
//! `{"success": false, "error": "..."}`, always with status 200 so that
//! callers only ever branch on `success`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::EventHub;
use crate::registry::Registry;
use crate::types::{CreateDelegate, CreateMail, CreateNode};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub hub: Arc<EventHub>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chain", post(add_node).get(get_node))
        .route("/api/chain/del", post(del_node))
        .route("/api/chain/all", get(all_nodes))
        .route("/api/chain/delegate", post(add_delegate).get(get_delegate))
        .route("/api/chain/delegate/del", post(del_delegate))
        .route("/api/chain/delegate/all", get(all_delegates))
        .route("/api/mail", get(all_mails).post(add_mail))
        .route("/api/mail/del", post(del_mail))
        .route("/api/mail/notify/start", post(start_notify))
        .route("/api/mail/notify/stop", post(stop_notify))
        .route("/api/mail/notify/status", get(notify_status))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

fn respond<T: Serialize>(op: &str, result: Result<T>) -> Json<Value> {
    match result {
        Ok(data) => Json(json!({ "success": true, "data": data })),
        Err(e) => {
            warn!("[API] {} failed: {}", op, e);
            Json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeQuery {
    id: String,
    #[serde(default)]
    with_delegates: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    with_delegates: bool,
}

#[derive(Debug, Deserialize)]
struct IdBody {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyParam {
    public_key: String,
}

async fn add_node(State(s): State<ApiState>, Json(body): Json<CreateNode>) -> Json<Value> {
    info!("[API] addNode {}:{}", body.ip, body.port);
    respond("addNode", s.registry.add_node(body).map(|id| json!({ "id": id })))
}

async fn get_node(State(s): State<ApiState>, Query(q): Query<NodeQuery>) -> Json<Value> {
    respond("getNode", s.registry.get_node(&q.id, q.with_delegates))
}

async fn del_node(State(s): State<ApiState>, Json(body): Json<IdBody>) -> Json<Value> {
    info!("[API] delNode {}", body.id);
    respond("delNode", s.registry.del_node(&body.id))
}

async fn all_nodes(State(s): State<ApiState>, Query(q): Query<ListQuery>) -> Json<Value> {
    respond("allNodes", Ok(s.registry.all_nodes(q.with_delegates)))
}

async fn add_delegate(
    State(s): State<ApiState>,
    Json(body): Json<CreateDelegate>,
) -> Json<Value> {
    info!("[API] addDelegate {} on {}", body.public_key, body.id);
    respond(
        "addDelegate",
        s.registry
            .add_delegate(body)
            .map(|pk| json!({ "publicKey": pk })),
    )
}

async fn get_delegate(
    State(s): State<ApiState>,
    Query(q): Query<PublicKeyParam>,
) -> Json<Value> {
    respond("getDelegate", s.registry.get_delegate(&q.public_key))
}

async fn del_delegate(
    State(s): State<ApiState>,
    Json(body): Json<PublicKeyParam>,
) -> Json<Value> {
    info!("[API] delDelegate {}", body.public_key);
    respond("delDelegate", s.registry.del_delegate(&body.public_key))
}

async fn all_delegates(State(s): State<ApiState>) -> Json<Value> {
    respond("allDelegates", Ok(s.registry.all_delegates()))
}

async fn all_mails(State(s): State<ApiState>) -> Json<Value> {
    respond("allMails", s.registry.all_mails())
}

async fn add_mail(State(s): State<ApiState>, Json(body): Json<CreateMail>) -> Json<Value> {
    respond("addMail", s.registry.add_mail(body))
}

async fn del_mail(State(s): State<ApiState>, Json(body): Json<IdBody>) -> Json<Value> {
    respond("delMail", s.registry.del_mail(&body.id).map(|_| json!({ "id": body.id })))
}

async fn start_notify(State(s): State<ApiState>) -> Json<Value> {
    s.registry.start_watcher();
    respond("startNotify", Ok(json!({ "running": s.registry.watcher_running() })))
}

async fn stop_notify(State(s): State<ApiState>) -> Json<Value> {
    s.registry.stop_watcher();
    respond("stopNotify", Ok(json!({ "running": s.registry.watcher_running() })))
}

async fn notify_status(State(s): State<ApiState>) -> Json<Value> {
    respond("notifyStatus", Ok(json!({ "running": s.registry.watcher_running() })))
}

async fn health(State(s): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "nodes": s.registry.all_nodes(false).len(),
        "delegates": s.registry.all_delegates().len(),
        "watcher": s.registry.watcher_running(),
        "subscribers": s.hub.subscriber_count(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(s): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, s.hub))
}

/// Forward every hub event to one WebSocket client until either side closes.
async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    info!("[API] WebSocket subscriber connected");
    let (mut sender, mut receiver) = socket.split();
    let mut rx = hub.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(ev) => ev,
                Err(RecvError::Lagged(n)) => {
                    warn!("[API] WebSocket subscriber lagged, dropped {} events", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    warn!("[API] Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    debug!("[API] WebSocket subscriber disconnected");
}
