//! Router assembly and the serve loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use arenalog_store::Database;

use crate::enrich::CardNameResolver;
use crate::handlers::{self, AppState};

pub struct ServerConfig {
    /// Listen address; a bare `:port` binds all interfaces.
    pub addr: String,
    /// Built frontend to serve at `/`, when present.
    pub web_dist: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            web_dist: None,
        }
    }
}

/// Expand Go-style `:8080` shorthand into a bindable address.
pub fn normalize_addr(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    }
}

pub fn build_router(state: AppState, web_dist: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/overview", get(handlers::overview))
        .route("/api/matches", get(handlers::list_matches))
        .route("/api/matches/{id}", get(handlers::match_detail))
        .route("/api/matches/{id}/timeline", get(handlers::match_timeline))
        .route("/api/decks", get(handlers::list_decks))
        .route("/api/decks/{id}", get(handlers::deck_detail))
        .route("/api/drafts", get(handlers::list_drafts))
        .route("/api/drafts/{id}/picks", get(handlers::draft_picks))
        .with_state(state);

    let router = match web_dist.filter(|dir| dir.is_dir()) {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api.fallback(|| async { "arenalog API is running. Frontend build not found." }),
    };

    router.layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns the bound address and the server task;
/// the task ends when the token is cancelled.
pub async fn listen(
    config: ServerConfig,
    db: Database,
    cancel: CancellationToken,
) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let resolver = CardNameResolver::new(db.clone()).map_err(std::io::Error::other)?;
    let state = AppState {
        db,
        resolver: Arc::new(resolver),
    };
    let router = build_router(state, config.web_dist);

    let addr = normalize_addr(&config.addr);
    let listener = TcpListener::bind(&addr).await?;
    let bound_addr = listener.local_addr()?;
    info!(addr = %bound_addr, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("server shutdown initiated");
            })
            .await;
    });

    Ok((bound_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenalog_store::{decks, matches};

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            decks::upsert(
                conn,
                "D1",
                "Constructed_Ladder",
                "Mono Red",
                "Standard",
                "event_set_deck",
                "",
                &[decks::DeckCard { section: "main", card_id: 5001, quantity: 4 }],
            )?;
            matches::upsert_start(conn, "M1", "Constructed_Ladder", 2, "2026-01-01T00:00:00Z")?;
            matches::update_end(conn, "M1", 2, 2, 8, 400, "Concede", "2026-01-01T00:20:00Z")?;
            Ok(())
        })
        .unwrap();
        db
    }

    async fn start_test_server() -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let config = ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            web_dist: None,
        };
        let (addr, _handle) = listen(config, seeded_db(), cancel.clone()).await.unwrap();
        (addr, cancel)
    }

    #[test]
    fn normalize_addr_expands_port_shorthand() {
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_endpoint_responds() {
        let (addr, cancel) = start_test_server().await;
        let resp = reqwest::get(format!("http://{addr}/api/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overview_reports_seeded_match() {
        let (addr, cancel) = start_test_server().await;
        let resp = reqwest::get(format!("http://{addr}/api/overview?recent=5"))
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["totalMatches"], 1);
        assert_eq!(body["wins"], 1);
        assert_eq!(body["recent"][0]["arenaMatchId"], "M1");
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn match_filters_and_detail() {
        let (addr, cancel) = start_test_server().await;

        let rows: serde_json::Value =
            reqwest::get(format!("http://{addr}/api/matches?result=win&event=Constructed_Ladder"))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);

        let missing = reqwest::get(format!("http://{addr}/api/matches/999")).await.unwrap();
        assert_eq!(missing.status(), 404);

        let bad = reqwest::get(format!("http://{addr}/api/matches/0")).await.unwrap();
        assert_eq!(bad.status(), 400);
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deck_scope_filtering_over_http() {
        let (addr, cancel) = start_test_server().await;

        let constructed: serde_json::Value =
            reqwest::get(format!("http://{addr}/api/decks?scope=constructed"))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(constructed.as_array().unwrap().len(), 1);

        let draft: serde_json::Value = reqwest::get(format!("http://{addr}/api/decks?scope=draft"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(draft.as_array().unwrap().len(), 0);
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_route_falls_back_to_placeholder() {
        let (addr, cancel) = start_test_server().await;
        let resp = reqwest::get(format!("http://{addr}/somewhere")).await.unwrap();
        let text = resp.text().await.unwrap();
        assert!(text.contains("arenalog API is running"));
        cancel.cancel();
    }
}
