//! GET handlers for the read API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use arenalog_store::queries::{
    self, CardPlayRow, DeckDetail, DeckScope, DeckSummaryRow, DraftPickRow, DraftSessionRow,
    MatchDetail, MatchRow, Overview,
};
use arenalog_store::Database;

use crate::enrich::{apply_names, CardNameResolver};
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub resolver: Arc<CardNameResolver>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
pub struct OverviewParams {
    #[serde(default)]
    recent: Option<i64>,
}

pub async fn overview(
    State(state): State<AppState>,
    Query(params): Query<OverviewParams>,
) -> Result<Json<Overview>, ApiError> {
    let out = state
        .db
        .with_conn(|conn| queries::overview(conn, params.recent.unwrap_or(20)))?;
    Ok(Json(out))
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchListParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    event: String,
    #[serde(default)]
    result: String,
}

pub async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<MatchListParams>,
) -> Result<Json<Vec<MatchRow>>, ApiError> {
    let rows = state.db.with_conn(|conn| {
        queries::list_matches(conn, params.limit.unwrap_or(200), &params.event, &params.result)
    })?;
    Ok(Json(rows))
}

pub async fn match_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MatchDetail>, ApiError> {
    if id <= 0 {
        return Err(ApiError::BadRequest("invalid match id".into()));
    }
    let mut detail = state.db.with_conn(|conn| queries::get_match_detail(conn, id))?;

    let ids: Vec<i64> = detail
        .opponent_observed_cards
        .iter()
        .filter(|card| card.card_name.is_none())
        .map(|card| card.card_id)
        .collect();
    let names = state.resolver.resolve(ids).await;
    apply_names(
        &mut detail.opponent_observed_cards,
        &names,
        |card| card.card_id,
        |card| &mut card.card_name,
    );

    Ok(Json(detail))
}

pub async fn match_timeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CardPlayRow>>, ApiError> {
    if id <= 0 {
        return Err(ApiError::BadRequest("invalid match id".into()));
    }
    let mut plays = state.db.with_conn(|conn| queries::list_card_plays(conn, id))?;

    let ids: Vec<i64> = plays.iter().map(|play| play.card_id).collect();
    let names = state.resolver.resolve(ids).await;
    apply_names(&mut plays, &names, |play| play.card_id, |play| &mut play.card_name);

    Ok(Json(plays))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeckListParams {
    #[serde(default)]
    scope: String,
}

pub async fn list_decks(
    State(state): State<AppState>,
    Query(params): Query<DeckListParams>,
) -> Result<Json<Vec<DeckSummaryRow>>, ApiError> {
    let scope = DeckScope::parse(&params.scope);
    let rows = state.db.with_conn(|conn| queries::list_decks(conn, scope))?;
    Ok(Json(rows))
}

pub async fn deck_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeckDetail>, ApiError> {
    if id <= 0 {
        return Err(ApiError::BadRequest("invalid deck id".into()));
    }
    let mut detail = state
        .db
        .with_conn(|conn| queries::get_deck_detail(conn, id, 50))?;

    let ids: Vec<i64> = detail
        .cards
        .iter()
        .filter(|card| card.card_name.is_none())
        .map(|card| card.card_id)
        .collect();
    let names = state.resolver.resolve(ids).await;
    apply_names(&mut detail.cards, &names, |card| card.card_id, |card| &mut card.card_name);

    Ok(Json(detail))
}

pub async fn list_drafts(
    State(state): State<AppState>,
) -> Result<Json<Vec<DraftSessionRow>>, ApiError> {
    let rows = state.db.with_conn(queries::list_draft_sessions)?;
    Ok(Json(rows))
}

pub async fn draft_picks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DraftPickRow>>, ApiError> {
    if id <= 0 {
        return Err(ApiError::BadRequest("invalid draft id".into()));
    }
    let rows = state.db.with_conn(|conn| queries::list_draft_picks(conn, id))?;
    Ok(Json(rows))
}
