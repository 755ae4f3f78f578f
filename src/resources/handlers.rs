use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{repo::Document, Collection};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    query::{self, RawParams, Retrieval},
    response::Envelope,
    state::AppState,
};

/// Parameters forced by `GET /tours/top-5-cheap`.
const TOP_CHEAP: [(&str, &str); 3] = [
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

fn keyed(key: &str, value: Value) -> Value {
    let mut data = Map::with_capacity(1);
    data.insert(key.to_string(), value);
    Value::Object(data)
}

fn not_found(collection: Collection, raw_id: &str) -> AppError {
    AppError::not_found(format!(
        "no {} found with id: {raw_id}",
        collection.singular()
    ))
}

/// Unparseable ids cannot name a stored document.
fn document_id(collection: Collection, raw_id: &str) -> AppResult<Uuid> {
    raw_id.parse().map_err(|_| not_found(collection, raw_id))
}

async fn run_listing(
    state: &AppState,
    collection: Collection,
    params: &RawParams,
) -> AppResult<Json<Envelope<Value>>> {
    let retrieval = query::build(Retrieval::new(collection), params)?;
    let docs = state.documents.fetch(&retrieval).await?;
    let results = docs.len();
    Ok(Json(
        Envelope::success(keyed(collection.as_str(), Value::Array(docs))).with_results(results),
    ))
}

#[instrument(skip(state, user, params), fields(user_id = %user.0.id))]
pub async fn list(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    user: AuthUser,
    Query(params): Query<RawParams>,
) -> AppResult<Json<Envelope<Value>>> {
    run_listing(&state, collection, &params).await
}

#[instrument(skip(state, params))]
pub async fn top_cheap(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    Query(mut params): Query<RawParams>,
) -> AppResult<Json<Envelope<Value>>> {
    for (key, value) in TOP_CHEAP {
        params.insert(key.to_string(), value.to_string());
    }
    run_listing(&state, collection, &params).await
}

#[instrument(skip(state))]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<Value>>> {
    let doc = state
        .documents
        .get(collection, document_id(collection, &id)?)
        .await?
        .ok_or_else(|| not_found(collection, &id))?;
    Ok(Json(Envelope::success(keyed(collection.singular(), doc))))
}

#[instrument(skip(state, user, body), fields(user_id = %user.0.id))]
pub async fn create(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    user: AuthUser,
    Json(body): Json<Document>,
) -> AppResult<(StatusCode, Json<Envelope<Value>>)> {
    let doc = state.documents.insert(collection, body).await?;
    info!(%collection, id = %doc["id"], "document created");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(keyed(collection.singular(), doc))),
    ))
}

#[instrument(skip(state, user, patch), fields(user_id = %user.0.id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<Document>,
) -> AppResult<Json<Envelope<Value>>> {
    let doc = state
        .documents
        .update(collection, document_id(collection, &id)?, patch)
        .await?
        .ok_or_else(|| not_found(collection, &id))?;
    Ok(Json(Envelope::success(keyed(collection.singular(), doc))))
}

/// Mounted behind the admin gate.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if !state
        .documents
        .delete(collection, document_id(collection, &id)?)
        .await?
    {
        return Err(not_found(collection, &id));
    }
    info!(%collection, %id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}
