//! Thin REST proxy: forwards record CRUD to the persistence gateway and the
//! permission-refresh call to the photo store. No business logic lives
//! here; the handlers translate HTTP to gateway calls and map errors.

use crate::core::{QcError, RecordStatus, Shift};
use crate::gateway::PersistenceGateway;
use crate::store::{DocumentStore, PhotoStore, RecordQuery};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub struct WebError(QcError);

impl From<QcError> for WebError {
    fn from(err: QcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            QcError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            QcError::AuthRequired(_) => (StatusCode::UNAUTHORIZED, "auth_required"),
            QcError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            QcError::TransientRemote(_) => (StatusCode::BAD_GATEWAY, "transient_remote"),
            QcError::PermanentRemote(_) => (StatusCode::BAD_GATEWAY, "permanent_remote"),
            QcError::Storage(_) | QcError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}

pub type WebResult<T> = std::result::Result<T, WebError>;

struct ProxyState<D: DocumentStore> {
    gateway: PersistenceGateway<D>,
    photos: Arc<dyn PhotoStore>,
}

/// Builds the proxy router over an injected document store and photo store.
pub fn proxy_router<D: DocumentStore + 'static>(
    gateway: PersistenceGateway<D>,
    photos: Arc<dyn PhotoStore>,
) -> axum::Router {
    let state = Arc::new(ProxyState { gateway, photos });
    axum::Router::new()
        .route("/records", get(list_records::<D>).post(create_record::<D>))
        .route(
            "/records/:id",
            get(get_record::<D>)
                .patch(patch_record::<D>)
                .delete(delete_record::<D>),
        )
        .route("/photos/:id/permission", post(refresh_permission::<D>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
struct ListParams {
    date: Option<chrono::NaiveDate>,
    shift: Option<String>,
    status: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

fn parse_shift(raw: &str) -> WebResult<Shift> {
    serde_json::from_value(Value::String(raw.to_uppercase()))
        .map_err(|_| WebError(QcError::Validation(format!("unknown shift '{raw}'"))))
}

fn parse_status(raw: &str) -> WebResult<RecordStatus> {
    serde_json::from_value(Value::String(raw.to_uppercase()))
        .map_err(|_| WebError(QcError::Validation(format!("unknown status '{raw}'"))))
}

async fn list_records<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Query(params): Query<ListParams>,
) -> WebResult<Json<Value>> {
    let mut query = RecordQuery {
        date: params.date,
        limit: params.limit.unwrap_or(20),
        cursor: params.cursor,
        ..Default::default()
    };
    if let Some(shift) = params.shift.as_deref() {
        query.shift = Some(parse_shift(shift)?);
    }
    if let Some(status) = params.status.as_deref() {
        query.status = Some(parse_status(status)?);
        query.newest_first = true;
    }
    if let Some(search) = params.search {
        query.code_prefix = Some(search);
    }
    let page = state.gateway.query(&query).await?;
    Ok(Json(json!({
        "records": page.records,
        "nextCursor": page.next_cursor,
    })))
}

async fn get_record<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Path(id): Path<String>,
) -> WebResult<Json<Value>> {
    let doc = state
        .gateway
        .get_raw(&id)
        .await?
        .ok_or(WebError(QcError::NotFound(id)))?;
    Ok(Json(doc))
}

async fn create_record<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Json(payload): Json<Value>,
) -> WebResult<(StatusCode, Json<Value>)> {
    let draft: crate::core::DraftRecord = serde_json::from_value(payload)
        .map_err(|e| WebError(QcError::Validation(format!("bad record payload: {e}"))))?;
    state.gateway.save(&draft).await?;
    Ok((StatusCode::CREATED, Json(json!({"id": draft.id}))))
}

async fn patch_record<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> WebResult<StatusCode> {
    if !patch.is_object() {
        return Err(WebError(QcError::Validation(
            "patch body must be a JSON object".into(),
        )));
    }
    state.gateway.update_patch(&id, &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_record<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Path(id): Path<String>,
) -> WebResult<StatusCode> {
    state.gateway.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_permission<D: DocumentStore>(
    State(state): State<Arc<ProxyState<D>>>,
    Path(id): Path<String>,
) -> WebResult<StatusCode> {
    state.photos.set_public_read_permission(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryDocumentStore, MemoryPhotoStore};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> (axum::Router, Arc<MemoryDocumentStore>) {
        let docs = Arc::new(MemoryDocumentStore::new());
        let gateway = PersistenceGateway::new(docs.clone());
        let photos: Arc<dyn PhotoStore> = Arc::new(MemoryPhotoStore::new());
        (proxy_router(gateway, photos), docs)
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let (router, _docs) = router();
        let mut draft = crate::core::DraftRecord::new("camaron", "ana");
        draft.codigo = "C1".into();
        draft.lote = "L1".into();
        let body = serde_json::to_string(&draft).unwrap();

        let create = axum::http::Request::builder()
            .method("POST")
            .uri("/records")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = router.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let get = axum::http::Request::builder()
            .uri(format!("/records/{}", draft.id))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_record_maps_to_404_with_code() {
        let (router, _docs) = router();
        let request = axum::http::Request::builder()
            .uri("/records/ghost")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "not_found");
    }
}
