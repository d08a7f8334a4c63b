//! Firestore REST client for the quality-record collection.
//!
//! Documents travel as Firestore's typed-fields JSON; [`encode_fields`] /
//! [`decode_fields`] convert to and from the plain `serde_json::Value`
//! payloads the rest of the crate works with.

use crate::auth::TokenProvider;
use crate::core::{QcError, Result};
use crate::store::{DocumentStore, QueryPage, RecordQuery};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub struct FirestoreStore {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    collection: String,
}

impl FirestoreStore {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        project_id: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            project_id: project_id.into(),
            collection: collection.into(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url(), self.collection, id)
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens.ensure_valid().await?.value)
    }

    async fn check(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| QcError::Serialization(format!("Failed to decode response: {}", e)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> QcError {
    use reqwest::StatusCode;
    match status {
        StatusCode::UNAUTHORIZED => QcError::AuthRequired(format!("401: {body}")),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            QcError::TransientRemote(format!("{}: {body}", status.as_u16()))
        }
        s if s.is_server_error() => QcError::TransientRemote(format!("{}: {body}", s.as_u16())),
        s => QcError::PermanentRemote(format!("{}: {body}", s.as_u16())),
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> QcError {
    QcError::TransientRemote(format!("transport: {err}"))
}

// ============================================================================
// Value <-> Firestore typed fields
// ============================================================================

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({"nullValue": null}),
        Value::Bool(b) => json!({"booleanValue": b}),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({"integerValue": i.to_string()})
            } else {
                json!({"doubleValue": n.as_f64()})
            }
        }
        Value::String(s) => json!({"stringValue": s}),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({"arrayValue": {"values": values}})
        }
        Value::Object(map) => json!({"mapValue": {"fields": encode_fields(map)}}),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Value {
    let mut fields = Map::new();
    for (key, value) in map {
        fields.insert(key.clone(), encode_value(value));
    }
    Value::Object(fields)
}

pub fn decode_value(typed: &Value) -> Result<Value> {
    let obj = typed
        .as_object()
        .ok_or_else(|| QcError::Serialization("typed value is not an object".into()))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| QcError::Serialization("empty typed value".into()))?;
    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => {
            let raw = inner
                .as_str()
                .ok_or_else(|| QcError::Serialization("integerValue is not a string".into()))?;
            let parsed: i64 = raw
                .parse()
                .map_err(|e| QcError::Serialization(format!("bad integerValue: {}", e)))?;
            json!(parsed)
        }
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" => inner.clone(),
        "arrayValue" => {
            let values = inner.get("values").and_then(Value::as_array);
            let mut items = Vec::new();
            for v in values.into_iter().flatten() {
                items.push(decode_value(v)?);
            }
            Value::Array(items)
        }
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            let mut map = Map::new();
            for (k, v) in fields.into_iter().flatten() {
                map.insert(k.clone(), decode_value(v)?);
            }
            Value::Object(map)
        }
        other => {
            return Err(QcError::Serialization(format!(
                "unsupported typed value kind '{other}'"
            )));
        }
    };
    Ok(decoded)
}

pub fn decode_fields(document: &Value) -> Result<Value> {
    let fields = document.get("fields").and_then(Value::as_object);
    let mut map = Map::new();
    for (k, v) in fields.into_iter().flatten() {
        map.insert(k.clone(), decode_value(v)?);
    }
    Ok(Value::Object(map))
}

fn as_object(doc: &Value) -> Result<&Map<String, Value>> {
    doc.as_object()
        .ok_or_else(|| QcError::Validation("document payload must be a JSON object".into()))
}

// ============================================================================
// Query building
// ============================================================================

fn field_filter(field: &str, op: &str, typed_value: Value) -> Value {
    json!({
        "fieldFilter": {
            "field": {"fieldPath": field},
            "op": op,
            "value": typed_value,
        }
    })
}

fn day_bounds(date: NaiveDate) -> (String, String) {
    // Plain date strings bound every RFC 3339 spelling of the day
    // lexicographically, subsecond digits or not:
    // "2026-08-20" < "2026-08-20T..." < "2026-08-21".
    let start = date.format("%Y-%m-%d").to_string();
    let end = (date + chrono::Duration::days(1)).format("%Y-%m-%d").to_string();
    (start, end)
}

pub(crate) fn build_structured_query(collection: &str, query: &RecordQuery) -> Value {
    let mut filters = Vec::new();
    if let Some(date) = query.date {
        let (start, end) = day_bounds(date);
        filters.push(field_filter("updatedAt", "GREATER_THAN_OR_EQUAL", json!({"stringValue": start})));
        filters.push(field_filter("updatedAt", "LESS_THAN", json!({"stringValue": end})));
    }
    if let Some(shift) = query.shift {
        filters.push(field_filter("turno", "EQUAL", json!({"stringValue": shift.as_str()})));
    }
    if let Some(status) = query.status {
        filters.push(field_filter("estado", "EQUAL", json!({"stringValue": status.as_str()})));
    }
    if let Some(prefix) = &query.code_prefix {
        // Prefix search as a half-open range, the standard trick for stores
        // without LIKE: [prefix, prefix + U+F8FF).
        let upper = format!("{prefix}\u{f8ff}");
        filters.push(field_filter("codigo", "GREATER_THAN_OR_EQUAL", json!({"stringValue": prefix})));
        filters.push(field_filter("codigo", "LESS_THAN", json!({"stringValue": upper})));
    }

    let mut structured = Map::new();
    structured.insert("from".into(), json!([{"collectionId": collection}]));
    if filters.len() == 1 {
        if let Some(only) = filters.pop() {
            structured.insert("where".into(), only);
        }
    } else if !filters.is_empty() {
        structured.insert(
            "where".into(),
            json!({"compositeFilter": {"op": "AND", "filters": filters}}),
        );
    }
    if query.newest_first {
        structured.insert(
            "orderBy".into(),
            json!([{"field": {"fieldPath": "updatedAt"}, "direction": "DESCENDING"}]),
        );
    } else if query.code_prefix.is_some() {
        structured.insert(
            "orderBy".into(),
            json!([{"field": {"fieldPath": "codigo"}, "direction": "ASCENDING"}]),
        );
    }
    if query.limit > 0 {
        structured.insert("limit".into(), json!(query.limit));
    }
    if let Some(cursor) = &query.cursor
        && let Ok(offset) = cursor.parse::<u64>()
    {
        structured.insert("offset".into(), json!(offset));
    }
    json!({"structuredQuery": Value::Object(structured)})
}

// ============================================================================
// DocumentStore impl
// ============================================================================

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(self.doc_url(id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = self.check(response).await?;
        Ok(Some(decode_fields(&document)?))
    }

    async fn put(&self, id: &str, doc: &Value) -> Result<()> {
        let token = self.bearer().await?;
        let body = json!({"fields": encode_fields(as_object(doc)?)});
        let response = self
            .http
            .patch(self.doc_url(id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        self.check(response).await?;
        Ok(())
    }

    async fn put_merge(&self, id: &str, doc: &Value) -> Result<()> {
        let map = as_object(doc)?;
        let token = self.bearer().await?;
        let mask: Vec<(String, String)> = map
            .keys()
            .map(|k| ("updateMask.fieldPaths".to_string(), k.clone()))
            .collect();
        let body = json!({"fields": encode_fields(map)});
        let response = self
            .http
            .patch(self.doc_url(id))
            .query(&mask)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        self.check(response).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(self.doc_url(id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport)?;
        self.check(response).await?;
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<QueryPage> {
        let token = self.bearer().await?;
        let body = build_structured_query(&self.collection, query);
        let response = self
            .http
            .post(format!("{}:runQuery", self.documents_url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        let results = self.check(response).await?;
        let rows = results.as_array().cloned().unwrap_or_default();
        let mut records = Vec::new();
        for row in &rows {
            if let Some(document) = row.get("document") {
                records.push(decode_fields(document)?);
            }
        }
        let returned = records.len();
        let offset: u64 = query
            .cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let next_cursor = (query.limit > 0 && returned == query.limit)
            .then(|| (offset + returned as u64).to_string());
        Ok(QueryPage { records, next_cursor })
    }
}
