use std::{cmp::Ordering, sync::Mutex};

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::{strip_reserved, to_document, Document, DocumentStore},
    Collection,
};
use crate::{
    error::AppResult,
    query::{Comparison, Condition, Direction, Retrieval},
};

struct Stored {
    collection: Collection,
    id: Uuid,
    created_at: OffsetDateTime,
    body: Document,
}

impl Stored {
    fn document(&self) -> AppResult<Value> {
        to_document(self.id, self.created_at, self.body.clone())
    }
}

/// In-memory `DocumentStore` for tests. Filters follow the Postgres renderer:
/// numbers and booleans only match values of the same JSON type, strings
/// compare as text. Sorting follows jsonb ordering
/// (`null < string < number < boolean < array < object`) with missing fields
/// last under ascending order; strings order bytewise, not by collation.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<Vec<Stored>>,
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Ascending order of one sort key; an absent field is SQL NULL.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare(x, y),
    }
}

fn matches(doc: &Value, field: &str, condition: &Condition) -> bool {
    let Some(actual) = doc.get(field) else {
        return false;
    };
    let expected = &condition.value;
    let ord = match (actual, expected) {
        (Value::Number(_), Value::Number(_)) | (Value::Bool(_), Value::Bool(_)) => {
            compare(actual, expected)
        }
        // text comparison, as `body->>field` does
        (_, Value::String(text)) => scalar_text(actual).as_str().cmp(text.as_str()),
        _ => return false,
    };
    match condition.op {
        Comparison::Eq => ord == Ordering::Equal,
        Comparison::Gt => ord == Ordering::Greater,
        Comparison::Gte => ord != Ordering::Less,
        Comparison::Lt => ord == Ordering::Less,
        Comparison::Lte => ord != Ordering::Greater,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, retrieval: &Retrieval) -> AppResult<Vec<Value>> {
        let spec = &retrieval.spec;
        let mut docs = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.collection == retrieval.collection)
            .map(Stored::document)
            .collect::<AppResult<Vec<_>>>()?;

        docs.retain(|doc| {
            spec.filters
                .iter()
                .all(|(field, conds)| conds.iter().all(|c| matches(doc, field, c)))
        });

        docs.sort_by(|a, b| {
            spec.sort.iter().fold(Ordering::Equal, |acc, key| {
                acc.then_with(|| {
                    let ord = sort_order(a.get(&key.field), b.get(&key.field));
                    match key.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
            })
        });

        let docs: Vec<Value> = match spec.page {
            Some(page) => docs
                .into_iter()
                .skip(page.skip() as usize)
                .take(page.limit as usize)
                .collect(),
            None => docs,
        };
        Ok(docs.into_iter().map(|d| spec.projection.apply(d)).collect())
    }

    async fn get(&self, collection: Collection, id: Uuid) -> AppResult<Option<Value>> {
        let docs = self.docs.lock().unwrap();
        docs.iter()
            .find(|d| d.collection == collection && d.id == id)
            .map(Stored::document)
            .transpose()
    }

    async fn insert(&self, collection: Collection, body: Document) -> AppResult<Value> {
        let mut docs = self.docs.lock().unwrap();
        // Strictly increasing timestamps keep default ordering deterministic.
        let created_at = docs
            .last()
            .map(|d| d.created_at + time::Duration::seconds(1))
            .unwrap_or_else(|| OffsetDateTime::now_utc().replace_nanosecond(0).unwrap());
        let stored = Stored {
            collection,
            id: Uuid::new_v4(),
            created_at,
            body: strip_reserved(body),
        };
        let doc = stored.document();
        docs.push(stored);
        doc
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Document,
    ) -> AppResult<Option<Value>> {
        let mut docs = self.docs.lock().unwrap();
        let Some(stored) = docs
            .iter_mut()
            .find(|d| d.collection == collection && d.id == id)
        else {
            return Ok(None);
        };
        stored.body.extend(strip_reserved(patch));
        stored.document().map(Some)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> AppResult<bool> {
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|d| !(d.collection == collection && d.id == id));
        Ok(docs.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::query::build;

    fn body(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::default();
        for (name, price, rating) in [
            ("Forest Hiker", 397, 4.7),
            ("Sea Explorer", 497, 4.8),
            ("Snow Adventurer", 997, 4.5),
            ("City Wanderer", 1197, 4.8),
        ] {
            store
                .insert(
                    Collection::Tours,
                    body(json!({"name": name, "price": price, "ratingsAverage": rating})),
                )
                .await
                .unwrap();
        }
        store
            .insert(Collection::Plants, body(json!({"name": "Fern", "price": 5})))
            .await
            .unwrap();
        store
    }

    fn names(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|d| d["name"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn filters_sorts_and_projects() {
        let store = seeded().await;
        let raw = params(&[
            ("price[gte]", "450"),
            ("sort", "-ratingsAverage,price"),
            ("fields", "name"),
        ]);
        let retrieval = build(Retrieval::new(Collection::Tours), &raw).unwrap();
        let docs = store.fetch(&retrieval).await.unwrap();

        assert_eq!(names(&docs), ["Sea Explorer", "City Wanderer", "Snow Adventurer"]);
        let keys: Vec<&String> = docs[0].as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(docs[0].get("price").is_none());
        assert!(docs[0].get("id").is_some());
    }

    #[tokio::test]
    async fn default_listing_is_newest_first_and_paginated() {
        let store = seeded().await;
        let raw = params(&[("page", "2"), ("limit", "3")]);
        let retrieval = build(Retrieval::new(Collection::Tours), &raw).unwrap();
        let docs = store.fetch(&retrieval).await.unwrap();
        assert_eq!(names(&docs), ["Forest Hiker"]);

        let beyond = build(
            Retrieval::new(Collection::Tours),
            &params(&[("page", "9"), ("limit", "3")]),
        )
        .unwrap();
        assert!(store.fetch(&beyond).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_filter_fields_match_nothing() {
        let store = seeded().await;
        let retrieval = Retrieval::new(Collection::Tours)
            .filter(&params(&[("price[ne]", "397")]))
            .unwrap();
        assert!(store.fetch(&retrieval).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_types_sort_like_jsonb() {
        let store = MemoryDocumentStore::default();
        for (name, rank) in [
            ("flag", json!(true)),
            ("missing", Value::Null),
            ("text", json!("high")),
            ("null", Value::Null),
            ("number", json!(3)),
        ] {
            let mut doc = body(json!({ "name": name }));
            if name != "missing" {
                doc.insert("rank".into(), rank);
            }
            store.insert(Collection::Plants, doc).await.unwrap();
        }

        let asc = build(Retrieval::new(Collection::Plants), &params(&[("sort", "rank")])).unwrap();
        let docs = store.fetch(&asc).await.unwrap();
        assert_eq!(names(&docs), ["null", "text", "number", "flag", "missing"]);

        let desc = build(Retrieval::new(Collection::Plants), &params(&[("sort", "-rank")])).unwrap();
        let docs = store.fetch(&desc).await.unwrap();
        assert_eq!(names(&docs), ["missing", "flag", "number", "text", "null"]);
    }

    #[tokio::test]
    async fn update_merges_and_keeps_identity() {
        let store = MemoryDocumentStore::default();
        let doc = store
            .insert(Collection::Plants, body(json!({"name": "Fern", "id": "forged"})))
            .await
            .unwrap();
        assert_ne!(doc["id"], "forged");
        let id: Uuid = doc["id"].as_str().unwrap().parse().unwrap();

        let updated = store
            .update(Collection::Plants, id, body(json!({"price": 7, "id": "x"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], "Fern");
        assert_eq!(updated["price"], 7);
        assert_eq!(updated["id"], doc["id"]);

        assert!(store.update(Collection::Tours, id, Document::new()).await.unwrap().is_none());
        assert!(store.delete(Collection::Plants, id).await.unwrap());
        assert!(!store.delete(Collection::Plants, id).await.unwrap());
        assert!(store.get(Collection::Plants, id).await.unwrap().is_none());
    }
}
