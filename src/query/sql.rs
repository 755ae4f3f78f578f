use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use super::{Condition, Direction, Retrieval, CREATED_AT_FIELD, ID_FIELD};

pub(crate) const DOCUMENT_COLUMNS: &str = "id, created_at, body";

/// Where a field lives in the `documents` table.
enum Column<'a> {
    Id,
    CreatedAt,
    Body(&'a str),
}

impl<'a> Column<'a> {
    fn of(field: &'a str) -> Self {
        match field {
            ID_FIELD => Column::Id,
            CREATED_AT_FIELD => Column::CreatedAt,
            other => Column::Body(other),
        }
    }
}

/// Pushes `body->>$n`; the field name is always a bind parameter.
fn push_text_field(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    qb.push("(body->>").push_bind(field.to_string()).push(")");
}

/// The field cast to `sql_type`; NULL (never matching) when the stored JSON
/// value is not a `json_type`.
fn push_typed_field(
    qb: &mut QueryBuilder<'_, Postgres>,
    field: &str,
    json_type: &'static str,
    sql_type: &'static str,
) {
    qb.push("CASE WHEN jsonb_typeof(body->")
        .push_bind(field.to_string())
        .push(") = '")
        .push(json_type)
        .push("' THEN ");
    push_text_field(qb, field);
    qb.push("::").push(sql_type).push(" END");
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, field: &str, condition: &Condition) {
    let op = condition.op.sql();
    match (Column::of(field), &condition.value) {
        (Column::Id, value) => {
            qb.push("id::text ").push(op).push(" ").push_bind(scalar_text(value));
        }
        (Column::CreatedAt, Value::Number(n)) => {
            qb.push("created_at ")
                .push(op)
                .push(" to_timestamp(")
                .push_bind(n.as_f64().unwrap_or_default())
                .push(")");
        }
        (Column::CreatedAt, value) => {
            qb.push("created_at ")
                .push(op)
                .push(" ")
                .push_bind(scalar_text(value))
                .push("::timestamptz");
        }
        (Column::Body(name), Value::Number(n)) => {
            push_typed_field(qb, name, "number", "numeric");
            qb.push(" ")
                .push(op)
                .push(" ")
                .push_bind(n.as_f64().unwrap_or_default());
        }
        (Column::Body(name), Value::Bool(b)) => {
            push_typed_field(qb, name, "boolean", "boolean");
            qb.push(" ").push(op).push(" ").push_bind(*b);
        }
        (Column::Body(name), value) => {
            push_text_field(qb, name);
            qb.push(" ").push(op).push(" ").push_bind(scalar_text(value));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Retrieval {
    /// Renders the descriptor as a parameterized query over `documents`.
    /// Projection is not part of the SQL; apply it to the fetched rows.
    pub fn to_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE collection = "
        ));
        qb.push_bind(self.collection.as_str());

        for (field, conditions) in &self.spec.filters {
            for condition in conditions {
                qb.push(" AND ");
                push_condition(&mut qb, field, condition);
            }
        }

        if !self.spec.sort.is_empty() {
            qb.push(" ORDER BY ");
            let mut keys = qb.separated(", ");
            for key in &self.spec.sort {
                match Column::of(&key.field) {
                    Column::Id => keys.push("id"),
                    Column::CreatedAt => keys.push("created_at"),
                    Column::Body(name) => keys
                        .push("body->")
                        .push_bind_unseparated(name.to_string()),
                };
                keys.push_unseparated(match key.direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                });
            }
        }

        if let Some(page) = self.spec.page {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.skip()).unwrap_or(i64::MAX));
        }
        qb
    }
}
