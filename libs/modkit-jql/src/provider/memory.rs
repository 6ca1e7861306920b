use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use modkit_resource::Value;
use modkit_security::AccessScope;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ID_FIELD, ProviderError, Record, RecordProvider};

type Row = BTreeMap<String, Value>;

/// How a relation is joined: `resource.relation` follows
/// `resource.local_key = target.foreign_key`.
///
/// `users.company` is `local_key: company_id, foreign_key: id`;
/// `companies.employees` is `local_key: id, foreign_key: company_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationLink {
    pub resource: String,
    pub relation: String,
    pub target: String,
    pub local_key: String,
    pub foreign_key: String,
}

/// Process-local record store for tests and the CLI.
#[derive(Debug)]
pub struct InMemoryProvider {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    links: HashMap<(String, String), RelationLink>,
    available: AtomicBool,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            links: HashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Seed `resource` with rows. Rows without an `id` get a fresh uuid.
    #[must_use]
    pub fn with_rows(self, resource: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        self.insert_rows(resource, rows);
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: RelationLink) -> Self {
        self.links
            .insert((link.resource.clone(), link.relation.clone()), link);
        self
    }

    /// Append rows to `resource`.
    pub fn insert_rows(&self, resource: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write();
        let table = tables.entry(resource.to_owned()).or_default();
        for mut row in rows {
            row.entry(ID_FIELD.to_owned())
                .or_insert_with(|| Value::Str(Uuid::new_v4().to_string()));
            table.push(row);
        }
    }

    /// Simulate a storage outage: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows stored for `resource`, visible or not.
    #[must_use]
    pub fn row_count(&self, resource: &str) -> usize {
        self.tables.read().get(resource).map_or(0, Vec::len)
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable)
        }
    }

    fn link(&self, resource: &str, relation: &str) -> Result<&RelationLink, ProviderError> {
        self.links
            .get(&(resource.to_owned(), relation.to_owned()))
            .ok_or_else(|| {
                ProviderError::backend(format!("no link declared for '{resource}.{relation}'"))
            })
    }
}

fn row_id(row: &Row) -> String {
    row.get(ID_FIELD)
        .and_then(Value::to_scope_value)
        .map(|v| v.as_binding())
        .unwrap_or_default()
}

fn is_visible(row: &Row, visibility: &AccessScope) -> bool {
    visibility.matches(|property| row.get(property).and_then(Value::to_scope_value))
}

fn to_record(resource: &str, row: &Row) -> Record {
    Record::new(resource, row_id(row), row.clone())
}

#[async_trait]
impl RecordProvider for InMemoryProvider {
    async fn fetch_all(
        &self,
        resource: &str,
        visibility: &AccessScope,
    ) -> Result<Vec<Record>, ProviderError> {
        self.check_available()?;
        let tables = self.tables.read();
        let records: Vec<Record> = tables
            .get(resource)
            .into_iter()
            .flatten()
            .filter(|row| is_visible(row, visibility))
            .map(|row| to_record(resource, row))
            .collect();
        tracing::trace!(resource, count = records.len(), "fetched records");
        Ok(records)
    }

    async fn fetch_relation(
        &self,
        record: &Record,
        relation: &str,
        visibility: &AccessScope,
    ) -> Result<Vec<Record>, ProviderError> {
        self.check_available()?;
        let link = self.link(record.resource(), relation)?;
        let Some(local) = record.field(&link.local_key).filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };
        let tables = self.tables.read();
        Ok(tables
            .get(&link.target)
            .into_iter()
            .flatten()
            .filter(|row| {
                row.get(&link.foreign_key)
                    .is_some_and(|foreign| foreign.equals(local))
            })
            .filter(|row| is_visible(row, visibility))
            .map(|row| to_record(&link.target, row))
            .collect())
    }

    async fn find(
        &self,
        resource: &str,
        id: &str,
        visibility: &AccessScope,
    ) -> Result<Option<Record>, ProviderError> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .get(resource)
            .into_iter()
            .flatten()
            .find(|row| row_id(row) == id)
            .filter(|row| is_visible(row, visibility))
            .map(|row| to_record(resource, row)))
    }

    async fn create(
        &self,
        resource: &str,
        mut fields: BTreeMap<String, Value>,
    ) -> Result<Record, ProviderError> {
        self.check_available()?;
        fields
            .entry(ID_FIELD.to_owned())
            .or_insert_with(|| Value::Str(Uuid::new_v4().to_string()));
        let id = row_id(&fields);

        let mut tables = self.tables.write();
        let table = tables.entry(resource.to_owned()).or_default();
        if table.iter().any(|row| row_id(row) == id) {
            return Err(ProviderError::backend(format!(
                "duplicate id '{id}' in '{resource}'"
            )));
        }
        let record = Record::new(resource, id, fields.clone());
        table.push(fields);
        tracing::debug!(resource, id = record.id(), "record created");
        Ok(record)
    }

    async fn update(
        &self,
        record: &Record,
        fields: BTreeMap<String, Value>,
    ) -> Result<Record, ProviderError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(record.resource())
            .and_then(|table| table.iter_mut().find(|row| row_id(row) == record.id()))
            .ok_or_else(|| ProviderError::NotFound {
                resource: record.resource().to_owned(),
                id: record.id().to_owned(),
            })?;
        for (name, value) in fields {
            if name != ID_FIELD {
                row.insert(name, value);
            }
        }
        tracing::debug!(resource = record.resource(), id = record.id(), "record updated");
        Ok(to_record(record.resource(), row))
    }

    async fn delete(&self, record: &Record) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let table = tables.get_mut(record.resource());
        let position = table
            .as_ref()
            .and_then(|t| t.iter().position(|row| row_id(row) == record.id()));
        match (table, position) {
            (Some(table), Some(index)) => {
                table.remove(index);
                tracing::debug!(resource = record.resource(), id = record.id(), "record deleted");
                Ok(())
            }
            _ => Err(ProviderError::NotFound {
                resource: record.resource().to_owned(),
                id: record.id().to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use modkit_security::{ScopeConstraint, ScopeFilter};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new()
            .with_rows(
                "users",
                [
                    row(&[("id", Value::Int(1)), ("company_id", Value::Int(10))]),
                    row(&[("id", Value::Int(2)), ("company_id", Value::Int(10))]),
                    row(&[("id", Value::Int(3)), ("company_id", Value::Null)]),
                ],
            )
            .with_rows("companies", [row(&[("id", Value::Int(10))])])
            .with_link(RelationLink {
                resource: "companies".to_owned(),
                relation: "employees".to_owned(),
                target: "users".to_owned(),
                local_key: "id".to_owned(),
                foreign_key: "company_id".to_owned(),
            })
            .with_link(RelationLink {
                resource: "users".to_owned(),
                relation: "company".to_owned(),
                target: "companies".to_owned(),
                local_key: "company_id".to_owned(),
                foreign_key: "id".to_owned(),
            })
    }

    fn only(id: i64) -> AccessScope {
        AccessScope::single(ScopeConstraint::new(vec![ScopeFilter::eq("id", id)]))
    }

    #[tokio::test]
    async fn fetch_all_applies_visibility() {
        let p = provider();
        assert_eq!(p.fetch_all("users", &AccessScope::allow_all()).await.unwrap().len(), 3);
        assert!(p.fetch_all("users", &AccessScope::deny_all()).await.unwrap().is_empty());
        let own = p.fetch_all("users", &only(2)).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id(), "2");
    }

    #[tokio::test]
    async fn relations_follow_links_both_ways() {
        let p = provider();
        let all = AccessScope::allow_all();
        let company = p.find("companies", "10", &all).await.unwrap().unwrap();
        let employees = p.fetch_relation(&company, "employees", &all).await.unwrap();
        assert_eq!(employees.len(), 2);

        let bounded = p.fetch_relation(&company, "employees", &only(1)).await.unwrap();
        assert_eq!(bounded.len(), 1);

        let orphan = p.find("users", "3", &all).await.unwrap().unwrap();
        assert!(p.fetch_relation(&orphan, "company", &all).await.unwrap().is_empty());

        let err = p.fetch_relation(&orphan, "manager", &all).await.unwrap_err();
        assert!(matches!(err, ProviderError::Backend(_)));
    }

    #[tokio::test]
    async fn writes_round_trip() {
        let p = provider();
        let created = p
            .create("users", row(&[("company_id", Value::Int(10))]))
            .await
            .unwrap();
        assert!(Uuid::parse_str(created.id()).is_ok());
        assert_eq!(p.row_count("users"), 4);

        let updated = p
            .update(&created, row(&[("company_id", Value::Null), ("id", Value::Int(99))]))
            .await
            .unwrap();
        assert_eq!(updated.id(), created.id());
        assert!(updated.field("company_id").unwrap().is_null());

        p.delete(&created).await.unwrap();
        assert_eq!(p.row_count("users"), 3);
        assert!(matches!(
            p.delete(&created).await,
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let p = provider();
        let err = p.create("users", row(&[("id", Value::Int(1))])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Backend(_)));
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let p = provider();
        p.set_available(false);
        assert_eq!(
            p.fetch_all("users", &AccessScope::allow_all()).await.unwrap_err(),
            ProviderError::Unavailable
        );
        p.set_available(true);
        assert!(p.fetch_all("users", &AccessScope::allow_all()).await.is_ok());
    }
}
