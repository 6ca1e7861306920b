use modkit_resource::Value;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Value of one projected field.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedValue {
    Scalar(Value),
    /// `one` relation; `None` when nothing visible is linked.
    One(Option<Box<ProjectedRecord>>),
    Many(Vec<ProjectedRecord>),
}

impl Serialize for ProjectedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(value) => value.serialize(serializer),
            Self::One(None) => serializer.serialize_none(),
            Self::One(Some(record)) => record.serialize(serializer),
            Self::Many(records) => records.serialize(serializer),
        }
    }
}

/// Ordered mapping of field name to projected value.
///
/// Serializes as a map in projection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectedRecord {
    entries: Vec<(String, ProjectedValue)>,
}

impl ProjectedRecord {
    #[must_use]
    pub fn new(entries: Vec<(String, ProjectedValue)>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProjectedValue> {
        self.entries
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Scalar value of `name`, if projected and scalar.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            ProjectedValue::Scalar(value) => Some(value),
            ProjectedValue::One(_) | ProjectedValue::Many(_) => None,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ProjectedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_projection_order() {
        let company = ProjectedRecord::new(vec![(
            "name".to_owned(),
            ProjectedValue::Scalar(Value::from("Acme")),
        )]);
        let record = ProjectedRecord::new(vec![
            ("zeta".to_owned(), ProjectedValue::Scalar(Value::Int(1))),
            ("alpha".to_owned(), ProjectedValue::Scalar(Value::Null)),
            ("company".to_owned(), ProjectedValue::One(Some(Box::new(company)))),
            ("reports".to_owned(), ProjectedValue::Many(Vec::new())),
            ("manager".to_owned(), ProjectedValue::One(None)),
        ]);

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"zeta":1,"alpha":null,"company":{"name":"Acme"},"reports":[],"manager":null}"#
        );
        assert_eq!(record.keys().collect::<Vec<_>>(), ["zeta", "alpha", "company", "reports", "manager"]);
        assert_eq!(record.scalar("zeta"), Some(&Value::Int(1)));
        assert_eq!(record.scalar("company"), None);
        assert!(!record.contains("missing"));
    }
}
