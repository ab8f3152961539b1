//! Storage types for the source store abstraction layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A named collection in the source store.
///
/// The store treats each collection as an opaque entity type; the cache layer
/// only uses the name to decide which cache entries a mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    MenuItem,
    Ingredient,
    Restaurant,
    /// Link between a menu item and a restaurant that serves it.
    MenuItemOnRestaurant,
    /// Link between a menu item and one of its ingredients.
    MenuItemIngredient,
    Order,
    Reservation,
}

impl Collection {
    /// All collections, in migration order.
    pub const ALL: [Collection; 7] = [
        Collection::MenuItem,
        Collection::Ingredient,
        Collection::Restaurant,
        Collection::MenuItemOnRestaurant,
        Collection::MenuItemIngredient,
        Collection::Order,
        Collection::Reservation,
    ];

    /// Returns the collection name as used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MenuItem => "MenuItem",
            Self::Ingredient => "Ingredient",
            Self::Restaurant => "Restaurant",
            Self::MenuItemOnRestaurant => "MenuItemOnRestaurant",
            Self::MenuItemIngredient => "MenuItemIngredient",
            Self::Order => "Order",
            Self::Reservation => "Reservation",
        }
    }

    /// Returns the snake_case table name for relational backends.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::MenuItem => "menu_item",
            Self::Ingredient => "ingredient",
            Self::Restaurant => "restaurant",
            Self::MenuItemOnRestaurant => "menu_item_on_restaurant",
            Self::MenuItemIngredient => "menu_item_ingredient",
            Self::Order => "order",
            Self::Reservation => "reservation",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s || c.table_name() == s)
            .copied()
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// A record as stored in the source store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The collection the record belongs to.
    pub collection: Collection,
    /// The record ID.
    pub id: String,
    /// The record payload as a JSON object (includes `id`).
    pub data: Value,
    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the record was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredRecord {
    /// Creates a new `StoredRecord` stamped with the current time.
    #[must_use]
    pub fn new(collection: Collection, id: impl Into<String>, data: Value) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            collection,
            id: id.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a string field of the payload.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// A single filter condition on a payload field.
///
/// The field `id` addresses the record ID, any other name addresses a
/// top-level field of the JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value.
    Eq(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
}

impl Filter {
    /// Returns the filtered field name.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Eq(field, _) | Self::In(field, _) => field,
        }
    }

    /// Evaluates the filter against a record.
    #[must_use]
    pub fn matches(&self, record: &StoredRecord) -> bool {
        let actual = if self.field() == "id" {
            Value::String(record.id.clone())
        } else {
            record.data.get(self.field()).cloned().unwrap_or(Value::Null)
        };
        match self {
            Self::Eq(_, expected) => &actual == expected,
            Self::In(_, values) => values.contains(&actual),
        }
    }
}

/// Sort parameter for `find_many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParam {
    /// The payload field to sort by.
    pub field: String,
    /// Sort in descending order.
    pub descending: bool,
}

impl SortParam {
    /// Ascending sort on a field.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Parameters for a `find_many` query.
///
/// All filters are combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindMany {
    /// Filter conditions.
    pub filters: Vec<Filter>,
    /// Ordering.
    pub order: Option<SortParam>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl FindMany {
    /// Creates an unfiltered, unordered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    /// Adds a membership filter.
    #[must_use]
    pub fn where_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push(Filter::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, sort: SortParam) -> Self {
        self.order = Some(sort);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the record passes every filter.
    #[must_use]
    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

/// Kind of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Upsert,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Upsert => write!(f, "upsert"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A write that has been applied to the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// The mutated collection.
    pub collection: Collection,
    /// The kind of write.
    pub kind: MutationKind,
    /// The affected record ID, when the write addressed a single record.
    pub id: Option<String>,
}

impl Mutation {
    /// Creates a mutation for a single record.
    #[must_use]
    pub fn new(collection: Collection, kind: MutationKind, id: impl Into<String>) -> Self {
        Self {
            collection,
            kind,
            id: Some(id.into()),
        }
    }

    /// Creates a mutation that touched an unknown set of records.
    #[must_use]
    pub fn bulk(collection: Collection, kind: MutationKind) -> Self {
        Self {
            collection,
            kind,
            id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_round_trip_names() {
        for c in Collection::ALL {
            assert_eq!(c.as_str().parse::<Collection>(), Ok(c));
            assert_eq!(c.table_name().parse::<Collection>(), Ok(c));
        }
        assert!("Dish".parse::<Collection>().is_err());
    }

    #[test]
    fn test_filters_match_payload_and_id() {
        let record = StoredRecord::new(
            Collection::MenuItemIngredient,
            "link-1",
            json!({"id": "link-1", "menuItemId": "osh", "ingredientId": "rice"}),
        );

        assert!(FindMany::new().where_eq("menuItemId", "osh").matches(&record));
        assert!(!FindMany::new().where_eq("menuItemId", "somsa").matches(&record));
        assert!(
            FindMany::new()
                .where_in("id", ["link-0", "link-1"])
                .matches(&record)
        );
        assert!(
            !FindMany::new()
                .where_eq("menuItemId", "osh")
                .where_eq("ingredientId", "lamb")
                .matches(&record)
        );
    }

    #[test]
    fn test_missing_field_is_null() {
        let record = StoredRecord::new(Collection::MenuItem, "1", json!({"id": "1"}));
        assert!(
            FindMany::new()
                .where_eq("category", Value::Null)
                .matches(&record)
        );
    }
}
