//! Cached domain entities.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use dastarkhan_storage::{StorageError, StoredRecord};

use crate::codec::Cacheable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub allergen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Menu items served here, resolved from `MenuItemOnRestaurant` links.
    #[serde(default)]
    pub menu_item_ids: Vec<String>,
}

/// A menu item with its ingredients and the restaurants serving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuDetail {
    pub item: MenuItem,
    pub ingredients: Vec<Ingredient>,
    pub restaurant_ids: Vec<String>,
}

impl Cacheable for MenuItem {
    const KIND: &'static str = "menu_item";
}

impl Cacheable for Vec<MenuItem> {
    const KIND: &'static str = "menu_item_list";
}

impl Cacheable for MenuDetail {
    const KIND: &'static str = "menu_detail";
}

impl Cacheable for Ingredient {
    const KIND: &'static str = "ingredient";
}

impl Cacheable for Vec<Ingredient> {
    const KIND: &'static str = "ingredient_list";
}

impl Cacheable for Vec<Restaurant> {
    const KIND: &'static str = "restaurant_list";
}

/// Deserializes a stored record's payload into an entity.
pub fn from_record<T: DeserializeOwned>(record: &StoredRecord) -> Result<T, StorageError> {
    serde_json::from_value(record.data.clone()).map_err(|e| {
        StorageError::invalid_record(format!(
            "{}/{} does not match the expected shape: {e}",
            record.collection, record.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dastarkhan_storage::Collection;
    use serde_json::json;

    #[test]
    fn test_menu_item_from_record_defaults() {
        let record = StoredRecord::new(
            Collection::MenuItem,
            "osh",
            json!({"id": "osh", "name": "Osh", "priceCents": 4500}),
        );
        let item: MenuItem = from_record(&record).unwrap();
        assert_eq!(item.name, "Osh");
        assert_eq!(item.price_cents, 4500);
        assert!(item.available);
        assert_eq!(item.category, None);
    }

    #[test]
    fn test_malformed_record_is_invalid() {
        let record = StoredRecord::new(Collection::Ingredient, "rice", json!({"id": "rice"}));
        let err = from_record::<Ingredient>(&record).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert!(err.to_string().contains("Ingredient/rice"));
    }
}
