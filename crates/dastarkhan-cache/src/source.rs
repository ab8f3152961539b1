//! Typed loaders reading entities from the source store.

use std::collections::BTreeMap;

use async_trait::async_trait;

use dastarkhan_storage::{Collection, DynStore, FindMany, SortParam, StorageError};

use crate::codec::Cacheable;
use crate::entity::{Ingredient, MenuDetail, MenuItem, Restaurant, from_record};

/// Loads the value a repository caches.
///
/// List loaders are called with `id = None` and always return `Some`;
/// detail loaders return `None` when the entity does not exist.
#[async_trait]
pub trait EntitySource<V: Cacheable>: Send + Sync {
    async fn load(&self, id: Option<&str>) -> Result<Option<V>, StorageError>;
}

fn require_id(id: Option<&str>) -> Result<&str, StorageError> {
    id.ok_or_else(|| StorageError::invalid_record("detail lookup requires an id"))
}

fn by_name() -> FindMany {
    FindMany::new().order_by(SortParam::asc("name"))
}

/// All menu items sorted by name.
pub struct MenuListSource {
    store: DynStore,
}

impl MenuListSource {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntitySource<Vec<MenuItem>> for MenuListSource {
    async fn load(&self, _id: Option<&str>) -> Result<Option<Vec<MenuItem>>, StorageError> {
        let records = self.store.find_many(Collection::MenuItem, &by_name()).await?;
        let items = records
            .iter()
            .map(from_record)
            .collect::<Result<Vec<MenuItem>, _>>()?;
        Ok(Some(items))
    }
}

/// One menu item joined with its ingredient and restaurant links.
pub struct MenuDetailSource {
    store: DynStore,
}

impl MenuDetailSource {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntitySource<MenuDetail> for MenuDetailSource {
    async fn load(&self, id: Option<&str>) -> Result<Option<MenuDetail>, StorageError> {
        let id = require_id(id)?;
        let Some(record) = self.store.find_unique(Collection::MenuItem, id).await? else {
            return Ok(None);
        };
        let item: MenuItem = from_record(&record)?;

        let links = self
            .store
            .find_many(
                Collection::MenuItemIngredient,
                &FindMany::new().where_eq("menuItemId", id),
            )
            .await?;
        let ingredient_ids: Vec<String> = links
            .iter()
            .filter_map(|link| link.str_field("ingredientId").map(str::to_owned))
            .collect();

        let ingredients = if ingredient_ids.is_empty() {
            Vec::new()
        } else {
            let query = by_name().where_in("id", ingredient_ids);
            self.store
                .find_many(Collection::Ingredient, &query)
                .await?
                .iter()
                .map(from_record)
                .collect::<Result<Vec<Ingredient>, _>>()?
        };

        let mut restaurant_ids: Vec<String> = self
            .store
            .find_many(
                Collection::MenuItemOnRestaurant,
                &FindMany::new().where_eq("menuItemId", id),
            )
            .await?
            .iter()
            .filter_map(|link| link.str_field("restaurantId").map(str::to_owned))
            .collect();
        restaurant_ids.sort();
        restaurant_ids.dedup();

        Ok(Some(MenuDetail {
            item,
            ingredients,
            restaurant_ids,
        }))
    }
}

/// All ingredients sorted by name.
pub struct IngredientListSource {
    store: DynStore,
}

impl IngredientListSource {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntitySource<Vec<Ingredient>> for IngredientListSource {
    async fn load(&self, _id: Option<&str>) -> Result<Option<Vec<Ingredient>>, StorageError> {
        let records = self.store.find_many(Collection::Ingredient, &by_name()).await?;
        let ingredients = records
            .iter()
            .map(from_record)
            .collect::<Result<Vec<Ingredient>, _>>()?;
        Ok(Some(ingredients))
    }
}

/// One ingredient by id.
pub struct IngredientDetailSource {
    store: DynStore,
}

impl IngredientDetailSource {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntitySource<Ingredient> for IngredientDetailSource {
    async fn load(&self, id: Option<&str>) -> Result<Option<Ingredient>, StorageError> {
        let id = require_id(id)?;
        match self.store.find_unique(Collection::Ingredient, id).await? {
            Some(record) => Ok(Some(from_record(&record)?)),
            None => Ok(None),
        }
    }
}

/// All restaurants sorted by name, with the menu items each one serves.
pub struct RestaurantListSource {
    store: DynStore,
}

impl RestaurantListSource {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EntitySource<Vec<Restaurant>> for RestaurantListSource {
    async fn load(&self, _id: Option<&str>) -> Result<Option<Vec<Restaurant>>, StorageError> {
        let records = self.store.find_many(Collection::Restaurant, &by_name()).await?;
        let links = self
            .store
            .find_many(Collection::MenuItemOnRestaurant, &FindMany::new())
            .await?;

        let mut served: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for link in &links {
            if let (Some(restaurant), Some(item)) =
                (link.str_field("restaurantId"), link.str_field("menuItemId"))
            {
                served.entry(restaurant).or_default().push(item.to_owned());
            }
        }

        let mut restaurants = Vec::with_capacity(records.len());
        for record in &records {
            let mut restaurant: Restaurant = from_record(record)?;
            if let Some(items) = served.get_mut(restaurant.id.as_str()) {
                items.sort();
                items.dedup();
                restaurant.menu_item_ids = std::mem::take(items);
            }
            restaurants.push(restaurant);
        }
        Ok(Some(restaurants))
    }
}
