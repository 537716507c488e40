//! Restaurant lookups built on the read-through fetch.

use std::str::FromStr;

use super::engine::SyncEngine;
use crate::api::{RemoteGateway, Restaurant, RestaurantId};
use crate::error::{Error, Result};
use crate::store::Storage;

/// Cuisine / neighborhood selector. `"all"` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
  #[default]
  All,
  Only(String),
}

impl Filter {
  pub fn matches(&self, value: &str) -> bool {
    match self {
      Filter::All => true,
      Filter::Only(wanted) => wanted == value,
    }
  }
}

impl FromStr for Filter {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(if s.is_empty() || s == "all" {
      Filter::All
    } else {
      Filter::Only(s.to_string())
    })
  }
}

impl From<Option<String>> for Filter {
  fn from(value: Option<String>) -> Self {
    match value {
      Some(v) => v.parse().unwrap_or_default(),
      None => Filter::All,
    }
  }
}

/// Distinct values in first-seen order.
fn unique(values: impl Iterator<Item = String>) -> Vec<String> {
  let mut seen = Vec::new();
  for value in values {
    if !seen.contains(&value) {
      seen.push(value);
    }
  }
  seen
}

impl<G: RemoteGateway, S: Storage> SyncEngine<G, S> {
  pub async fn restaurant_by_id(&self, id: RestaurantId) -> Result<Restaurant> {
    self
      .fetch_restaurants()
      .await?
      .data
      .into_iter()
      .find(|r| r.id == id)
      .ok_or(Error::NotFound(id))
  }

  pub async fn restaurants_by_cuisine(&self, cuisine: &str) -> Result<Vec<Restaurant>> {
    self
      .restaurants_by_cuisine_and_neighborhood(&Filter::Only(cuisine.to_string()), &Filter::All)
      .await
  }

  pub async fn restaurants_by_neighborhood(&self, neighborhood: &str) -> Result<Vec<Restaurant>> {
    self
      .restaurants_by_cuisine_and_neighborhood(&Filter::All, &Filter::Only(neighborhood.to_string()))
      .await
  }

  pub async fn restaurants_by_cuisine_and_neighborhood(
    &self,
    cuisine: &Filter,
    neighborhood: &Filter,
  ) -> Result<Vec<Restaurant>> {
    Ok(
      self
        .fetch_restaurants()
        .await?
        .data
        .into_iter()
        .filter(|r| cuisine.matches(&r.cuisine_type) && neighborhood.matches(&r.neighborhood))
        .collect(),
    )
  }

  pub async fn neighborhoods(&self) -> Result<Vec<String>> {
    let restaurants = self.fetch_restaurants().await?.data;
    Ok(unique(restaurants.into_iter().map(|r| r.neighborhood)))
  }

  pub async fn cuisines(&self) -> Result<Vec<String>> {
    let restaurants = self.fetch_restaurants().await?.data;
    Ok(unique(restaurants.into_iter().map(|r| r.cuisine_type)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::SqliteStore;
  use crate::testing::{restaurant, FakeGateway};

  fn engine() -> SyncEngine<FakeGateway, SqliteStore> {
    let gateway = FakeGateway::online();
    gateway.set_restaurants(vec![
      restaurant(1, "Mission Chinese Food", "Asian", "Manhattan"),
      restaurant(2, "Emily", "Pizza", "Brooklyn"),
      restaurant(3, "Kang Ho Dong Baekjeong", "Asian", "Manhattan"),
      restaurant(4, "Katz's Delicatessen", "American", "Manhattan"),
      restaurant(5, "Roberta's Pizza", "Pizza", "Brooklyn"),
    ]);
    SyncEngine::new(gateway, SqliteStore::open_in_memory().unwrap())
  }

  #[test]
  fn test_filter_parse() {
    assert_eq!("all".parse::<Filter>().unwrap(), Filter::All);
    assert_eq!("".parse::<Filter>().unwrap(), Filter::All);
    assert_eq!(
      "Pizza".parse::<Filter>().unwrap(),
      Filter::Only("Pizza".to_string())
    );
    assert_eq!(Filter::from(None), Filter::All);
  }

  #[tokio::test]
  async fn test_restaurant_by_id() {
    let engine = engine();
    assert_eq!(engine.restaurant_by_id(2).await.unwrap().name, "Emily");
    assert!(matches!(
      engine.restaurant_by_id(42).await,
      Err(Error::NotFound(42))
    ));
  }

  #[tokio::test]
  async fn test_restaurant_by_id_offline_uses_cache() {
    let engine = engine();
    engine.fetch_restaurants().await.unwrap();
    engine.gateway().set_online(false);
    assert_eq!(engine.restaurant_by_id(4).await.unwrap().id, 4);
  }

  #[tokio::test]
  async fn test_filters() {
    let engine = engine();
    let pizza = engine.restaurants_by_cuisine("Pizza").await.unwrap();
    assert_eq!(pizza.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 5]);

    let manhattan = engine.restaurants_by_neighborhood("Manhattan").await.unwrap();
    assert_eq!(manhattan.len(), 3);

    let asian_manhattan = engine
      .restaurants_by_cuisine_and_neighborhood(
        &Filter::Only("Asian".to_string()),
        &Filter::Only("Manhattan".to_string()),
      )
      .await
      .unwrap();
    assert_eq!(
      asian_manhattan.iter().map(|r| r.id).collect::<Vec<_>>(),
      vec![1, 3]
    );

    let everything = engine
      .restaurants_by_cuisine_and_neighborhood(&Filter::All, &Filter::All)
      .await
      .unwrap();
    assert_eq!(everything.len(), 5);
  }

  #[tokio::test]
  async fn test_unique_lists_keep_first_seen_order() {
    let engine = engine();
    assert_eq!(
      engine.neighborhoods().await.unwrap(),
      vec!["Manhattan", "Brooklyn"]
    );
    assert_eq!(
      engine.cuisines().await.unwrap(),
      vec!["Asian", "Pizza", "American"]
    );
  }

  #[tokio::test]
  async fn test_queries_surface_data_unavailable() {
    let gateway = FakeGateway::offline();
    let engine = SyncEngine::new(gateway, SqliteStore::open_in_memory().unwrap());
    assert!(matches!(
      engine.cuisines().await,
      Err(Error::DataUnavailable)
    ));
  }
}
