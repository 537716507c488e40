//! Domain types for the restaurant review API.
//!
//! The reference server is loose about JSON types: ids and ratings arrive as
//! numbers or numeric strings, `is_favorite` as a bool or `"true"`/`"false"`.
//! The deserializers here accept both and the serializers always write the
//! canonical form.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

pub type RestaurantId = u64;
pub type ReviewId = u64;

/// Image shown for restaurants without a photograph.
const DEFAULT_PHOTOGRAPH: &str = "10";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

/// Restaurant as served by `GET /restaurants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
  #[serde(deserialize_with = "number_or_string")]
  pub id: RestaurantId,
  pub name: String,
  #[serde(default)]
  pub cuisine_type: String,
  #[serde(default)]
  pub neighborhood: String,
  #[serde(default)]
  pub address: String,
  pub latlng: Option<LatLng>,
  #[serde(
    default,
    deserialize_with = "optional_text",
    skip_serializing_if = "Option::is_none"
  )]
  pub photograph: Option<String>,
  #[serde(default)]
  pub operating_hours: BTreeMap<String, String>,
  #[serde(default, deserialize_with = "bool_or_string")]
  pub is_favorite: bool,
}

impl Restaurant {
  /// Page showing this restaurant.
  pub fn page_path(&self) -> String {
    format!("./restaurant.html?id={}", self.id)
  }

  /// Image path, falling back to the placeholder photograph.
  pub fn image_path(&self) -> String {
    format!(
      "/img/{}.jpg",
      self.photograph.as_deref().unwrap_or(DEFAULT_PHOTOGRAPH)
    )
  }
}

/// Review as served by `GET /reviews/?restaurant_id=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  #[serde(deserialize_with = "number_or_string")]
  pub id: ReviewId,
  #[serde(deserialize_with = "number_or_string")]
  pub restaurant_id: RestaurantId,
  pub name: String,
  #[serde(deserialize_with = "number_or_string")]
  pub rating: u8,
  #[serde(default)]
  pub comments: String,
  /// Epoch milliseconds
  #[serde(
    rename = "createdAt",
    default,
    deserialize_with = "optional_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at: Option<i64>,
  /// Epoch milliseconds
  #[serde(
    rename = "updatedAt",
    default,
    deserialize_with = "optional_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub updated_at: Option<i64>,
}

/// Accept `4` or `"4"`.
fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: FromStr + Deserialize<'de>,
  T::Err: Display,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw<T> {
    Number(T),
    Text(String),
  }

  match Raw::<T>::deserialize(deserializer)? {
    Raw::Number(n) => Ok(n),
    Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
  }
}

/// Accept `true`, `"true"`, `"false"` or null (as false).
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Bool(bool),
    Text(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(false),
    Some(Raw::Bool(b)) => Ok(b),
    Some(Raw::Text(s)) => match s.trim().to_lowercase().as_str() {
      "true" => Ok(true),
      "false" | "" => Ok(false),
      other => Err(serde::de::Error::custom(format!(
        "expected a boolean, got '{}'",
        other
      ))),
    },
  }
}

/// Accept a string or a number, keeping its text form.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Number(serde_json::Number),
    Text(String),
  }

  Ok(match Option::<Raw>::deserialize(deserializer)? {
    Some(Raw::Number(n)) => Some(n.to_string()),
    Some(Raw::Text(s)) if !s.is_empty() => Some(s),
    _ => None,
  })
}

/// Accept epoch milliseconds or an RFC 3339 string.
fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Millis(i64),
    Float(f64),
    Text(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Raw::Millis(ms)) => Ok(Some(ms)),
    Some(Raw::Float(ms)) => Ok(Some(ms as i64)),
    Some(Raw::Text(s)) => {
      if let Ok(ms) = s.trim().parse::<i64>() {
        return Ok(Some(ms));
      }
      DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| Some(dt.timestamp_millis()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", s, e)))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_restaurant_from_reference_server() {
    let restaurant: Restaurant = serde_json::from_value(json!({
      "name": "Mission Chinese Food",
      "neighborhood": "Manhattan",
      "photograph": "1",
      "address": "171 E Broadway, New York, NY 10002",
      "latlng": {"lat": 40.713829, "lng": -73.989667},
      "cuisine_type": "Asian",
      "operating_hours": {"Monday": "5:30 pm - 11:00 pm"},
      "createdAt": 1504095563444i64,
      "updatedAt": "2018-07-08T19:41:44.000Z",
      "id": 1,
      "is_favorite": "false"
    }))
    .unwrap();

    assert_eq!(restaurant.id, 1);
    assert!(!restaurant.is_favorite);
    assert_eq!(restaurant.image_path(), "/img/1.jpg");
    assert_eq!(restaurant.page_path(), "./restaurant.html?id=1");
    assert_eq!(
      restaurant.operating_hours.get("Monday").map(String::as_str),
      Some("5:30 pm - 11:00 pm")
    );
  }

  #[test]
  fn test_restaurant_loose_fields() {
    let restaurant: Restaurant = serde_json::from_value(json!({
      "id": "10",
      "name": "Casa Enrique",
      "photograph": 10,
      "is_favorite": true
    }))
    .unwrap();
    assert_eq!(restaurant.id, 10);
    assert!(restaurant.is_favorite);
    assert_eq!(restaurant.photograph.as_deref(), Some("10"));
    assert!(restaurant.latlng.is_none());
  }

  #[test]
  fn test_restaurant_without_photograph_uses_placeholder() {
    let restaurant: Restaurant =
      serde_json::from_value(json!({"id": 3, "name": "Kang Ho Dong Baekjeong"})).unwrap();
    assert_eq!(restaurant.image_path(), "/img/10.jpg");
    assert!(!restaurant.is_favorite);
  }

  #[test]
  fn test_is_favorite_rejects_garbage() {
    let result =
      serde_json::from_value::<Restaurant>(json!({"id": 1, "name": "x", "is_favorite": "maybe"}));
    assert!(result.is_err());
  }

  #[test]
  fn test_review_string_fields() {
    let review: Review = serde_json::from_value(json!({
      "id": 31,
      "restaurant_id": "5",
      "name": "X",
      "rating": "4",
      "comments": "ok",
      "createdAt": "2018-07-08T19:41:44.000Z"
    }))
    .unwrap();

    assert_eq!(review.restaurant_id, 5);
    assert_eq!(review.rating, 4);
    assert_eq!(review.created_at, Some(1531078904000));
    assert!(review.updated_at.is_none());

    // Canonical form on the way back out
    let value = serde_json::to_value(&review).unwrap();
    assert_eq!(value["restaurant_id"], json!(5));
    assert_eq!(value["rating"], json!(4));
    assert_eq!(value["createdAt"], json!(1531078904000i64));
    assert!(value.get("updatedAt").is_none());
  }
}
