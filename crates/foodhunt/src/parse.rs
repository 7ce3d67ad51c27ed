//! Turn captured API payloads into restaurants and menu items.
//!
//! The endpoint a response came from is only a hint: the same endpoint can
//! return error payloads, so the shape is decided by inspecting the JSON.
//! Nothing here is fatal. Bad payloads, entries and prices become
//! [`ScrapeWarning`]s and parsing moves on.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::price::{self, PriceError};
use crate::types::{CapturedResponse, MenuItem, Restaurant, ScrapeWarning};

/// Keys holding the restaurant list of a search-results payload.
const SEARCH_LIST_KEYS: &[&str] = &["delivery_infos", "restaurants"];
/// Keys holding the dish groups of a menu payload.
const MENU_LIST_KEYS: &[&str] = &["menu_infos", "dish_types"];
/// Keys carrying the restaurant identifier.
const RESTAURANT_ID_KEYS: &[&str] = &["delivery_id", "restaurant_id", "id"];
/// Query parameters of a menu request that name the restaurant.
const RESTAURANT_QUERY_KEYS: &[&str] = &["request_id", "delivery_id", "restaurant_id"];

/// Structural kind of a decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadShape {
    SearchResults,
    Menu,
    /// The API answered with an error; carries its message.
    Error(String),
    Unknown,
}

/// Everything parsed from one batch of captures.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub restaurants: Vec<Restaurant>,
    pub items: Vec<MenuItem>,
    pub warnings: Vec<ScrapeWarning>,
    /// Restaurants for which a menu payload was seen.
    pub menus_for: BTreeSet<String>,
}

impl ParseOutput {
    /// Append another batch, keeping arrival order.
    pub fn merge(&mut self, other: ParseOutput) {
        self.restaurants.extend(other.restaurants);
        self.items.extend(other.items);
        self.warnings.extend(other.warnings);
        self.menus_for.extend(other.menus_for);
    }

    fn warn(&mut self, warning: ScrapeWarning) {
        tracing::warn!(%warning, "recoverable scrape problem");
        self.warnings.push(warning);
    }
}

/// The object holding the payload data: `reply` when present, else the root.
fn container(root: &Map<String, Value>) -> Option<&Map<String, Value>> {
    match root.get("reply") {
        Some(reply) => reply.as_object(),
        None => Some(root),
    }
}

fn has_array(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| map.get(*k).is_some_and(Value::is_array))
}

fn first_array<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|k| map.get(*k).and_then(Value::as_array))
}

/// Classify a decoded payload by the keys it carries.
pub fn detect_shape(payload: &Value) -> PayloadShape {
    let Some(root) = payload.as_object() else {
        return PayloadShape::Unknown;
    };

    if let Some(data) = container(root) {
        if has_array(data, SEARCH_LIST_KEYS) {
            return PayloadShape::SearchResults;
        }
        if has_array(data, MENU_LIST_KEYS) {
            return PayloadShape::Menu;
        }
    }

    let message = ["error_msg", "error", "msg"]
        .iter()
        .find_map(|k| root.get(*k).filter(|v| !v.is_null()))
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()));
    let result = root.get("result").and_then(Value::as_str);
    let failed_result = result.is_some_and(|r| r != "success");
    let null_reply = root.get("reply").is_some_and(Value::is_null);

    if failed_result || null_reply || message.is_some() {
        let reason = message
            .or_else(|| result.map(|r| format!("result={r}")))
            .unwrap_or_else(|| "empty reply".to_string());
        return PayloadShape::Error(reason);
    }

    PayloadShape::Unknown
}

/// Parse a batch of captures. `currency` labels prices whose payload names no unit.
pub fn parse(responses: &[CapturedResponse], currency: &str) -> ParseOutput {
    let mut out = ParseOutput::default();
    for response in responses {
        parse_one(response, currency, &mut out);
    }
    tracing::debug!(
        responses = responses.len(),
        restaurants = out.restaurants.len(),
        items = out.items.len(),
        warnings = out.warnings.len(),
        "parsed captures"
    );
    out
}

fn parse_one(response: &CapturedResponse, currency: &str, out: &mut ParseOutput) {
    let payload: Value = match serde_json::from_str(&response.body) {
        Ok(v) => v,
        Err(e) => {
            out.warn(ScrapeWarning::PayloadDecode {
                url: response.request_url.clone(),
                reason: format!("invalid JSON: {e}"),
            });
            return;
        }
    };

    match detect_shape(&payload) {
        PayloadShape::SearchResults => parse_search(response, &payload, out),
        PayloadShape::Menu => parse_menu(response, &payload, currency, out),
        PayloadShape::Error(reason) => out.warn(ScrapeWarning::PayloadDecode {
            url: response.request_url.clone(),
            reason: format!("API error: {reason}"),
        }),
        PayloadShape::Unknown => out.warn(ScrapeWarning::PayloadDecode {
            url: response.request_url.clone(),
            reason: format!("unrecognized payload from '{}' endpoint", response.pattern),
        }),
    }
}

fn parse_search(response: &CapturedResponse, payload: &Value, out: &mut ParseOutput) {
    let Some(entries) = payload
        .as_object()
        .and_then(container)
        .and_then(|data| first_array(data, SEARCH_LIST_KEYS))
    else {
        return;
    };

    for (index, entry) in entries.iter().enumerate() {
        match parse_restaurant(entry) {
            Ok(restaurant) => out.restaurants.push(restaurant),
            Err(reason) => out.warn(ScrapeWarning::PayloadDecode {
                url: response.request_url.clone(),
                reason: format!("restaurant entry {index}: {reason}"),
            }),
        }
    }
}

fn parse_restaurant(entry: &Value) -> Result<Restaurant, String> {
    let obj = entry.as_object().ok_or("not an object")?;
    let id = id_from(obj, RESTAURANT_ID_KEYS).ok_or("missing identifier")?;
    let name = non_empty_str(obj.get("name")).ok_or("missing name")?;
    let location = non_empty_str(obj.get("address")).or_else(|| non_empty_str(obj.get("location")));
    let url = non_empty_str(obj.get("url"));
    Ok(Restaurant {
        id,
        name,
        location,
        url,
    })
}

fn parse_menu(response: &CapturedResponse, payload: &Value, currency: &str, out: &mut ParseOutput) {
    let Some(data) = payload.as_object().and_then(container) else {
        return;
    };
    let restaurant_id = id_from(data, &RESTAURANT_ID_KEYS[..2])
        .or_else(|| restaurant_from_request(&response.request_url));
    let Some(restaurant_id) = restaurant_id else {
        out.warn(ScrapeWarning::PayloadDecode {
            url: response.request_url.clone(),
            reason: "menu payload without restaurant reference".into(),
        });
        return;
    };
    let Some(groups) = first_array(data, MENU_LIST_KEYS) else {
        return;
    };

    out.menus_for.insert(restaurant_id.clone());

    for (index, group) in groups.iter().enumerate() {
        let Some(dishes) = group.get("dishes").and_then(Value::as_array) else {
            out.warn(ScrapeWarning::PayloadDecode {
                url: response.request_url.clone(),
                reason: format!("dish group {index} has no dish list"),
            });
            continue;
        };
        for dish in dishes {
            match parse_dish(dish, &restaurant_id, currency) {
                Ok(item) => out.items.push(item),
                Err(DishError::Decode(reason)) => out.warn(ScrapeWarning::PayloadDecode {
                    url: response.request_url.clone(),
                    reason: format!("dish in group {index}: {reason}"),
                }),
                Err(DishError::Price { item, raw, error }) => {
                    out.warn(ScrapeWarning::PriceNormalization {
                        restaurant_id: restaurant_id.clone(),
                        item,
                        raw,
                        reason: error.to_string(),
                    })
                }
            }
        }
    }
}

enum DishError {
    Decode(String),
    Price {
        item: String,
        raw: String,
        error: PriceError,
    },
}

fn parse_dish(dish: &Value, restaurant_id: &str, currency: &str) -> Result<MenuItem, DishError> {
    let obj = dish
        .as_object()
        .ok_or_else(|| DishError::Decode("not an object".into()))?;
    let id = id_from(obj, &["id", "dish_id"])
        .ok_or_else(|| DishError::Decode("missing identifier".into()))?;
    let name = non_empty_str(obj.get("name"))
        .ok_or_else(|| DishError::Decode(format!("dish {id} has no name")))?;

    let price_error = |raw: &Value, error| DishError::Price {
        item: name.clone(),
        raw: raw.to_string(),
        error,
    };

    let raw_price = obj.get("price").unwrap_or(&Value::Null);
    let listed = price::normalize(raw_price).map_err(|e| price_error(raw_price, e))?;

    let discount = match obj.get("discount_price") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(price::normalize(raw).map_err(|e| price_error(raw, e))?),
    };

    let unit = listed
        .unit
        .clone()
        .or_else(|| discount.as_ref().and_then(|d| d.unit.clone()))
        .unwrap_or_else(|| currency.to_string());

    Ok(MenuItem {
        id,
        name,
        restaurant_id: restaurant_id.to_string(),
        price: listed.amount,
        discount_price: discount.map(|d| d.amount),
        currency: unit,
    })
}

/// Identifier from the first present key; integers and non-empty strings qualify.
fn id_from(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Restaurant id from the menu request's query string.
fn restaurant_from_request(request_url: &str) -> Option<String> {
    let url = url::Url::parse(request_url).ok()?;
    RESTAURANT_QUERY_KEYS.iter().find_map(|key| {
        url.query_pairs()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    })
}
