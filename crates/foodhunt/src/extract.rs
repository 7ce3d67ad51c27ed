//! Deal extraction: deduplicate, join, filter by threshold, sort.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{Deal, MenuItem, Restaurant};

/// Deals plus the bookkeeping done while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub deals: Vec<Deal>,
    /// Item records discarded because a later record had the same identity.
    pub duplicates: usize,
    /// Items under the threshold whose restaurant was never seen.
    pub orphaned: usize,
}

/// Menu items priced strictly below `threshold`, in deterministic order.
pub fn extract(restaurants: &[Restaurant], items: &[MenuItem], threshold: f64) -> Vec<Deal> {
    extract_with_stats(restaurants, items, threshold).deals
}

/// [`extract`] with duplicate and orphan counts.
pub fn extract_with_stats(
    restaurants: &[Restaurant],
    items: &[MenuItem],
    threshold: f64,
) -> Extraction {
    let by_id: HashMap<&str, &Restaurant> =
        restaurants.iter().map(|r| (r.id.as_str(), r)).collect();

    // Last seen wins; identity is the item id within its restaurant.
    let mut unique: HashMap<(&str, &str), &MenuItem> = HashMap::with_capacity(items.len());
    let mut duplicates = 0;
    for item in items {
        if unique
            .insert((item.restaurant_id.as_str(), item.id.as_str()), item)
            .is_some()
        {
            duplicates += 1;
        }
    }

    let mut orphaned = 0;
    let mut deals = Vec::new();
    for item in unique.into_values() {
        let price = item.effective_price();
        if price.partial_cmp(&threshold) != Some(Ordering::Less) {
            continue;
        }
        let Some(restaurant) = by_id.get(item.restaurant_id.as_str()) else {
            tracing::debug!(item = %item.name, restaurant_id = %item.restaurant_id, "orphaned menu item");
            orphaned += 1;
            continue;
        };
        deals.push(Deal {
            restaurant_id: restaurant.id.clone(),
            restaurant_name: restaurant.name.clone(),
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            price,
            original_price: item.discount_price.map(|_| item.price),
            currency: item.currency.clone(),
        });
    }

    deals.sort_by(compare_deals);

    Extraction {
        deals,
        duplicates,
        orphaned,
    }
}

fn compare_deals(a: &Deal, b: &Deal) -> Ordering {
    a.price
        .total_cmp(&b.price)
        .then_with(|| a.restaurant_name.cmp(&b.restaurant_name))
        .then_with(|| a.item_name.cmp(&b.item_name))
        .then_with(|| a.restaurant_id.cmp(&b.restaurant_id))
        .then_with(|| a.item_id.cmp(&b.item_id))
}
