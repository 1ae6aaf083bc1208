//! Catalog payload decoding and exhaustive pagination.
//!
//! Upstream catalog endpoints are not consistent about where the item list
//! lives, so the decode is an explicit union with a documented priority
//! order, validated here at the boundary instead of inline per call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{string_field, ApiError, FluidApiClient};

/// Field names checked, in priority order, for the item list.
const ITEM_FIELDS: [&str; 4] = ["products", "data", "items", "records"];

/// Field paths checked, in priority order, for the page count.
const TOTAL_PAGES_FIELDS: [&[&str]; 3] = [
    &["meta", "total_pages"],
    &["total_pages"],
    &["pagination", "total_pages"],
];

/// Exhaustive pagination safety cap.
pub const MAX_CATALOG_PAGES: u32 = 50;

/// One purchasable catalog item, normalized from whatever shape the
/// upstream returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// One decoded catalog page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

impl CatalogPage {
    /// Decode a catalog payload. A bare JSON array is accepted as the item
    /// list itself; an object must carry the list under one of
    /// [`ITEM_FIELDS`]. Anything else is [`ApiError::Shape`].
    pub fn decode(value: &Value, page: u32) -> Result<CatalogPage, ApiError> {
        let raw_items = if let Some(array) = value.as_array() {
            array
        } else {
            ITEM_FIELDS
                .iter()
                .find_map(|field| value.get(field).and_then(Value::as_array))
                .ok_or_else(|| ApiError::Shape {
                    expected: ITEM_FIELDS.join(", "),
                })?
        };

        let items = raw_items.iter().filter_map(decode_item).collect();
        Ok(CatalogPage {
            items,
            page,
            total_pages: total_pages(value),
        })
    }
}

fn decode_item(value: &Value) -> Option<CatalogItem> {
    let id = string_field(value, &["id", "product_id", "sku"])?;
    Some(CatalogItem {
        id,
        title: string_field(value, &["title", "name"]),
        price: value.get("price").and_then(Value::as_f64),
    })
}

fn total_pages(value: &Value) -> Option<u32> {
    for path in TOTAL_PAGES_FIELDS {
        let mut cursor = value;
        let mut found = true;
        for key in path {
            match cursor.get(*key) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(n) = cursor.as_u64() {
                return Some(n as u32);
            }
        }
    }
    None
}

impl FluidApiClient {
    /// Paginate the tenant catalog to exhaustion, concatenating items.
    /// Stops at an empty page, the reported page count, or the
    /// [`MAX_CATALOG_PAGES`] safety cap, whichever comes first.
    pub async fn fetch_all_products(
        &self,
        product_type: Option<&str>,
    ) -> anyhow::Result<Vec<CatalogItem>> {
        use super::CommerceApi;

        let mut all = Vec::new();
        for page in 1..=MAX_CATALOG_PAGES {
            let decoded = self.get_products(product_type, page).await?;
            if decoded.items.is_empty() {
                break;
            }
            all.extend(decoded.items);
            if let Some(total) = decoded.total_pages {
                if page >= total {
                    break;
                }
            }
        }
        debug!(company = %self.company_subdomain(), total = all.len(), "catalog pagination complete");
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_prefers_products_over_data() {
        let v = json!({
            "products": [{ "id": "p1" }],
            "data": [{ "id": "wrong" }],
        });
        let page = CatalogPage::decode(&v, 1).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "p1");
    }

    #[test]
    fn decode_falls_through_priority_order() {
        let v = json!({ "records": [{ "product_id": "r1", "name": "Widget" }] });
        let page = CatalogPage::decode(&v, 3).unwrap();
        assert_eq!(page.items[0].id, "r1");
        assert_eq!(page.items[0].title.as_deref(), Some("Widget"));
        assert_eq!(page.page, 3);
    }

    #[test]
    fn decode_accepts_bare_array() {
        let v = json!([{ "sku": "s1", "price": 9.5 }]);
        let page = CatalogPage::decode(&v, 1).unwrap();
        assert_eq!(page.items[0].id, "s1");
        assert_eq!(page.items[0].price, Some(9.5));
    }

    #[test]
    fn decode_rejects_unknown_shape() {
        let v = json!({ "stuff": 7 });
        let err = CatalogPage::decode(&v, 1).unwrap_err();
        assert!(matches!(err, ApiError::Shape { .. }));
        assert!(err.to_string().contains("products"));
    }

    #[test]
    fn total_pages_priority_order() {
        let v = json!({ "meta": { "total_pages": 4 }, "total_pages": 9 });
        assert_eq!(total_pages(&v), Some(4));

        let v = json!({ "pagination": { "total_pages": 2 } });
        assert_eq!(total_pages(&v), Some(2));

        let v = json!({ "products": [] });
        assert_eq!(total_pages(&v), None);
    }

    #[test]
    fn items_without_ids_are_dropped() {
        let v = json!({ "items": [{ "id": "ok" }, { "name": "no id" }] });
        let page = CatalogPage::decode(&v, 1).unwrap();
        assert_eq!(page.items.len(), 1);
    }
}
