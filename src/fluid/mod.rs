//! Fluid platform HTTP client -- authenticated request building, response
//! decoding, and the `CommerceApi` seam the test runner drives.

pub mod catalog;
pub mod gateway;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use self::catalog::{CatalogItem, CatalogPage};

/// Attempts and spacing for the bounded storefront SDK poll.
const SDK_PROBE_ATTEMPTS: u32 = 3;
const SDK_PROBE_DELAY: Duration = Duration::from_millis(400);

/// Response bodies embedded in errors are truncated to keep logs sane.
const ERROR_BODY_LIMIT: usize = 512;

/// Upstream API failure. Any non-2xx is fatal for the calling step; there
/// is no automatic retry.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        status: u16,
        endpoint: String,
        body: String,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("unrecognized catalog payload: expected an item list under one of [{expected}]")]
    Shape { expected: String },
}

/// The four base URL variants the Fluid platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiBase {
    /// Tenant-scoped v1 API.
    TenantV1,
    /// Tenant-scoped public commerce API (cart sessions, checkout).
    TenantCommerce,
    /// Global enrollment catalog.
    Enrollment,
    /// Global legacy API (customer accounts).
    Legacy,
}

/// An in-progress cart session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSession {
    pub cart_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub cart_token: String,
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// The commerce operations the scenarios drive. `FluidApiClient` is the
/// production implementation; tests substitute mocks.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Bounded availability poll; absence is a policy branch, never an error.
    async fn detect_storefront_sdk(&self) -> bool;
    async fn get_products(&self, product_type: Option<&str>, page: u32) -> Result<CatalogPage>;
    async fn get_enrollment_packs(&self) -> Result<Vec<CatalogItem>>;
    async fn create_session(&self) -> Result<CartSession>;
    async fn get_cart(&self, cart_token: &str) -> Result<Cart>;
    async fn add_to_cart(&self, cart_token: &str, product_id: &str, quantity: u32) -> Result<Cart>;
    async fn track_event(&self, cart_token: &str, event: &str) -> Result<()>;
    async fn complete_checkout(&self, cart_token: &str) -> Result<CheckoutReceipt>;
}

/// Thin authenticated wrapper over the Fluid REST API. Every method hits a
/// fixed endpoint/verb; responses outside the success range become
/// [`ApiError::Status`].
#[derive(Clone)]
pub struct FluidApiClient {
    company_subdomain: String,
    auth_token: String,
    http: Client,
}

impl FluidApiClient {
    pub fn new(company_subdomain: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            company_subdomain: company_subdomain.into(),
            auth_token: auth_token.into(),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(concat!("fluidprobe/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    pub fn company_subdomain(&self) -> &str {
        &self.company_subdomain
    }

    fn base_url(&self, base: ApiBase) -> String {
        match base {
            ApiBase::TenantV1 => format!("https://{}.fluid.app/api/v1", self.company_subdomain),
            ApiBase::TenantCommerce => {
                format!("https://{}.fluid.app/api/commerce", self.company_subdomain)
            }
            ApiBase::Enrollment => "https://enrollment.fluid.app/api".to_string(),
            ApiBase::Legacy => "https://api.fluid.app/v1".to_string(),
        }
    }

    /// Issue one request and parse the JSON body. Empty bodies decode to
    /// `Value::Null`.
    pub(crate) async fn request_json(
        &self,
        method: Method,
        base: ApiBase,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url(base), path);
        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                endpoint: url,
                body: truncate_body(&text),
            });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| ApiError::Decode {
            endpoint: url,
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl CommerceApi for FluidApiClient {
    async fn detect_storefront_sdk(&self) -> bool {
        for attempt in 1..=SDK_PROBE_ATTEMPTS {
            match self
                .request_json(Method::GET, ApiBase::TenantCommerce, "/sdk/status", None)
                .await
            {
                Ok(_) => return true,
                Err(err) => {
                    debug!(company = %self.company_subdomain, attempt, error = %err, "storefront SDK not reachable");
                }
            }
            if attempt < SDK_PROBE_ATTEMPTS {
                tokio::time::sleep(SDK_PROBE_DELAY).await;
            }
        }
        false
    }

    async fn get_products(&self, product_type: Option<&str>, page: u32) -> Result<CatalogPage> {
        let mut path = format!("/products?page={}", page);
        if let Some(pt) = product_type {
            path.push_str(&format!("&product_type={}", pt));
        }
        let value = self
            .request_json(Method::GET, ApiBase::TenantV1, &path, None)
            .await?;
        Ok(CatalogPage::decode(&value, page)?)
    }

    async fn get_enrollment_packs(&self) -> Result<Vec<CatalogItem>> {
        let value = self
            .request_json(Method::GET, ApiBase::Enrollment, "/packs", None)
            .await?;
        Ok(CatalogPage::decode(&value, 1)?.items)
    }

    async fn create_session(&self) -> Result<CartSession> {
        let value = self
            .request_json(Method::POST, ApiBase::TenantCommerce, "/sessions", None)
            .await?;
        let cart_token = string_field(&value, &["cart_token", "token", "session_token"])
            .ok_or_else(|| ApiError::Decode {
                endpoint: "/sessions".to_string(),
                message: "missing cart token field".to_string(),
            })?;
        Ok(CartSession { cart_token })
    }

    async fn get_cart(&self, cart_token: &str) -> Result<Cart> {
        let path = format!("/carts/{}", cart_token);
        let value = self
            .request_json(Method::GET, ApiBase::TenantCommerce, &path, None)
            .await?;
        Ok(decode_cart(cart_token, &value))
    }

    async fn add_to_cart(&self, cart_token: &str, product_id: &str, quantity: u32) -> Result<Cart> {
        let path = format!("/carts/{}/items", cart_token);
        let body = json!({ "product_id": product_id, "quantity": quantity });
        let value = self
            .request_json(Method::POST, ApiBase::TenantCommerce, &path, Some(body))
            .await?;
        Ok(decode_cart(cart_token, &value))
    }

    async fn track_event(&self, cart_token: &str, event: &str) -> Result<()> {
        let body = json!({ "cart_token": cart_token, "event": event });
        self.request_json(Method::POST, ApiBase::TenantV1, "/events", Some(body))
            .await?;
        Ok(())
    }

    async fn complete_checkout(&self, cart_token: &str) -> Result<CheckoutReceipt> {
        let path = format!("/carts/{}/checkout", cart_token);
        let value = self
            .request_json(Method::POST, ApiBase::TenantCommerce, &path, None)
            .await?;
        let order_id = string_field(&value, &["order_id", "id", "order_number"])
            .ok_or_else(|| ApiError::Decode {
                endpoint: path,
                message: "missing order id field".to_string(),
            })?;
        Ok(CheckoutReceipt {
            order_id,
            total: value.get("total").and_then(Value::as_f64),
        })
    }
}

/// Look a string value up under the first matching key.
pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(found) = value.get(key) {
            if let Some(s) = found.as_str() {
                return Some(s.to_string());
            }
            if let Some(n) = found.as_u64() {
                return Some(n.to_string());
            }
        }
    }
    None
}

fn decode_cart(cart_token: &str, value: &Value) -> Cart {
    let lines = value
        .get("items")
        .or_else(|| value.get("line_items"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let product_id = string_field(item, &["product_id", "id", "sku"])?;
                    Some(CartLine {
                        product_id,
                        quantity: item.get("quantity").and_then(Value::as_u64).unwrap_or(1),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Cart {
        cart_token: string_field(value, &["cart_token", "token"])
            .unwrap_or_else(|| cart_token.to_string()),
        items: lines,
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < ERROR_BODY_LIMIT)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_cover_all_variants() {
        let client = FluidApiClient::new("acme", "tok");
        assert_eq!(
            client.base_url(ApiBase::TenantV1),
            "https://acme.fluid.app/api/v1"
        );
        assert_eq!(
            client.base_url(ApiBase::TenantCommerce),
            "https://acme.fluid.app/api/commerce"
        );
        assert_eq!(client.base_url(ApiBase::Enrollment), "https://enrollment.fluid.app/api");
        assert_eq!(client.base_url(ApiBase::Legacy), "https://api.fluid.app/v1");
    }

    #[test]
    fn decode_cart_reads_items_or_line_items() {
        let v = json!({ "token": "c1", "items": [{ "product_id": "p1", "quantity": 2 }] });
        let cart = decode_cart("fallback", &v);
        assert_eq!(cart.cart_token, "c1");
        assert_eq!(cart.items[0].quantity, 2);

        let v = json!({ "line_items": [{ "id": "p2" }] });
        let cart = decode_cart("fallback", &v);
        assert_eq!(cart.cart_token, "fallback");
        assert_eq!(cart.items[0].product_id, "p2");
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[test]
    fn string_field_honors_key_order_and_numeric_ids() {
        let v = json!({ "id": 42, "order_id": "ord-1" });
        assert_eq!(string_field(&v, &["order_id", "id"]).as_deref(), Some("ord-1"));
        assert_eq!(string_field(&v, &["id"]).as_deref(), Some("42"));
        assert_eq!(string_field(&v, &["missing"]), None);
    }

    #[test]
    fn truncate_body_caps_long_payloads() {
        let long = "x".repeat(2000);
        let cut = truncate_body(&long);
        assert!(cut.len() < long.len());
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_body("short"), "short");
    }
}
