//! Refund and customer-auth capability seams.
//!
//! The Fluid platform does not expose refund or customer-account APIs to
//! droplets, so the default deployment wires the `Simulated*`
//! implementations: they sleep for a bounded random delay and synthesize a
//! plausible response. The `Http*` counterparts exist for tenants where the
//! real endpoints are enabled; selection happens in configuration, never
//! here.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{string_field, ApiBase, ApiError, FluidApiClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundTicket {
    pub refund_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAccount {
    pub customer_id: String,
    pub email: String,
    /// Kept so the login step can replay the registration credentials.
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerToken {
    pub token: String,
    pub customer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[async_trait]
pub trait RefundGateway: Send + Sync {
    async fn initiate_refund(&self, order_id: &str) -> Result<RefundTicket>;
    async fn process_refund(&self, refund_id: &str) -> Result<RefundTicket>;
    async fn refund_details(&self, refund_id: &str) -> Result<RefundTicket>;
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn register_customer(&self) -> Result<CustomerAccount>;
    async fn login_customer(&self, email: &str, password: &str) -> Result<CustomerToken>;
    async fn customer_profile(&self, token: &str) -> Result<CustomerProfile>;
    async fn logout_customer(&self, token: &str) -> Result<()>;
}

/// Sleep for a bounded random interval so simulated calls have a realistic
/// duration profile.
async fn simulated_latency() {
    let millis = rand::thread_rng().gen_range(120..420);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// Simulated refund gateway: deterministic status progression
/// `pending -> refunded`.
pub struct SimulatedRefundGateway;

#[async_trait]
impl RefundGateway for SimulatedRefundGateway {
    async fn initiate_refund(&self, order_id: &str) -> Result<RefundTicket> {
        simulated_latency().await;
        Ok(RefundTicket {
            refund_id: format!("sim-refund-{}", Uuid::new_v4()),
            order_id: Some(order_id.to_string()),
            status: "pending".to_string(),
            amount: Some(49.99),
        })
    }

    async fn process_refund(&self, refund_id: &str) -> Result<RefundTicket> {
        simulated_latency().await;
        Ok(RefundTicket {
            refund_id: refund_id.to_string(),
            order_id: None,
            status: "refunded".to_string(),
            amount: Some(49.99),
        })
    }

    async fn refund_details(&self, refund_id: &str) -> Result<RefundTicket> {
        simulated_latency().await;
        Ok(RefundTicket {
            refund_id: refund_id.to_string(),
            order_id: None,
            status: "refunded".to_string(),
            amount: Some(49.99),
        })
    }
}

/// Simulated auth gateway: synthesizes a disposable account and echoes it
/// back through login/profile/logout.
pub struct SimulatedAuthGateway;

#[async_trait]
impl AuthGateway for SimulatedAuthGateway {
    async fn register_customer(&self) -> Result<CustomerAccount> {
        simulated_latency().await;
        let customer_id = format!("sim-customer-{}", Uuid::new_v4());
        Ok(CustomerAccount {
            email: format!("{}@synthetic.fluidprobe.dev", customer_id),
            password: Uuid::new_v4().to_string(),
            customer_id,
        })
    }

    async fn login_customer(&self, _email: &str, _password: &str) -> Result<CustomerToken> {
        simulated_latency().await;
        Ok(CustomerToken {
            token: format!("sim-token-{}", Uuid::new_v4()),
            customer_id: format!("sim-customer-{}", Uuid::new_v4()),
        })
    }

    async fn customer_profile(&self, _token: &str) -> Result<CustomerProfile> {
        simulated_latency().await;
        let customer_id = format!("sim-customer-{}", Uuid::new_v4());
        Ok(CustomerProfile {
            email: format!("{}@synthetic.fluidprobe.dev", customer_id),
            customer_id,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        })
    }

    async fn logout_customer(&self, _token: &str) -> Result<()> {
        simulated_latency().await;
        Ok(())
    }
}

/// Real HTTP refund gateway against the tenant v1 API.
pub struct HttpRefundGateway {
    client: FluidApiClient,
}

impl HttpRefundGateway {
    pub fn new(client: FluidApiClient) -> Self {
        Self { client }
    }
}

fn decode_ticket(endpoint: &str, value: &Value) -> Result<RefundTicket, ApiError> {
    let refund_id =
        string_field(value, &["refund_id", "id"]).ok_or_else(|| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: "missing refund id field".to_string(),
        })?;
    Ok(RefundTicket {
        refund_id,
        order_id: string_field(value, &["order_id"]),
        status: string_field(value, &["status", "state"]).unwrap_or_else(|| "unknown".to_string()),
        amount: value.get("amount").and_then(Value::as_f64),
    })
}

#[async_trait]
impl RefundGateway for HttpRefundGateway {
    async fn initiate_refund(&self, order_id: &str) -> Result<RefundTicket> {
        let body = json!({ "order_id": order_id });
        let value = self
            .client
            .request_json(Method::POST, ApiBase::TenantV1, "/refunds", Some(body))
            .await?;
        Ok(decode_ticket("/refunds", &value)?)
    }

    async fn process_refund(&self, refund_id: &str) -> Result<RefundTicket> {
        let path = format!("/refunds/{}/process", refund_id);
        let value = self
            .client
            .request_json(Method::POST, ApiBase::TenantV1, &path, None)
            .await?;
        Ok(decode_ticket(&path, &value)?)
    }

    async fn refund_details(&self, refund_id: &str) -> Result<RefundTicket> {
        let path = format!("/refunds/{}", refund_id);
        let value = self
            .client
            .request_json(Method::GET, ApiBase::TenantV1, &path, None)
            .await?;
        Ok(decode_ticket(&path, &value)?)
    }
}

/// Real HTTP auth gateway against the global legacy API.
pub struct HttpAuthGateway {
    client: FluidApiClient,
}

impl HttpAuthGateway {
    pub fn new(client: FluidApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn register_customer(&self) -> Result<CustomerAccount> {
        let email = format!("probe-{}@synthetic.fluidprobe.dev", Uuid::new_v4());
        let password = Uuid::new_v4().to_string();
        let body = json!({ "email": email, "password": password });
        let value = self
            .client
            .request_json(Method::POST, ApiBase::Legacy, "/customers/register", Some(body))
            .await?;
        let customer_id =
            string_field(&value, &["customer_id", "id"]).ok_or_else(|| ApiError::Decode {
                endpoint: "/customers/register".to_string(),
                message: "missing customer id field".to_string(),
            })?;
        Ok(CustomerAccount {
            customer_id,
            email,
            password,
        })
    }

    async fn login_customer(&self, email: &str, password: &str) -> Result<CustomerToken> {
        let body = json!({ "email": email, "password": password });
        let value = self
            .client
            .request_json(Method::POST, ApiBase::Legacy, "/customers/login", Some(body))
            .await?;
        let token =
            string_field(&value, &["token", "access_token"]).ok_or_else(|| ApiError::Decode {
                endpoint: "/customers/login".to_string(),
                message: "missing token field".to_string(),
            })?;
        Ok(CustomerToken {
            token,
            customer_id: string_field(&value, &["customer_id", "id"]).unwrap_or_default(),
        })
    }

    async fn customer_profile(&self, token: &str) -> Result<CustomerProfile> {
        let body = json!({ "token": token });
        let value = self
            .client
            .request_json(Method::POST, ApiBase::Legacy, "/customers/profile", Some(body))
            .await?;
        let customer_id =
            string_field(&value, &["customer_id", "id"]).ok_or_else(|| ApiError::Decode {
                endpoint: "/customers/profile".to_string(),
                message: "missing customer id field".to_string(),
            })?;
        Ok(CustomerProfile {
            customer_id,
            email: string_field(&value, &["email"]).unwrap_or_default(),
            created_at: string_field(&value, &["created_at"]),
        })
    }

    async fn logout_customer(&self, token: &str) -> Result<()> {
        let body = json!({ "token": token });
        self.client
            .request_json(Method::POST, ApiBase::Legacy, "/customers/logout", Some(body))
            .await?;
        Ok(())
    }
}
