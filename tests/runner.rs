//! Scenario-level tests for the test runner, driven through mock
//! implementations of the commerce and gateway seams.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use fluidprobe::fluid::catalog::{CatalogItem, CatalogPage};
use fluidprobe::fluid::gateway::{
    AuthGateway, CustomerAccount, CustomerProfile, CustomerToken, RefundGateway, RefundTicket,
};
use fluidprobe::fluid::{Cart, CartLine, CartSession, CheckoutReceipt, CommerceApi};
use fluidprobe::runner::{StepStatus, TestRunner, TestStatus, TestType};
use fluidprobe::store::TestSettings;

fn item(id: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        title: Some(format!("Item {}", id)),
        price: Some(19.99),
    }
}

/// All-success commerce mock. `sdk` controls the product-purchase branch;
/// `fail_add_to_cart` / `fail_track_event` inject step failures.
struct MockCommerce {
    sdk: bool,
    fail_add_to_cart: bool,
    fail_track_event: bool,
}

impl MockCommerce {
    fn happy(sdk: bool) -> Self {
        Self {
            sdk,
            fail_add_to_cart: false,
            fail_track_event: false,
        }
    }
}

#[async_trait]
impl CommerceApi for MockCommerce {
    async fn detect_storefront_sdk(&self) -> bool {
        self.sdk
    }

    async fn get_products(&self, _product_type: Option<&str>, page: u32) -> Result<CatalogPage> {
        Ok(CatalogPage {
            items: vec![item("prod-1"), item("prod-2")],
            page,
            total_pages: Some(1),
        })
    }

    async fn get_enrollment_packs(&self) -> Result<Vec<CatalogItem>> {
        Ok(vec![item("pack-1")])
    }

    async fn create_session(&self) -> Result<CartSession> {
        Ok(CartSession {
            cart_token: "cart-1".to_string(),
        })
    }

    async fn get_cart(&self, cart_token: &str) -> Result<Cart> {
        Ok(Cart {
            cart_token: cart_token.to_string(),
            items: vec![CartLine {
                product_id: "prod-1".to_string(),
                quantity: 1,
            }],
        })
    }

    async fn add_to_cart(&self, cart_token: &str, product_id: &str, quantity: u32) -> Result<Cart> {
        if self.fail_add_to_cart {
            return Err(anyhow!("cart service unavailable"));
        }
        Ok(Cart {
            cart_token: cart_token.to_string(),
            items: vec![CartLine {
                product_id: product_id.to_string(),
                quantity: quantity as u64,
            }],
        })
    }

    async fn track_event(&self, _cart_token: &str, _event: &str) -> Result<()> {
        if self.fail_track_event {
            return Err(anyhow!("analytics endpoint is down"));
        }
        Ok(())
    }

    async fn complete_checkout(&self, _cart_token: &str) -> Result<CheckoutReceipt> {
        Ok(CheckoutReceipt {
            order_id: "order-1".to_string(),
            total: Some(19.99),
        })
    }
}

struct MockRefunds;

#[async_trait]
impl RefundGateway for MockRefunds {
    async fn initiate_refund(&self, order_id: &str) -> Result<RefundTicket> {
        Ok(RefundTicket {
            refund_id: "refund-1".to_string(),
            order_id: Some(order_id.to_string()),
            status: "pending".to_string(),
            amount: Some(19.99),
        })
    }

    async fn process_refund(&self, refund_id: &str) -> Result<RefundTicket> {
        Ok(RefundTicket {
            refund_id: refund_id.to_string(),
            order_id: None,
            status: "refunded".to_string(),
            amount: Some(19.99),
        })
    }

    async fn refund_details(&self, refund_id: &str) -> Result<RefundTicket> {
        Ok(RefundTicket {
            refund_id: refund_id.to_string(),
            order_id: None,
            status: "refunded".to_string(),
            amount: Some(19.99),
        })
    }
}

/// Auth mock; `fail_login` makes the login step fail with "timeout".
struct MockAuth {
    fail_login: bool,
}

#[async_trait]
impl AuthGateway for MockAuth {
    async fn register_customer(&self) -> Result<CustomerAccount> {
        Ok(CustomerAccount {
            customer_id: "cust-1".to_string(),
            email: "cust-1@example.com".to_string(),
            password: "hunter2".to_string(),
        })
    }

    async fn login_customer(&self, _email: &str, _password: &str) -> Result<CustomerToken> {
        if self.fail_login {
            return Err(anyhow!("timeout"));
        }
        Ok(CustomerToken {
            token: "tok-1".to_string(),
            customer_id: "cust-1".to_string(),
        })
    }

    async fn customer_profile(&self, _token: &str) -> Result<CustomerProfile> {
        Ok(CustomerProfile {
            customer_id: "cust-1".to_string(),
            email: "cust-1@example.com".to_string(),
            created_at: None,
        })
    }

    async fn logout_customer(&self, _token: &str) -> Result<()> {
        Ok(())
    }
}

fn runner_with(commerce: MockCommerce, auth: MockAuth, settings: TestSettings) -> TestRunner {
    TestRunner::new(
        Arc::new(commerce),
        Arc::new(MockRefunds),
        Arc::new(auth),
        settings,
        "acme",
    )
}

fn happy_runner(sdk: bool) -> TestRunner {
    runner_with(
        MockCommerce::happy(sdk),
        MockAuth { fail_login: false },
        TestSettings::default(),
    )
}

#[tokio::test]
async fn all_five_scenarios_pass_with_fixed_step_counts() {
    let expected = [
        (TestType::ProductPurchase, 4),
        (TestType::SubscriptionPurchase, 5),
        (TestType::Enrollment, 5),
        (TestType::RefundFlow, 4),
        (TestType::CustomerAuth, 4),
    ];
    for (test_type, steps) in expected {
        let result = happy_runner(true).run_test(test_type).await;
        assert_eq!(result.status, TestStatus::Passed, "{} should pass", test_type);
        assert_eq!(result.steps.len(), steps, "{} step count", test_type);
        assert!(result.error.is_none());
        assert!(result
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Passed));
        assert!(result.finished_at.is_some());
    }
}

#[tokio::test]
async fn product_purchase_downgrades_without_sdk() {
    let result = happy_runner(false).run_test(TestType::ProductPurchase).await;
    assert_eq!(result.status, TestStatus::Passed);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.steps[0].name, "Detect storefront SDK");
    assert_eq!(result.steps[1].name, "Fetch product catalog");
    assert_eq!(result.steps[2].name, "Validate product availability");
    assert_eq!(
        result.metadata.get("mode").and_then(|v| v.as_str()),
        Some("validation")
    );
}

#[tokio::test]
async fn auth_login_timeout_aborts_after_two_steps() {
    let runner = runner_with(
        MockCommerce::happy(true),
        MockAuth { fail_login: true },
        TestSettings::default(),
    );
    let result = runner.run_test(TestType::CustomerAuth).await;

    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].name, "Register new customer");
    assert_eq!(result.steps[0].status, StepStatus::Passed);
    assert_eq!(result.steps[1].name, "Customer login");
    assert_eq!(result.steps[1].status, StepStatus::Failed);
    assert_eq!(result.steps[1].error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn failing_add_to_cart_preserves_partial_step_list() {
    let runner = runner_with(
        MockCommerce {
            sdk: true,
            fail_add_to_cart: true,
            fail_track_event: false,
        },
        MockAuth { fail_login: false },
        TestSettings::default(),
    );
    let result = runner.run_test(TestType::SubscriptionPurchase).await;

    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.steps[2].name, "Add product to cart");
    assert_eq!(result.steps[2].status, StepStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("cart service unavailable"));
}

#[tokio::test]
async fn best_effort_analytics_failure_does_not_fail_the_run() {
    let runner = runner_with(
        MockCommerce {
            sdk: true,
            fail_add_to_cart: false,
            fail_track_event: true,
        },
        MockAuth { fail_login: false },
        TestSettings::default(),
    );
    let result = runner.run_test(TestType::Enrollment).await;

    assert_eq!(result.status, TestStatus::Passed);
    assert_eq!(result.steps.len(), 5);
    let event_step = &result.steps[3];
    assert_eq!(event_step.name, "Record checkout-started event");
    assert_eq!(event_step.status, StepStatus::Skipped);
    assert_eq!(
        event_step.error.as_deref(),
        Some("analytics endpoint is down")
    );
}

#[tokio::test]
async fn configured_product_ids_are_honored() {
    let settings = TestSettings {
        product_ids: vec!["conf-a".to_string(), "conf-b".to_string()],
        product_type: None,
    };
    let runner = runner_with(MockCommerce::happy(true), MockAuth { fail_login: false }, settings);
    let result = runner.run_test(TestType::SubscriptionPurchase).await;

    assert_eq!(result.status, TestStatus::Passed);
    let chosen = result
        .metadata
        .get("product_id")
        .and_then(|v| v.as_str())
        .unwrap();
    assert!(chosen == "conf-a" || chosen == "conf-b");
}

#[tokio::test]
async fn checkout_records_order_id_in_metadata() {
    let result = happy_runner(true).run_test(TestType::Enrollment).await;
    assert_eq!(
        result.metadata.get("order_id").and_then(|v| v.as_str()),
        Some("order-1")
    );
    assert_eq!(
        result.metadata.get("company_subdomain").and_then(|v| v.as_str()),
        Some("acme")
    );
}
