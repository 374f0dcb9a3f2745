//! Stripe client for connected accounts, customers and hosted sessions.
//!
//! Stripe takes form-encoded bodies and bearer auth with the secret key.
//! Everything here is outbound; inbound webhooks only get enqueued.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use super::ServiceError;
use crate::config::StripeConfig;
use crate::models::Organization;

/// A provider-hosted page the caller should be redirected to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Returns the new connected account id.
    async fn create_connected_account(&self, organization: &Organization) -> Result<String, ServiceError>;
    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, ServiceError>;
    async fn create_login_link(&self, account_id: &str) -> Result<String, ServiceError>;
    /// Returns the new customer id.
    async fn create_customer(&self, organization: &Organization) -> Result<String, ServiceError>;
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<HostedSession, ServiceError>;
    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<HostedSession, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        if !self.is_configured() {
            return Err(ServiceError::Provider("Stripe credentials not configured".to_string()));
        }

        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("Stripe request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Provider(format!("Stripe response unreadable: {}", e)))?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            let detail = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.error.code.unwrap_or_else(|| "unknown".to_string()),
                        b.error.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|_| body.clone());
            tracing::error!(status = %status, path = %path, error = %detail, "Stripe API error");
            Err(ServiceError::Provider(format!("Stripe {} returned {}: {}", path, status, detail)))
        }
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_connected_account(&self, organization: &Organization) -> Result<String, ServiceError> {
        let mut form = vec![
            ("type", "express".to_string()),
            ("business_profile[name]", organization.name.clone()),
            ("metadata[organization_id]", organization.organization_id.to_string()),
        ];
        if let Some(email) = &organization.contact_email {
            form.push(("email", email.clone()));
        }
        if let Some(website) = &organization.website_url {
            form.push(("business_profile[url]", website.clone()));
        }

        let account: StripeObject = self.post_form("/v1/accounts", &form).await?;
        tracing::info!(
            organization_id = %organization.organization_id,
            account_id = %account.id,
            "Stripe connected account created"
        );
        Ok(account.id)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String, ServiceError> {
        let form = [
            ("account", account_id.to_string()),
            ("refresh_url", refresh_url.to_string()),
            ("return_url", return_url.to_string()),
            ("type", "account_onboarding".to_string()),
        ];
        let link: StripeLink = self.post_form("/v1/account_links", &form).await?;
        Ok(link.url)
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ServiceError> {
        let path = format!("/v1/accounts/{}/login_links", account_id);
        let link: StripeLink = self.post_form(&path, &[]).await?;
        Ok(link.url)
    }

    async fn create_customer(&self, organization: &Organization) -> Result<String, ServiceError> {
        let mut form = vec![
            ("name", organization.name.clone()),
            ("metadata[organization_id]", organization.organization_id.to_string()),
        ];
        if let Some(email) = &organization.contact_email {
            form.push(("email", email.clone()));
        }

        let customer: StripeObject = self.post_form("/v1/customers", &form).await?;
        tracing::info!(
            organization_id = %organization.organization_id,
            customer_id = %customer.id,
            "Stripe customer created"
        );
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<HostedSession, ServiceError> {
        let form = [
            ("mode", "subscription".to_string()),
            ("customer", customer_id.to_string()),
            ("line_items[0][price]", self.config.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", success_url.to_string()),
            ("cancel_url", cancel_url.to_string()),
        ];
        let session: StripeObject = self.post_form("/v1/checkout/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| ServiceError::Provider("Checkout session has no url".to_string()))?;
        Ok(HostedSession { id: session.id, url })
    }

    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<HostedSession, ServiceError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];
        let session: StripeObject = self.post_form("/v1/billing_portal/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| ServiceError::Provider("Portal session has no url".to_string()))?;
        Ok(HostedSession { id: session.id, url })
    }
}

/// Deterministic provider that records every call.
#[derive(Default)]
pub struct MockBillingProvider {
    calls: Mutex<Vec<String>>,
    fail: bool,
    latency: Option<Duration>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Account and customer creation take `latency`, widening race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn stall(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), ServiceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.fail {
            return Err(ServiceError::Provider("mock provider failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_connected_account(&self, organization: &Organization) -> Result<String, ServiceError> {
        self.record(format!("create_connected_account:{}", organization.organization_id))?;
        self.stall().await;
        Ok(format!("acct_{}", organization.organization_id.simple()))
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<String, ServiceError> {
        self.record(format!("create_account_link:{}", account_id))?;
        Ok(format!("https://connect.stripe.test/setup/{}", account_id))
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ServiceError> {
        self.record(format!("create_login_link:{}", account_id))?;
        Ok(format!("https://connect.stripe.test/express/{}", account_id))
    }

    async fn create_customer(&self, organization: &Organization) -> Result<String, ServiceError> {
        self.record(format!("create_customer:{}", organization.organization_id))?;
        self.stall().await;
        Ok(format!("cus_{}", organization.organization_id.simple()))
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<HostedSession, ServiceError> {
        self.record(format!("create_checkout_session:{}", customer_id))?;
        Ok(HostedSession {
            id: format!("cs_{}", customer_id),
            url: format!("https://checkout.stripe.test/{}", customer_id),
        })
    }

    async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<HostedSession, ServiceError> {
        self.record(format!("create_billing_portal_session:{}", customer_id))?;
        Ok(HostedSession {
            id: format!("bps_{}", customer_id),
            url: format!("https://billing.stripe.test/{}", customer_id),
        })
    }
}
