use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionAttributes {
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub success_url: String,
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub cancel_url: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CheckoutSessionData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: CheckoutSessionAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CheckoutSessionRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: CheckoutSessionData,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PortalSessionAttributes {
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"))]
    pub return_url: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PortalSessionData {
    #[serde(default)]
    #[validate(nested)]
    pub attributes: PortalSessionAttributes,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PortalSessionRequest {
    #[serde(default)]
    #[validate(nested)]
    pub data: PortalSessionData,
}

/// A provider-hosted URL the client redirects to.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedirectAttributes {
    pub url: String,
}

pub const CHECKOUT_SESSION_TYPE: &str = "checkout-session";
pub const BILLING_PORTAL_SESSION_TYPE: &str = "billing-portal-session";
pub const STRIPE_LINK_TYPE: &str = "stripe-link";
pub const SUBSCRIPTION_TYPE: &str = "subscription";
