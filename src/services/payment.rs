use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument};

use crate::domain::value_objects::Money;
use crate::error::{Result, ShopError};

const RAZORPAY_ORDERS_URL: &str = "https://api.razorpay.com/v1/orders";

/// Order created on the gateway side; the client completes payment against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn key_id(&self) -> &str;
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder>;
    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;
}

pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    http: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self { key_id: key_id.into(), key_secret: key_secret.into(), http: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> { amount: i64, currency: &'a str, receipt: &'a str }

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str { &self.key_id }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder> {
        let body = CreateOrderBody { amount: amount.minor_units(), currency: amount.currency(), receipt };
        let resp = self.http.post(RAZORPAY_ORDERS_URL)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ShopError::Gateway(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ShopError::Gateway(format!("{status}: {text}")));
        }
        let order: GatewayOrder = resp.json().await.map_err(|e| ShopError::Gateway(e.to_string()))?;
        info!(gateway_order_id = %order.id, "gateway order created");
        Ok(order)
    }

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_hmac(&self.key_secret, gateway_order_id, payment_id, signature)
    }
}

/// Razorpay signs `order_id|payment_id` with HMAC-SHA256 under the key secret, hex encoded.
pub fn verify_hmac(secret: &str, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else { return false };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

pub fn sign(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let sig = sign("secret", "order_abc", "pay_xyz");
        assert!(verify_hmac("secret", "order_abc", "pay_xyz", &sig));
        assert!(!verify_hmac("secret", "order_abc", "pay_other", &sig));
        assert!(!verify_hmac("other", "order_abc", "pay_xyz", &sig));
        assert!(!verify_hmac("secret", "order_abc", "pay_xyz", "not-hex"));
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let expected = "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";
        let mut mac = Hmac::<Sha256>::new_from_slice(b"key").unwrap();
        mac.update(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(hex::encode(mac.finalize().into_bytes()), expected);
    }

    #[test]
    fn test_gateway_delegates_verification() {
        let gw = RazorpayGateway::new("rzp_test", "s3cret");
        let sig = sign("s3cret", "order_1", "pay_1");
        assert!(gw.verify_signature("order_1", "pay_1", &sig));
        assert_eq!(gw.key_id(), "rzp_test");
    }
}
