use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Processing,
    Failed,
}

/// Gateway answer for a collection or refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub reference: String, // Provider's ID (e.g., pay_123)
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Collect `amount` minor units against the client's payment method
    async fn collect(
        &self,
        booking_id: Uuid,
        payment_method_ref: &str,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt>;

    /// Return `amount` minor units for a previous collection
    async fn refund(
        &self,
        booking_id: Uuid,
        reference: Option<&str>,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt>;
}

/// In-process gateway stand-in.
///
/// `decline` as the method ref yields a failed collection, `gateway-down`
/// a transport error.
pub struct MockPaymentAdapter;

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn collect(
        &self,
        booking_id: Uuid,
        payment_method_ref: &str,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt> {
        if payment_method_ref == "gateway-down" {
            return Err(CoreError::GatewayError("Simulated Payment Gateway Failure".into()));
        }

        let status = if payment_method_ref == "decline" {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Succeeded
        };

        Ok(PaymentReceipt {
            reference: format!("mock_pay_{}", Uuid::new_v4().simple()),
            booking_id,
            amount,
            currency: currency.to_string(),
            status,
            processed_at: Utc::now(),
        })
    }

    async fn refund(
        &self,
        booking_id: Uuid,
        reference: Option<&str>,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt> {
        tracing::info!(%booking_id, amount, "mock refund issued against {:?}", reference);
        Ok(PaymentReceipt {
            reference: format!("mock_refund_{}", Uuid::new_v4().simple()),
            booking_id,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Succeeded,
            processed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_adapter_outcomes() {
        let adapter = MockPaymentAdapter;
        let id = Uuid::new_v4();

        let ok = adapter.collect(id, "card_visa", 1000, "USD").await.unwrap();
        assert_eq!(ok.status, PaymentStatus::Succeeded);

        let declined = adapter.collect(id, "decline", 1000, "USD").await.unwrap();
        assert_eq!(declined.status, PaymentStatus::Failed);

        assert!(adapter.collect(id, "gateway-down", 1000, "USD").await.is_err());
    }
}
