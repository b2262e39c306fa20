use crate::domain::customer::split_full_name;
use crate::domain::ports::{IssuedPayment, PaymentGateway, PaymentRequest};
use crate::domain::tax_id;
use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.mercadopago.com";
const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";
const PAYMENT_METHOD: &str = "pix";
const CODE_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    description: &'a str,
    payment_method_id: &'static str,
    payer: PayerBody<'a>,
    external_reference: &'a str,
    date_of_expiration: String,
}

#[derive(Debug, Serialize)]
struct PayerBody<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identification: Option<Identification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<PhoneBody>,
}

#[derive(Debug, Serialize)]
struct Identification {
    #[serde(rename = "type")]
    kind: &'static str,
    number: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct PhoneBody {
    area_code: String,
    number: String,
}

/// Settlement state reported by the gateway.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Approved,
    Pending,
    InProcess,
    Rejected,
    Cancelled,
    Refunded,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    status: GatewayStatus,
    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: Option<String>,
}

impl PaymentResponse {
    fn payment_id(&self) -> Result<String, GatewayError> {
        match &self.id {
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
            other => Err(GatewayError::Decode(format!("unexpected payment id {other}"))),
        }
    }

    fn pix_code(&self) -> Option<&str> {
        self.point_of_interaction
            .as_ref()?
            .transaction_data
            .as_ref()?
            .qr_code
            .as_deref()
            .filter(|code| !code.is_empty())
    }
}

/// Payment gateway client speaking the gateway's REST payments API.
///
/// Every call is bounded by the timeout of the `reqwest::Client` it is built
/// with; a timeout surfaces as [`GatewayError::Transport`] or as `false` from
/// [`PaymentGateway::check_status`].
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpPaymentGateway {
    pub fn new(client: Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn payments_url(&self) -> String {
        format!("{}/v1/payments", self.base_url)
    }

    fn payment_url(&self, payment_id: &str) -> String {
        format!("{}/v1/payments/{}", self.base_url, payment_id)
    }

    async fn post_payment(
        &self,
        body: &CreatePaymentBody<'_>,
        idempotency_key: &str,
    ) -> Result<IssuedPayment, GatewayError> {
        let response = self
            .client
            .post(self.payments_url())
            .bearer_auth(&self.access_token)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        interpret_create_response(status, &text)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentResponse, GatewayError> {
        let response = self
            .client
            .get(self.payment_url(payment_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(&self, request: PaymentRequest) -> Result<IssuedPayment, GatewayError> {
        let body = build_create_body(&request, Utc::now());
        let idempotency_key = Uuid::new_v4().to_string();
        debug!(
            reference = %request.external_reference,
            amount = %request.amount,
            identified = body.payer.identification.is_some(),
            "creating payment"
        );

        let result = self.post_payment(&body, &idempotency_key).await;

        if let Err(e) = &result {
            error!(reference = %request.external_reference, error = %e, "payment creation failed");
        }
        result
    }

    async fn check_status(&self, payment_id: &str) -> bool {
        match self.get_payment(payment_id).await {
            Ok(payment) => {
                debug!(payment_id, status = ?payment.status, "payment status checked");
                payment.status == GatewayStatus::Approved
            }
            Err(e) => {
                warn!(payment_id, error = %e, "payment status check failed");
                false
            }
        }
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<IssuedPayment, GatewayError> {
        let payment = self.get_payment(payment_id).await?;
        if !matches!(payment.status, GatewayStatus::Pending | GatewayStatus::Approved) {
            warn!(payment_id, status = ?payment.status, "reusing code of a payment that is no longer open");
        }
        let pix_code = payment.pix_code().ok_or(GatewayError::MissingCode)?;
        Ok(IssuedPayment {
            payment_id: payment_id.to_string(),
            pix_code: pix_code.to_string(),
        })
    }
}

fn build_create_body(request: &PaymentRequest, now: DateTime<Utc>) -> CreatePaymentBody<'_> {
    let payer = &request.payer;
    let (first_name, last_name) = split_full_name(&payer.name);

    // Invalid ids are dropped rather than failing the payment.
    let identification = payer
        .tax_id
        .as_deref()
        .and_then(tax_id::normalize)
        .map(|number| Identification {
            kind: "CPF",
            number,
        });

    CreatePaymentBody {
        transaction_amount: request.amount.value(),
        description: &request.description,
        payment_method_id: PAYMENT_METHOD,
        payer: PayerBody {
            email: &payer.email,
            first_name,
            last_name,
            identification,
            phone: payer.phone.as_deref().and_then(split_phone),
        },
        external_reference: &request.external_reference,
        date_of_expiration: (now + Duration::hours(CODE_VALIDITY_HOURS))
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Splits a local number into its two-digit area code and subscriber number.
fn split_phone(raw: &str) -> Option<PhoneBody> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 2 {
        return None;
    }
    let (area_code, number) = digits.split_at(2);
    Some(PhoneBody {
        area_code: area_code.to_string(),
        number: number.to_string(),
    })
}

fn interpret_create_response(status: StatusCode, body: &str) -> Result<IssuedPayment, GatewayError> {
    if !status.is_success() {
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    let payment: PaymentResponse =
        serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    if !matches!(payment.status, GatewayStatus::Approved | GatewayStatus::Pending) {
        return Err(GatewayError::NotApproved(format!("{:?}", payment.status)));
    }
    let pix_code = payment.pix_code().ok_or(GatewayError::MissingCode)?;
    Ok(IssuedPayment {
        payment_id: payment.payment_id()?,
        pix_code: pix_code.to_string(),
    })
}
