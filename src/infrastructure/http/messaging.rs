use crate::domain::ports::Messenger;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

pub const DEFAULT_COUNTRY_CODE: &str = "55";

#[derive(Debug, Serialize)]
struct SendTextBody<'a> {
    number: &'a str,
    text: &'a str,
}

/// Text-message channel addressed by a per-instance routing id.
#[derive(Clone)]
pub struct HttpMessenger {
    client: Client,
    base_url: String,
    api_key: String,
    instance_id: String,
    country_code: String,
}

impl HttpMessenger {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            instance_id: instance_id.into(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    fn send_text_url(&self) -> String {
        format!("{}/message/sendText/{}", self.base_url, self.instance_id)
    }
}

/// Strips everything but digits and prefixes `country_code` when missing.
pub fn normalize_address(address: &str, country_code: &str) -> String {
    let digits: String = address.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(country_code) {
        digits
    } else {
        format!("{country_code}{digits}")
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send(&self, address: &str, text: &str) -> bool {
        let number = normalize_address(address, &self.country_code);
        debug!(address, number = %number, "sending text message");

        let response = self
            .client
            .post(self.send_text_url())
            .header("apikey", &self.api_key)
            .json(&SendTextBody {
                number: &number,
                text,
            })
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                error!(number = %number, status, body = %body, "messaging channel rejected message");
                false
            }
            Err(e) => {
                error!(number = %number, error = %e, "messaging channel unreachable");
                false
            }
        }
    }
}
