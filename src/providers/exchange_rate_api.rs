use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::currency::{Currency, RateProvider};
use crate::core::error::{FxError, FxResult};

/// Rate source backed by the exchangerate-api.com v6 `latest` endpoint.
pub struct ExchangeRateApiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxtally/1.0")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(ExchangeRateApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default, alias = "conversionRates")]
    conversion_rates: HashMap<String, f64>,
}

/// Keeps the supported currencies; an unusable quote for one of them fails the response.
fn supported_rates(base: Currency, raw: &HashMap<String, f64>) -> FxResult<HashMap<Currency, f64>> {
    let mut rates = HashMap::new();
    for (code, rate) in raw {
        let Some(currency) = Currency::from_code(code) else {
            continue;
        };
        if !rate.is_finite() || *rate <= 0.0 {
            return Err(FxError::Upstream(format!(
                "invalid rate {rate} for {currency} in {base} response"
            )));
        }
        rates.insert(currency, *rate);
    }
    Ok(rates)
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    #[instrument(name = "ExchangeRateApiFetch", skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: Currency) -> FxResult<HashMap<Currency, f64>> {
        if self.api_key.is_empty() {
            return Err(FxError::Upstream("API key not configured".to_string()));
        }

        let url = format!("{}/{}/latest/{}", self.base_url, self.api_key, base.code());
        debug!(base = %base, "Requesting latest rates");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FxError::Upstream(format!("Request error: {e} for base: {base}")))?;

        if !response.status().is_success() {
            return Err(FxError::Upstream(format!(
                "HTTP error: {} for base: {}",
                response.status(),
                base
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| FxError::Upstream(format!("Failed to read response for {base}: {e}")))?;
        let data: LatestRatesResponse = serde_json::from_str(&text).map_err(|e| {
            FxError::Upstream(format!("Failed to parse JSON response for {base}: {e}"))
        })?;

        if data.result != "success" {
            return Err(FxError::Upstream(format!(
                "unsuccessful result '{}' for base: {} ({})",
                data.result,
                base,
                data.error_type.as_deref().unwrap_or("unknown error")
            )));
        }

        let rates = supported_rates(base, &data.conversion_rates)?;
        debug!(base = %base, count = rates.len(), "Received rates");
        Ok(rates)
    }
}
