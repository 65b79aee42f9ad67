//! REST client for the marketplace API
//!
//! Failures are classified into three distinguishable outcomes: rate limited
//! (HTTP 429 with an optional Retry-After), API errors (any other
//! non-success status) and transport errors (the request never completed).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::auth::{generate_auth_headers, AuthHeaders};
use super::messages::*;
use crate::common::errors::{EngineError, Result};
use crate::common::traits::MarketApi;
use crate::common::types::{
    BuyOutcome, EditOutcome, InventoryItem, ListOutcome, ListRequest, Listing, PriceUpdate, Sale,
};
use crate::config::types::ApiCredentials;

/// REST client for the marketplace API
#[derive(Debug, Clone)]
pub struct MarketplaceRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the API
    base_url: String,
    /// Optional API credentials for authenticated endpoints
    credentials: Option<ApiCredentials>,
}

impl MarketplaceRestClient {
    /// Create a new REST client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Set API credentials for authenticated requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Generate authentication headers if credentials are set
    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Result<Option<AuthHeaders>> {
        match &self.credentials {
            Some(creds) => {
                let headers =
                    generate_auth_headers(&creds.api_key, &creds.api_secret, method, path, body)?;
                Ok(Some(headers))
            }
            None => Ok(None),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(headers) = self.auth_headers("GET", path, "")? {
            request = headers.apply_to_request(request);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_string(body)?;
        debug!("POST {}", url);

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.clone());
        if let Some(headers) = self.auth_headers("POST", path, &payload)? {
            request = headers.apply_to_request(request);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// Classify the response status before decoding the payload
    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(EngineError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MarketApi for MarketplaceRestClient {
    #[instrument(skip(self))]
    async fn get_balance(&self) -> Result<Decimal> {
        let response: BalanceResponse = self.get_json("/account/balance").await?;
        parse_decimal(&response.balance, "balance")
    }

    #[instrument(skip(self))]
    async fn search(&self, item_name: &str) -> Result<Vec<Listing>> {
        let path = format!(
            "/market/search?item={}",
            urlencoding_encode(item_name)
        );
        let response: SearchResponse = self.get_json(&path).await?;
        response
            .listings
            .into_iter()
            .map(ListingDto::into_listing)
            .collect()
    }

    #[instrument(skip(self, listing_ids))]
    async fn buy_items(&self, listing_ids: &[String]) -> Result<BuyOutcome> {
        let request = BuyRequest {
            listing_ids: listing_ids.to_vec(),
        };
        let response: BuyResponse = self.post_json("/market/buy", &request).await?;
        Ok(BuyOutcome {
            purchased_ids: response.purchased,
            total_price: parse_decimal(&response.total_price, "total price")?,
        })
    }

    #[instrument(skip(self, requests))]
    async fn list_items(&self, requests: &[ListRequest]) -> Result<ListOutcome> {
        let request = ListItemsRequest {
            items: requests
                .iter()
                .map(|item| ListItemDto {
                    sale_id: item.sale_id.clone(),
                    price: item.price.to_string(),
                })
                .collect(),
        };
        let response: ListItemsResponse = self.post_json("/inventory/list", &request).await?;
        Ok(ListOutcome {
            listed_ids: response.listed,
        })
    }

    #[instrument(skip(self, updates))]
    async fn edit_price(&self, updates: &[PriceUpdate]) -> Result<EditOutcome> {
        let request = EditPriceRequest {
            updates: updates
                .iter()
                .map(|update| PriceUpdateDto {
                    sale_id: update.sale_id.clone(),
                    new_price: update.new_price.to_string(),
                })
                .collect(),
        };
        let response: EditPriceResponse = self.post_json("/inventory/edit-price", &request).await?;
        Ok(EditOutcome {
            updated_ids: response.updated,
        })
    }

    #[instrument(skip(self))]
    async fn get_inventory(&self) -> Result<Vec<InventoryItem>> {
        let response: InventoryResponse = self.get_json("/inventory").await?;
        response
            .items
            .into_iter()
            .map(InventoryItemDto::into_inventory_item)
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_sales_history(&self, item_name: &str) -> Result<Vec<Sale>> {
        let path = format!(
            "/market/sales?item={}",
            urlencoding_encode(item_name)
        );
        let response: SalesHistoryResponse = self.get_json(&path).await?;
        response.sales.into_iter().map(SaleDto::into_sale).collect()
    }
}

/// Percent-encode an item name for use in a query string
fn urlencoding_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MarketplaceRestClient::new("https://api.marketplace.example");
        assert!(client.is_ok());
    }

    #[test]
    fn test_url_normalization() {
        let client = MarketplaceRestClient::new("https://api.marketplace.example/").unwrap();
        assert!(!client.base_url.ends_with('/'));
    }

    #[test]
    fn test_item_name_encoding() {
        assert_eq!(
            urlencoding_encode("chrome falchion (field-tested)"),
            "chrome+falchion+%28field-tested%29"
        );
    }
}
