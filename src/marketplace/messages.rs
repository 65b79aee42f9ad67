//! Wire types for the marketplace REST API
//!
//! The API transmits money as strings; conversion into `Decimal` happens at
//! this boundary so the rest of the engine never touches raw payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{InventoryItem, Listing, Sale};

/// Parse a string-encoded decimal field
pub fn parse_decimal(value: &str, field: &str) -> Result<Decimal> {
    value
        .parse()
        .map_err(|e| EngineError::InvalidResponse(format!("invalid {}: {}", field, e)))
}

/// Account balance response
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: String,
}

/// One listing in a search response
#[derive(Debug, Clone, Deserialize)]
pub struct ListingDto {
    pub id: String,
    pub item_name: String,
    pub price: String,
}

impl ListingDto {
    pub fn into_listing(self) -> Result<Listing> {
        let price = parse_decimal(&self.price, "listing price")?;
        Ok(Listing {
            listing_id: self.id,
            item_name: self.item_name,
            price,
        })
    }
}

/// Search response
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub listings: Vec<ListingDto>,
}

/// Buy request body
#[derive(Debug, Clone, Serialize)]
pub struct BuyRequest {
    pub listing_ids: Vec<String>,
}

/// Buy response
#[derive(Debug, Clone, Deserialize)]
pub struct BuyResponse {
    #[serde(default)]
    pub purchased: Vec<String>,
    pub total_price: String,
}

/// One item of a list request body
#[derive(Debug, Clone, Serialize)]
pub struct ListItemDto {
    pub sale_id: String,
    pub price: String,
}

/// List request body
#[derive(Debug, Clone, Serialize)]
pub struct ListItemsRequest {
    pub items: Vec<ListItemDto>,
}

/// List response
#[derive(Debug, Clone, Deserialize)]
pub struct ListItemsResponse {
    #[serde(default)]
    pub listed: Vec<String>,
}

/// One price edit in an edit request body
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdateDto {
    pub sale_id: String,
    pub new_price: String,
}

/// Edit-price request body
#[derive(Debug, Clone, Serialize)]
pub struct EditPriceRequest {
    pub updates: Vec<PriceUpdateDto>,
}

/// Edit-price response
#[derive(Debug, Clone, Deserialize)]
pub struct EditPriceResponse {
    #[serde(default)]
    pub updated: Vec<String>,
}

/// One inventory item
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItemDto {
    pub sale_id: String,
    pub item_name: String,
    #[serde(default)]
    pub listed: bool,
    #[serde(default)]
    pub listed_price: Option<String>,
}

impl InventoryItemDto {
    pub fn into_inventory_item(self) -> Result<InventoryItem> {
        let listed_price = match self.listed_price {
            Some(price) => Some(parse_decimal(&price, "listed price")?),
            None => None,
        };
        Ok(InventoryItem {
            sale_id: self.sale_id,
            item_name: self.item_name,
            listed: self.listed,
            listed_price,
        })
    }
}

/// Inventory response
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryResponse {
    #[serde(default)]
    pub items: Vec<InventoryItemDto>,
}

/// One historical sale
#[derive(Debug, Clone, Deserialize)]
pub struct SaleDto {
    pub item_name: String,
    pub price: String,
    /// Unix timestamp in seconds
    pub sold_at: i64,
}

impl SaleDto {
    pub fn into_sale(self) -> Result<Sale> {
        let price = parse_decimal(&self.price, "sale price")?;
        let sold_at: DateTime<Utc> = DateTime::from_timestamp(self.sold_at, 0)
            .ok_or_else(|| {
                EngineError::InvalidResponse(format!("invalid sale timestamp: {}", self.sold_at))
            })?;
        Ok(Sale {
            item_name: self.item_name,
            price,
            sold_at,
        })
    }
}

/// Sales history response
#[derive(Debug, Clone, Deserialize)]
pub struct SalesHistoryResponse {
    #[serde(default)]
    pub sales: Vec<SaleDto>,
}
