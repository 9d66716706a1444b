//! Natural Resources Canada EODMS REST API, serving RADARSAT Constellation Mission products.
use super::{
    ItemState, ItemUpdate, OrderItem, OrderTicket, Product, SearchClient, REQUEST_TIMEOUT,
};
use crate::config::Credentials;
use crate::download::{self, Auth};
use crate::error::{AcquisitionError, DownloadError};
use crate::query::QueryFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const RAPI_URL: &str = "https://www.eodms-sgdot.nrcan-rncan.gc.ca/wes/rapi";
const PACKAGING_FORMAT: &str = "ZIP";
const PRIORITY: &str = "Urgent";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRecord>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchRecord {
    record_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    collection_id: Option<String>,
    #[serde(default)]
    geometry: Option<serde_json::Value>,
}

impl SearchRecord {
    fn into_product(self, collection: &str) -> Product {
        Product {
            name: self.title.unwrap_or_else(|| self.record_id.clone()),
            collection: self.collection_id.unwrap_or_else(|| collection.to_string()),
            footprint: self.geometry.map(|g| g.to_string()),
            id: self.record_id,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    destinations: Vec<serde_json::Value>,
    items: Vec<OrderRequestItem<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderRequestItem<'a> {
    collection_id: &'a str,
    record_id: &'a str,
    priority: &'a str,
    parameters: OrderParameters<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderParameters<'a> {
    packaging_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct OrderResponse {
    #[serde(default)]
    items: Vec<OrderResponseItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderResponseItem {
    #[serde(default)]
    item_id: Option<serde_json::Value>,
    #[serde(default)]
    order_id: Option<serde_json::Value>,
    record_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    destinations: Vec<Destination>,
}

#[derive(Deserialize, Debug)]
struct Destination {
    #[serde(default)]
    url: Option<String>,
}

/// Ids come back as numbers or strings depending on the endpoint.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl OrderResponseItem {
    fn state(&self) -> ItemState {
        match self.status.as_deref().unwrap_or_default() {
            "AVAILABLE_FOR_DOWNLOAD" => match self.destinations.iter().find_map(|d| d.url.clone()) {
                Some(location) => ItemState::Ready { location },
                None => ItemState::Pending,
            },
            status @ ("FAILED" | "CANCELLED" | "EXPIRED") => ItemState::Failed(
                self.status_message
                    .clone()
                    .unwrap_or_else(|| status.to_string()),
            ),
            _ => ItemState::Pending,
        }
    }
}

pub struct EodmsClient {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
}

impl EodmsClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: super::http_client(),
            credentials,
            base_url: RAPI_URL.to_string(),
        }
    }

    fn auth(&self) -> Auth {
        Auth::Basic {
            user: self.credentials.user.clone(),
            secret: self.credentials.secret.clone(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .basic_auth(&self.credentials.user, Some(&self.credentials.secret))
            .timeout(REQUEST_TIMEOUT)
    }
}

impl SearchClient for EodmsClient {
    fn name(&self) -> &'static str {
        "EODMS"
    }

    async fn search(&self, filter: &QueryFilter) -> Result<Vec<Product>, AcquisitionError> {
        let query = filter.to_eodms_query();
        let page_size = filter.page_size.to_string();
        tracing::debug!("EODMS query: {query}");
        let response: SearchResponse = self
            .get("search")
            .query(&[
                ("collection", filter.collection.as_str()),
                ("query", query.as_str()),
                ("maxResults", page_size.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(AcquisitionError::Search)?
            .json()
            .await
            .map_err(AcquisitionError::Search)?;

        Ok(response
            .results
            .into_iter()
            .map(|record| record.into_product(&filter.collection))
            .collect())
    }

    async fn order(&self, products: &[Product]) -> Result<OrderTicket, AcquisitionError> {
        if products.is_empty() {
            return Ok(OrderTicket::empty());
        }
        let request = OrderRequest {
            destinations: vec![],
            items: products
                .iter()
                .map(|p| OrderRequestItem {
                    collection_id: &p.collection,
                    record_id: &p.id,
                    priority: PRIORITY,
                    parameters: OrderParameters {
                        packaging_format: PACKAGING_FORMAT,
                    },
                })
                .collect(),
        };

        let response: OrderResponse = self
            .client
            .post(format!("{}/order", self.base_url))
            .basic_auth(&self.credentials.user, Some(&self.credentials.secret))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(AcquisitionError::Order)?
            .json()
            .await
            .map_err(AcquisitionError::Order)?;

        let order_ids: BTreeSet<String> = response
            .items
            .iter()
            .filter_map(|i| i.order_id.as_ref().map(id_string))
            .collect();
        let items = products
            .iter()
            .map(|product| {
                let submitted = response.items.iter().find(|i| i.record_id == product.id);
                OrderItem {
                    item_id: submitted.and_then(|i| i.item_id.as_ref().map(id_string)),
                    product: product.clone(),
                    state: match submitted {
                        Some(item) => item.state(),
                        None => ItemState::Failed("not accepted by the order".to_string()),
                    },
                }
            })
            .collect();

        Ok(OrderTicket::new(order_ids.into_iter().collect(), items))
    }

    async fn check(&self, ticket: &OrderTicket) -> Result<Vec<ItemUpdate>, AcquisitionError> {
        let mut updates = vec![];
        for order_id in &ticket.order_ids {
            let response: OrderResponse = self
                .get("order")
                .query(&[("orderId", order_id.as_str()), ("format", "json")])
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(AcquisitionError::Order)?
                .json()
                .await
                .map_err(AcquisitionError::Order)?;
            updates.extend(response.items.iter().map(|item| ItemUpdate {
                product_id: item.record_id.clone(),
                state: item.state(),
            }));
        }
        Ok(updates)
    }

    async fn fetch(
        &self,
        product: &Product,
        destination: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let url = product
            .download_url
            .as_deref()
            .ok_or_else(|| DownloadError::NoLocation(product.id.clone()))?;
        let output = product.archive_path(destination)?;
        download::fetch_to_file(&self.client, url, &self.auth(), &output).await
    }
}
