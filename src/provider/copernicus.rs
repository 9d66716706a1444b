//! Copernicus Data Space Ecosystem OData catalogue, serving Sentinel products.
use super::{
    Checksum, ItemState, ItemUpdate, OrderItem, OrderTicket, Product, SearchClient,
    REQUEST_TIMEOUT,
};
use crate::config::Credentials;
use crate::download::{self, Auth};
use crate::error::{AcquisitionError, DownloadError};
use crate::query::QueryFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ODATA_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1";
const TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
const CLIENT_ID: &str = "cdse-public";

#[derive(Deserialize, Debug)]
struct ProductList {
    #[serde(default)]
    value: Vec<ODataProduct>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ODataProduct {
    id: String,
    name: String,
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    modification_date: Option<String>,
    #[serde(default = "assume_online")]
    online: bool,
    #[serde(default)]
    checksum: Vec<ODataChecksum>,
    #[serde(default)]
    content_date: Option<ContentDate>,
    #[serde(default)]
    footprint: Option<String>,
}

fn assume_online() -> bool {
    true
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ODataChecksum {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    algorithm: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ContentDate {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

impl ODataProduct {
    fn into_product(self, base_url: &str, collection: &str) -> Product {
        let (acquisition_start, acquisition_end) = match self.content_date {
            Some(ContentDate { start, end }) => (start, end),
            None => (None, None),
        };
        Product {
            download_url: Some(format!("{base_url}/Products({})/$value", self.id)),
            id: self.id,
            name: self.name,
            collection: collection.to_string(),
            content_length: self.content_length,
            acquisition_start,
            acquisition_end,
            publication_date: self.publication_date,
            modification_date: self.modification_date,
            online: self.online,
            checksums: self
                .checksum
                .into_iter()
                .filter_map(|c| {
                    Some(Checksum {
                        algorithm: c.algorithm?,
                        value: c.value?,
                    })
                })
                .collect(),
            footprint: self.footprint,
        }
    }
}

fn readiness(product: &Product) -> ItemState {
    match (&product.download_url, product.online) {
        (Some(location), true) => ItemState::Ready {
            location: location.clone(),
        },
        _ => ItemState::Pending,
    }
}

pub struct CopernicusClient {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
    token_url: String,
    token: Option<String>,
}

impl CopernicusClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: super::http_client(),
            credentials,
            base_url: ODATA_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            token: None,
        }
    }

    /// Exchanges the user's credentials for a Keycloak access token.
    async fn request_token(&self) -> Result<String, AcquisitionError> {
        let form = [
            ("client_id", CLIENT_ID),
            ("username", self.credentials.user.as_str()),
            ("password", self.credentials.secret.as_str()),
            ("grant_type", "password"),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .timeout(REQUEST_TIMEOUT)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AcquisitionError::Authentication(e.to_string()))?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            AcquisitionError::Authentication(format!("Error parsing Keycloak response: {e}"))
        })?;
        Ok(token.access_token)
    }
}

impl SearchClient for CopernicusClient {
    fn name(&self) -> &'static str {
        "Copernicus Data Space"
    }

    async fn search(&self, filter: &QueryFilter) -> Result<Vec<Product>, AcquisitionError> {
        let odata = filter.to_odata();
        tracing::debug!("OData filter: {odata}");
        let list: ProductList = self
            .client
            .get(format!("{}/Products", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .query(&[("$filter", odata), ("$top", filter.page_size.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(AcquisitionError::Search)?
            .json()
            .await
            .map_err(AcquisitionError::Search)?;

        Ok(list
            .value
            .into_iter()
            .map(|p| p.into_product(&self.base_url, &filter.collection))
            .collect())
    }

    /// Products are served straight from the catalogue, so the order only exists locally.
    async fn order(&self, products: &[Product]) -> Result<OrderTicket, AcquisitionError> {
        let items = products
            .iter()
            .map(|product| OrderItem {
                item_id: None,
                product: product.clone(),
                state: readiness(product),
            })
            .collect();
        Ok(OrderTicket::new(vec![], items))
    }

    /// Re-reads the `Online` flag of every product still pending.
    async fn check(&self, ticket: &OrderTicket) -> Result<Vec<ItemUpdate>, AcquisitionError> {
        let mut updates = vec![];
        for item in ticket.items.iter().filter(|i| i.state == ItemState::Pending) {
            let refreshed: ODataProduct = self
                .client
                .get(format!("{}/Products({})", self.base_url, item.product.id))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(AcquisitionError::Search)?
                .json()
                .await
                .map_err(AcquisitionError::Search)?;
            let product = refreshed.into_product(&self.base_url, &item.product.collection);
            updates.push(ItemUpdate {
                product_id: item.product.id.clone(),
                state: readiness(&product),
            });
        }
        Ok(updates)
    }

    async fn authenticate(&mut self) -> Result<(), AcquisitionError> {
        if self.token.is_none() {
            self.token = Some(self.request_token().await?);
        }
        Ok(())
    }

    async fn fetch(
        &self,
        product: &Product,
        destination: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let token = self.token.clone().ok_or(DownloadError::Unauthenticated)?;
        let url = product
            .download_url
            .as_deref()
            .ok_or_else(|| DownloadError::NoLocation(product.id.clone()))?;
        let output = product.archive_path(destination)?;
        download::fetch_to_file(&self.client, url, &Auth::Bearer(token), &output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: &str = r#"{
        "@odata.context": "$metadata#Products",
        "value": [
            {
                "@odata.mediaContentType": "application/octet-stream",
                "Id": "a1b2c3d4-0000-4000-8000-000000000001",
                "Name": "S1A_IW_GRDH_1SDV_20230101T055007_20230101T055032_046574_059502_1A2B.SAFE",
                "ContentType": "application/octet-stream",
                "ContentLength": 1702543901,
                "OriginDate": "2023-01-01T06:40:11.000Z",
                "PublicationDate": "2023-01-01T06:50:09.118Z",
                "ModificationDate": "2023-01-01T06:51:01.802Z",
                "Online": true,
                "EvictionDate": "",
                "S3Path": "/eodata/Sentinel-1/SAR/GRD/2023/01/01/S1A_IW_GRDH_1SDV.SAFE",
                "Checksum": [
                    {"Value": "5bd4e6e48c2bd4e1e1cd6e73ff6e1c8b", "Algorithm": "MD5", "ChecksumDate": "2023-01-01T06:50:59.000Z"},
                    {}
                ],
                "ContentDate": {"Start": "2023-01-01T05:50:07.000Z", "End": "2023-01-01T05:50:32.000Z"},
                "Footprint": "geography'SRID=4326;POLYGON((0 0,0 1,1 1,0 0))'",
                "GeoFootprint": {"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [0, 0]]]}
            },
            {
                "Id": "a1b2c3d4-0000-4000-8000-000000000002",
                "Name": "S1A_IW_GRDH_1SDV_20230101T055032_20230101T055057_046574_059502_3C4D.SAFE",
                "Online": false
            }
        ]
    }"#;

    fn products() -> Vec<Product> {
        let list: ProductList = serde_json::from_str(PRODUCTS).unwrap();
        list.value
            .into_iter()
            .map(|p| p.into_product(ODATA_URL, "SENTINEL-1"))
            .collect()
    }

    fn client() -> CopernicusClient {
        CopernicusClient::new(Credentials {
            user: "someone".to_string(),
            secret: "hunter2".to_string(),
        })
    }

    #[test]
    fn test_parse_products() {
        let products = products();
        assert_eq!(products.len(), 2);

        let first = &products[0];
        assert_eq!(first.content_length, Some(1702543901));
        assert_eq!(
            first.acquisition_start.as_deref(),
            Some("2023-01-01T05:50:07.000Z")
        );
        assert_eq!(
            first.checksums,
            vec![Checksum {
                algorithm: "MD5".to_string(),
                value: "5bd4e6e48c2bd4e1e1cd6e73ff6e1c8b".to_string()
            }]
        );
        assert_eq!(
            first.download_url.as_deref(),
            Some("https://catalogue.dataspace.copernicus.eu/odata/v1/Products(a1b2c3d4-0000-4000-8000-000000000001)/$value")
        );
        assert_eq!(first.archive_name(), format!("{}.zip", first.name));
        assert!(!products[1].online);
    }

    #[tokio::test]
    async fn test_order_marks_online_products_ready() {
        let ticket = client().order(&products()).await.unwrap();
        assert!(ticket.order_ids.is_empty());
        assert_eq!(ticket.ready_products().len(), 1);
        assert_eq!(ticket.pending(), 1);
    }

    #[tokio::test]
    async fn test_fetch_requires_token() {
        let product = products().remove(0);
        let result = client().fetch(&product, Path::new("/tmp")).await;
        assert!(matches!(result, Err(DownloadError::Unauthenticated)));
    }

    #[test]
    fn test_parse_token_response() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token": "eyJhbGciOi", "expires_in": 600, "token_type": "Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "eyJhbGciOi");
    }

    #[tokio::test]
    async fn test_token_failure_is_authentication_error() {
        let mut client = client();
        client.token_url = "http://127.0.0.1:9/token".to_string();
        assert!(matches!(
            client.authenticate().await,
            Err(AcquisitionError::Authentication(_))
        ));
        assert!(client.token.is_none());
    }
}
