use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{filter::FilterSet, lenient, settings::CatalogSettings, APP_USER_AGENT};

const API_KEY_HEADER: &str = "apiKey";

/// A catalog product. The upstream schema is only partially known, so every
/// field is optional and unknown fields are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub(crate) struct Product {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub(crate) id: Option<String>,
    #[serde(
        rename = "productId",
        default,
        deserialize_with = "lenient::string",
        skip_serializing
    )]
    #[schemars(skip)]
    pub(crate) product_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub(crate) name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub(crate) brand: Option<String>,
    #[serde(
        rename = "Color",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) color: Option<String>,
    #[serde(
        rename = "Size",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) size: Option<String>,
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<f64>")]
    pub(crate) price: Option<f64>,
    #[serde(
        rename = "salePrice",
        default,
        deserialize_with = "lenient::number",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<f64>")]
    pub(crate) sale_price: Option<f64>,
    #[serde(
        rename = "Gender",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) gender: Option<String>,
    #[serde(
        rename = "imageUrl",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) image_url: Option<String>,
    #[serde(
        rename = "catalogName",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) catalog_name: Option<String>,
    #[serde(
        rename = "shortDescription",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) short_description: Option<String>,
    #[serde(
        rename = "linkUrl",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) link_url: Option<String>,
    #[serde(
        rename = "priceCurrency",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub(crate) price_currency: Option<String>,
}

impl Product {
    /// `id`, falling back to `productId`.
    pub(crate) fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.product_id.as_deref())
    }

    /// Takes every field missing here from `other`.
    pub(crate) fn fill_from(&mut self, other: &Product) {
        fn fill<T: Clone>(slot: &mut Option<T>, source: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(source);
            }
        }
        fill(&mut self.id, &other.id);
        fill(&mut self.product_id, &other.product_id);
        fill(&mut self.name, &other.name);
        fill(&mut self.brand, &other.brand);
        fill(&mut self.color, &other.color);
        fill(&mut self.size, &other.size);
        fill(&mut self.price, &other.price);
        fill(&mut self.sale_price, &other.sale_price);
        fill(&mut self.gender, &other.gender);
        fill(&mut self.image_url, &other.image_url);
        fill(&mut self.catalog_name, &other.catalog_name);
        fill(&mut self.short_description, &other.short_description);
        fill(&mut self.link_url, &other.link_url);
        fill(&mut self.price_currency, &other.price_currency);
    }
}

/// A product source queried with extracted filters.
#[async_trait]
pub(crate) trait Catalog: Send + Sync {
    async fn products(&self, filters: &FilterSet) -> Result<Vec<Product>>;
}

pub(crate) struct CatalogClient {
    http: Client,
    url: String,
    api_key: String,
}

impl CatalogClient {
    pub(crate) fn new(settings: &CatalogSettings) -> Result<Self> {
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            http,
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn products(&self, filters: &FilterSet) -> Result<Vec<Product>> {
        let params = filters.query_pairs();
        debug!(?params, "catalog request");

        let response = self
            .http
            .get(&self.url)
            .query(&params)
            .header(ACCEPT, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("catalog request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("catalog error ({status}): {error_text}"));
        }

        let mut products: Vec<Product> = response
            .json()
            .await
            .context("catalog response is not a product list")?;
        for product in &mut products {
            if product.id.is_none() {
                product.id.clone_from(&product.product_id);
            }
        }
        info!(count = products.len(), "fetched catalog products");
        Ok(products)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Serves a fixed product list and records the filters it was asked for.
    pub(crate) struct StaticCatalog {
        products: Option<Vec<Product>>,
        pub(crate) requests: Mutex<Vec<FilterSet>>,
    }

    impl StaticCatalog {
        pub(crate) fn new(products: Vec<Product>) -> Self {
            Self {
                products: Some(products),
                requests: Mutex::default(),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                products: None,
                requests: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl Catalog for StaticCatalog {
        async fn products(&self, filters: &FilterSet) -> Result<Vec<Product>> {
            self.requests.lock().unwrap().push(filters.clone());
            self.products
                .clone()
                .ok_or_else(|| anyhow!("catalog unavailable"))
        }
    }

    pub(crate) fn product(id: &str, name: &str, price: f64) -> Product {
        Product {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            brand: Some("Nike".to_string()),
            color: Some("Red".to_string()),
            size: Some("10".to_string()),
            price: Some(price),
            gender: Some("Men".to_string()),
            image_url: Some(format!("https://img.example/{id}.jpg")),
            catalog_name: Some("Sports Outlet".to_string()),
            short_description: Some(format!("{name} description")),
            link_url: Some(format!("https://shop.example/{id}")),
            price_currency: Some("USD".to_string()),
            ..Product::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use serde_json::{json, Value};
    use warp::{http::StatusCode, Filter};

    use super::*;
    use crate::filter::SortOrder;

    #[derive(Debug)]
    struct Seen {
        params: HashMap<String, String>,
        api_key: String,
        accept: String,
    }

    fn spawn_catalog(status: StatusCode, body: Value) -> (SocketAddr, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let route = warp::get()
            .and(warp::path!("v3" / "products" / "full"))
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::header::<String>("apikey"))
            .and(warp::header::<String>("accept"))
            .map(
                move |params: HashMap<String, String>, api_key: String, accept: String| {
                    sink.lock().unwrap().push(Seen {
                        params,
                        api_key,
                        accept,
                    });
                    warp::reply::with_status(warp::reply::json(&body), status)
                },
            );
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, seen)
    }

    fn client_for(addr: SocketAddr) -> CatalogClient {
        CatalogClient::new(&CatalogSettings {
            url: format!("http://{addr}/v3/products/full"),
            api_key: "catalog-secret".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn filters_round_trip_through_query_string() {
        let (addr, seen) = spawn_catalog(StatusCode::OK, json!([]));
        let filters = FilterSet {
            name: Some("nike shoe red & white".to_string()),
            color: Some("red".to_string()),
            max_price: Some(300.0),
            is_on_sale: Some(true),
            sort_column: Some("price".to_string()),
            sort_order: Some(SortOrder::Asc),
            page: Some(1),
            page_size: Some(50),
            ..FilterSet::default()
        };

        let products = client_for(addr).products(&filters).await.unwrap();
        assert!(products.is_empty());

        let seen = seen.lock().unwrap();
        let expected: HashMap<String, String> = filters
            .query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(seen[0].params, expected);
        assert_eq!(seen[0].params["max_price"], "300");
        assert_eq!(seen[0].params["isOnSale"], "true");
        assert_eq!(seen[0].api_key, "catalog-secret");
        assert_eq!(seen[0].accept, "application/json");
    }

    #[tokio::test]
    async fn partial_records_are_tolerated() {
        let (addr, _) = spawn_catalog(
            StatusCode::OK,
            json!([
                {
                    "productId": 981,
                    "name": "Air Zoom",
                    "brand": "Nike",
                    "price": "129.99",
                    "salePrice": 99.5,
                    "Size": 10,
                    "advertiserId": 42,
                    "linkUrl": "https://shop.example/981"
                },
                {"name": "Mystery item", "price": null, "imageUrl": {"bad": true}}
            ]),
        );

        let products = client_for(addr)
            .products(&FilterSet::default().normalized())
            .await
            .unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].identifier(), Some("981"));
        assert_eq!(products[0].id.as_deref(), Some("981"));
        assert_eq!(products[0].price, Some(129.99));
        assert_eq!(products[0].sale_price, Some(99.5));
        assert_eq!(products[0].size.as_deref(), Some("10"));
        assert_eq!(products[1].identifier(), None);
        assert_eq!(products[1].price, None);
        assert_eq!(products[1].image_url, None);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let (addr, _) = spawn_catalog(StatusCode::FORBIDDEN, json!({"message": "bad key"}));
        let err = client_for(addr)
            .products(&FilterSet::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn non_list_body_is_an_error() {
        let (addr, _) = spawn_catalog(StatusCode::OK, json!({"results": []}));
        assert!(client_for(addr)
            .products(&FilterSet::default())
            .await
            .is_err());
    }

    #[test]
    fn id_prefers_id_over_product_id() {
        let product: Product =
            serde_json::from_str(r#"{"id": "a-1", "productId": "p-1"}"#).unwrap();
        assert_eq!(product.identifier(), Some("a-1"));
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json, json!({"id": "a-1"}));
    }

    #[test]
    fn fill_from_keeps_existing_fields() {
        let mut refined = Product {
            id: Some("7".to_string()),
            price: Some(10.0),
            ..Product::default()
        };
        let full = testing::product("7", "Runner", 12.0);
        refined.fill_from(&full);
        assert_eq!(refined.price, Some(10.0));
        assert_eq!(refined.name.as_deref(), Some("Runner"));
        assert_eq!(refined.link_url, full.link_url);
    }
}
