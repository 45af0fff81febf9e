use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;

use crate::{
    lenient,
    llm::{ask_json, ChatModel},
};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 50;
const PRICE_COLUMN: &str = "price";

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that extracts API filters from user queries.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub(crate) enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Catalog search filters extracted from a free-text query.
///
/// Only the keys the catalog understands are kept. Values the model returns
/// as null, empty, or of an unusable type are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub(crate) struct FilterSet {
    #[serde(default, deserialize_with = "lenient::string")]
    #[schemars(with = "Option<String>")]
    pub(crate) name: Option<String>,
    #[serde(rename = "Color", default, deserialize_with = "lenient::string")]
    #[schemars(with = "Option<String>")]
    pub(crate) color: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    #[schemars(with = "Option<f64>")]
    pub(crate) min_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    #[schemars(with = "Option<f64>")]
    pub(crate) max_price: Option<f64>,
    #[serde(rename = "Size", default, deserialize_with = "lenient::string")]
    #[schemars(with = "Option<String>")]
    pub(crate) size: Option<String>,
    #[serde(rename = "isOnSale", default, deserialize_with = "lenient::boolean")]
    #[schemars(with = "Option<bool>")]
    pub(crate) is_on_sale: Option<bool>,
    #[serde(default, deserialize_with = "lenient::string")]
    #[schemars(with = "Option<String>")]
    pub(crate) condition: Option<String>,
    #[serde(rename = "sortColumn", default, deserialize_with = "lenient::string")]
    #[schemars(with = "Option<String>")]
    pub(crate) sort_column: Option<String>,
    #[serde(rename = "sortOrder", default, deserialize_with = "lenient_sort_order")]
    #[schemars(with = "Option<SortOrder>")]
    pub(crate) sort_order: Option<SortOrder>,
    #[serde(default, deserialize_with = "lenient::count")]
    #[schemars(with = "Option<u32>")]
    pub(crate) page: Option<u32>,
    #[serde(rename = "pageSize", default, deserialize_with = "lenient::count")]
    #[schemars(with = "Option<u32>")]
    pub(crate) page_size: Option<u32>,
}

impl FilterSet {
    /// Fills in paging defaults and the price-ceiling sort.
    pub(crate) fn normalized(mut self) -> Self {
        if self.page.unwrap_or(0) == 0 {
            self.page = Some(DEFAULT_PAGE);
        }
        if self.page_size.unwrap_or(0) == 0 {
            self.page_size = Some(DEFAULT_PAGE_SIZE);
        }
        if self.max_price.is_some() && self.sort_column.is_none() {
            self.sort_column = Some(PRICE_COLUMN.to_string());
            self.sort_order.get_or_insert(SortOrder::Asc);
        }
        self
    }

    /// Catalog query parameters in a fixed key order, every value stringified.
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key, value));
            }
        };
        push("name", self.name.clone());
        push("Color", self.color.clone());
        push("min_price", self.min_price.map(|v| v.to_string()));
        push("max_price", self.max_price.map(|v| v.to_string()));
        push("Size", self.size.clone());
        push("isOnSale", self.is_on_sale.map(|v| v.to_string()));
        push("condition", self.condition.clone());
        push("sortColumn", self.sort_column.clone());
        push(
            "sortOrder",
            self.sort_order.map(|v| v.as_str().to_string()),
        );
        push("page", self.page.map(|v| v.to_string()));
        push("pageSize", self.page_size.map(|v| v.to_string()));
        pairs
    }
}

pub(crate) fn extraction_prompt(query: &str) -> String {
    format!(
        r#"You are an AI assistant that extracts structured search filters from e-commerce queries.

Output a valid JSON object using only these allowed fields:
- name
- Color
- min_price
- max_price
- Size
- isOnSale
- condition
- sortColumn
- sortOrder
- page
- pageSize

Rules:
- Include descriptive product keywords (brand, type, color, gender) in the 'name' field as a single string, excluding common stop words like "of", "for", "the", etc.
- The 'Color' should also be present in 'name' and returned separately.
- Convert price values to numbers (not strings).
- Always return 'page' and 'pageSize'. Default to page: {DEFAULT_PAGE}, pageSize: {DEFAULT_PAGE_SIZE} if not specified.
- If a price condition like "under 50 dollars" is mentioned, set 'max_price': 50.
- Set 'sortColumn': "price" and 'sortOrder': "ASC" for "under"/"below"/"cheaper than" conditions.
- Do not include any fields with null or missing values.
- Return JSON only. No comments or extra formatting.

User query: "{query}"
"#
    )
}

/// Asks the model to turn `query` into catalog filters.
pub(crate) async fn extract_filters(model: &dyn ChatModel, query: &str) -> Result<FilterSet> {
    let filters = ask_json::<FilterSet>(model, SYSTEM_PROMPT, &extraction_prompt(query))
        .await
        .context("failed to extract filters")?
        .normalized();
    info!(?filters, "extracted filters");
    Ok(filters)
}

fn lenient_sort_order<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SortOrder>, D::Error> {
    Ok(match lenient::value(deserializer)? {
        None => None,
        Some(Value::String(s)) => match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(SortOrder::Asc),
            "DESC" => Some(SortOrder::Desc),
            _ => lenient::ignored("sort order", &Value::String(s)),
        },
        Some(other) => lenient::ignored("sort order", &other),
    })
}
