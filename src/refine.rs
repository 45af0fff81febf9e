use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::{
    catalog::Product,
    llm::{ask_json, ChatModel},
};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that filters product lists based on search queries.";

/// The fields of a product the model sees when refining. Descriptions and
/// links stay out of the prompt to bound its size.
#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct ProductSummary<'a> {
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brand: Option<&'a str>,
    #[serde(rename = "Color", skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
    #[serde(rename = "Size", skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(rename = "salePrice", skip_serializing_if = "Option::is_none")]
    sale_price: Option<f64>,
    #[serde(rename = "Gender", skip_serializing_if = "Option::is_none")]
    gender: Option<&'a str>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

impl<'a> From<&'a Product> for ProductSummary<'a> {
    fn from(p: &'a Product) -> Self {
        Self {
            id: p.identifier(),
            name: p.name.as_deref(),
            brand: p.brand.as_deref(),
            color: p.color.as_deref(),
            size: p.size.as_deref(),
            price: p.price,
            sale_price: p.sale_price,
            gender: p.gender.as_deref(),
            image_url: p.image_url.as_deref(),
        }
    }
}

/// One summary per product, in catalog order.
pub(crate) fn project(products: &[Product]) -> Vec<ProductSummary<'_>> {
    products.iter().map(ProductSummary::from).collect()
}

pub(crate) fn refinement_prompt(query: &str, projection: &[ProductSummary<'_>]) -> Result<String> {
    let products = serde_json::to_string_pretty(projection)?;
    Ok(format!(
        r#"
You are an AI assistant that filters a list of products based on a user's search query.

User query: "{query}"

Products JSON:
{products}

Return a JSON array containing only the products that exactly match the user's intent based on color, price, size, brand, and other criteria.

Return JSON only, no extra text.
"#
    ))
}

/// Asks the model which of `products` match `query`.
///
/// The model's order and membership are kept. Returned entries whose `id`
/// matches a catalog product get that product's remaining fields back.
pub(crate) async fn refine_products(
    model: &dyn ChatModel,
    query: &str,
    products: &[Product],
) -> Result<Vec<Product>> {
    if products.is_empty() {
        info!("catalog returned no products, skipping refinement");
        return Ok(Vec::new());
    }

    let prompt = refinement_prompt(query, &project(products))?;
    let mut refined: Vec<Product> = ask_json(model, SYSTEM_PROMPT, &prompt)
        .await
        .context("failed to refine products")?;

    let by_id: HashMap<&str, &Product> = products
        .iter()
        .filter_map(|p| p.identifier().map(|id| (id, p)))
        .collect();
    for product in &mut refined {
        let source = product.identifier().and_then(|id| by_id.get(id).copied());
        if let Some(source) = source {
            product.fill_from(source);
        }
    }

    info!(
        catalog = products.len(),
        refined = refined.len(),
        "refined products"
    );
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{
        catalog::testing::product,
        llm::{testing::ScriptedModel, Role},
    };

    const PROJECTED_KEYS: [&str; 9] = [
        "id", "name", "brand", "Color", "Size", "price", "salePrice", "Gender", "imageUrl",
    ];

    #[test]
    fn projection_keeps_one_bounded_entry_per_product() {
        let products: Vec<Product> = (0..7)
            .map(|i| product(&i.to_string(), &format!("Shoe {i}"), 50.0 + f64::from(i)))
            .collect();
        let projection = project(&products);
        assert_eq!(projection.len(), products.len());

        let json = serde_json::to_value(&projection).unwrap();
        for entry in json.as_array().unwrap() {
            for key in entry.as_object().unwrap().keys() {
                assert!(PROJECTED_KEYS.contains(&key.as_str()), "unexpected key {key}");
            }
            assert!(entry.get("shortDescription").is_none());
            assert!(entry.get("linkUrl").is_none());
        }
        assert_eq!(json[3]["id"], "3");
        assert_eq!(json[3]["Color"], "Red");
    }

    #[test]
    fn projection_uses_product_id_fallback() {
        let p: Product = serde_json::from_str(r#"{"productId": "p-9", "name": "Cap"}"#).unwrap();
        let json = serde_json::to_value(project(std::slice::from_ref(&p))).unwrap();
        assert_eq!(json[0]["id"], "p-9");
    }

    #[test]
    fn missing_id_is_sent_as_null() {
        let p = Product {
            name: Some("Cap".to_string()),
            ..Product::default()
        };
        let json = serde_json::to_value(project(std::slice::from_ref(&p))).unwrap();
        assert_eq!(json[0]["id"], Value::Null);
    }

    #[tokio::test]
    async fn prompt_carries_query_and_projection() {
        let products = vec![product("1", "Air Max", 120.0), product("2", "Pegasus", 95.0)];
        let model = ScriptedModel::new([r#"[{"id": "2", "name": "Pegasus", "price": 95}]"#]);

        refine_products(&model, "nike under 100", &products)
            .await
            .unwrap();

        let requests = model.requests.lock().unwrap();
        let messages = &requests[0];
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        let prompt = &messages[1].content;
        assert!(prompt.contains("User query: \"nike under 100\""));
        assert!(prompt.contains("\"name\": \"Air Max\""));
        assert!(prompt.contains("\"name\": \"Pegasus\""));
        assert!(!prompt.contains("shop.example"));
    }

    #[tokio::test]
    async fn refined_entries_regain_catalog_fields() {
        let products = vec![product("1", "Air Max", 120.0), product("2", "Pegasus", 95.0)];
        let model = ScriptedModel::new([
            r#"[{"id": "2", "name": "Pegasus", "price": 95}, {"name": "Invented", "price": 1}]"#,
        ]);

        let refined = refine_products(&model, "nike under 100", &products)
            .await
            .unwrap();
        assert_eq!(refined.len(), 2);
        assert_eq!(refined[0], products[1]);
        assert_eq!(refined[1].name.as_deref(), Some("Invented"));
        assert_eq!(refined[1].link_url, None);
    }

    #[tokio::test]
    async fn empty_array_is_a_valid_refinement() {
        let products = vec![product("1", "Air Max", 120.0)];
        let model = ScriptedModel::new(["[]"]);
        let refined = refine_products(&model, "blue hats", &products).await.unwrap();
        assert!(refined.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_skips_the_model() {
        let model = ScriptedModel::new(Vec::<String>::new());
        let refined = refine_products(&model, "anything", &[]).await.unwrap();
        assert!(refined.is_empty());
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let products = vec![product("1", "Air Max", 120.0)];
        let model = ScriptedModel::new(["The best match is the Air Max."]);
        let err = refine_products(&model, "nike", &products).await.unwrap_err();
        assert!(err.to_string().contains("failed to refine products"));
    }
}
