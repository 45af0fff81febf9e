use url::Url;

use crate::{catalog::Product, search::SearchOutcome};

const DEFAULT_CURRENCY: &str = "$";
const PLACEHOLDER: &str = "Results will appear here...";
const NO_RESULTS: &str = "No results found";
const BUSY: &str = "A search is already running. Try again in a moment.";

/// What the page shows below the search box.
#[derive(Debug, Clone, Copy)]
pub(crate) enum View<'a> {
    /// Nothing searched yet.
    Idle,
    /// Another search holds the loading flag.
    Busy,
    Outcome(&'a SearchOutcome),
}

/// Render the search page.
pub(crate) fn render_page(query: &str, view: View<'_>, loading: bool) -> String {
    let disabled = if loading || query.trim().is_empty() {
        " disabled"
    } else {
        ""
    };
    let label = if loading { "Searching..." } else { "Search" };

    let results = match view {
        View::Idle => format!("<pre>{PLACEHOLDER}</pre>"),
        View::Busy => format!("<pre>{BUSY}</pre>"),
        View::Outcome(SearchOutcome::Failed { message }) => {
            format!("<pre>{}</pre>", html_escape(message))
        }
        View::Outcome(SearchOutcome::Products { products }) if products.is_empty() => {
            format!(r#"<div class="empty">{NO_RESULTS}</div>"#)
        }
        View::Outcome(SearchOutcome::Products { products }) => {
            products.iter().fold(String::new(), |mut cards, product| {
                cards.push_str(&render_card(product));
                cards
            })
        }
    };

    let content = format!(
        r#"<h1>Smart Product Search</h1>
<form method="get" action="/search">
<input type="text" name="q" value="{query}" placeholder="e.g., nike shoe with red color under 300 dollars" oninput="this.form.querySelector('button').disabled = !this.value.trim()">
<button type="submit"{disabled}>{label}</button>
</form>
<div class="results">
{results}
</div>"#,
        query = html_escape(query),
    );

    build_page(&content)
}

fn render_card(item: &Product) -> String {
    let currency = html_escape(item.price_currency.as_deref().unwrap_or(DEFAULT_CURRENCY));
    let name = html_escape(item.name.as_deref().unwrap_or_default());

    let mut card = format!(
        r#"<div class="card"><div class="name">{name}</div>
<div class="brand">{brand} - {catalog}</div>
<div class="price">Price: {currency} {price}</div>"#,
        brand = html_escape(item.brand.as_deref().unwrap_or_default()),
        catalog = html_escape(item.catalog_name.as_deref().unwrap_or_default()),
        price = item.price.map(|p| p.to_string()).unwrap_or_default(),
    );

    if let Some(sale) = item.sale_price.filter(|s| *s > 0.0) {
        card.push_str(&format!(
            r#"<div class="sale">Sale Price: {currency} {sale}</div>"#
        ));
    }

    card.push_str(&format!(
        r#"<div class="attrs">Color: {color}, Size: {size}, Gender: {gender}</div>
<div class="description">{description}</div>"#,
        color = html_escape(item.color.as_deref().unwrap_or("-")),
        size = html_escape(item.size.as_deref().unwrap_or("-")),
        gender = html_escape(item.gender.as_deref().unwrap_or("-")),
        description = html_escape(item.short_description.as_deref().unwrap_or_default()),
    ));

    if let Some(image) = item.image_url.as_deref().and_then(web_url) {
        card.push_str(&format!(
            r#"<img src="{}" alt="{name}">"#,
            html_escape(image)
        ));
    }
    if let Some(link) = item.link_url.as_deref().and_then(web_url) {
        card.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">View Product</a>"#,
            html_escape(link),
        ));
    }

    card.push_str("</div>\n");
    card
}

/// `raw` if it is an absolute http(s) URL. Anything else, such as a
/// `javascript:` or `data:` URL, is not rendered.
fn web_url(raw: &str) -> Option<&str> {
    let parsed = Url::parse(raw.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(raw)
}

fn build_page(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Smart Product Search</title>
<style>
body{{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;padding:20px;max-width:1200px;margin:0 auto;}}
h1{{font-size:24px;font-weight:bold;margin-bottom:16px;}}
input[type=text]{{width:100%;padding:10px;border-radius:4px;border:1px solid #ccc;margin-bottom:10px;font-size:16px;box-sizing:border-box;}}
button{{background:#2563EB;color:#fff;padding:10px 20px;border-radius:4px;border:none;cursor:pointer;margin-bottom:20px;font-size:16px;}}
button:disabled{{cursor:not-allowed;opacity:0.6;}}
.results{{display:flex;flex-wrap:wrap;gap:16px;justify-content:center;}}
.card{{border:1px solid #ddd;border-radius:8px;padding:10px;width:100%;max-width:320px;box-sizing:border-box;box-shadow:0 2px 4px rgba(0,0,0,0.1);display:flex;flex-direction:column;align-items:center;}}
.card .name{{font-weight:bold;font-size:16px;margin-bottom:4px;text-align:center;}}
.card .brand{{font-size:12px;color:#666;text-align:center;}}
.card .price{{font-size:14px;margin-top:4px;}}
.card .sale{{font-size:14px;color:green;}}
.card .attrs,.card .description{{font-size:12px;margin-top:4px;text-align:center;}}
.card img{{width:100%;max-width:150px;height:150px;object-fit:contain;margin:10px 0;}}
.card a{{color:#2563EB;text-decoration:underline;font-size:14px;text-align:center;}}
pre{{background:#f5f5f5;padding:10px;border-radius:4px;width:100%;overflow-x:auto;}}
</style>
</head>
<body>
{content}
</body>
</html>"#
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
