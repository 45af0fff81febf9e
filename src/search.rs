use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::{
    catalog::{Catalog, Product},
    filter::extract_filters,
    llm::ChatModel,
    refine::refine_products,
};

/// Shown in place of results whenever any stage fails.
pub(crate) const SEARCH_ERROR: &str = "Error fetching results. Check server logs for details.";

/// The result of one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub(crate) enum SearchOutcome {
    #[serde(rename = "ok")]
    Products { products: Vec<Product> },
    #[serde(rename = "error")]
    Failed { message: String },
}

/// Runs the extract, fetch, and refine pipeline.
pub(crate) struct Searcher {
    model: Arc<dyn ChatModel>,
    catalog: Arc<dyn Catalog>,
    loading: AtomicBool,
}

/// Clears the loading flag when dropped.
pub(crate) struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Searcher {
    pub(crate) fn new(model: Arc<dyn ChatModel>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            model,
            catalog,
            loading: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Runs one search. Returns `None` if another search is in flight.
    ///
    /// Every failure is logged and reported as [`SEARCH_ERROR`]; no partial
    /// results are returned.
    #[instrument(skip(self))]
    pub(crate) async fn search(&self, query: &str) -> Option<SearchOutcome> {
        let _guard = LoadingGuard::acquire(&self.loading)?;

        let outcome = match self.run(query).await {
            Ok(products) => {
                info!(count = products.len(), "search finished");
                SearchOutcome::Products { products }
            }
            Err(e) => {
                error!("search failed: {e:?}");
                SearchOutcome::Failed {
                    message: SEARCH_ERROR.to_string(),
                }
            }
        };
        Some(outcome)
    }

    /// Holds the loading flag as a running search would.
    #[cfg(test)]
    pub(crate) fn hold_loading(&self) -> Option<LoadingGuard<'_>> {
        LoadingGuard::acquire(&self.loading)
    }

    async fn run(&self, query: &str) -> Result<Vec<Product>> {
        let filters = extract_filters(self.model.as_ref(), query).await?;
        let products = self.catalog.products(&filters).await?;
        refine_products(self.model.as_ref(), query, &products).await
    }
}
