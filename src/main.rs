mod catalog;
mod filter;
mod lenient;
mod llm;
mod refine;
mod render;
mod search;
mod settings;
mod web;

use std::{process::exit, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    catalog::CatalogClient,
    llm::ChatClient,
    search::Searcher,
    settings::{Args, Settings},
    web::Tls,
};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(error) = run(Args::parse()).await {
        error!("{error:?}");
        exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings =
        Settings::load(args.config.as_deref()).context("Problem while loading settings")?;
    info!(
        model = %settings.llm.model,
        llm = %settings.llm.url,
        catalog = %settings.catalog.url,
        "Smart Product Search"
    );

    let model = ChatClient::new(&settings.llm).context("Problem while building LLM client")?;
    let catalog =
        CatalogClient::new(&settings.catalog).context("Problem while building catalog client")?;
    let searcher = Arc::new(Searcher::new(Arc::new(model), Arc::new(catalog)));

    let tls = match (args.cert, args.key) {
        (Some(cert), Some(key)) => Some(Tls { cert, key }),
        _ => None,
    };
    web::serve(searcher, settings.web.address, tls).await;
    Ok(())
}
