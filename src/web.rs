use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::info;
use warp::{
    http::StatusCode,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

use crate::{
    render::{render_page, View},
    search::{SearchOutcome, Searcher},
};

const BLANK_QUERY: &str = "query must not be empty";
const BUSY: &str = "a search is already running";
const MAX_BODY_BYTES: u64 = 4 * 1024;

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct Status {
    loading: bool,
}

pub(crate) struct Tls {
    pub(crate) cert: PathBuf,
    pub(crate) key: PathBuf,
}

pub(crate) async fn serve(searcher: Arc<Searcher>, addr: SocketAddr, tls: Option<Tls>) {
    let routes = routes(searcher);
    match tls {
        Some(Tls { cert, key }) => {
            info!(%addr, "serving over https");
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        None => {
            info!(%addr, "serving over http");
            warp::serve(routes).run(addr).await;
        }
    }
}

pub(crate) fn routes(
    searcher: Arc<Searcher>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_searcher = warp::any().map(move || searcher.clone());

    let index = warp::get()
        .and(warp::path::end())
        .and(with_searcher.clone())
        .map(|searcher: Arc<Searcher>| {
            reply::html(render_page("", View::Idle, searcher.is_loading()))
        });

    let search_page = warp::get()
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::query::<SearchParams>())
        .and(with_searcher.clone())
        .then(handle_search_page);

    let api_search = warp::post()
        .and(warp::path!("api" / "search"))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_searcher.clone())
        .then(handle_api_search);

    let status = warp::get()
        .and(warp::path!("api" / "status"))
        .and(with_searcher)
        .map(|searcher: Arc<Searcher>| {
            reply::json(&Status {
                loading: searcher.is_loading(),
            })
        });

    index
        .or(search_page)
        .or(api_search)
        .or(status)
        .with(warp::trace::request())
}

async fn handle_search_page(
    params: SearchParams,
    searcher: Arc<Searcher>,
) -> reply::Html<String> {
    let query = params.q.trim();
    if query.is_empty() {
        return reply::html(render_page("", View::Idle, searcher.is_loading()));
    }

    let page = match searcher.search(query).await {
        Some(outcome) => render_page(query, View::Outcome(&outcome), searcher.is_loading()),
        None => render_page(query, View::Busy, true),
    };
    reply::html(page)
}

async fn handle_api_search(request: SearchRequest, searcher: Arc<Searcher>) -> Response {
    let query = request.query.trim();
    if query.is_empty() {
        return failure(BLANK_QUERY, StatusCode::BAD_REQUEST);
    }

    match searcher.search(query).await {
        Some(outcome) => reply::json(&outcome).into_response(),
        None => failure(BUSY, StatusCode::CONFLICT),
    }
}

fn failure(message: &str, status: StatusCode) -> Response {
    let body = SearchOutcome::Failed {
        message: message.to_string(),
    };
    reply::with_status(reply::json(&body), status).into_response()
}
