use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use metadata_importer::Importer;
use shared::http::{make_boxed_error_response, make_json_response, make_text_response};
use std::convert::Infallible;
use std::pin::Pin;
use tag_reconciler::handler::EventHandler;

pub const IMPORT_PATH: &str = "/api/import";
const DEFAULT_IMPORT_NAME: &str = "upload";

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main listener: dataset uploads on [`IMPORT_PATH`], resource events on every other path.
#[derive(Clone)]
pub struct AutotagService {
    events: EventHandler,
    importer: Importer,
}

impl AutotagService {
    pub fn new(events: EventHandler, importer: Importer) -> Self {
        AutotagService { events, importer }
    }
}

impl<B> Service<Request<B>> for AutotagService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move {
            if req.method() != Method::POST {
                return Ok(make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED));
            }

            let is_import = req.uri().path() == IMPORT_PATH;
            let name = import_name(req.uri().query());

            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read request body");
                    return Ok(make_boxed_error_response(StatusCode::BAD_REQUEST));
                }
            };

            if is_import {
                Ok(service.import(&name, &body).await)
            } else {
                Ok(service.events.handle(&body).await.into_response())
            }
        })
    }
}

impl AutotagService {
    async fn import(&self, name: &str, body: &[u8]) -> Response<BoxBody<Bytes, Infallible>> {
        match self.importer.import_bytes(name, body).await {
            Ok(summary) => make_json_response(StatusCode::OK, &summary).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Could not serialize import summary");
                make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }),
            Err(e) => make_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

/// Value of the `name` query parameter, used to identify the upload in notifications
fn import_name(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "name")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_IMPORT_NAME.to_string())
}
