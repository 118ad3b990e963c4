use crate::errors::StoreError;
use crate::etag;
use crate::metrics_defs::REQUESTS;
use crate::store::{DiscoveryStore, ReadStatus};
use hyper::header::{
    ACCEPT, ALLOW, CONTENT_TYPE, ETAG, HeaderName, HeaderValue, IF_NONE_MATCH, VARY,
};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::counter;
use shared::http::{ResponseBody, empty_body, full_body};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const DEFAULT_DISCOVERY_PATH: &str = "/apis";

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

fn error_response(status: StatusCode, message: String) -> Response<ResponseBody> {
    let body = serde_json::to_vec(&ApiErrorResponse {
        error_message: message,
    })
    .unwrap_or_default();

    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn method_not_allowed() -> Response<ResponseBody> {
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "the discovery document is read-only".to_string(),
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
    response
}

/// Serves the merged discovery document held by a [`DiscoveryStore`].
pub struct DiscoveryService {
    store: Arc<DiscoveryStore>,
    path: String,
}

impl DiscoveryService {
    pub fn new(store: Arc<DiscoveryStore>, path: &str) -> Self {
        let path = path.trim_end_matches('/');
        DiscoveryService {
            store,
            path: if path.is_empty() { "/".into() } else { path.into() },
        }
    }

    pub fn handle<B>(&self, req: &Request<B>) -> Response<ResponseBody> {
        let path = req.uri().path();
        let response = if path == self.path || path.trim_end_matches('/') == self.path {
            match *req.method() {
                Method::GET | Method::HEAD => self.read(req),
                _ => method_not_allowed(),
            }
        } else if path.starts_with(&format!("{}/", self.path)) {
            // Individual groups are not addressable and nothing is writable
            method_not_allowed()
        } else {
            error_response(StatusCode::NOT_FOUND, format!("no such path: {path}"))
        };

        counter!(REQUESTS, "status" => response.status().as_u16().to_string()).increment(1);
        response
    }

    fn read<B>(&self, req: &Request<B>) -> Response<ResponseBody> {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let served = match self.store.read(header(ACCEPT), header(IF_NONE_MATCH)) {
            Ok(served) => served,
            Err(StoreError::Negotiation(err)) => {
                return error_response(StatusCode::NOT_ACCEPTABLE, err.to_string());
            }
            Err(err @ StoreError::Encode(_)) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
            }
        };

        let (status, body) = match served.status {
            ReadStatus::NotModified => (StatusCode::NOT_MODIFIED, empty_body()),
            ReadStatus::Ok if *req.method() == Method::HEAD => (StatusCode::OK, empty_body()),
            ReadStatus::Ok => (StatusCode::OK, full_body(served.body)),
        };

        let mut builder = Response::builder()
            .status(status)
            .header(ETAG, etag::quote(&served.etag))
            .header(VARY, "Accept");
        if status == StatusCode::OK {
            builder = builder.header(CONTENT_TYPE, served.content_type);
        }

        builder.body(body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build discovery response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    }
}

impl<B> Service<Request<B>> for DiscoveryService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let res = self.handle(&req);
        Box::pin(async move { Ok(res) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveryDocument, ResourceDiscovery, VersionRecord};
    use http_body_util::BodyExt;

    const JSON: &str = "application/json;g=apidiscovery.k8s.io;v=v2beta1;as=APIGroupDiscoveryList";

    fn service() -> (Arc<DiscoveryStore>, DiscoveryService) {
        let store = Arc::new(DiscoveryStore::new());
        store.upsert(
            "stable.example.com",
            VersionRecord::new("v1", vec![ResourceDiscovery::new("foos")]),
        );
        let service = DiscoveryService::new(store.clone(), DEFAULT_DISCOVERY_PATH);
        (store, service)
    }

    fn request(method: Method, path: &str, etag: Option<&str>) -> Request<()> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(ACCEPT, JSON);
        if let Some(etag) = etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        builder.body(()).unwrap()
    }

    async fn body_bytes(response: Response<ResponseBody>) -> bytes::Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_get_document() {
        let (store, service) = service();

        let response = service
            .call(request(Method::GET, "/apis", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], JSON);
        assert_eq!(response.headers()[VARY], "Accept");
        let etag = response.headers()[ETAG].to_str().unwrap().to_string();
        assert_eq!(etag, etag::quote(&store.etag().unwrap()));

        let doc: DiscoveryDocument = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(doc, store.document());
    }

    #[tokio::test]
    async fn test_conditional_get() {
        let (store, service) = service();
        let first = service.handle(&request(Method::GET, "/apis", None));
        let etag = first.headers()[ETAG].to_str().unwrap().to_string();

        let second = service.handle(&request(Method::GET, "/apis", Some(&etag)));
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers()[ETAG].to_str().unwrap(), etag);
        assert!(body_bytes(second).await.is_empty());

        // Content changes, the old tag no longer matches
        store.upsert("stable.example.com", VersionRecord::new("v2", vec![]));
        let third = service.handle(&request(Method::GET, "/apis", Some(&etag)));
        assert_eq!(third.status(), StatusCode::OK);
        assert_ne!(third.headers()[ETAG].to_str().unwrap(), etag);
        assert!(!body_bytes(third).await.is_empty());
    }

    #[tokio::test]
    async fn test_head_has_headers_only() {
        let (_store, service) = service();
        let response = service.handle(&request(Method::HEAD, "/apis/", None));

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ETAG));
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_not_acceptable() {
        let (_store, service) = service();
        let req = Request::builder()
            .uri("/apis")
            .header(ACCEPT, "application/json;g=apidiscovery.k8s.io;v=v2beta1;as=APIGroupList")
            .body(())
            .unwrap();

        let response = service.handle(&req);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(!response.headers().contains_key(ETAG));
    }

    #[tokio::test]
    async fn test_read_only() {
        let (_store, service) = service();

        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let response = service.handle(&request(method, "/apis", None));
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers()[ALLOW], "GET, HEAD");
        }

        // Groups are not individually addressable
        for method in [Method::GET, Method::PATCH] {
            let response = service.handle(&request(method, "/apis/stable.example.com", None));
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (_store, service) = service();
        let response = service.handle(&request(Method::GET, "/api", None));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error_message"], "no such path: /api");
    }
}
