// src/interception/http_adapter.rs
//! hyper <-> flow conversion
//!
//! Lets a hyper-based transport drive the pipeline: incoming requests become
//! `FlowRequest`s, upstream responses become `FlowResponse`s, and engine
//! answers become `Response<Full<Bytes>>`.

use crate::interception::flow::{FlowRequest, FlowResponse, InterceptResponse};
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST, LOCATION};
use hyper::{Request, Response, StatusCode};
use tracing::debug;

/// Build a flow request from a proxied hyper request.
///
/// Absolute-form URIs carry their own scheme and host; origin-form requests
/// fall back to the `Host` header and plain http.
pub fn flow_request_from_hyper<B>(req: &Request<B>, client_id: &str) -> Result<FlowRequest> {
    let uri = req.uri();
    let headers = req.headers();

    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| EngineError::InterceptionFailed(format!("No host for request {}", uri)))?;

    let host = uri
        .host()
        .map(str::to_string)
        .unwrap_or_else(|| authority.split(':').next().unwrap_or(&authority).to_string())
        .to_ascii_lowercase();

    let scheme = uri.scheme_str().unwrap_or("http").to_string();
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    debug!("Intercepted request: {} {}", req.method(), uri);

    Ok(FlowRequest {
        url: format!("{}://{}{}", scheme, authority, path_and_query),
        path: uri.path().to_string(),
        host,
        scheme,
        accept: headers
            .get(ACCEPT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
        client_id: client_id.to_string(),
    })
}

/// Collect an upstream response body for analysis
pub async fn flow_response_from_hyper<B>(response: Response<B>) -> Result<FlowResponse>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| EngineError::InterceptionFailed(format!("Response body error: {}", e)))?
        .to_bytes();

    Ok(FlowResponse { content_type, body })
}

/// Render an engine answer as a hyper response
pub fn into_hyper_response(resp: InterceptResponse) -> Result<Response<Full<Bytes>>> {
    let status = StatusCode::from_u16(resp.status)
        .map_err(|e| EngineError::InterceptionFailed(format!("Bad status {}: {}", resp.status, e)))?;

    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/html; charset=utf-8");

    if let Some(location) = &resp.location {
        builder = builder.header(LOCATION, location.as_str());
    }

    builder
        .body(Full::new(Bytes::from(resp.body)))
        .map_err(|e| EngineError::InterceptionFailed(format!("Response build error: {}", e)))
}
