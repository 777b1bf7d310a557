use crate::api::second_http_function;
use crate::errors::FunctionError;
use crate::handler::{HttpFunction, HttpRequest};
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const NAME: &str = "first_http_function";
pub const ROUTE: &str = "first_http_function";

const GREETING: &str = "Hello from the first function!";

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct FirstFunctionResponse {
    pub message: String,
    pub second_function_response: String,
}

/// Entry point of the chain: calls the second function over HTTP on the same
/// deployment and wraps its answer.
pub struct FirstHttpFunction {
    client: reqwest::Client,
    route_prefix: String,
}

impl FirstHttpFunction {
    pub fn new(route_prefix: &str, outbound_timeout: Duration) -> Result<Self, FunctionError> {
        let client = reqwest::Client::builder()
            .timeout(outbound_timeout)
            .build()
            .map_err(|e| FunctionError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            route_prefix: route_prefix.to_string(),
        })
    }

    async fn call_second_function(&self, url: &str) -> Result<String, FunctionError> {
        let unavailable = |e: reqwest::Error| FunctionError::DependencyUnavailable {
            url: url.to_string(),
            reason: e.to_string(),
        };

        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)
    }
}

/// `request_url` up to and including the first `/{route_prefix}` segment.
///
/// The prefix is matched ignoring ASCII case, like routing, and keeps the
/// casing it has in `request_url`.
pub fn base_url(request_url: &str, route_prefix: &str) -> Result<String, FunctionError> {
    let marker = format!("/{route_prefix}/").to_ascii_lowercase();
    // ASCII lowercasing keeps byte offsets, so indices carry over.
    let index = request_url
        .to_ascii_lowercase()
        .find(&marker)
        .ok_or_else(|| FunctionError::MissingRoutePrefix {
            prefix: route_prefix.to_string(),
        })?;

    Ok(request_url[..index + marker.len() - 1].to_string())
}

/// URL of the second function on the deployment that served `request_url`.
pub fn second_function_url(request_url: &str, route_prefix: &str) -> Result<String, FunctionError> {
    let base = base_url(request_url, route_prefix)?;
    Ok(format!("{base}/{}", second_http_function::ROUTE))
}

#[async_trait]
impl HttpFunction for FirstHttpFunction {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn invoke(&self, request: HttpRequest) -> Result<Response<Bytes>, FunctionError> {
        tracing::info!("HTTP trigger function (first) processed a request.");

        let url = second_function_url(request.url.as_str(), &self.route_prefix)?;
        tracing::debug!(url = %url, "calling second function");

        let second_function_response = self.call_second_function(&url).await?;

        let body = serde_json::to_vec(&FirstFunctionResponse {
            message: GREETING.to_string(),
            second_function_response,
        })
        .map_err(|e| FunctionError::InternalError(format!("Failed to serialize response: {e}")))?;

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Bytes::from(body))
            .map_err(|e| FunctionError::InternalError(format!("Failed to build response: {e}")))
    }
}
