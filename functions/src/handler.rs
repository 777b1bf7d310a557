use crate::errors::FunctionError;
use async_trait::async_trait;
use http::{HeaderMap, Method};
use hyper::Response;
use hyper::body::Bytes;
use queue::QueueMessage;
use std::collections::HashMap;
use url::Url;

/// What an HTTP function sees of the inbound request. The body is never read.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL as seen by the caller.
    pub url: Url,
    pub headers: HeaderMap,
    /// Values captured by `{param}` route segments.
    pub params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        HttpRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            params: HashMap::new(),
        }
    }
}

/// A function invoked by the HTTP ingress.
#[async_trait]
pub trait HttpFunction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(&self, request: HttpRequest) -> Result<Response<Bytes>, FunctionError>;
}

/// A function invoked once per delivered queue message.
///
/// Returning `Ok` completes the message. Returning `Err` abandons it, so the
/// queue delivers it again or dead-letters it.
#[async_trait]
pub trait QueueFunction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(&self, message: &QueueMessage) -> Result<(), FunctionError>;
}
