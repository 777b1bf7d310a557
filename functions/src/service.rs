use crate::app::FunctionApp;
use crate::errors::FunctionError;
use crate::handler::HttpRequest;
use crate::metrics_defs::{FUNCTION_DURATION, FUNCTION_INVOCATIONS, REQUESTS_INFLIGHT};
use crate::request::request_url;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use routing::Resolution;
use shared::http::{full_body, make_error_response};
use shared::{counter, gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Dispatches inbound requests to the HTTP functions of a [`FunctionApp`].
///
/// Unknown paths get a 404 and disallowed methods a 405. A function that fails
/// or outlives `function_timeout` produces a 500.
pub struct FunctionHostService {
    app: Arc<FunctionApp>,
    function_timeout: Duration,
}

impl FunctionHostService {
    pub fn new(app: Arc<FunctionApp>, function_timeout: Duration) -> Self {
        Self {
            app,
            function_timeout,
        }
    }
}

impl Service<Request<Incoming>> for FunctionHostService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = FunctionError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let app = self.app.clone();
        let function_timeout = self.function_timeout;

        Box::pin(async move { Ok(handle(&app, function_timeout, request).await) })
    }
}

async fn handle<B>(
    app: &FunctionApp,
    function_timeout: Duration,
    request: Request<B>,
) -> Response<BoxBody<Bytes, FunctionError>> {
    let path = request.uri().path().to_string();
    let (function, params) = match app.resolve(request.method(), &path) {
        Resolution::Matched(route_match) => (
            route_match.action.clone(),
            route_match
                .params
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect(),
        ),
        Resolution::MethodNotAllowed => {
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }
        Resolution::NotFound => return make_error_response(StatusCode::NOT_FOUND),
    };

    let url = match request_url(&request) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting request");
            return make_error_response(StatusCode::BAD_REQUEST);
        }
    };

    let http_request = HttpRequest {
        method: request.method().clone(),
        url,
        headers: request.headers().clone(),
        params,
    };

    let name = function.name();
    let span = tracing::info_span!("invocation", function = name, invocation_id = %Uuid::new_v4());

    async move {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        let start = Instant::now();

        let result = match tokio::time::timeout(function_timeout, function.invoke(http_request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FunctionError::FunctionTimeout {
                function: name.to_string(),
                timeout_secs: function_timeout.as_secs(),
            }),
        };

        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
        histogram!(FUNCTION_DURATION, "function" => name, "trigger" => "http")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                counter!(FUNCTION_INVOCATIONS, "function" => name, "trigger" => "http", "outcome" => "success")
                    .increment(1);
                tracing::info!(status = response.status().as_u16(), "Executed function");
                response.map(full_body)
            }
            Err(e) => {
                counter!(FUNCTION_INVOCATIONS, "function" => name, "trigger" => "http", "outcome" => e.kind())
                    .increment(1);
                tracing::error!(error = %e, "Function failed");
                make_error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
    .instrument(span)
    .await
}
