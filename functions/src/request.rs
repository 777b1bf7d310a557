use crate::errors::FunctionError;
use hyper::Request;
use hyper::header::HOST;
use url::Url;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Rebuilds the absolute URL of an inbound request.
///
/// HTTP/2 requests carry scheme and authority in the URI. For origin-form
/// requests the host comes from the `Host` header and the scheme from
/// `X-Forwarded-Proto`, defaulting to `http`.
pub fn request_url<B>(request: &Request<B>) -> Result<Url, FunctionError> {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|e| FunctionError::InvalidRequestUrl(e.to_string()));
    }

    let scheme = request
        .headers()
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");

    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .ok_or_else(|| FunctionError::InvalidRequestUrl("missing Host header".into()))?;

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
        .map_err(|e| FunctionError::InvalidRequestUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_form_with_host_header() {
        let request = Request::builder()
            .uri("/api/first_http_function?code=1")
            .header(HOST, "localhost:7071")
            .body(())
            .unwrap();

        assert_eq!(
            request_url(&request).unwrap().as_str(),
            "http://localhost:7071/api/first_http_function?code=1"
        );
    }

    #[test]
    fn test_forwarded_proto() {
        let request = Request::builder()
            .uri("/api/first_http_function")
            .header(HOST, "chain.example.com")
            .header(FORWARDED_PROTO, "https, http")
            .body(())
            .unwrap();

        assert_eq!(
            request_url(&request).unwrap().as_str(),
            "https://chain.example.com/api/first_http_function"
        );
    }

    #[test]
    fn test_absolute_form() {
        let request = Request::builder()
            .uri("https://chain.example.com/api/first_http_function")
            .body(())
            .unwrap();

        assert_eq!(
            request_url(&request).unwrap().as_str(),
            "https://chain.example.com/api/first_http_function"
        );
    }

    #[test]
    fn test_missing_host() {
        let request = Request::builder()
            .uri("/api/first_http_function")
            .body(())
            .unwrap();

        assert!(matches!(
            request_url(&request),
            Err(FunctionError::InvalidRequestUrl(_))
        ));
    }
}
