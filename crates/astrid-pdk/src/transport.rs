//! A pluggable transport over the host HTTP primitive.
//!
//! Higher-level client code written against [`HttpTransport`] and the `http`
//! crate's request/response types can be pointed at [`HostTransport`]
//! without knowing anything about this crate's own request types.

use http::header::{HeaderName, HeaderValue};

use crate::PdkError;
use crate::http::{HttpRequest, Method};

/// Anything that can perform one HTTP exchange.
pub trait HttpTransport {
    type Error;

    /// Perform `request` and return the complete response.
    ///
    /// # Errors
    /// Implementation-defined.
    fn round_trip(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, Self::Error>;
}

/// [`HttpTransport`] backed by the host's `http_request` import.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTransport;

impl HttpTransport for HostTransport {
    type Error = PdkError;

    fn round_trip(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, PdkError> {
        let (parts, body) = request.into_parts();
        let method = Method::parse(parts.method.as_str())
            .ok_or_else(|| PdkError::UnsupportedMethod(parts.method.to_string()))?;

        let mut outbound = HttpRequest::new(parts.uri.to_string()).with_method(method);
        for name in parts.headers.keys() {
            // The wire format has one value per name; repeated headers are joined.
            let joined = parts
                .headers
                .get_all(name)
                .iter()
                .map(|value| {
                    value
                        .to_str()
                        .map_err(|e| PdkError::InvalidHeader(format!("{name}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(",");
            outbound = outbound.with_header(name.as_str(), joined);
        }
        if !body.is_empty() {
            outbound = outbound.with_body(body);
        }

        let response = outbound.send()?;
        // Copy the body out first so no error below can strand its block.
        let body = response.body();
        if let Some(memory) = response.memory() {
            memory.free();
        }

        let mut builder = http::Response::builder().status(response.status());
        for (name, value) in response.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PdkError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PdkError::InvalidHeader(format!("{name}: {e}")))?;
            builder = builder.header(name, value);
        }
        Ok(builder.body(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_pdk_sys::sim::{self, HttpReply};

    #[test]
    fn standard_requests_go_through_the_host() {
        sim::reset();
        sim::with_host(|h| {
            h.respond_with(|call| {
                HttpReply::status(200)
                    .with_header(
                        "x-seen-accept",
                        call.headers.get("accept").cloned().unwrap_or_default(),
                    )
                    .with_body(r#"{"id":1}"#)
            });
        });

        let request = http::Request::builder()
            .method("GET")
            .uri("https://jsonplaceholder.typicode.com/todos/1")
            .header("accept", "application/json")
            .header("accept", "text/plain")
            .body(Vec::new())
            .unwrap();

        let response = HostTransport.round_trip(request).unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()["x-seen-accept"],
            "application/json,text/plain"
        );
        assert_eq!(response.body(), br#"{"id":1}"#);

        let calls = sim::with_host(|h| h.http_calls().to_vec());
        assert_eq!(calls[0].body, None);
        // Only the request metadata block the host now owns is left behind.
        assert_eq!(sim::with_host(|h| h.live_blocks()), 1);
    }

    #[test]
    fn request_bodies_are_sent() {
        sim::reset();
        sim::with_host(|h| {
            h.respond_with(|call| {
                HttpReply::status(202).with_body(call.body.clone().unwrap_or_default())
            });
        });

        let request = http::Request::post("https://example/upload")
            .body(b"payload".to_vec())
            .unwrap();
        let response = HostTransport.round_trip(request).unwrap();
        assert_eq!(response.status(), http::StatusCode::ACCEPTED);
        assert_eq!(response.body(), b"payload");
        assert_eq!(
            sim::with_host(|h| h.http_calls()[0].method.clone()),
            "POST"
        );
    }

    #[test]
    fn rejected_response_header_frees_the_body() {
        sim::reset();
        sim::with_host(|h| {
            h.respond_with(|_| {
                HttpReply::status(200)
                    .with_header("x-split", "one\ntwo")
                    .with_body("kept until now")
            });
        });

        let request = http::Request::get("https://example/bad-header")
            .body(Vec::new())
            .unwrap();
        assert!(matches!(
            HostTransport.round_trip(request),
            Err(PdkError::InvalidHeader(_))
        ));
        // Only the request metadata block the host now owns is left behind.
        assert_eq!(sim::with_host(|h| h.live_blocks()), 1);
    }

    #[test]
    fn generic_callers_only_see_the_trait() {
        fn fetch<T: HttpTransport>(transport: &T) -> Result<u16, T::Error> {
            let request = http::Request::get("https://example/health")
                .body(Vec::new())
                .expect("static request is valid");
            Ok(transport.round_trip(request)?.status().as_u16())
        }

        sim::reset();
        sim::with_host(|h| h.respond_with(|_| HttpReply::status(204)));
        assert_eq!(fetch(&HostTransport).unwrap(), 204);
    }
}
