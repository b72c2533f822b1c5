//! Outbound HTTP through the host.
//!
//! The guest never touches the network. A request is described as JSON
//! metadata (`url`, `method`, `headers`) plus an optional body block, handed
//! to the host in one synchronous `http_request` crossing, and the host's
//! answer is read back as a status code, a JSON header map and a body block.
//!
//! There are no retries and no distinct connection-failure error: a failed
//! fetch shows up as whatever status and body the host chooses to report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::{self, HostAddress, Memory};
use crate::{PdkError, PdkResult};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Connect,
    Trace,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
        }
    }

    /// Parse a method name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata as the host expects it on the wire.
#[derive(Debug, Serialize)]
struct RequestMeta<'a> {
    url: &'a str,
    method: Method,
    headers: &'a BTreeMap<String, String>,
}

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A `GET` request for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set `Content-Type` accordingly.
    ///
    /// # Errors
    /// [`PdkError::Encode`] if `value` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> PdkResult<Self> {
        let body = serde_json::to_vec(value).map_err(PdkError::Encode)?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// Hand the request to the host and wait for its response.
    ///
    /// # Errors
    /// Allocation failures, an out-of-range status code, or a header map the
    /// host encoded as invalid JSON.
    pub fn send(&self) -> PdkResult<HttpResponse> {
        send(self)
    }
}

/// The host's answer to an [`HttpRequest`].
///
/// The body stays in host memory until read. The caller owns it and should
/// [`HttpResponse::free`] the response (or take the block with
/// [`HttpResponse::into_memory`]) when done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Option<Memory>,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body block, `None` for HEAD requests and empty bodies.
    #[must_use]
    pub fn memory(&self) -> Option<Memory> {
        self.body
    }

    /// Copy the body out of host memory. Empty if there is none.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        self.body.map(|memory| memory.to_vec()).unwrap_or_default()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    /// [`PdkError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> PdkResult<T> {
        serde_json::from_slice(&self.body()).map_err(PdkError::Decode)
    }

    /// Take ownership of the body block, e.g. to pass it on as plugin output.
    #[must_use]
    pub fn into_memory(self) -> Option<Memory> {
        self.body
    }

    /// Release the body block.
    pub fn free(self) {
        if let Some(memory) = self.body {
            memory.free();
        }
    }
}

/// Send `request` through the host.
///
/// The metadata and body blocks are handed to the host and not freed here.
/// A response body block is freed before any error is returned.
///
/// # Errors
/// See [`HttpRequest::send`].
pub fn send(request: &HttpRequest) -> PdkResult<HttpResponse> {
    let meta = serde_json::to_vec(&RequestMeta {
        url: &request.url,
        method: request.method,
        headers: &request.headers,
    })
    .map_err(PdkError::Encode)?;
    let meta = Memory::from_bytes(meta)?;
    let body = match &request.body {
        // The host never sees the metadata if the body cannot be written.
        Some(body) => Memory::from_bytes(body).inspect_err(|_| meta.free())?,
        None => Memory::NULL,
    };

    let response =
        unsafe { astrid_pdk_sys::http_request(meta.offset().raw(), body.offset().raw()) };
    let mut body = Memory::find_unchecked(HostAddress::from_raw(response));
    if request.method == Method::Head {
        // HEAD has no body by definition; drop anything the host sent anyway.
        if let Some(stray) = body.take() {
            stray.free();
        }
    }

    let free_body = |_: &PdkError| {
        if let Some(body) = body {
            body.free();
        }
    };
    let code = unsafe { astrid_pdk_sys::http_status_code() };
    let status = u16::try_from(code)
        .map_err(|_| PdkError::InvalidStatus(code))
        .inspect_err(free_body)?;
    let headers = response_headers().inspect_err(free_body)?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn response_headers() -> PdkResult<BTreeMap<String, String>> {
    let offset = unsafe { astrid_pdk_sys::http_headers() };
    match memory::take_host_block(HostAddress::from_raw(offset)) {
        Some(json) if !json.is_empty() => serde_json::from_slice(&json).map_err(PdkError::Decode),
        _ => Ok(BTreeMap::new()),
    }
}
