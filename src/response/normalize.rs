//! Turning a handler's return value into `(status, headers, body)`.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use super::body::Body;
use crate::error::{Error, Result};

/// What a handler may return.
#[derive(Debug)]
pub enum Response {
    /// Body alone; status 200 and no headers.
    Body(Body),
    StatusAndBody(u16, Body),
    HeadersAndBody(HeaderMap, Body),
    Full(u16, HeaderMap, Body),
    /// A loosely built grouping of 1 (body), 2 (headers, body) or
    /// 3 (status, headers, body) elements.
    Parts(Vec<Part>),
}

/// One element of a [`Response::Parts`] grouping.
#[derive(Debug)]
pub enum Part {
    Status(i64),
    Headers(Vec<(String, String)>),
    Body(Body),
}

/// A response with every default filled in.
#[derive(Debug)]
pub struct Normalized {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl From<Normalized> for Response {
    fn from(n: Normalized) -> Self {
        Response::Full(n.status.as_u16(), n.headers, n.body)
    }
}

/// Normalize a response into a status, header map and body.
///
/// The body is moved through untouched; a lazy body is never polled here.
pub fn normalize(response: Response) -> Result<Normalized> {
    let (status, headers, body) = match response {
        Response::Body(body) => (StatusCode::OK, HeaderMap::new(), body),
        Response::StatusAndBody(status, body) => (status_code(status.into())?, HeaderMap::new(), body),
        Response::HeadersAndBody(headers, body) => (StatusCode::OK, headers, body),
        Response::Full(status, headers, body) => (status_code(status.into())?, headers, body),
        Response::Parts(parts) => normalize_parts(parts)?,
    };
    Ok(Normalized {
        status,
        headers,
        body,
    })
}

fn normalize_parts(parts: Vec<Part>) -> Result<(StatusCode, HeaderMap, Body)> {
    let n = parts.len();
    let mut parts = parts.into_iter();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(body), None, None, None) => Ok((StatusCode::OK, HeaderMap::new(), body_part(body)?)),
        (Some(headers), Some(body), None, None) => {
            Ok((StatusCode::OK, headers_part(headers)?, body_part(body)?))
        }
        (Some(status), Some(headers), Some(body), None) => {
            let status = match status {
                Part::Status(status) => status_code(status)?,
                other => {
                    return Err(Error::Shape(format!(
                        "status code must be an int, not {}",
                        describe(&other)
                    )))
                }
            };
            Ok((status, headers_part(headers)?, body_part(body)?))
        }
        _ => Err(Error::Shape(format!("handler returned {n}-element grouping"))),
    }
}

fn status_code(status: i64) -> Result<StatusCode> {
    u16::try_from(status)
        .ok()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .ok_or_else(|| Error::Shape(format!("status code must be an int in 100..=999, got {status}")))
}

fn headers_part(part: Part) -> Result<HeaderMap> {
    let pairs = match part {
        Part::Headers(pairs) => pairs,
        other => {
            return Err(Error::Shape(format!(
                "headers must be a mapping, not {}",
                describe(&other)
            )))
        }
    };
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes());
        let value = HeaderValue::from_str(&value);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => {
                return Err(Error::Shape(
                    "header keys and values must be valid header strings".to_string(),
                ))
            }
        }
    }
    Ok(headers)
}

fn body_part(part: Part) -> Result<Body> {
    match part {
        Part::Body(body) => Ok(body),
        other => Err(Error::BodyType(format!("body cannot be {}", describe(&other)))),
    }
}

fn describe(part: &Part) -> &'static str {
    match part {
        Part::Status(_) => "a status code",
        Part::Headers(_) => "a header mapping",
        Part::Body(_) => "a body",
    }
}

impl From<Body> for Response {
    fn from(body: Body) -> Self {
        Response::Body(body)
    }
}

macro_rules! response_from_body {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Response {
                fn from(value: $ty) -> Self {
                    Response::Body(Body::from(value))
                }
            }
        )*
    };
}

response_from_body!(
    &str,
    String,
    bytes::Bytes,
    Vec<u8>,
    &'static [u8],
    serde_json::Value,
);

impl<B: Into<Body>> From<(u16, B)> for Response {
    fn from((status, body): (u16, B)) -> Self {
        Response::StatusAndBody(status, body.into())
    }
}

impl<B: Into<Body>> From<(HeaderMap, B)> for Response {
    fn from((headers, body): (HeaderMap, B)) -> Self {
        Response::HeadersAndBody(headers, body.into())
    }
}

impl<B: Into<Body>> From<(u16, HeaderMap, B)> for Response {
    fn from((status, headers, body): (u16, HeaderMap, B)) -> Self {
        Response::Full(status, headers, body.into())
    }
}

impl From<Vec<Part>> for Response {
    fn from(parts: Vec<Part>) -> Self {
        Response::Parts(parts)
    }
}
