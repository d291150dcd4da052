use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::constants::CONTENT_TYPE_JSON;

pub(super) struct HttpResponse {
    pub status: StatusCode,
    pub data: Bytes,
}

impl HttpResponse {
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                data: Bytes::from(body),
            },
            Err(err) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                data: Bytes::from(format!("{{\"error\":\"{}\"}}", err)),
            },
        }
    }
}

impl From<HttpResponse> for Response<Full<Bytes>> {
    fn from(response: HttpResponse) -> Self {
        let mut out = Response::new(Full::new(response.data));
        *out.status_mut() = response.status;
        out.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(CONTENT_TYPE_JSON),
        );
        out
    }
}
