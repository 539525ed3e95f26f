//! Thin JSON-over-HTTP helpers on top of the hyper-util pooled client

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ControlError;

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

pub async fn get_json<T: DeserializeOwned>(
    http: &HttpClient,
    uri: hyper::Uri,
) -> Result<T, ControlError> {
    let request = hyper::Request::get(uri)
        .header(hyper::header::ACCEPT, "application/json")
        .body(Full::default())?;
    let bytes = send(http, request).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn post_json<B: Serialize, T: DeserializeOwned>(
    http: &HttpClient,
    uri: hyper::Uri,
    body: &B,
) -> Result<T, ControlError> {
    let request = hyper::Request::post(uri)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .header(hyper::header::ACCEPT, "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(body)?)))?;
    let bytes = send(http, request).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn send(
    http: &HttpClient,
    request: hyper::Request<Full<Bytes>>,
) -> Result<Bytes, ControlError> {
    let response = http
        .request(request)
        .await
        .map_err(|e| ControlError::Network(e.to_string()))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ControlError::Network(e.to_string()))?
        .to_bytes();

    if !status.is_success() {
        return Err(ControlError::Server {
            status: status.as_u16(),
        });
    }
    Ok(body)
}
