use bytes::Bytes;
use futures::Stream;
use http::{Request, Response};
use once_cell::sync::Lazy;
use reqwest::Client;
use std::pin::Pin;

use crate::error::{LLMError, check_status};

/// A single, global client, built once
pub static CLIENT: Lazy<Client> = Lazy::new(Client::new);

pub type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

fn to_reqwest(req: Request<Vec<u8>>) -> Result<reqwest::RequestBuilder, LLMError> {
    let method = req
        .method()
        .as_str()
        .parse::<reqwest::Method>()
        .map_err(|e| LLMError::InvalidRequest(e.to_string()))?;

    let mut rb = CLIENT.request(method, req.uri().to_string());
    for (name, value) in req.headers().iter() {
        rb = rb.header(name.as_str(), value.as_bytes());
    }
    Ok(rb.body(req.into_body()))
}

/// Sends a fully built request and buffers the response.
///
/// Non-2xx statuses are returned as responses; parsers decide how to map them.
pub async fn call_outbound(req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, LLMError> {
    let resp = to_reqwest(req)?.send().await?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.bytes().await?.to_vec();

    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in headers.iter() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    Ok(builder.body(bytes)?)
}

/// Sends a request and hands back the body as a byte stream.
///
/// A non-2xx status is consumed and mapped to an error before any bytes
/// are yielded.
pub async fn call_outbound_stream(req: Request<Vec<u8>>) -> Result<ByteStream, LLMError> {
    let resp = to_reqwest(req)?.send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.bytes().await?;
        let err = check_status(status, &body)
            .err()
            .unwrap_or_else(|| LLMError::HttpError(format!("unexpected status {status}")));
        return Err(err);
    }
    Ok(Box::pin(resp.bytes_stream()))
}
