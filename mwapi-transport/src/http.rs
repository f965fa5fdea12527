// HTTP transport backed by reqwest
// Sends encoded parameters as a query string (GET), a form body (POST),
// or a multipart body (POST with file parameters)

use crate::transport::{RawResponse, Transport, TransportError};
use async_trait::async_trait;
use mwapi_core::{has_files, Headers, WireParams, WireValue};
use reqwest::header::SET_COOKIE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// Path of the API entry point on a conventionally configured wiki.
pub const DEFAULT_API_PATH: &str = "/w/api.php";

/// Expand a bare domain like `en.wikipedia.org` to its API URL.
pub fn normalize_endpoint(endpoint: &str) -> Result<Url, TransportError> {
    let endpoint = endpoint.trim();
    if endpoint.contains('/') {
        Ok(Url::parse(endpoint)?)
    } else {
        Ok(Url::parse(&format!("https://{endpoint}{DEFAULT_API_PATH}"))?)
    }
}

/// Transport sending requests with a shared reqwest client.
///
/// The default client keeps cookies between requests so that login
/// sessions established by a collaborator persist.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Url,
    http_client: HttpClient,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let http_client = HttpClient::builder().cookie_store(true).build()?;
        Ok(Self::with_client(normalize_endpoint(endpoint)?, http_client))
    }

    pub fn with_client(endpoint: Url, http_client: HttpClient) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: RequestBuilder, headers: &Headers) -> Result<RawResponse, TransportError> {
        let request = headers
            .iter()
            .fold(request, |request, (name, value)| request.header(name.as_str(), value.as_str()));
        let response = request.send().await?;
        read_response(response).await
    }
}

fn text_pairs(params: &WireParams) -> Result<Vec<(&str, &str)>, TransportError> {
    params
        .iter()
        .map(|(key, value)| match value {
            WireValue::Text(text) => Ok((key.as_str(), text.as_str())),
            WireValue::File(_) => Err(TransportError::Unsupported(format!(
                "file parameter '{key}' requires a multipart POST request"
            ))),
        })
        .collect()
}

fn multipart_form(params: &WireParams) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (key, value) in params {
        form = match value {
            WireValue::Text(text) => form.text(key.clone(), text.clone()),
            WireValue::File(file) => {
                let mut part = Part::bytes(file.data.to_vec()).file_name(file.file_name.clone());
                if let Some(content_type) = &file.content_type {
                    part = part.mime_str(content_type)?;
                }
                form.part(key.clone(), part)
            }
        };
    }
    Ok(form)
}

async fn read_response(response: reqwest::Response) -> Result<RawResponse, TransportError> {
    let status = response.status().as_u16();

    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        if *name == SET_COOKIE {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let text = response.text().await?;
    trace!("Response body:\n{}", text);

    // Error pages from proxies are often not JSON; keep them as text.
    let body = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(err) if status == 200 => return Err(err.into()),
        Err(_) => Value::String(text),
    };

    debug!("Received HTTP {} response", status);
    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError> {
        let pairs = text_pairs(params)?;
        debug!("GET {} with {} parameters", self.endpoint, pairs.len());
        let request = self.http_client.get(self.endpoint.clone()).query(&pairs);
        self.send(request, headers).await
    }

    async fn post(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError> {
        debug!("POST {} with {} parameters", self.endpoint, params.len());
        let request = self.http_client.post(self.endpoint.clone());
        let request = if has_files(params) {
            request.multipart(multipart_form(params)?)
        } else {
            request.form(&text_pairs(params)?)
        };
        self.send(request, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_domain_expands() {
        let url = normalize_endpoint("en.wikipedia.org").unwrap();
        assert_eq!(url.as_str(), "https://en.wikipedia.org/w/api.php");
    }

    #[test]
    fn test_full_url_kept() {
        let url = normalize_endpoint("http://localhost:8080/api.php").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api.php");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            normalize_endpoint("not a url/at all"),
            Err(TransportError::Endpoint(_))
        ));
    }

    #[test]
    fn test_files_rejected_outside_multipart() {
        let mut params = WireParams::new();
        params.insert(
            "file".to_string(),
            WireValue::File(mwapi_core::FileParam::new("a.txt", b"data".to_vec())),
        );
        assert!(matches!(text_pairs(&params), Err(TransportError::Unsupported(_))));
    }
}
