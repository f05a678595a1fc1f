//! Backend boundary: the JSON endpoints that supply portfolios, ticker
//! metrics, upload extraction and price history.

use crate::error::{ClientError, ClientResult};
use crate::fields::TICKER_KEY;
use crate::normalize::{normalize, NormalizedValue};
use reqwest::{multipart, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Portfolio name -> ordered tickers, as stored by the backend.
pub type PortfolioRegistry = BTreeMap<String, Vec<String>>;

/// One ticker's metrics exactly as the backend sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn ticker(&self) -> Option<&str> {
        match self.0.get(TICKER_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn value(&self, key: &str) -> NormalizedValue {
        normalize(self.get(key))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct History {
    pub dates: Vec<String>,
    pub prices: Vec<Option<f64>>,
    #[serde(default)]
    pub indicator_series: Vec<Option<f64>>,
    #[serde(default)]
    pub indicator_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    tickers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PortfolioBody<'a> {
    name: &'a str,
    tickers: &'a [String],
}

/// The backend operations the dashboard consumes.
pub trait Backend {
    fn portfolios(&self) -> impl Future<Output = ClientResult<PortfolioRegistry>> + Send;

    fn save_portfolio(
        &self,
        name: &str,
        tickers: &[String],
    ) -> impl Future<Output = ClientResult<()>> + Send;

    fn delete_portfolio(&self, name: &str) -> impl Future<Output = ClientResult<()>> + Send;

    fn tickers(&self, tickers: &[String]) -> impl Future<Output = ClientResult<Vec<Row>>> + Send;

    /// Sends a spreadsheet and returns the tickers the backend found in it.
    fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> impl Future<Output = ClientResult<Vec<String>>> + Send;

    /// `fallback` backfills indicator points older than the indicator history.
    fn history(
        &self,
        ticker: &str,
        indicator: &str,
        fallback: Option<f64>,
    ) -> impl Future<Output = ClientResult<History>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpBackend { client, base_url })
    }

    // Segments are percent-encoded, so portfolio names and tickers can hold anything.
    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

// Non-2xx responses carry a `detail` message when the backend raised it.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(obj)) => match obj.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.clone(),
        },
        _ if !body.trim().is_empty() => body.clone(),
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    warn!(status = status.as_u16(), %detail, "backend rejected request");
    Err(ClientError::Status {
        status: status.as_u16(),
        detail,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

impl Backend for HttpBackend {
    async fn portfolios(&self) -> ClientResult<PortfolioRegistry> {
        let url = self.endpoint(&["api", "portfolios"])?;
        let response = check(self.client.get(url).send().await?).await?;
        decode(response).await
    }

    async fn save_portfolio(&self, name: &str, tickers: &[String]) -> ClientResult<()> {
        let url = self.endpoint(&["api", "portfolios"])?;
        let body = PortfolioBody { name, tickers };
        check(self.client.post(url).json(&body).send().await?).await?;
        Ok(())
    }

    async fn delete_portfolio(&self, name: &str) -> ClientResult<()> {
        let url = self.endpoint(&["api", "portfolios", name])?;
        check(self.client.delete(url).send().await?).await?;
        Ok(())
    }

    async fn tickers(&self, tickers: &[String]) -> ClientResult<Vec<Row>> {
        let url = self.endpoint(&["api", "tickers"])?;
        debug!(count = tickers.len(), "requesting ticker rows");
        let response = self
            .client
            .get(url)
            .query(&[("tickers", tickers.join(","))])
            .send()
            .await?;
        decode(check(response).await?).await
    }

    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> ClientResult<Vec<String>> {
        let url = self.endpoint(&["api", "upload"])?;
        let part = multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);
        let response = self.client.post(url).multipart(form).send().await?;
        let body: UploadResponse = decode(check(response).await?).await?;
        Ok(body.tickers)
    }

    async fn history(
        &self,
        ticker: &str,
        indicator: &str,
        fallback: Option<f64>,
    ) -> ClientResult<History> {
        let url = self.endpoint(&["api", "history", ticker])?;
        let mut request = self.client.get(url).query(&[("indicator", indicator)]);
        if let Some(value) = fallback {
            request = request.query(&[("indicator_value", value.to_string())]);
        }
        decode(check(request.send().await?).await?).await
    }
}
