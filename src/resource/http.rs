use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};

use super::{ByteRange, ByteRangeResource};
use crate::config::{HttpConfig, RangeEnd};
use crate::error::{EdfError, Result};

/// A remote file fetched piecewise with HTTP range requests
pub struct HttpResource {
    client: Client,
    url: String,
    name: String,
    size: Option<u64>,
    config: HttpConfig,
}

impl HttpResource {
    /// Connects with a fresh client and the default configuration
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        Self::connect_with(Client::new(), url, HttpConfig::default()).await
    }

    pub async fn connect_with(client: Client, url: impl Into<String>, config: HttpConfig) -> Result<Self> {
        let url = url.into();
        let mut resource = HttpResource {
            name: name_from_url(&url),
            client,
            url,
            size: None,
            config,
        };

        if resource.config.probe_size {
            resource.size = resource.probe_size().await?;
        }
        Ok(resource)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// HEAD request for `Content-Length`
    async fn probe_size(&self) -> Result<Option<u64>> {
        let response = self.client.head(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EdfError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        debug!("{} has content-length {:?}", self.url, size);
        Ok(size)
    }
}

/// `Range` header value for `[from, till)`, or `None` for the whole resource
pub(crate) fn range_header(from: u64, till: Option<u64>, policy: RangeEnd) -> Option<String> {
    match till {
        Some(till) if till > 0 => {
            let last = match policy {
                RangeEnd::Legacy if till % 2 == 0 => till - 1,
                RangeEnd::Legacy => till,
                RangeEnd::Inclusive => till - 1,
            };
            Some(format!("bytes={}-{}", from, last))
        }
        Some(_) => None,
        None if from > 0 => Some(format!("bytes={}-", from)),
        None => None,
    }
}

fn name_from_url(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or(url);
    let last = last.split('#').next().unwrap_or(last);
    last.split('?').next().unwrap_or(last).to_string()
}

#[async_trait]
impl ByteRangeResource for HttpResource {
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes> {
        let (from, till) = range.resolve(self.size);
        if till == Some(from) {
            return Ok(Bytes::new());
        }

        let mut request = self.client.get(&self.url);
        if let Some(value) = range_header(from, till, self.config.range_end) {
            debug!("GET {} Range: {}", self.url, value);
            request = request.header(RANGE, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EdfError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let mut body = response.bytes().await?;

        if status == StatusCode::PARTIAL_CONTENT {
            if let Some(till) = till {
                body.truncate((till - from) as usize);
            }
            return Ok(body);
        }

        // 服务器忽略了Range：只有拿到完整文件时才能在本地切片
        let complete = self.size.map_or(true, |size| body.len() as u64 == size);
        if !complete || from as usize > body.len() {
            return Err(EdfError::RangeUnsupported {
                url: self.url.clone(),
                from,
                till: till.unwrap_or(0),
            });
        }
        if from > 0 || till.is_some() {
            warn!("{} ignored the range request, slicing the full body locally", self.url);
        }
        let end = till.map_or(body.len(), |till| (till as usize).min(body.len()));
        Ok(body.slice(from as usize..end))
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn name(&self) -> &str {
        &self.name
    }
}
