// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP terminus talking to a remote indirector server.
//
// Resources live at `/<environment>/<indirection>/<escaped key>`; search uses
// the plural `/<environment>/<indirection>s/<escaped key>`. Options travel as
// the query string and bodies are JSON. A 404 on `find` or `head` means the
// value does not exist; any other non-success status is a transport error.
// The HTTP client itself sits behind `HttpTransport`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use indirector_core::{
    IndirectorConfig, IndirectorError, Model, Request, Result, Terminus, TerminusContext,
    TerminusError, TerminusFactory,
};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
    Head,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    /// JSON body, for `PUT`.
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends HTTP requests. Timeouts and TLS are the transport's business.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TerminusError>;
}

/// `HttpTransport` over a pooled `reqwest` client with rustls.
#[cfg(feature = "reqwest-transport")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

#[cfg(feature = "reqwest-transport")]
static INSTALL_CRYPTO_PROVIDER: std::sync::Once = std::sync::Once::new();

/// Install ring as the process-wide rustls provider, unless the host already
/// installed one.
#[cfg(feature = "reqwest-transport")]
fn install_crypto_provider() {
    INSTALL_CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::CryptoProvider::get_default().is_some() {
            return;
        }
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider installed concurrently by the host");
        }
    });
}

#[cfg(feature = "reqwest-transport")]
impl ReqwestTransport {
    /// Build a client with a per-request `timeout`.
    pub fn new(timeout: std::time::Duration) -> std::result::Result<Self, TerminusError> {
        install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TerminusError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[cfg(feature = "reqwest-transport")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TerminusError> {
        let builder = match request.method {
            HttpMethod::Get => self.http.get(request.url),
            HttpMethod::Put => self.http.put(request.url),
            HttpMethod::Delete => self.http.delete(request.url),
            HttpMethod::Head => self.http.head(request.url),
        };
        let builder = builder.header(reqwest::header::ACCEPT, "application/json");
        let builder = match request.body {
            Some(body) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TerminusError::Unavailable(e.to_string())
            } else {
                TerminusError::Transport(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TerminusError::Transport(format!("reading body: {e}")))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Terminus
// ---------------------------------------------------------------------------

pub struct Rest<M: Model> {
    indirection: String,
    config: Arc<IndirectorConfig>,
    transport: Arc<dyn HttpTransport>,
    scheme: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Rest<M> {
    pub const ADAPTER_NAME: &'static str = "rest";

    pub fn new(
        indirection: impl Into<String>,
        config: Arc<IndirectorConfig>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            indirection: indirection.into(),
            config,
            transport,
            scheme: "https".to_string(),
            _model: PhantomData,
        }
    }

    /// Use `scheme` (e.g. `http`) instead of `https`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// A factory building REST termini on `transport`.
    pub fn factory(transport: Arc<dyn HttpTransport>) -> TerminusFactory<M> {
        Self::factory_with_scheme(transport, "https")
    }

    pub fn factory_with_scheme(
        transport: Arc<dyn HttpTransport>,
        scheme: &str,
    ) -> TerminusFactory<M> {
        let scheme = scheme.to_string();
        Arc::new(move |context: &TerminusContext| {
            Ok(Arc::new(
                Rest::<M>::new(
                    context.indirection.as_str(),
                    Arc::clone(&context.config),
                    Arc::clone(&transport),
                )
                .with_scheme(scheme.as_str()),
            ) as Arc<dyn Terminus<M>>)
        })
    }

    /// The URL serving `request`; `plural` selects the search path.
    pub fn url(&self, request: &Request<M>, plural: bool) -> Result<Url> {
        let server = request.server().unwrap_or(self.config.server.as_str());
        let port = request
            .port()
            .filter(|port| *port != 0)
            .unwrap_or(self.config.master_port);
        let environment = request.environment().unwrap_or(self.config.environment.as_str());
        let resource = if plural {
            format!("{}s", self.indirection)
        } else {
            self.indirection.clone()
        };

        let text = format!(
            "{}://{server}:{port}/{}/{resource}/{}{}",
            self.scheme,
            urlencoding::encode(environment),
            request.escaped_key(),
            request.query_string()?
        );
        Url::parse(&text)
            .map_err(|e| IndirectorError::Request(format!("could not build URL {text}: {e}")))
    }

    fn fail(&self, key: &str, source: TerminusError) -> IndirectorError {
        IndirectorError::terminus(self.indirection.as_str(), key, source)
    }

    async fn send(
        &self,
        request: &Request<M>,
        method: HttpMethod,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        debug!(indirection = %self.indirection, method = %method, url = %url, "sending");
        self.transport
            .send(HttpRequest { method, url, body })
            .await
            .map_err(|e| self.fail(request.key(), e))
    }

    /// `None` for 404, the response for success, an error otherwise.
    fn found(&self, request: &Request<M>, response: HttpResponse) -> Result<Option<HttpResponse>> {
        match response.status {
            404 => Ok(None),
            _ if response.is_success() => Ok(Some(response)),
            _ => Err(self.status_error(request, &response)),
        }
    }

    fn status_error(&self, request: &Request<M>, response: &HttpResponse) -> IndirectorError {
        self.fail(
            request.key(),
            TerminusError::Transport(format!(
                "error {} on server: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )),
        )
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, request: &Request<M>, body: &[u8]) -> Result<T> {
        serde_json::from_slice(body).map_err(|e| {
            self.fail(request.key(), TerminusError::Serialization(e.to_string()))
        })
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for Rest<M> {
    fn name(&self) -> &str {
        Self::ADAPTER_NAME
    }

    async fn find(&self, request: &Request<M>) -> Result<Option<M>> {
        let url = self.url(request, false)?;
        let response = self.send(request, HttpMethod::Get, url, None).await?;
        match self.found(request, response)? {
            Some(response) => self.decode(request, &response.body).map(Some),
            None => Ok(None),
        }
    }

    async fn head(&self, request: &Request<M>) -> Result<bool> {
        let url = self.url(request, false)?;
        let response = self.send(request, HttpMethod::Head, url, None).await?;
        Ok(self.found(request, response)?.is_some())
    }

    async fn search(&self, request: &Request<M>) -> Result<Vec<M>> {
        let url = self.url(request, true)?;
        let response = self.send(request, HttpMethod::Get, url, None).await?;
        if !response.is_success() {
            return Err(self.status_error(request, &response));
        }

        let body: serde_json::Value = self.decode(request, &response.body)?;
        let serde_json::Value::Array(items) = body else {
            return Err(IndirectorError::Contract(format!(
                "search results from terminus {} are not an array",
                Self::ADAPTER_NAME
            )));
        };
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| {
                    self.fail(request.key(), TerminusError::Serialization(e.to_string()))
                })
            })
            .collect()
    }

    async fn save(&self, request: &Request<M>) -> Result<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Request(format!("save of {} carries no instance", request.key()))
        })?;
        let body = serde_json::to_vec(instance)
            .map_err(|e| self.fail(request.key(), TerminusError::Serialization(e.to_string())))?;
        let url = self.url(request, false)?;
        let response = self.send(request, HttpMethod::Put, url, Some(body)).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.status_error(request, &response))
        }
    }

    async fn destroy(&self, request: &Request<M>) -> Result<()> {
        let url = self.url(request, false)?;
        let response = self.send(request, HttpMethod::Delete, url, None).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.status_error(request, &response))
        }
    }
}
