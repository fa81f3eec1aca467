//! Outbound HTTP instrumentation over `reqwest`.
//!
//! [`InstrumentedClient::send`] covers the high-level builder path
//! (category `fetch`), [`InstrumentedClient::execute`] the request-object
//! path (category `request`). Both are toggled together by one [`HttpHook`].

use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vigil_core::{Breadcrumb, BreadcrumbHint, BreadcrumbLevel, BreadcrumbType};

use super::{HookSlot, InstrumentationAdapter, guarded};
use crate::manager::BreadcrumbManager;

/// Records one breadcrumb per completed HTTP request while installed.
#[derive(Clone, Default)]
pub struct HttpHook {
    slot: Arc<HookSlot>,
}

impl HttpHook {
    fn record(
        &self,
        category: &'static str,
        method: &str,
        url: &str,
        outcome: Result<u16, String>,
        elapsed: Duration,
    ) {
        guarded(self.name(), || {
            let Some(manager) = self.slot.manager() else {
                return;
            };
            let duration_ms = elapsed.as_millis() as u64;

            let (level, message) = match &outcome {
                Ok(status) if *status >= 400 => {
                    (BreadcrumbLevel::Error, format!("{method} {url} {status}"))
                }
                Ok(status) => (BreadcrumbLevel::Info, format!("{method} {url} {status}")),
                Err(error) => (BreadcrumbLevel::Error, format!("{method} {url} failed: {error}")),
            };

            let mut crumb = Breadcrumb::new(message)
                .with_type(BreadcrumbType::Request)
                .with_category(category)
                .with_level(level)
                .with_data("method", method)
                .with_data("url", url)
                .with_data("duration_ms", duration_ms);
            match &outcome {
                Ok(status) => crumb = crumb.with_data("status_code", *status),
                Err(error) => crumb = crumb.with_data("error", error.as_str()),
            }

            let (status, error) = match outcome {
                Ok(status) => (Some(status), None),
                Err(error) => (None, Some(error)),
            };
            let hint = BreadcrumbHint::Request {
                method: method.to_string(),
                url: url.to_string(),
                status,
                duration_ms,
                error,
            };

            manager.add(crumb, Some(hint));
        });
    }
}

impl InstrumentationAdapter for HttpHook {
    fn name(&self) -> &str {
        "http"
    }

    fn install(&self, manager: &BreadcrumbManager) {
        self.slot.install(manager);
    }

    fn uninstall(&self) {
        self.slot.uninstall();
    }

    fn is_installed(&self) -> bool {
        self.slot.is_installed()
    }
}

/// A `reqwest::Client` whose requests are reported to an [`HttpHook`].
///
/// Responses and errors are returned exactly as the client produced them.
#[derive(Clone)]
pub struct InstrumentedClient {
    client: Client,
    hook: HttpHook,
}

impl InstrumentedClient {
    pub fn new(client: Client, hook: HttpHook) -> Self {
        Self { client, hook }
    }

    /// The wrapped client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request builder, the equivalent of `builder.send()`.
    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let (client, request) = builder.build_split();
        self.dispatch("fetch", &client, request?).await
    }

    /// Execute a prepared request, the equivalent of `client.execute(request)`.
    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        self.dispatch("request", &self.client, request).await
    }

    async fn dispatch(
        &self,
        category: &'static str,
        client: &Client,
        request: Request,
    ) -> reqwest::Result<Response> {
        if !self.hook.is_installed() {
            return client.execute(request).await;
        }

        let method = request.method().to_string();
        let url = request.url().to_string();
        let started = Instant::now();
        let result = client.execute(request).await;

        let outcome = match &result {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) => Err(e.to_string()),
        };
        self.hook
            .record(category, &method, &url, outcome, started.elapsed());

        result
    }
}
