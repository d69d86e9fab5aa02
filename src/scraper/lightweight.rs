use crate::config::AppConfig;
use crate::models::{BackendKind, CurrentFields, LocatorSet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use tracing::{info, warn};
use url::Url;

use super::http_client::HttpClient;
use super::selectors::HtmlPage;
use super::{extract_fields, ExtractionBackend};

/// One GET, static DOM, selector chains. No script execution.
pub struct LightweightBackend {
    client: HttpClient,
    current_url: Url,
    locators: LocatorSet,
}

impl LightweightBackend {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let current_url = Url::parse(&config.scraper.current_url)
            .with_context(|| format!("Invalid current_url {:?}", config.scraper.current_url))?;

        Ok(Self {
            client: HttpClient::new(&config.scraper)?,
            current_url,
            locators: config.selectors.static_page.clone(),
        })
    }
}

/// Extraction half of the backend, split out so it runs on canned markup.
pub fn extract_current(markup: &str, locators: &LocatorSet) -> CurrentFields {
    let page = HtmlPage::parse(markup);
    extract_fields(&page, locators, Local::now().naive_local())
}

#[async_trait]
impl ExtractionBackend for LightweightBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lightweight
    }

    async fn fetch_current(&self) -> Option<CurrentFields> {
        let body = match self.client.get_text(self.current_url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                warn!("lightweight fetch failed: {}", e);
                return None;
            }
        };

        let fields = extract_current(&body, &self.locators);
        if fields.has_close() {
            info!("lightweight: close {:?}", fields.close);
        } else {
            info!("lightweight: page fetched but close price not in static markup");
        }
        Some(fields)
    }
}
