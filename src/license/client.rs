// Baserow REST client for the license and release tables

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{LicenseRow, LicenseServer, UpdateRow};
use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RowsPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

pub struct BaserowClient {
    client: Client,
    api_url: String,
    token: String,
    license_table_id: u64,
    update_table_id: u64,
}

impl BaserowClient {
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        if !config.has_server() {
            return Err(LicenseError::NotConfigured);
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            license_table_id: config.license_table_id,
            update_table_id: config.update_table_id,
        })
    }

    fn rows_url(&self, table_id: u64) -> String {
        format!(
            "{}/api/database/rows/table/{}/?user_field_names=true",
            self.api_url, table_id
        )
    }

    fn fetch_rows<T: DeserializeOwned>(
        &self,
        table_id: u64,
        search: Option<&str>,
    ) -> LicenseResult<Vec<T>> {
        let mut request = self
            .client
            .get(self.rows_url(table_id))
            .header("Authorization", format!("Token {}", self.token));

        if let Some(term) = search {
            request = request.query(&[("search", term)]);
        }

        debug!(table_id, "Requesting rows");
        let page: RowsPage<T> = request.send()?.error_for_status()?.json()?;
        Ok(page.results)
    }
}

impl LicenseServer for BaserowClient {
    fn license_rows(&self, search: Option<&str>) -> LicenseResult<Vec<LicenseRow>> {
        self.fetch_rows(self.license_table_id, search)
    }

    fn update_rows(&self) -> LicenseResult<Vec<UpdateRow>> {
        if self.update_table_id == 0 {
            return Ok(Vec::new());
        }
        self.fetch_rows(self.update_table_id, None)
    }
}
