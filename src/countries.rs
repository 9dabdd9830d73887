use std::{error::Error, time::Duration};

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name search endpoint of the REST Countries v3.1 API.
pub const REST_COUNTRIES_URL: &str = "https://restcountries.com/v3.1/name";

/// How long one upstream search may take, connecting included.
pub const COUNTRY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Country {
    pub name: String,
    pub flag: String,
    pub capital: String,
    pub population: u64,
    pub region: String,
}

#[async_trait]
pub trait CountrySource: Send + Sync + 'static {
    /// Find countries whose name matches `query`.
    async fn search(&self, query: &str) -> Result<Vec<Country>, Box<dyn Error + Send + Sync>>;
}

pub struct RestCountriesClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestCountriesClient {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::with_timeout(base_url, COUNTRY_LOOKUP_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCountriesUrl {
            url: base_url.to_owned(),
            reason,
        };

        let base_url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot have path segments".into()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    fn search_url(&self, query: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(query);
        }
        url
    }
}

#[async_trait]
impl CountrySource for RestCountriesClient {
    async fn search(&self, query: &str) -> Result<Vec<Country>, Box<dyn Error + Send + Sync>> {
        let countries = self
            .client
            .get(self.search_url(query))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<UpstreamCountry>>()
            .await?;

        Ok(countries.into_iter().map(Country::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamCountry {
    name: UpstreamName,
    #[serde(default)]
    flags: UpstreamFlags,
    #[serde(default)]
    capital: Vec<String>,
    #[serde(default)]
    population: u64,
    #[serde(default)]
    region: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamName {
    common: String,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamFlags {
    #[serde(default)]
    png: String,
}

impl From<UpstreamCountry> for Country {
    fn from(upstream: UpstreamCountry) -> Self {
        Self {
            name: upstream.name.common,
            flag: upstream.flags.png,
            capital: upstream
                .capital
                .into_iter()
                .next()
                .unwrap_or_else(|| "N/A".to_owned()),
            population: upstream.population,
            region: upstream.region,
        }
    }
}
