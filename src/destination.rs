//! Travel destination model and the remote fetch seam.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Placeholder text used in every field of a fallback destination.
pub const NO_DETAILS_AVAILABLE: &str = "No Details Available";

/// Description carried by a fallback destination.
pub const UNAVAILABLE_DESCRIPTION: &str =
    "Destination information temporarily unavailable due to service issues.";

/// A travel destination as returned by the destination service.
///
/// Identity is `(destination_id, country, name)`; equality and hashing ignore
/// the descriptive fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelDestination {
    /// Service-side identifier.
    pub destination_id: String,
    /// Country the destination is in.
    pub country: String,
    /// Display name.
    pub name: String,
    /// City or nearest town.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Kind of destination, e.g. national park.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Recommended season.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_season_to_visit: Option<String>,
    /// Notable attractions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attractions: Option<String>,
}

impl TravelDestination {
    /// Creates a destination with only its identity set.
    pub fn new(
        destination_id: impl Into<String>,
        country: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            destination_id: destination_id.into(),
            country: country.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// The degraded record served when the destination service cannot be
    /// used. Only `name` and `country` carry caller data.
    pub fn unavailable(name: &str, country: &str) -> Self {
        Self::new(NO_DETAILS_AVAILABLE, country, name)
            .with_city(NO_DETAILS_AVAILABLE)
            .with_description(UNAVAILABLE_DESCRIPTION)
            .with_category(NO_DETAILS_AVAILABLE)
            .with_best_season_to_visit(NO_DETAILS_AVAILABLE)
            .with_attractions(NO_DETAILS_AVAILABLE)
    }

    /// Whether this is the fallback record built by [`unavailable`](Self::unavailable).
    pub fn is_unavailable(&self) -> bool {
        self.destination_id == NO_DETAILS_AVAILABLE
    }

    /// Sets the city.
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the best season to visit.
    pub fn with_best_season_to_visit(mut self, season: impl Into<String>) -> Self {
        self.best_season_to_visit = Some(season.into());
        self
    }

    /// Sets the attractions.
    pub fn with_attractions(mut self, attractions: impl Into<String>) -> Self {
        self.attractions = Some(attractions.into());
        self
    }
}

impl PartialEq for TravelDestination {
    fn eq(&self, other: &Self) -> bool {
        self.destination_id == other.destination_id
            && self.country == other.country
            && self.name == other.name
    }
}

impl Eq for TravelDestination {}

impl Hash for TravelDestination {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.destination_id.hash(state);
        self.country.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for TravelDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.country, self.destination_id)
    }
}

/// The remote destination lookup.
///
/// Implementations may block; the gateway runs them on a worker thread and
/// abandons them after its timeout.
pub trait DestinationFetcher: Send + Sync + 'static {
    /// Fetches the destination called `name` in `country`.
    fn fetch(&self, name: &str, country: &str) -> Result<TravelDestination, FetchError>;
}

impl<F> DestinationFetcher for F
where
    F: Fn(&str, &str) -> Result<TravelDestination, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, name: &str, country: &str) -> Result<TravelDestination, FetchError> {
        self(name, country)
    }
}

#[cfg(feature = "http")]
pub use http::HttpDestinationFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{DestinationFetcher, TravelDestination};
    use crate::error::FetchError;
    use reqwest::blocking::Client;
    use reqwest::StatusCode;
    use tracing::{info, warn};

    /// Fetches destinations from the travel destination HTTP service.
    ///
    /// Issues `GET {base_url}/travelDestination?destinationId={name}&country={country}`.
    #[derive(Debug, Clone)]
    pub struct HttpDestinationFetcher {
        client: Client,
        base_url: String,
    }

    impl HttpDestinationFetcher {
        /// Creates a fetcher with a default client.
        pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
            let client = Client::builder().build().map_err(FetchError::from)?;
            Ok(Self::with_client(client, base_url))
        }

        /// Creates a fetcher around an existing client.
        pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
            Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }
    }

    impl DestinationFetcher for HttpDestinationFetcher {
        fn fetch(&self, name: &str, country: &str) -> Result<TravelDestination, FetchError> {
            let response = self
                .client
                .get(format!("{}/travelDestination", self.base_url))
                .query(&[("destinationId", name), ("country", country)])
                .send()?;

            if response.status() == StatusCode::NOT_FOUND {
                warn!(name, country, "destination not found");
                return Err(FetchError::NotFound);
            }

            let destination: TravelDestination = response.error_for_status()?.json()?;
            info!(name = %destination.name, "retrieved destination");
            Ok(destination)
        }
    }

    impl From<reqwest::Error> for FetchError {
        fn from(e: reqwest::Error) -> Self {
            if e.status() == Some(StatusCode::NOT_FOUND) {
                FetchError::NotFound
            } else {
                FetchError::Remote(Box::new(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_descriptive_fields() {
        let a = TravelDestination::new("DEST001", "USA", "Rocky Mountain").with_city("Estes Park");
        let b = TravelDestination::new("DEST001", "USA", "Rocky Mountain").with_city("Denver");
        let c = TravelDestination::new("DEST002", "USA", "Rocky Mountain");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn json_uses_camel_case_names() {
        let destination = TravelDestination::new("DEST001", "USA", "Rocky Mountain")
            .with_best_season_to_visit("Summer");
        let json = serde_json::to_value(&destination).unwrap();

        assert_eq!(json["destinationId"], "DEST001");
        assert_eq!(json["bestSeasonToVisit"], "Summer");
        assert!(json.get("city").is_none());

        let parsed: TravelDestination = serde_json::from_str(
            r#"{"destinationId":"DEST001","country":"USA","name":"Rocky Mountain","category":"National Park"}"#,
        )
        .unwrap();
        assert_eq!(parsed.category.as_deref(), Some("National Park"));
        assert_eq!(parsed.city, None);
    }

    #[test]
    fn unavailable_record_is_marked() {
        let fallback = TravelDestination::unavailable("Rocky Mountain", "USA");
        assert!(fallback.is_unavailable());
        assert_eq!(fallback.attractions.as_deref(), Some(NO_DETAILS_AVAILABLE));
        assert_eq!(fallback.description.as_deref(), Some(UNAVAILABLE_DESCRIPTION));
        assert!(!TravelDestination::new("DEST001", "USA", "Rocky Mountain").is_unavailable());
    }
}
