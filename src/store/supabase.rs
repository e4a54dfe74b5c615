//! Supabase REST API client

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Serialize};

/// Supabase client for the highscore tables.
/// Uses the anon key; row-level security on the project governs access.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Table URL with `query` filters, each value percent-encoded
    fn query_url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, SupabaseError> {
        let mut url = Url::parse(&self.rest_url(table))
            .map_err(|e| SupabaseError::InvalidUrl(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, SupabaseError> {
        let url = self.query_url(table, query)?;

        let response = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting at most a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, SupabaseError> {
        let url = self.query_url(table, query)?;

        let response = self
            .authed(self.client.get(url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let response = check_status(response).await?;
        response.json().await.map(Some).map_err(SupabaseError::Parse)
    }

    /// Count rows matching `query` without fetching them
    pub async fn count(&self, table: &str, query: &[(&str, &str)]) -> Result<u64, SupabaseError> {
        let mut pairs = vec![("select", "*")];
        pairs.extend_from_slice(query);
        let url = self.query_url(table, &pairs)?;

        let response = self
            .authed(self.client.head(url))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        let range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or(SupabaseError::MissingCount)?;

        parse_content_range_total(range).ok_or(SupabaseError::MissingCount)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let url = self.rest_url(table);

        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;

        // PostgREST returns an array, get first element
        let results: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &[(&str, &str)],
        data: &T,
    ) -> Result<(), SupabaseError> {
        let url = self.query_url(table, query)?;

        let response = self
            .authed(self.client.patch(url))
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, SupabaseError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SupabaseError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Total from a PostgREST `Content-Range` header such as `0-9/42` or `*/0`
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Response carried no row count")]
    MissingCount,

    #[error("Invalid Supabase URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn filter_values_cannot_add_filters() {
        let client = SupabaseClient::new("https://example.supabase.co", "key");
        let url = client
            .query_url(
                "highscores",
                &[("wallet_address", "eq.x&or=(total_kills.gt.0)")],
            )
            .unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            [(
                "wallet_address".to_string(),
                "eq.x&or=(total_kills.gt.0)".to_string()
            )]
        );
        assert!(!url.query().unwrap_or_default().contains("&or="));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = SupabaseClient::new("https://example.supabase.co/", "key");
        assert_eq!(
            client.rest_url("highscores"),
            "https://example.supabase.co/rest/v1/highscores"
        );
    }
}
