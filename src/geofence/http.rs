use std::time::Duration;

use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin JSON client for the attendance backend.
///
/// Errors are returned as display strings; callers wrap them in the
/// error variant that fits their operation.
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: api_url.into(),
            token,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let request = self.authorize(self.client.get(self.url(path)));
        send_json(request).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, String>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(self.url(path)).json(body));
        send_json(request).await
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, String> {
    let response = request.send().await.map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string());
    }

    response
        .json::<T>()
        .await
        .map_err(|e| format!("invalid response body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_without_double_slashes() {
        let client = BackendClient::new("http://localhost:8051/api/v1/", None);
        assert_eq!(
            client.url("/attendance/check-location"),
            "http://localhost:8051/api/v1/attendance/check-location"
        );
        assert_eq!(client.url("offices"), "http://localhost:8051/api/v1/offices");
    }
}
