//! Thin JSON client for the node API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
    #[serde(default)]
    retryable: bool,
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: Result<reqwest::Response, reqwest::Error>,
) -> anyhow::Result<T> {
    let r = match resp {
        Ok(r) => r,
        Err(e) => {
            anyhow::bail!(
                "could not reach node at {}: {}\nIs the node running? Start it with: census-node",
                endpoint,
                e
            );
        }
    };

    let status = r.status();
    if status.is_success() {
        return Ok(r.json().await?);
    }
    match r.json::<ErrorResponse>().await {
        Ok(err) if err.retryable => {
            anyhow::bail!("{} (HTTP {}, retryable): {}", err.code, status, err.error)
        }
        Ok(err) => anyhow::bail!("{} (HTTP {}): {}", err.code, status, err.error),
        Err(_) => anyhow::bail!("node returned HTTP {}", status),
    }
}

pub async fn get<T: DeserializeOwned>(endpoint: &str, path: &str) -> anyhow::Result<T> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    decode(endpoint, reqwest::get(&url).await).await
}

pub async fn post<B: Serialize, T: DeserializeOwned>(
    endpoint: &str,
    path: &str,
    body: &B,
) -> anyhow::Result<T> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    let client = reqwest::Client::new();
    decode(endpoint, client.post(&url).json(body).send().await).await
}

/// Pretty-print any JSON response.
pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
