use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

use super::ReplicationClient;
use super::protocol::{ENDPOINT_INTERNAL_KEYS, ENDPOINT_INTERNAL_REFRESH, PutKeyRequest};
use crate::error::{Error, Result};

/// Talks to peers over their internal HTTP endpoints.
///
/// Node addresses are `host:port`. Without a timeout the client's defaults
/// apply, so a hung peer stalls only the request that called it.
#[derive(Clone)]
pub struct HttpReplicationClient {
    http_client: reqwest::Client,
}

impl HttpReplicationClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http_client: builder.build()?,
        })
    }

    fn url(node: &str, endpoint: &str, key: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&format!("http://{}", node))
            .map_err(|e| Error::RemoteUnavailable {
                node: node.to_string(),
                reason: format!("invalid address: {}", e),
            })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::RemoteUnavailable {
                node: node.to_string(),
                reason: "address cannot carry a path".to_string(),
            })?;
            segments.pop_if_empty();
            segments.extend(endpoint.trim_start_matches('/').split('/'));
            if let Some(key) = key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    async fn fetch(&self, node: &str, key: &str) -> Result<Option<Value>> {
        let url = Self::url(node, ENDPOINT_INTERNAL_KEYS, Some(key))?;
        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable {
                node: node.to_string(),
                reason: format!("GET returned {}", response.status()),
            });
        }

        match response.json::<Value>().await? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }
}

#[async_trait]
impl ReplicationClient for HttpReplicationClient {
    async fn push(
        &self,
        node: &str,
        key: &str,
        value: &Value,
        expiration: DateTime<Utc>,
    ) -> Result<()> {
        let url = Self::url(node, ENDPOINT_INTERNAL_KEYS, Some(key))?;
        let payload = PutKeyRequest::new(value.clone(), expiration);

        let response = self
            .http_client
            .put(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable {
                node: node.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable {
                node: node.to_string(),
                reason: format!("PUT returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn pull(&self, node: &str, key: &str) -> Option<Value> {
        match self.fetch(node, key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Pull of {} from {} failed: {}", key, node, e);
                None
            }
        }
    }

    async fn broadcast_refresh(&self, nodes: &[String], local: &str) {
        for node in nodes.iter().filter(|node| node.as_str() != local) {
            let url = match Self::url(node, ENDPOINT_INTERNAL_REFRESH, None) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping refresh notice: {}", e);
                    continue;
                }
            };

            let http_client = self.http_client.clone();
            let node = node.clone();
            tokio::spawn(async move {
                match http_client.post(url).send().await {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!("Refresh notice accepted by {}", node);
                    }
                    Ok(response) => {
                        tracing::warn!("Refresh notice to {} returned {}", node, response.status());
                    }
                    Err(e) => tracing::warn!("Refresh notice to {} failed: {}", node, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_key_as_single_segment() {
        let url =
            HttpReplicationClient::url("10.0.0.2:5000", ENDPOINT_INTERNAL_KEYS, Some("a/b c")).unwrap();

        assert_eq!(url.as_str(), "http://10.0.0.2:5000/internal/keys/a%2Fb%20c");
    }

    #[test]
    fn test_refresh_url() {
        let url = HttpReplicationClient::url("node-b:7000", ENDPOINT_INTERNAL_REFRESH, None).unwrap();

        assert_eq!(url.as_str(), "http://node-b:7000/internal/refresh");
    }

    #[tokio::test]
    async fn test_pull_from_unreachable_peer_is_a_miss() {
        let client = HttpReplicationClient::new(Some(Duration::from_millis(200))).unwrap();

        // Port 9 (discard) on localhost is closed in test environments
        assert_eq!(client.pull("127.0.0.1:9", "k").await, None);
    }

    #[tokio::test]
    async fn test_push_to_unreachable_peer_reports_remote_unavailable() {
        let client = HttpReplicationClient::new(Some(Duration::from_millis(200))).unwrap();

        let err = client
            .push("127.0.0.1:9", "k", &Value::from(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable { .. }));
    }
}
