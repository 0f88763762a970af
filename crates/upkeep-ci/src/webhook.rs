//! HTTP webhook channel.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use upkeep_core::{Notification, Notifier, NotifyError};

/// POSTs each notification as `{"subject": ..., "body": ...}` JSON.
///
/// `${VAR}` references in the url and header values are resolved from the
/// environment when the notifier is built.
#[derive(Debug)]
pub struct WebhookNotifier {
    channel: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(
        channel: impl Into<String>,
        url: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let url = expand_env(url)?;
        let headers = headers
            .into_iter()
            .map(|(k, v)| expand_env(&v).map(|v| (k, v)))
            .collect::<Result<_, _>>()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("upkeep/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Config(format!("http client: {e}")))?;

        Ok(Self {
            channel: channel.into(),
            url,
            headers,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(channel = %self.channel, %status, "webhook rejected notification");
            return Err(NotifyError::Delivery(format!("webhook returned {status}: {body}")));
        }

        tracing::debug!(channel = %self.channel, %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        &self.channel
    }
}

/// Replace `${VAR}` with the value of environment variable `VAR`.
fn expand_env(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| NotifyError::Config(format!("unclosed variable in: {input}")))?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not set: {name}")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
