use std::time::Duration;

use tracing::debug;

use crate::error::DispatchError;
use podwatch_types::NotificationPayload;

/// Timeout applied to the whole notification request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts notification payloads to caller-supplied webhook URLs
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    client: reqwest::Client,
}

impl NotificationDispatcher {
    /// Create a dispatcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Send `payload` to `return_url` once. Non-2xx responses are errors.
    pub async fn dispatch(
        &self,
        return_url: &str,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        let response = self.client.post(return_url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(
            status = status.as_u16(),
            report_status = ?payload.status,
            "Notification delivered"
        );
        Ok(())
    }
}
