use async_trait::async_trait;

use crate::prelude::*;

#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Deliver the value to the topic once, the caller does not retry.
    async fn publish(&self, topic: &str, value: &str) -> Result;
}

/// Dry run: logs the commands instead of publishing them.
#[derive(Copy, Clone, Debug, Default)]
pub struct Scout;

#[async_trait]
impl CommandTransport for Scout {
    async fn publish(&self, topic: &str, value: &str) -> Result {
        info!(topic, value, "scouting, not publishing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scout_always_succeeds() -> Result {
        Scout.publish("solar_assistant/inverter_1/grid_charge/set", "Enabled").await
    }
}
