use async_trait::async_trait;

use crate::{core::snapshot::SystemSnapshot, prelude::*};

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read the whole snapshot at once, absent readings are zeros.
    async fn snapshot(&self) -> Result<SystemSnapshot>;
}
