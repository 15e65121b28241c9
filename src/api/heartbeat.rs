use std::time::Duration;

use reqwest::{Client, Url};

use crate::prelude::*;

/// Optional ping to an uptime monitor after every tick.
#[derive(Clone, Default)]
pub struct Heartbeat(Option<(Client, Url)>);

impl Heartbeat {
    pub fn try_new(url: Option<Url>) -> Result<Self> {
        let Some(url) = url else {
            return Ok(Self(None));
        };
        let client = Client::builder().timeout(Duration::from_secs(3)).build()?;
        Ok(Self(Some((client, url))))
    }

    pub async fn send(&self) {
        if let Some((client, url)) = &self.0
            && let Err(error) = Self::send_fallible(client, url.clone()).await
        {
            warn!("failed to send the heartbeat: {error:#}");
        }
    }

    #[instrument(skip_all)]
    async fn send_fallible(client: &Client, url: Url) -> Result {
        debug!("sending a heartbeat…");
        client.post(url).send().await?.error_for_status()?;
        Ok(())
    }
}
