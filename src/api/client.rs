use std::time::Duration;

use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::prelude::*;

/// Build a client which authenticates with the bearer token.
pub fn try_new(access_token: &str, timeout: Duration) -> Result<Client> {
    let mut authorization = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .context("the access token is not a valid header value")?;
    authorization.set_sensitive(true);
    let headers = HeaderMap::from_iter([(AUTHORIZATION, authorization)]);
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("failed to build the HTTP client")
}
