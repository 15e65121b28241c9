//! [Home Assistant REST API](https://developers.home-assistant.io/docs/api/rest/) client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    api::{client, telemetry::TelemetrySource, transport::CommandTransport},
    core::snapshot::SystemSnapshot,
    prelude::*,
    quantity::{
        electric::{AmpereHours, Volts},
        percent::Percent,
        power::Watts,
    },
};

#[derive(Clone)]
pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        Ok(Self { client: client::try_new(access_token, Duration::from_secs(10))?, base_url })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Numeric state of the entity, zero if it is unavailable or not a number.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_numeric_state(&self, entity_id: &str) -> Result<f64> {
        let state: EntityState = self
            .client
            .get(self.url(&["states", entity_id])?)
            .send()
            .await
            .with_context(|| format!("failed to request the state of `{entity_id}`"))?
            .error_for_status()
            .with_context(|| format!("failed to get the state of `{entity_id}`"))?
            .json()
            .await
            .with_context(|| format!("failed to deserialize the state of `{entity_id}`"))?;
        Ok(state.numeric_value())
    }

    #[instrument(skip_all, fields(domain = domain, service = service))]
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &serde_json::Value,
    ) -> Result {
        self.client
            .post(self.url(&["services", domain, service])?)
            .json(data)
            .send()
            .await
            .with_context(|| format!("failed to call `{domain}.{service}`"))?
            .error_for_status()
            .with_context(|| format!("`{domain}.{service}` failed"))?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct EntityState {
    state: String,
}

impl EntityState {
    fn numeric_value(&self) -> f64 {
        self.state.parse().ok().filter(|value: &f64| value.is_finite()).unwrap_or_else(|| {
            debug!(state = %self.state, "not a number, assuming zero");
            0.0
        })
    }
}

/// Entity IDs of the snapshot readings, missing entities read as zeros.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entities {
    pub battery_soc: Option<String>,
    pub pv_power: Option<String>,
    pub load: Option<String>,
    pub grid_power: Option<String>,
    pub grid_voltage: Option<String>,
    pub battery_voltage: Option<String>,
    pub battery_capacity_ah: Option<String>,
}

impl Default for Entities {
    fn default() -> Self {
        Self {
            battery_soc: Some("sensor.battery_state_of_charge".to_owned()),
            pv_power: Some("sensor.pv_power".to_owned()),
            load: Some("sensor.load_power".to_owned()),
            grid_power: Some("sensor.grid_power".to_owned()),
            grid_voltage: Some("sensor.grid_voltage".to_owned()),
            battery_voltage: Some("sensor.battery_voltage".to_owned()),
            battery_capacity_ah: None,
        }
    }
}

pub struct Telemetry {
    api: Api,
    entities: Entities,
}

impl Telemetry {
    pub const fn new(api: Api, entities: Entities) -> Self {
        Self { api, entities }
    }

    /// `None` when the entity is not configured.
    async fn read(&self, entity_id: Option<&str>) -> Option<Result<f64>> {
        match entity_id {
            Some(entity_id) => Some(self.api.get_numeric_state(entity_id).await),
            None => None,
        }
    }
}

#[async_trait]
impl TelemetrySource for Telemetry {
    #[instrument(skip_all)]
    async fn snapshot(&self) -> Result<SystemSnapshot> {
        let entities = &self.entities;
        let readings = tokio::join!(
            self.read(entities.battery_soc.as_deref()),
            self.read(entities.pv_power.as_deref()),
            self.read(entities.load.as_deref()),
            self.read(entities.grid_power.as_deref()),
            self.read(entities.grid_voltage.as_deref()),
            self.read(entities.battery_voltage.as_deref()),
            self.read(entities.battery_capacity_ah.as_deref()),
        );
        let [
            battery_soc,
            pv_power,
            load,
            grid_power,
            grid_voltage,
            battery_voltage,
            battery_capacity_ah,
        ] = or_zeros([
            readings.0, readings.1, readings.2, readings.3, readings.4, readings.5, readings.6,
        ])?;
        let snapshot = SystemSnapshot {
            battery_soc: Percent(battery_soc),
            pv_power: Watts(pv_power),
            load: Watts(load),
            grid_power: Watts(grid_power),
            grid_voltage: Volts(grid_voltage),
            battery_voltage: Volts(battery_voltage),
            battery_capacity_ah: AmpereHours(battery_capacity_ah),
        };
        debug!(?snapshot, "read");
        Ok(snapshot)
    }
}

/// Failed and unconfigured readings count as zeros.
///
/// Fails only when every configured reading has failed.
fn or_zeros<const N: usize>(readings: [Option<Result<f64>>; N]) -> Result<[f64; N]> {
    let n_configured = readings.iter().flatten().count();
    let mut n_failed = 0;
    let mut last_error = None;
    let values = readings.map(|reading| match reading {
        Some(Ok(value)) => value,
        Some(Err(error)) => {
            warn!("assuming zero: {error:#}");
            n_failed += 1;
            last_error = Some(error);
            0.0
        }
        None => 0.0,
    });
    match last_error {
        Some(error) if n_failed == n_configured => {
            Err(error.context("every telemetry reading has failed"))
        }
        _ => Ok(values),
    }
}

/// Publishes the commands through the `mqtt.publish` service.
pub struct MqttTransport(Api);

impl MqttTransport {
    pub const fn new(api: Api) -> Self {
        Self(api)
    }
}

#[async_trait]
impl CommandTransport for MqttTransport {
    async fn publish(&self, topic: &str, value: &str) -> Result {
        self.0.call_service("mqtt", "publish", &json!({ "topic": topic, "payload": value })).await
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_deserialize_state_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "entity_id": "sensor.battery_state_of_charge",
                "state": "87",
                "attributes": {
                    "state_class": "measurement",
                    "unit_of_measurement": "%",
                    "device_class": "battery",
                    "friendly_name": "Battery state of charge"
                },
                "last_changed": "2025-11-03T09:41:07.673333+00:00",
                "last_updated": "2025-11-03T09:41:07.673333+00:00"
            }
        "#;
        let state = serde_json::from_str::<EntityState>(RESPONSE)?;
        assert_abs_diff_eq!(state.numeric_value(), 87.0);
        Ok(())
    }

    #[test]
    fn test_unavailable_state_is_zero() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"{"entity_id": "sensor.grid_voltage", "state": "unavailable"}"#;
        let state = serde_json::from_str::<EntityState>(RESPONSE)?;
        assert_abs_diff_eq!(state.numeric_value(), 0.0);
        Ok(())
    }

    #[test]
    fn test_failed_reading_is_zero() -> Result {
        let values = or_zeros([Some(Ok(87.0)), Some(Err(anyhow!("404 Not Found"))), None])?;
        assert_eq!(values, [87.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_every_reading_failed() {
        let result = or_zeros([Some(Err(anyhow!("connection refused"))), None]);
        let error = result.unwrap_err();
        assert!(format!("{error:#}").contains("connection refused"), "{error:#}");
    }

    #[test]
    fn test_nothing_configured_is_zeros() -> Result {
        assert_eq!(or_zeros::<2>([None, None])?, [0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_url() -> Result {
        let api = Api::try_new("token", Url::parse("http://homeassistant.local:8123/")?)?;
        assert_eq!(
            api.url(&["states", "sensor.pv_power"])?.as_str(),
            "http://homeassistant.local:8123/api/states/sensor.pv_power",
        );
        assert_eq!(
            api.url(&["services", "mqtt", "publish"])?.as_str(),
            "http://homeassistant.local:8123/api/services/mqtt/publish",
        );
        Ok(())
    }

    #[test]
    fn test_deserialize_partial_entities() -> Result {
        // language=TOML
        const ENTITIES: &str = r#"
            battery_soc = "sensor.deye_battery_soc"
            battery_capacity_ah = "sensor.deye_battery_capacity"
        "#;
        let entities: Entities = toml::from_str(ENTITIES)?;
        assert_eq!(entities.battery_soc.as_deref(), Some("sensor.deye_battery_soc"));
        assert_eq!(entities.pv_power.as_deref(), Some("sensor.pv_power"));
        assert_eq!(entities.battery_capacity_ah.as_deref(), Some("sensor.deye_battery_capacity"));
        Ok(())
    }
}
