use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    api::transport::CommandTransport,
    core::decision::Action,
    dispatch::inverter::{CommandValue, InverterId, Topology},
    error::EngineError,
    prelude::*,
};

/// Single published setting.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub inverter_id: InverterId,
    pub topic: String,
    pub value: String,

    /// Whether the transport accepted it.
    pub success: bool,
}

/// Translates actions into inverter settings and publishes only the changed ones.
#[must_use]
#[derive(Clone, Debug)]
pub struct Dispatcher {
    topic_prefix: String,
    last_values: BTreeMap<InverterId, CommandValue>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOPIC_PREFIX)
    }
}

impl Dispatcher {
    pub const DEFAULT_TOPIC_PREFIX: &'static str = "solar_assistant";

    /// Action which puts every inverter into the safe state.
    pub const SAFE_STATE: Action = Action::StopCharging;

    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self { topic_prefix: topic_prefix.into(), last_values: BTreeMap::new() }
    }

    #[must_use]
    pub const fn last_values(&self) -> &BTreeMap<InverterId, CommandValue> {
        &self.last_values
    }

    /// Drop the remembered values of the inverters which are no longer in the topology.
    pub fn retain(&mut self, topology: &Topology) {
        let known = topology.iter().map(|(inverter_id, _)| inverter_id).collect::<Vec<_>>();
        self.last_values.retain(|inverter_id, _| known.contains(&inverter_id));
    }

    /// Publish the action to every inverter whose last value differs.
    #[instrument(skip_all, fields(action = ?action))]
    pub async fn dispatch(
        &mut self,
        action: Action,
        topology: &Topology,
        transport: &dyn CommandTransport,
    ) -> Vec<Command> {
        if !action.is_commanded() {
            trace!("nothing to command");
            return Vec::new();
        }
        self.send(action, topology, transport, false).await
    }

    /// Publish the safe state to every inverter, even if it is already there.
    #[instrument(skip_all)]
    pub async fn force_safe_state(
        &mut self,
        topology: &Topology,
        transport: &dyn CommandTransport,
    ) -> Vec<Command> {
        info!(n_inverters = topology.len(), "forcing the safe state…");
        self.send(Self::SAFE_STATE, topology, transport, true).await
    }

    async fn send(
        &mut self,
        action: Action,
        topology: &Topology,
        transport: &dyn CommandTransport,
        force: bool,
    ) -> Vec<Command> {
        let mut commands = Vec::new();
        for (inverter_id, inverter) in topology.iter() {
            let Some(value) = inverter.profile.command_value(action) else {
                continue;
            };
            if !force && self.last_values.get(inverter_id) == Some(&value) {
                debug!(%inverter_id, %value, "unchanged");
                continue;
            }
            info!(%inverter_id, %value, "publishing…");
            for (setting, payload) in value.settings() {
                let topic = format!("{}/{inverter_id}/{setting}/set", self.topic_prefix);
                let success = match transport.publish(&topic, &payload).await {
                    Ok(()) => true,
                    Err(source) => {
                        let error =
                            Error::from(EngineError::Transport { topic: topic.clone(), source });
                        warn!(%inverter_id, "{error:#}");
                        false
                    }
                };
                commands.push(Command {
                    inverter_id: inverter_id.clone(),
                    topic,
                    value: payload,
                    success,
                });
            }
            // The core does not retry, a failed publish is not re-sent until the value changes.
            self.last_values.insert(inverter_id.clone(), value);
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::inverter::{InverterConfig, InverterProfile},
        engine::testing::RecordingTransport,
    };

    fn topology() -> Topology {
        [
            (
                InverterId::from("inverter_1"),
                InverterConfig { profile: InverterProfile::PriorityList, capacity: None },
            ),
            (
                InverterId::from("inverter_2"),
                InverterConfig { profile: InverterProfile::Legacy, capacity: None },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_dispatch_publishes_every_setting() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::default();
        let commands = dispatcher.dispatch(Action::ChargeGrid, &topology(), &transport).await;
        assert_eq!(commands.len(), 4);
        assert!(commands.iter().all(|command| command.success));
        assert_eq!(
            transport.published(),
            [
                (
                    "solar_assistant/inverter_1/charger_source_priority/set".to_owned(),
                    "Solar and utility simultaneously".to_owned(),
                ),
                (
                    "solar_assistant/inverter_1/output_source_priority/set".to_owned(),
                    "Utility first".to_owned(),
                ),
                ("solar_assistant/inverter_2/grid_charge/set".to_owned(), "Enabled".to_owned()),
                (
                    "solar_assistant/inverter_2/energy_pattern/set".to_owned(),
                    "Battery first".to_owned(),
                ),
            ],
        );
    }

    #[tokio::test]
    async fn test_same_value_is_not_resent() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::new("inverters");
        dispatcher.dispatch(Action::ChargeSolar, &topology(), &transport).await;
        let commands = dispatcher.dispatch(Action::ChargeSolar, &topology(), &transport).await;
        assert!(commands.is_empty());
        assert_eq!(transport.published().len(), 4);
    }

    #[tokio::test]
    async fn test_only_changed_inverters_are_sent() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::default();
        dispatcher.dispatch(Action::StopCharging, &topology(), &transport).await;

        // Legacy inverters do not distinguish discharging from not charging:
        let commands = dispatcher.dispatch(Action::Discharge, &topology(), &transport).await;
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|command| command.inverter_id == "inverter_1".into()));
    }

    #[tokio::test]
    async fn test_non_commanded_action_sends_nothing() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::default();
        for action in [Action::Monitor, Action::ExportSolar, Action::Idle, Action::Error] {
            assert!(dispatcher.dispatch(action, &topology(), &transport).await.is_empty());
        }
        assert!(dispatcher.last_values().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_inverters() {
        let transport = RecordingTransport::failing_on("solar_assistant/inverter_1/");
        let mut dispatcher = Dispatcher::default();
        let commands = dispatcher.dispatch(Action::ChargeGrid, &topology(), &transport).await;
        assert_eq!(commands.len(), 4);
        assert_eq!(commands.iter().filter(|command| command.success).count(), 2);
        assert_eq!(dispatcher.last_values().len(), 2);
    }

    #[tokio::test]
    async fn test_force_safe_state_bypasses_deduplication() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::default();
        dispatcher.dispatch(Action::StopCharging, &topology(), &transport).await;
        let commands = dispatcher.force_safe_state(&topology(), &transport).await;
        assert_eq!(commands.len(), 4);
        assert_eq!(transport.published().len(), 8);
    }

    #[tokio::test]
    async fn test_retain() {
        let transport = RecordingTransport::default();
        let mut dispatcher = Dispatcher::default();
        dispatcher.dispatch(Action::ChargeGrid, &topology(), &transport).await;
        let topology: Topology = topology()
            .iter()
            .skip(1)
            .map(|(inverter_id, config)| (inverter_id.clone(), *config))
            .collect();
        dispatcher.retain(&topology);
        assert_eq!(dispatcher.last_values().len(), 1);
    }
}
