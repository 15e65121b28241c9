use clap::Parser;
use reqwest::Url;

use crate::{
    api::{
        audit::{Fanout, Journal, TracingAudit},
        heartbeat::Heartbeat,
        home_assistant::{self, MqttTransport, Telemetry},
        tibber,
        transport::{CommandTransport, Scout},
    },
    engine::{Engine, config::Config},
    prelude::*,
};

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// Home Assistant long-lived access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    access_token: String,

    /// Home Assistant base URL. For example: `http://homeassistant.local:8123`.
    #[clap(long = "home-assistant-base-url", env = "HOME_ASSISTANT_BASE_URL")]
    base_url: Url,
}

impl HomeAssistantArgs {
    pub fn try_new_client(&self) -> Result<home_assistant::Api> {
        home_assistant::Api::try_new(&self.access_token, self.base_url.clone())
    }
}

#[derive(Parser)]
pub struct TibberArgs {
    #[clap(long = "tibber-access-token", env = "TIBBER_ACCESS_TOKEN")]
    access_token: String,

    #[clap(long = "tibber-url", env = "TIBBER_URL", default_value = tibber::Api::DEFAULT_URL)]
    url: Url,

    /// Home to take the prices of, the first subscribed home by default.
    #[clap(long = "tibber-home-id", env = "TIBBER_HOME_ID")]
    home_id: Option<String>,
}

impl TibberArgs {
    pub fn try_new_client(&self) -> Result<tibber::Api> {
        tibber::Api::try_new(&self.access_token, self.url.clone(), self.home_id.clone())
    }
}

/// Everything needed to wire up the engine.
#[derive(Parser)]
pub struct EngineArgs {
    /// Log the commands instead of publishing them (dry run).
    #[clap(long)]
    scout: bool,

    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    heartbeat_url: Option<Url>,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    tibber: TibberArgs,
}

impl EngineArgs {
    pub fn try_new_engine(&self, config: &Config) -> Result<Engine> {
        if config.inverters.is_empty() {
            warn!("no inverters are configured, nothing will be published");
        }
        let home_assistant = self.home_assistant.try_new_client()?;
        let transport: Box<dyn CommandTransport> = if self.scout {
            Box::new(Scout)
        } else {
            Box::new(MqttTransport::new(home_assistant.clone()))
        };
        let audit = match &config.journal {
            Some(path) => Fanout::default().with(TracingAudit).with(Journal::new(path)),
            None => Fanout::default().with(TracingAudit),
        };
        let (evaluator, learner) = config.evaluator();
        Ok(Engine::builder()
            .provider(Box::new(self.tibber.try_new_client()?))
            .telemetry(Box::new(Telemetry::new(home_assistant, config.telemetry.clone())))
            .transport(transport)
            .audit(Box::new(audit))
            .learner(learner)
            .evaluator(evaluator)
            .analyzer(config.analyzer())
            .detector(config.detector())
            .limits(config.limits())
            .timeouts(config.timeouts())
            .topology(config.inverters.clone())
            .dispatcher(config.dispatcher())
            .heartbeat(Heartbeat::try_new(self.heartbeat_url.clone())?)
            .build())
    }
}
