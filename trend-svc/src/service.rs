//! Service assembly
//!
//! Wires stores, repository, channel, publisher, pipeline and scheduler from
//! configuration. The binary and the integration tests both build through
//! here, differing only in the parts they pass in.

use std::sync::Arc;
use tokio::task::JoinHandle;
use trend_common::config::TomlConfig;
use trend_common::Clock;

use crate::channel::{BufferedChannel, ChannelSink};
use crate::error::Result;
use crate::notify::NotificationHub;
use crate::observer::Observer;
use crate::publisher::Publisher;
use crate::repository::TrendRepository;
use crate::scheduler::{PipelineComponents, Scheduler, TrendPipeline};
use crate::stats::CycleStats;
use crate::store::{ScoreStore, WindowedScoreStore};
use crate::AppState;

/// Backends chosen by the caller
pub struct ServiceParts {
    pub score_store: Arc<dyn ScoreStore>,
    pub repository: Arc<dyn TrendRepository>,
    pub observer: Arc<dyn Observer>,
    pub sink: Arc<dyn ChannelSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct TrendService {
    pub state: AppState,
    pub scheduler: Arc<Scheduler>,
    pub channel: Arc<BufferedChannel>,
    pub forwarder: JoinHandle<()>,
}

impl TrendService {
    /// Build every component; must be called inside a Tokio runtime
    pub fn assemble(config: &TomlConfig, parts: ServiceParts) -> Result<Self> {
        config.validate()?;
        let pipeline_config = &config.pipeline;

        let stats = Arc::new(CycleStats::new());
        let hub = NotificationHub::new(pipeline_config.notification_capacity);
        let (channel, forwarder) = BufferedChannel::spawn(pipeline_config.channel_capacity, parts.sink);
        let channel = Arc::new(channel);

        let publisher = Arc::new(Publisher::new(
            parts.repository.clone(),
            channel.clone(),
            hub.clone(),
            stats.clone(),
            parts.clock.clone(),
            pipeline_config.traffic_floor,
            config.default_category.clone(),
        ));

        let store = Arc::new(WindowedScoreStore::new(parts.score_store, pipeline_config.bucket_ttl()));
        let pipeline = Arc::new(TrendPipeline::new(
            PipelineComponents {
                observer: parts.observer,
                store,
                repository: parts.repository.clone(),
                publisher: publisher.clone(),
                hub: hub.clone(),
                stats: stats.clone(),
                clock: parts.clock,
            },
            pipeline_config,
        )?);

        let scheduler = Arc::new(Scheduler::new(
            pipeline.clone(),
            stats.clone(),
            pipeline_config.tick_interval(),
            pipeline_config.cycle_timeout(),
        ));

        let state = AppState {
            pipeline,
            repository: parts.repository,
            publisher,
            hub,
            stats,
        };

        Ok(Self {
            state,
            scheduler,
            channel,
            forwarder,
        })
    }
}
