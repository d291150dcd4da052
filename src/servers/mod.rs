mod http;

use crate::config::HvConfig;
use crate::gateway::RequestGateway;
use crate::stats::StatsAggregator;
use std::sync::Arc;

pub use self::http::HttpServer;

/// Everything a request handler needs, cheap to clone per connection.
#[derive(Clone)]
pub struct State {
    pub gateway: RequestGateway,
    pub stats: StatsAggregator,
    pub config: Arc<HvConfig>,
}

impl State {
    pub fn new(gateway: RequestGateway, stats: StatsAggregator, config: Arc<HvConfig>) -> State {
        State {
            gateway,
            stats,
            config,
        }
    }
}
