use std::sync::Arc;

use teloxide::Bot;

use crate::config::Config;
use crate::db::database::Database;
use crate::llm::LlmGateway;
use crate::scheduler::Scheduler;

/// Everything a request handler needs, built once in `main` and cloned per
/// request. All fields are cheap-clone handles; requests share no other
/// mutable state.
#[derive(Clone)]
pub struct AppState {
    pub bot: Bot,
    pub http: reqwest::Client,
    pub db: Database,
    pub gateway: LlmGateway,
    pub scheduler: Arc<dyn Scheduler>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        bot: Bot,
        http: reqwest::Client,
        db: Database,
        gateway: LlmGateway,
        scheduler: Arc<dyn Scheduler>,
        config: Arc<Config>,
    ) -> Self {
        AppState {
            bot,
            http,
            db,
            gateway,
            scheduler,
            config,
        }
    }
}
