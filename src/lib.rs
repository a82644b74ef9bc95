pub mod api;
pub mod cli;
pub mod config;
pub mod listener;
pub mod notifications;
pub mod realtime;
pub mod startup;
pub mod supabase;
pub mod utils;

use config::Config;
use notifications::NotificationService;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub notifications: Arc<NotificationService>,
    /// Whether the realtime listener was started
    pub realtime_enabled: bool,
}

impl AppState {
    pub fn new(
        config: Config,
        notifications: Arc<NotificationService>,
        realtime_enabled: bool,
    ) -> Self {
        Self {
            config,
            notifications,
            realtime_enabled,
        }
    }
}
