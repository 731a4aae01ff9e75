//! WhereAreYou Client Library
//!
//! Session storage and live location reporting for the WhereAreYou client.

pub mod auth;
pub mod config;
pub mod location;
pub mod logging;
pub mod reporter;
pub mod storage;
pub mod sync;

use std::sync::Arc;

use auth::SessionStore;
use config::Config;
use location::{Position, SharedPosition};
use reporter::LocationReporter;
use storage::FileStorage;
use sync::{ApiClient, ApiError};

/// Application state wired from a [`Config`]
pub struct AppState {
    pub sessions: SessionStore,
    pub api: ApiClient,
    pub position: SharedPosition,
    pub reporter: LocationReporter,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let storage = match &config.data_dir {
            Some(dir) => FileStorage::at(dir),
            None => FileStorage::new(),
        };
        let sessions = SessionStore::open(storage);
        let api = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let position = SharedPosition::new(config.initial_position.unwrap_or(Position::UNKNOWN));

        let reporter = LocationReporter::new(
            sessions.clone(),
            Arc::new(position.clone()),
            Arc::new(api.clone()),
            config.report_interval(),
        );

        Ok(Self {
            sessions,
            api,
            position,
            reporter,
        })
    }
}
