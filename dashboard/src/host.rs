//! Bridge for running embedded in a host fleet-management platform, which
//! drives the dashboard through initialize/focus/blur callbacks.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::errors::Result;
use crate::poller::PollerHandle;
use crate::session::{HostSession, SessionManager};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostEvent {
    Initialize { session: HostSession },
    Focus,
    Blur,
}

#[derive(Clone)]
pub struct HostBridge {
    session: Arc<SessionManager>,
    poller: PollerHandle,
}

impl HostBridge {
    pub fn new(session: Arc<SessionManager>, poller: PollerHandle) -> Self {
        Self { session, poller }
    }

    pub async fn handle(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Initialize { session } => {
                info!("Host initialize for {}", session.user_name);
                self.session.login_with_host_session(&session).await?;
                self.poller.resume();
            }
            HostEvent::Focus => {
                info!("Host focus, resuming polling");
                self.poller.resume();
            }
            HostEvent::Blur => {
                info!("Host blur, pausing polling");
                self.poller.pause();
            }
        }
        Ok(())
    }
}
