//! Relay Router
//!
//! Decides who receives what. Inbound tab data goes to the account's delivery
//! group, inject commands sweep the registry first and then go to the same
//! group tagged with the chosen tab. The router never touches sockets; every
//! delivery goes through [`ConnectionHub::deliver_to_group`].

use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::hub::ConnectionHub;
use crate::metrics::ServerMetrics;
use crate::registry::TabRegistry;
use crate::session::{Session, SessionRole};
use crate::ws::ServerMessage;

pub struct RelayRouter {
    registry: Arc<TabRegistry>,
    hub: Arc<ConnectionHub>,
    metrics: Arc<ServerMetrics>,
}

impl RelayRouter {
    pub fn new(
        registry: Arc<TabRegistry>,
        hub: Arc<ConnectionHub>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            registry,
            hub,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<TabRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Bind the session as a tab-side input for `account`.
    ///
    /// Input sessions never belong to a delivery group, so a former
    /// controller loses its subscription here.
    pub async fn bind_input(&self, session: &mut Session, account: &str) -> Result<(), RelayError> {
        let prev = session.bind_input(account)?;
        if matches!(prev, SessionRole::Output { .. }) {
            self.hub.leave_all(&session.connection_id).await;
        }
        info!("[ROUTER] {} bound as input for {}", session.connection_id, account);
        Ok(())
    }

    /// Bind the session as controller for `account`. Membership is reset to
    /// exactly that account's group.
    pub async fn bind_output(
        &self,
        session: &mut Session,
        account: &str,
    ) -> Result<(), RelayError> {
        session.bind_output(account)?;
        self.hub.leave_all(&session.connection_id).await;
        self.hub.join(&session.connection_id, account).await;
        info!("[ROUTER] {} bound as output for {}", session.connection_id, account);
        Ok(())
    }

    /// Refresh (or create) tab entries for the session's input account.
    pub async fn heartbeat(&self, session: &Session, tab_ids: &[String]) -> Result<(), RelayError> {
        let account = session.input_account().ok_or(RelayError::Unauthorized)?;
        self.registry.heartbeat(account, tab_ids).await;
        Ok(())
    }

    /// Remove tab entries for the session's input account.
    pub async fn forget(&self, session: &Session, tab_ids: &[String]) -> Result<(), RelayError> {
        let account = session.input_account().ok_or(RelayError::Unauthorized)?;
        let removed = self.registry.forget(account, tab_ids).await;
        debug!("[ROUTER] {} forgot {} tab(s)", account, removed);
        Ok(())
    }

    /// Relay tab data to the account's controllers. Data from a session with
    /// no input binding is dropped without telling the sender.
    /// Returns the number of recipients reached.
    pub async fn relay_inbound(&self, session: &Session, tab_id: String, data: String) -> usize {
        let Some(account) = session.input_account() else {
            debug!(
                "[ROUTER] Dropping inbound data from unbound session {}",
                session.connection_id
            );
            self.metrics.inbound_dropped();
            return 0;
        };

        self.metrics.inbound_relayed();
        self.hub
            .deliver_to_group(account, ServerMessage::Received { tab_id, data })
            .await
    }

    /// Route a command to `target`, or to a random live tab when absent.
    ///
    /// Every call prunes the account's expired tabs first and announces each
    /// removal to the account group, whether or not the command is delivered.
    /// Returns the tab the command was addressed to.
    pub async fn inject_command(
        &self,
        session: &Session,
        data: String,
        target: Option<String>,
    ) -> Result<String, RelayError> {
        let result = self.try_inject(session, data, target).await;
        match &result {
            Ok(_) => self.metrics.inject_delivered(),
            Err(_) => self.metrics.inject_rejected(),
        }
        result
    }

    async fn try_inject(
        &self,
        session: &Session,
        data: String,
        target: Option<String>,
    ) -> Result<String, RelayError> {
        let account = session.output_account().ok_or(RelayError::Unauthorized)?;

        let outcome = self.registry.pick_and_prune(account).await;
        self.metrics.tabs_pruned(outcome.removed.len());
        for tab_id in outcome.removed {
            self.hub
                .deliver_to_group(account, ServerMessage::TabRemoved { tab_id })
                .await;
        }

        let tab_id = match target {
            Some(tab_id) if outcome.live.contains(&tab_id) => tab_id,
            Some(tab_id) => return Err(RelayError::UnknownTab(tab_id)),
            None => pick_random(&outcome.live)
                .cloned()
                .ok_or(RelayError::NoLiveTabs)?,
        };

        debug!("[ROUTER] Injecting into {} tab {}", account, tab_id);
        self.hub
            .deliver_to_group(
                account,
                ServerMessage::Inject {
                    data,
                    tab_id: tab_id.clone(),
                },
            )
            .await;
        Ok(tab_id)
    }

    /// Live tabs of the controller's account. Read-only: no pruning, no
    /// notifications. Non-controllers get an empty list.
    pub async fn query_tabs(&self, session: &Session) -> Vec<String> {
        match session.output_account() {
            Some(account) => self.registry.live_tabs(account).await,
            None => Vec::new(),
        }
    }
}

/// Uniform choice over the live set; no state carried between calls.
fn pick_random(live: &[String]) -> Option<&String> {
    live.choose(&mut rand::rng())
}
