//! Owns the engine state and drives the watcher through status changes.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{RelayMetadataSource, ScopeRegistry, SiteMetadataCache};
use crate::config::EngineConfig;
use crate::dom::{NavigationEvent, Page};
use crate::relay::Relay;
use crate::resolver::LinkResolver;
use crate::rewrite::RewriteEngine;
use crate::status::{IconSink, StatusCell, Transition, TriState};
use crate::watcher::{DomWatcher, ObserverHandle};

/// Where the persisted status is read from on re-initialization.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Returns the persisted status. Unreadable state counts as disabled.
    async fn load_status(&self) -> TriState;
}

/// The single owner of engine state for one page.
pub struct StatusController {
    page: Arc<dyn Page>,
    status: Arc<StatusCell>,
    scopes: Arc<ScopeRegistry>,
    engine: Arc<RewriteEngine>,
    source: Option<Arc<dyn StatusSource>>,
    watcher: tokio::sync::Mutex<Option<DomWatcher>>,
    listeners: Mutex<Vec<ObserverHandle>>,
}

impl StatusController {
    /// Creates a disabled controller for `page`.
    pub fn new(
        page: Arc<dyn Page>,
        relay: Arc<dyn Relay>,
        icon: Arc<dyn IconSink>,
        config: EngineConfig,
    ) -> Self {
        let status = Arc::new(StatusCell::new(icon));
        let scopes = Arc::new(ScopeRegistry::new());
        let metadata = Arc::new(SiteMetadataCache::new(Arc::new(RelayMetadataSource::new(
            Arc::clone(&relay),
            config.metadata.clone(),
        ))));
        let engine = Arc::new(RewriteEngine::new(
            config,
            page.form_factor(),
            Arc::clone(&status),
            Arc::clone(&scopes),
            LinkResolver::new(relay),
            metadata,
        ));

        Self {
            page,
            status,
            scopes,
            engine,
            source: None,
            watcher: tokio::sync::Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Sets where [`reinitialize`](Self::reinitialize) reads the status from.
    pub fn with_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status(&self) -> TriState {
        self.status.current()
    }

    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    pub fn engine(&self) -> &Arc<RewriteEngine> {
        &self.engine
    }

    /// Returns true while the watcher is running.
    pub async fn is_watching(&self) -> bool {
        self.watcher.lock().await.is_some()
    }

    /// Applies a status change.
    ///
    /// Enabling from disabled starts the watcher with a full rescan.
    /// Disabling stops it and clears every seen-link set. Re-entering the
    /// current coarse state only updates the icon.
    pub async fn set_status(&self, new: TriState) -> Transition {
        self.apply(new, false).await
    }

    /// Re-reads the persisted status and applies it, restarting the watcher
    /// if it stays enabled.
    pub async fn reinitialize(&self) -> TriState {
        let status = match &self.source {
            Some(source) => source.load_status().await,
            None => self.status.current(),
        };
        self.apply(status, true).await;
        status
    }

    async fn apply(&self, new: TriState, restart: bool) -> Transition {
        // A disable lands before queueing on the watcher, so a start still
        // running its initial rescan drops whatever it resolves.
        let early = (!new.is_enabled()).then(|| {
            let transition = self.status.set(new);
            self.scopes.reset_all();
            transition
        });

        let mut watcher = self.watcher.lock().await;
        let transition = match early {
            Some(transition) if !self.status.is_enabled() => transition,
            _ => self.status.set(new),
        };
        let restart = restart && transition == Transition::Unchanged && new.is_enabled();

        if !new.is_enabled() || restart {
            if let Some(running) = watcher.take() {
                running.stop().await;
            }
            self.scopes.reset_all();
        }

        if transition == Transition::Started || restart {
            let page = Arc::clone(&self.page);
            *watcher = Some(DomWatcher::start(page, Arc::clone(&self.engine)).await);
        }

        match transition {
            Transition::Started => info!("link rewriting enabled"),
            Transition::Stopped => info!("link rewriting disabled"),
            Transition::Unchanged => debug!(status = %new, "status unchanged"),
        }
        transition
    }

    /// Re-initializes whenever the page reports a window load.
    pub fn reinitialize_on_load(self: &Arc<Self>) {
        let mut navigation = self.page.subscribe_navigation();
        let controller = Arc::downgrade(self);

        self.listeners.lock().push(ObserverHandle::spawn(async move {
            while let Some(event) = navigation.recv().await {
                if event != NavigationEvent::Load {
                    continue;
                }
                let Some(controller) = Weak::upgrade(&controller) else {
                    break;
                };
                let status = controller.reinitialize().await;
                debug!(status = %status, "re-initialized after load");
            }
        }));
    }

    /// Applies every status broadcast from the relay.
    pub fn follow(self: &Arc<Self>, mut updates: broadcast::Receiver<TriState>) {
        let controller = Arc::downgrade(self);

        self.listeners.lock().push(ObserverHandle::spawn(async move {
            loop {
                let status = match updates.recv().await {
                    Ok(status) => status,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed status broadcasts");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(controller) = Weak::upgrade(&controller) else {
                    break;
                };
                controller.set_status(status).await;
            }
        }));
    }

    /// Stops the watcher and every listener.
    pub async fn shutdown(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            listener.shutdown().await;
        }
        if let Some(running) = self.watcher.lock().await.take() {
            running.stop().await;
        }
    }
}
