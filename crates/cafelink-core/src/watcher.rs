//! Mutation and navigation watching.
//!
//! One observer task per watched document. The main document observer
//! rescans when added nodes contain candidate anchors and registers frames
//! as they appear. Each frame gets its own observer with its own debounce
//! and follows the frame across navigations via its load notifications.
//!
//! Observers own their subscriptions, so shutting one down unsubscribes it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::dom::{
    Document, Frame, LoadStream, MutationBatch, MutationStream, NavigationEvent,
    NavigationStream, Page,
};
use crate::rewrite::RewriteEngine;

/// A running observer. Dropping it stops the observer.
#[derive(Debug)]
pub struct ObserverHandle {
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(future)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stops the observer and waits until its subscriptions are released.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct WatchContext {
    engine: Arc<RewriteEngine>,
    frames: Mutex<HashMap<u64, ObserverHandle>>,
    closed: AtomicBool,
}

impl WatchContext {
    /// Starts observing `frame` unless it is already observed.
    fn register_frame(self: &Arc<Self>, frame: Arc<dyn Frame>) {
        let id = frame.id();
        let mut frames = self.frames.lock();
        if self.closed.load(Ordering::SeqCst) || frames.contains_key(&id) {
            return;
        }

        debug!(frame = id, "observing frame");
        let loads = frame.subscribe_load();
        let handle = ObserverHandle::spawn(watch_frame(Arc::clone(self), frame, loads));
        frames.insert(id, handle);
    }

    fn spawn_rescan(&self, doc: Arc<dyn Document>) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.rescan(doc).await;
        });
    }

    fn close(&self) -> Vec<ObserverHandle> {
        let mut frames = self.frames.lock();
        self.closed.store(true, Ordering::SeqCst);
        frames.drain().map(|(_, handle)| handle).collect()
    }
}

/// Watches the main document, its frames, and history navigation.
pub struct DomWatcher {
    ctx: Arc<WatchContext>,
    observers: Vec<ObserverHandle>,
}

impl DomWatcher {
    /// Starts watching `page`.
    ///
    /// Subscribes first so that nothing added during the initial rescan is
    /// missed, then rescans the main document once before any mutation
    /// batch is delivered.
    pub async fn start(page: Arc<dyn Page>, engine: Arc<RewriteEngine>) -> Self {
        let ctx = Arc::new(WatchContext {
            engine: Arc::clone(&engine),
            frames: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let doc = page.main_document();
        let mutations = match doc.subscribe() {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(doc = %doc.id(), "cannot observe main document: {}", e);
                None
            }
        };
        let navigation = page.subscribe_navigation();

        for frame in doc.frames() {
            ctx.register_frame(frame);
        }

        engine.scopes().reset(doc.id());
        engine.rescan(Arc::clone(&doc)).await;

        let mut observers = Vec::new();
        if let Some(stream) = mutations {
            observers.push(ObserverHandle::spawn(watch_main(
                Arc::clone(&ctx),
                doc,
                stream,
            )));
        }
        observers.push(ObserverHandle::spawn(watch_navigation(
            Arc::clone(&ctx),
            page,
            navigation,
        )));

        info!(frames = ctx.frames.lock().len(), "watching page");
        Self { ctx, observers }
    }

    /// Number of frames being observed.
    pub fn frame_count(&self) -> usize {
        self.ctx.frames.lock().len()
    }

    /// Stops every observer and releases every subscription.
    pub async fn stop(mut self) {
        for observer in std::mem::take(&mut self.observers) {
            observer.shutdown().await;
        }
        for observer in self.ctx.close() {
            observer.shutdown().await;
        }
        info!("stopped watching page");
    }
}

impl Drop for DomWatcher {
    fn drop(&mut self) {
        self.observers.clear();
        // Frame tasks hold the context; dropping their handles breaks the cycle.
        self.ctx.close();
    }
}

async fn watch_main(ctx: Arc<WatchContext>, doc: Arc<dyn Document>, mut mutations: MutationStream) {
    let debouncer = {
        let engine = Arc::clone(&ctx.engine);
        let doc = Arc::clone(&doc);
        Debouncer::new(engine.config().debounce(), move || {
            let engine = Arc::clone(&engine);
            let doc = Arc::clone(&doc);
            async move {
                engine.rescan(doc).await;
            }
        })
    };
    let selector = ctx.engine.anchor_selector().to_string();

    while let Some(batch) = mutations.recv().await {
        for frame in batch.frames() {
            ctx.register_frame(Arc::clone(frame));
        }
        if batch.adds_match(&selector) {
            debouncer.trigger();
        }
    }
    debug!(doc = %doc.id(), "main document subscription closed");
}

async fn watch_navigation(
    ctx: Arc<WatchContext>,
    page: Arc<dyn Page>,
    mut navigation: NavigationStream,
) {
    let settle = ctx.engine.config().navigation_settle();

    while let Some(event) = navigation.recv().await {
        if event != NavigationEvent::HistoryPop {
            continue;
        }

        tokio::time::sleep(settle).await;
        let doc = page.main_document();
        debug!(doc = %doc.id(), "history navigation, rescanning");
        ctx.engine.scopes().reset(doc.id());
        ctx.engine.rescan(doc).await;
    }
}

/// Subscribes to a frame document, logging failures.
fn subscribe_frame(frame_id: u64, doc: &dyn Document) -> Option<MutationStream> {
    match doc.subscribe() {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(frame = frame_id, "cannot observe frame document: {}", e);
            None
        }
    }
}

/// Next batch from an optional stream; pends forever once there is none.
async fn next_batch(stream: &mut Option<MutationStream>) -> MutationBatch {
    loop {
        let batch = match stream.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending::<Option<MutationBatch>>().await,
        };
        match batch {
            Some(batch) => return batch,
            None => *stream = None,
        }
    }
}

async fn watch_frame(ctx: Arc<WatchContext>, frame: Arc<dyn Frame>, mut loads: LoadStream) {
    let frame_id = frame.id();
    let debouncer = {
        let engine = Arc::clone(&ctx.engine);
        let frame = Arc::clone(&frame);
        Debouncer::new(engine.config().frame_debounce(), move || {
            let engine = Arc::clone(&engine);
            let doc = frame.content_document();
            async move {
                if let Ok(doc) = doc {
                    engine.rescan(doc).await;
                }
            }
        })
    };

    let mut mutations = match frame.content_document() {
        Ok(doc) => {
            if doc.ready_state().is_ready() {
                ctx.spawn_rescan(Arc::clone(&doc));
            }
            subscribe_frame(frame_id, doc.as_ref())
        }
        Err(e) => {
            warn!(frame = frame_id, "cannot access frame document: {}", e);
            None
        }
    };

    loop {
        tokio::select! {
            load = loads.recv() => {
                if load.is_none() {
                    break;
                }
                debouncer.cancel();

                match frame.content_document() {
                    Ok(doc) => {
                        debug!(frame = frame_id, doc = %doc.id(), "frame loaded");
                        ctx.engine.scopes().reset(doc.id());
                        mutations = subscribe_frame(frame_id, doc.as_ref());
                        ctx.spawn_rescan(doc);
                    }
                    Err(e) => {
                        warn!(frame = frame_id, "cannot access frame document: {}", e);
                        mutations = None;
                    }
                }
            }
            batch = next_batch(&mut mutations) => {
                if !batch.added.is_empty() {
                    debouncer.trigger();
                }
            }
        }
    }
    debug!(frame = frame_id, "frame observer finished");
}
