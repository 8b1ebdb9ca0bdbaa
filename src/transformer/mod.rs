//! The layer transformer facade.
//!
//! A [`LayerTransformer`] maintains the derived geometry set for one logical
//! data layer and keeps it correct as domain events arrive asynchronously.
//! All mutation entry points are fire-and-forget: the caller enqueues a task
//! on the transformer's single-worker update queue and returns immediately;
//! failures are absorbed by the worker and logged.
//!
//! One transformer type covers both layer variants: the "default" and
//! "style-based" transformers differ only in their id codec (identity vs.
//! bit-packed) and in whether a style resolver is present.
//!
//! # Example
//!
//! ```ignore
//! use geolayer::transformer::{LayerTransformer, TransformerConfig};
//! use geolayer::id::PackedIdCodec;
//!
//! let transformer = LayerTransformer::new(
//!     TransformerConfig::new("tracks"),
//!     Arc::new(PackedIdCodec),
//!     factory,
//!     registry,
//!     store,
//!     time_manager,
//!     Some(style_registry),
//! );
//!
//! transformer.add_elements(elements);
//! transformer.handle_selection_command(polygons, RegionCommand::Select);
//! transformer.shutdown().await;
//! ```

mod config;
mod task;
mod worker;

pub use config::TransformerConfig;
pub use task::UpdateTask;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use geo::Polygon;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::GeometryCache;
use crate::error::TransformError;
use crate::event::{DataTypeEvent, ElementEvent};
use crate::geometry::{DataElement, GeometryFactory, GeometryRegistry};
use crate::id::{ElementId, GeometryId, GeometryIdCodec};
use crate::queue::UpdateSerializer;
use crate::region::{RegionCommand, RegionCommandProcessor};
use crate::store::ElementStore;
use crate::style::{StyleRegistry, StyleResolver};
use crate::time::TimeManager;
use worker::TransformerWorker;

/// Maintains render-ready geometries for one data layer.
///
/// Created when a data layer is activated; [`shutdown`](Self::shutdown)
/// drains the update queue and discards all state on deactivation. Must be
/// constructed inside a Tokio runtime.
pub struct LayerTransformer {
    config: TransformerConfig,
    serializer: Arc<UpdateSerializer<UpdateTask>>,
    cache: Arc<GeometryCache>,
    worker: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    listener_cancel: CancellationToken,
}

impl LayerTransformer {
    /// Create a transformer and start its update worker.
    ///
    /// Passing a style registry makes this a style-based transformer with a
    /// per-layer [`StyleResolver`]; omitting it yields the plain variant.
    pub fn new(
        config: TransformerConfig,
        codec: Arc<dyn GeometryIdCodec>,
        factory: Arc<dyn GeometryFactory>,
        registry: Arc<dyn GeometryRegistry>,
        store: Arc<dyn ElementStore>,
        time: Arc<dyn TimeManager>,
        styles: Option<Arc<dyn StyleRegistry>>,
    ) -> Self {
        let cache = Arc::new(GeometryCache::new(codec.element_mask()));
        let resolver = styles
            .as_ref()
            .map(|reg| Arc::new(StyleResolver::new(config.type_key.clone(), Arc::clone(reg))));

        let (serializer, rx) = UpdateSerializer::new();
        let serializer = Arc::new(serializer);
        let region = RegionCommandProcessor::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::clone(&time),
            config.type_key.clone(),
            config.source.clone(),
            config.purge_allowed,
        );

        let worker = TransformerWorker::new(
            config.clone(),
            codec,
            factory,
            registry,
            store,
            Arc::clone(&cache),
            resolver.clone(),
            region,
        );
        let worker_handle = tokio::spawn(worker.run(rx));

        let listener_cancel = CancellationToken::new();
        let listener = match (styles, resolver) {
            (Some(style_registry), Some(resolver)) => Some(Self::spawn_style_listener(
                style_registry.subscribe(),
                resolver,
                Arc::clone(&serializer),
                config.type_key.clone(),
                listener_cancel.clone(),
            )),
            _ => None,
        };

        info!(type_key = %config.type_key, "layer transformer started");
        Self {
            config,
            serializer,
            cache,
            worker: Mutex::new(Some(worker_handle)),
            listener: Mutex::new(listener),
            listener_cancel,
        }
    }

    /// Register new data elements and derive their geometries.
    pub fn add_elements(&self, elements: Vec<DataElement>) {
        self.serializer.submit(UpdateTask::AddElements(elements));
    }

    /// Drop elements and remove their geometries.
    pub fn remove_elements(&self, ids: Vec<ElementId>) {
        self.serializer.submit(UpdateTask::RemoveElements(ids));
    }

    /// Apply a datatype-level event.
    pub fn handle_data_type_event(&self, event: DataTypeEvent) {
        self.serializer.submit(UpdateTask::DataType(event));
    }

    /// Apply a consolidated element event.
    pub fn handle_element_event(&self, event: ElementEvent) {
        self.serializer.submit(UpdateTask::Element(event));
    }

    /// Execute a spatial selection command over the given query polygons.
    ///
    /// Purge has its own entry point; passing [`RegionCommand::Purge`] here
    /// is rejected.
    pub fn handle_selection_command(&self, polygons: Vec<Polygon<f64>>, command: RegionCommand) {
        if command == RegionCommand::Purge {
            warn!("purge submitted through the selection surface; rejected");
            return;
        }
        self.serializer.submit(UpdateTask::Region { polygons, command });
    }

    /// Execute a spatial purge command over the given query polygons.
    pub fn handle_purge_command(&self, polygons: Vec<Polygon<f64>>) {
        self.serializer.submit(UpdateTask::Region {
            polygons,
            command: RegionCommand::Purge,
        });
    }

    /// Map geometry ids back to element ids.
    ///
    /// Synchronous: fails fast on an empty input, silently omits unknown
    /// ids from the result.
    pub fn element_ids_for_geometry_ids(
        &self,
        geometry_ids: &[GeometryId],
    ) -> Result<HashMap<GeometryId, ElementId>, TransformError> {
        self.cache.element_ids_for_geometry_ids(geometry_ids)
    }

    /// Wait until every previously submitted task has been executed.
    pub async fn flush(&self) -> Result<(), TransformError> {
        let (tx, rx) = oneshot::channel();
        if !self.serializer.submit(UpdateTask::Flush(tx)) {
            return Err(TransformError::QueueClosed);
        }
        rx.await.map_err(|_| TransformError::QueueClosed)
    }

    /// Shut the transformer down.
    ///
    /// Stops the style subscription, enqueues a final remove-all task,
    /// closes the queue to further submissions and waits for the worker to
    /// drain. Tasks submitted after this point are silently dropped.
    pub async fn shutdown(&self) {
        self.listener_cancel.cancel();
        let listener = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = listener {
            let _ = handle.await;
        }

        self.serializer.submit(UpdateTask::Clear);
        self.serializer.close();

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        info!(type_key = %self.config.type_key, "layer transformer shut down");
    }

    /// Geometry ids currently in the visible partition.
    pub fn visible_geometry_ids(&self) -> std::collections::HashSet<GeometryId> {
        self.cache.visible_ids()
    }

    /// Geometry ids currently in the hidden partition.
    pub fn hidden_geometry_ids(&self) -> std::collections::HashSet<GeometryId> {
        self.cache.hidden_ids()
    }

    /// Element ids this transformer is responsible for.
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.cache.all_element_ids()
    }

    /// Forward style notifications to the resolver, rebuilding on demand.
    fn spawn_style_listener(
        mut rx: broadcast::Receiver<crate::style::StyleEvent>,
        resolver: Arc<StyleResolver>,
        serializer: Arc<UpdateSerializer<UpdateTask>>,
        type_key: String,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            if resolver.handle_style_event(&event) {
                                serializer.submit(UpdateTask::DataType(
                                    DataTypeEvent::RebuildRequested,
                                ));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // Missed notifications could include a parameter
                            // change for a listened style; rebuild to resync.
                            warn!(
                                type_key = %type_key,
                                missed,
                                "style events lagged, forcing rebuild"
                            );
                            serializer.submit(UpdateTask::DataType(
                                DataTypeEvent::RebuildRequested,
                            ));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
