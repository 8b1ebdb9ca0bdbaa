//! Typed tasks carried by the update queue.

use geo::Polygon;
use tokio::sync::oneshot;

use crate::event::{DataTypeEvent, ElementEvent};
use crate::geometry::DataElement;
use crate::id::ElementId;
use crate::region::RegionCommand;

/// A unit of work executed by the transformer's single update worker.
///
/// Tasks are processed strictly in submission order; see
/// [`crate::queue::UpdateSerializer`].
#[derive(Debug)]
pub enum UpdateTask {
    /// Register and derive geometries for new elements.
    AddElements(Vec<DataElement>),
    /// Drop elements and their geometries.
    RemoveElements(Vec<ElementId>),
    /// Classify and apply a datatype-level event.
    DataType(DataTypeEvent),
    /// Classify and apply a consolidated element event.
    Element(ElementEvent),
    /// Execute a spatial region command.
    Region {
        polygons: Vec<Polygon<f64>>,
        command: RegionCommand,
    },
    /// Signal the caller once every previously enqueued task has run.
    Flush(oneshot::Sender<()>),
    /// Remove all managed geometries; the final task before shutdown.
    Clear,
}
