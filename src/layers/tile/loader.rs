//! Tile producers and the scheduler that tracks their in-flight futures.
//!
//! Loads are never polled while the grid is admitting tiles. They only make
//! progress on an explicit [`LoadScheduler::poll_ready`] tick (or while the
//! scheduler is awaited), so a producer that completes immediately is still
//! observed one tick after the request.

use std::fmt;
use std::task::{Context, Poll};

use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::noop_waker_ref;

use crate::core::geo::{TileCoord, TileKey};
use crate::prelude::HashMap;

/// Why a single tile failed. Cloned into notifications; never escapes the grid
/// as a hard error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileLoadError {
    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("load aborted")]
    Aborted,

    #[error("producer error: {0}")]
    Producer(String),
}

pub type TileFuture<H> = BoxFuture<'static, Result<H, TileLoadError>>;

/// Produces the content of a tile. The grid only stores the returned handle
/// and never inspects it.
pub trait TileProducer {
    type Handle: Clone + Send + 'static;

    fn produce(&self, coord: TileCoord) -> TileFuture<Self::Handle>;
}

impl<F, H> TileProducer for F
where
    F: Fn(TileCoord) -> TileFuture<H>,
    H: Clone + Send + 'static,
{
    type Handle = H;

    fn produce(&self, coord: TileCoord) -> TileFuture<H> {
        self(coord)
    }
}

/// Identifies one request; a key re-requested after eviction gets a new id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(pub u64);

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A finished load, successful or not
#[derive(Debug)]
pub struct Completion<H> {
    pub key: TileKey,
    pub load_id: LoadId,
    pub result: Result<H, TileLoadError>,
}

pub struct LoadScheduler<H> {
    in_flight: FuturesUnordered<BoxFuture<'static, Completion<H>>>,
    abort_handles: HashMap<LoadId, AbortHandle>,
}

impl<H> fmt::Debug for LoadScheduler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadScheduler")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl<H: Send + 'static> Default for LoadScheduler<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Send + 'static> LoadScheduler<H> {
    pub fn new() -> Self {
        Self {
            in_flight: FuturesUnordered::new(),
            abort_handles: HashMap::default(),
        }
    }

    /// Queues a load. The future is not polled until the next tick.
    pub fn spawn(&mut self, key: TileKey, load_id: LoadId, future: TileFuture<H>) {
        let (abort_handle, registration) = AbortHandle::new_pair();
        let load = Abortable::new(future, registration).map(move |outcome| Completion {
            key,
            load_id,
            result: match outcome {
                Ok(result) => result,
                Err(_) => Err(TileLoadError::Aborted),
            },
        });

        self.in_flight.push(load.boxed());
        self.abort_handles.insert(load_id, abort_handle);
    }

    /// Aborts a load; it still resolves, with [`TileLoadError::Aborted`]
    pub fn abort(&mut self, load_id: LoadId) -> bool {
        match self.abort_handles.remove(&load_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// One scheduler tick: polls the in-flight loads without registering a
    /// real waker and returns every load that finished, in completion order.
    pub fn poll_ready(&mut self) -> Vec<Completion<H>> {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut completed = Vec::new();

        while let Poll::Ready(Some(completion)) = self.in_flight.poll_next_unpin(&mut cx) {
            self.abort_handles.remove(&completion.load_id);
            completed.push(completion);
        }
        completed
    }

    /// Waits for the next load to finish; `None` when nothing is in flight
    pub async fn next(&mut self) -> Option<Completion<H>> {
        let completion = self.in_flight.next().await?;
        self.abort_handles.remove(&completion.load_id);
        Some(completion)
    }
}
