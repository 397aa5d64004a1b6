use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use once_cell::sync::Lazy;
use reqwest::Client;

use super::source::TileSource;
use crate::core::geo::TileCoord;
use crate::layers::tile::loader::{TileFuture, TileLoadError, TileProducer};

/// Shared HTTP client with a custom User-Agent so that public tile servers
/// (e.g. OpenStreetMap) don't reject the request.
pub(crate) static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("mapgrid/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build reqwest client")
});

/// Producer that downloads tile bytes from a [`TileSource`] over HTTP.
///
/// Failed downloads are reported once and never retried. The returned
/// futures are driven by reqwest and need a Tokio runtime when polled.
pub struct HttpTileProducer<S> {
    source: Arc<S>,
}

impl<S> Clone for HttpTileProducer<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: TileSource> HttpTileProducer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

async fn fetch(url: &str) -> Result<Vec<u8>, TileLoadError> {
    let response = HTTP_CLIENT
        .get(url)
        .send()
        .await
        .map_err(|e| TileLoadError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TileLoadError::Http {
            status: status.as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TileLoadError::Transport(e.to_string()))?;
    Ok(bytes.to_vec())
}

impl<S: TileSource + 'static> TileProducer for HttpTileProducer<S> {
    type Handle = Arc<Vec<u8>>;

    fn produce(&self, coord: TileCoord) -> TileFuture<Self::Handle> {
        let url = self.source.url(coord);

        async move {
            log::debug!("fetch tile {coord} from {url}");
            match fetch(&url).await {
                Ok(data) => {
                    log::info!("downloaded tile {coord} ({} bytes)", data.len());
                    Ok(Arc::new(data))
                }
                Err(e) => {
                    log::warn!("tile {coord} download failed: {e}");
                    Err(e)
                }
            }
        }
        .boxed()
    }
}
