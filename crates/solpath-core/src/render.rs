//! Render capability trait and artifact types.
//!
//! Renderers turn a sol range into a stored plot artifact. The actual
//! dataset access, plotting, and image-host upload live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::SolRange;
use crate::Result;

/// Reference to a rendered artifact held by an external artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Backend-specific location of the artifact (e.g. an image-host key).
    pub location: String,
}

/// Trait for plot-rendering backends.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Name of this renderer.
    fn name(&self) -> &'static str;

    /// Render the drive and flight paths for the given sol range and
    /// return a reference to the stored artifact.
    async fn render(&self, range: SolRange) -> Result<ArtifactRef>;
}
