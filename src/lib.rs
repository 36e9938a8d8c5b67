//! Group photo compositor.
//!
//! Lock a background frame, then repeatedly capture frames, cut the person
//! out of each with a segmentation model, and stack the cutouts onto the
//! background so people who were never in frame together end up in one
//! picture.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod layer;
pub mod output;
pub mod segmentation;
pub mod session;
pub mod state;

pub use compositor::{compose, Snapshot};
pub use config::ExtractorSettings;
pub use error::{ErrorKind, GroupShotError, GroupShotResult};
pub use layer::{Layer, LayerExtractor};
pub use segmentation::{Mask, SegmentationModel};
pub use session::{Session, SessionEvent};
pub use state::{AddTicket, CompositionState, Phase};
