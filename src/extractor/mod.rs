pub mod media;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod writer;

pub use media::{decode_attachment, DecodedMedia, MediaKind};
pub use pipeline::ExtractionPipeline;
pub use stats::{RunStats, RunSummary};
pub use store::{Fingerprint, FingerprintStore};
pub use writer::MediaWriter;
