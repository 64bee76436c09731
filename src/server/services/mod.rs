pub mod allowlist_services;
pub mod channels_services;
pub mod edge_services;
pub mod manifest_services;

pub use allowlist_services::Allowlist;
pub use channels_services::DynChannelsService;
pub use edge_services::EdgeServices;
pub use manifest_services::{BodyKind, ManifestRewriter};
