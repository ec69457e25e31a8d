//! Remote clients for video generation services.

mod veo;

pub use veo::{vertex_base_url, VeoClient, VeoClientBuilder, GEMINI_BASE_URL, STORAGE_BASE_URL};
