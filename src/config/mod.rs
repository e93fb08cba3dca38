//! Configuration for Atelier
//!
//! Two layers: backend descriptions ([`backends`]) and the environment-backed
//! runtime settings ([`settings`]). API keys live only in process memory for
//! the duration of a run; nothing here writes them to disk.

pub mod backends;
pub mod settings;

pub use self::{
    backends::{ApiKey, BackendConfig, BackendKind, DEFAULT_TIMEOUT},
    settings::Settings,
};
