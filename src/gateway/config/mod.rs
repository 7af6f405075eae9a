mod load;
mod settings;

pub use load::load_config;
pub use settings::{config, Auth, CredentialSource, Iris, Limits, Listen, Pool, Settings, Timeouts, Vector};
