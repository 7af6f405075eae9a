use std::mem::MaybeUninit;
use std::path::PathBuf;
use std::sync::Once;

use serde::Deserialize;

use crate::gateway::common::{Error, Result};

#[derive(Deserialize, Default, Clone)]
pub struct Listen {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub reuseport: bool,
}

fn default_host() -> String { "0.0.0.0".to_string() }
const fn default_port() -> u16 { 5432 }

#[derive(Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Password,
    Wallet,
    Oauth,
}

impl Default for CredentialSource {
    fn default() -> Self {
        CredentialSource::Password
    }
}

#[derive(Deserialize, Default, Clone)]
pub struct Iris {
    pub host: String,
    #[serde(default = "default_iris_port")]
    pub port: u16,
    pub namespace: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub credential_source: CredentialSource,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
}

const fn default_iris_port() -> u16 { 1972 }

#[derive(Deserialize, Clone)]
pub struct Pool {
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_pool_max_overflow")]
    pub pool_max_overflow: u32,
    #[serde(default = "default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
    #[serde(default = "default_pool_recycle_seconds")]
    pub pool_recycle_seconds: u64,
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,
}

const fn default_pool_size() -> u32 { 10 }
const fn default_pool_max_overflow() -> u32 { 5 }
const fn default_pool_timeout_ms() -> u64 { 30_000 }
const fn default_pool_recycle_seconds() -> u64 { 3600 }
const fn default_health_check_interval_seconds() -> u64 { 30 }

impl Default for Pool {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            pool_max_overflow: default_pool_max_overflow(),
            pool_timeout_ms: default_pool_timeout_ms(),
            pool_recycle_seconds: default_pool_recycle_seconds(),
            health_check_interval_seconds: default_health_check_interval_seconds(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct Auth {
    #[serde(default = "default_true")]
    pub scram_enabled: bool,
    #[serde(default)]
    pub trust_enabled: bool,
}

const fn default_true() -> bool { true }

impl Default for Auth {
    fn default() -> Self {
        Self { scram_enabled: true, trust_enabled: false }
    }
}

#[derive(Deserialize, Clone)]
pub struct Limits {
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    #[serde(default = "default_copy_batch_rows")]
    pub copy_batch_rows: u32,
    #[serde(default = "default_outbound_high_water_mark")]
    pub outbound_high_water_mark: usize,
    #[serde(default = "default_outbound_high_water_mark_copy")]
    pub outbound_high_water_mark_copy: usize,
    #[serde(default = "default_outbound_low_water_mark")]
    pub outbound_low_water_mark: usize,
}

const fn default_max_frame_size() -> u32 { 16 * 1024 * 1024 }
const fn default_copy_batch_rows() -> u32 { 1000 }
const fn default_outbound_high_water_mark() -> usize { 256 * 1024 }
const fn default_outbound_high_water_mark_copy() -> usize { 4 * 1024 * 1024 }
const fn default_outbound_low_water_mark() -> usize { 32 * 1024 }

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            copy_batch_rows: default_copy_batch_rows(),
            outbound_high_water_mark: default_outbound_high_water_mark(),
            outbound_high_water_mark_copy: default_outbound_high_water_mark_copy(),
            outbound_low_water_mark: default_outbound_low_water_mark(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,
    #[serde(default = "default_statement_seconds")]
    pub statement_seconds: u64,
    #[serde(default = "default_auth_seconds")]
    pub auth_seconds: u64,
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

const fn default_idle_seconds() -> u64 { 600 }
const fn default_statement_seconds() -> u64 { 120 }
const fn default_auth_seconds() -> u64 { 15 }
const fn default_lease_ms() -> u64 { 30_000 }

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            idle_seconds: default_idle_seconds(),
            statement_seconds: default_statement_seconds(),
            auth_seconds: default_auth_seconds(),
            lease_ms: default_lease_ms(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct Vector {
    #[serde(default = "default_l2_function")]
    pub l2_function: String,
    #[serde(default = "default_vector_oid")]
    pub oid: i32,
}

fn default_l2_function() -> String { "VECTOR_COSINE".to_string() }
const fn default_vector_oid() -> i32 { 99999 }

impl Default for Vector {
    fn default() -> Self {
        Self { l2_function: default_l2_function(), oid: default_vector_oid() }
    }
}

#[derive(Deserialize, Default, Clone)]
pub struct Settings {
    #[serde(skip)]
    pub config_path: PathBuf,
    #[serde(default)]
    pub listen: Listen,
    pub iris: Iris,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub vector: Vector,
}

impl Settings {
    pub(crate) fn validate(&mut self, path: PathBuf) -> Result<()> {
        self.config_path = path;
        if self.iris.host.is_empty() {
            return Err(Error::new("iris.host must be set"));
        }
        if self.iris.namespace.is_empty() {
            return Err(Error::new("iris.namespace must be set"));
        }
        if self.pool.pool_size == 0 {
            return Err(Error::new("pool.pool_size cannot be 0"));
        }
        if self.limits.max_frame_size < 4096 {
            return Err(Error::new("limits.max_frame_size must be at least 4096"));
        }
        if self.auth.credential_requires_scram() && !self.auth.scram_enabled && !self.auth.trust_enabled {
            return Err(Error::new("at least one of auth.scram_enabled or auth.trust_enabled must be true"));
        }
        Ok(())
    }
}

impl Auth {
    fn credential_requires_scram(&self) -> bool {
        true
    }
}

static mut SETTINGS: MaybeUninit<Settings> = MaybeUninit::uninit();
static INIT: Once = Once::new();

/// The process-wide settings, populated once by [`super::load::load_config`].
/// Accessing this before load_config runs is a programming error.
pub fn config() -> &'static Settings {
    assert!(INIT.is_completed(), "config() called before load_config()");
    unsafe { &*SETTINGS.as_ptr() }
}

pub(crate) fn set_global(settings: Settings) {
    unsafe {
        *SETTINGS.as_mut_ptr() = settings;
    }
    INIT.call_once(|| {});
}
