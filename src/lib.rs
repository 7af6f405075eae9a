pub mod gateway;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a process-wide `tracing` subscriber writing to stdout. Shared by
/// the `iris-pgwire` binary and any test harness that wants real log output.
pub fn init_tracing(max_level: Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(max_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
