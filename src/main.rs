use std::sync::Arc;

use tracing::{error, info_span, Level};

use iris_pgwire::gateway::common::Result;
use iris_pgwire::gateway::config::load_config;
use iris_pgwire::gateway::iris::{Connector, IrisBackend};
use iris_pgwire::gateway::server::GatewayService;
use iris_pgwire::init_tracing;

/// Placeholder for the concrete IRIS driver binding a deployment supplies
/// (embedded %Net.Remote or a native ODBC/JDBC-style driver) — the gateway
/// only specifies the `Connector`/`IrisBackend` shape it needs, per spec's
/// treatment of the IRIS driver as an external collaborator. Wire a real
/// implementation in here before shipping this binary.
struct UnconfiguredConnector;

impl Connector for UnconfiguredConnector {
    fn connect(
        &self,
        _host: &str,
        _port: u16,
        _namespace: &str,
        _user: &str,
        _password: &str,
    ) -> Result<Box<dyn IrisBackend>> {
        Err("no IrisBackend driver is wired into this build; supply a Connector implementation".into())
    }
}

fn main() {
    init_tracing(Level::INFO);
    let _span = info_span!("startup").entered();

    let settings = load_config("gateway.yaml").expect("could not load config");

    let tokio = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("could not create tokio runtime");

    tokio.block_on(async move {
        let connector: Arc<dyn Connector> = Arc::new(UnconfiguredConnector);
        let service = GatewayService::new(settings, connector).expect("could not start gateway listener");
        service.run().await;
        error!("gateway listener exited");
    });
}
