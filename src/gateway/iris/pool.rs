//! Bounded pool of IRIS backend connections shared by every client session:
//! overflow, FIFO waiting via a semaphore, recycling, and a periodic
//! health check. A gateway session leases a connection per statement
//! batch rather than owning one for its whole lifetime.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::gateway::common::{Error, Result, METRICS};
use crate::gateway::config::{Iris, Pool as PoolConfig};

use super::backend::{Connector, IrisBackend};

struct PooledConn {
    backend: Box<dyn IrisBackend>,
    created_at: Instant,
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    iris: Iris,
    config: PoolConfig,
    idle: Mutex<Vec<PooledConn>>,
    permits: Arc<Semaphore>,
}

/// A leased connection; on drop, a healthy connection returns to the
/// pool's idle list and the lease's concurrency permit is released.
pub struct Lease {
    pool: Arc<ConnectionPool>,
    conn: Option<PooledConn>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, iris: Iris, config: PoolConfig) -> Arc<Self> {
        let permits = (config.pool_size + config.pool_max_overflow) as usize;
        Arc::new(Self {
            connector,
            iris,
            config,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(permits)),
        })
    }

    /// Leases a connection, queuing FIFO behind the `pool_size +
    /// pool_max_overflow` concurrency cap, bounded by `pool_timeout_ms`.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease> {
        let timeout = Duration::from_millis(self.config.pool_timeout_ms);
        let permit = tokio::time::timeout(timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                METRICS.pool_lease_timeouts.fetch_add(1, Relaxed);
                Error::pool_exhausted()
            })?
            .map_err(|_| Error::closed())?;

        METRICS.pool_leases_total.fetch_add(1, Relaxed);
        METRICS.pool_in_use.fetch_add(1, Relaxed);

        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        Ok(Lease { pool: self.clone(), conn: Some(conn), healthy: true, _permit: permit })
    }

    fn take_idle(&self) -> Option<PooledConn> {
        let mut idle = self.idle.lock().unwrap();
        while let Some(conn) = idle.pop() {
            let recycle_deadline = conn.created_at + Duration::from_secs(self.config.pool_recycle_seconds);
            if Instant::now() >= recycle_deadline {
                debug!("recycling backend connection past its recycle deadline");
                METRICS.pool_connections_recycled.fetch_add(1, Relaxed);
                continue;
            }
            return Some(conn);
        }
        None
    }

    async fn connect(&self) -> Result<PooledConn> {
        let backend = self.connector.connect(
            &self.iris.host,
            self.iris.port,
            &self.iris.namespace,
            &self.iris.user,
            &self.iris.password,
        )?;
        Ok(PooledConn { backend, created_at: Instant::now() })
    }

    /// Runs `ping` on every idle connection, dropping ones that fail so
    /// the next `acquire` reconnects instead of handing out a dead socket.
    /// Intended to be driven by a periodic task at
    /// `pool.health_check_interval_seconds`.
    pub fn health_check(&self) {
        let mut idle = self.idle.lock().unwrap();
        let before = idle.len();
        idle.retain_mut(|conn| {
            let ok = conn.backend.ping();
            if !ok {
                warn!("dropping backend connection that failed health check");
            }
            ok
        });
        let dropped = before - idle.len();
        if dropped > 0 {
            METRICS.pool_health_check_failures.fetch_add(dropped as u64, Relaxed);
        }
    }
}

impl Lease {
    pub fn backend(&mut self) -> &mut dyn IrisBackend {
        &mut *self.conn.as_mut().expect("lease used after release").backend
    }

    /// Marks this connection as unhealthy so it's dropped instead of
    /// returned to the idle list when the lease is released.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        METRICS.pool_in_use.fetch_sub(1, Relaxed);
        if let Some(conn) = self.conn.take() {
            if self.healthy {
                self.pool.idle.lock().unwrap().push(conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::CredentialSource;
    use crate::gateway::iris::backend::ExecOutcome;

    struct FakeBackend {
        alive: bool,
    }

    impl IrisBackend for FakeBackend {
        fn exec(&mut self, _sql: &str) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(0))
        }
        fn prepare(&mut self, _sql: &str) -> Result<super::super::backend::StatementHandle> {
            Ok(super::super::backend::StatementHandle(1))
        }
        fn bind_exec(&mut self, _stmt: &super::super::backend::StatementHandle, _params: &[crate::gateway::protocol::types::Value]) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(0))
        }
        fn close_statement(&mut self, _stmt: super::super::backend::StatementHandle) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) -> Result<()> {
            Ok(())
        }
        fn ping(&mut self) -> bool {
            self.alive
        }
    }

    struct FakeConnector;
    impl Connector for FakeConnector {
        fn connect(&self, _host: &str, _port: u16, _namespace: &str, _user: &str, _password: &str) -> Result<Box<dyn IrisBackend>> {
            Ok(Box::new(FakeBackend { alive: true }))
        }
    }

    fn test_iris() -> Iris {
        Iris {
            host: "localhost".into(),
            port: 1972,
            namespace: "USER".into(),
            user: "svc".into(),
            password: "pw".into(),
            credential_source: CredentialSource::Password,
            oauth_client_id: None,
        }
    }

    #[tokio::test]
    async fn acquire_and_release_reuses_connection() {
        let pool = ConnectionPool::new(Arc::new(FakeConnector), test_iris(), PoolConfig::default());
        {
            let mut lease = pool.acquire().await.unwrap();
            let _ = lease.backend().exec("SELECT 1");
        }
        assert_eq!(pool.idle.lock().unwrap().len(), 1);
        let _lease2 = pool.acquire().await.unwrap();
        assert_eq!(pool.idle.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unhealthy_lease_is_not_returned_to_idle() {
        let pool = ConnectionPool::new(Arc::new(FakeConnector), test_iris(), PoolConfig::default());
        {
            let mut lease = pool.acquire().await.unwrap();
            lease.mark_unhealthy();
        }
        assert_eq!(pool.idle.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_times_out() {
        let mut config = PoolConfig::default();
        config.pool_size = 1;
        config.pool_max_overflow = 0;
        config.pool_timeout_ms = 10;
        let pool = ConnectionPool::new(Arc::new(FakeConnector), test_iris(), config);
        let _lease1 = pool.acquire().await.unwrap();
        assert!(pool.acquire().await.is_err());
    }
}
