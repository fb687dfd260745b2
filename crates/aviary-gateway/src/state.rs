//! Shared gateway state, storage layout, and admin bootstrap.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use aviary_core::{lease_expiry, now_utc};
use aviary_roster::{AccountLinker, RosterReconciler};
use aviary_store::{next_record_id, RecordStore, TenantRecord};
use aviary_supervisor::{ProcessSupervisor, SupervisorConfig, TemplateProvisioner};

use crate::auth::password_digest;

/// Admin tenants are bootstrapped with an effectively-unlimited quota and
/// a lease measured in decades.
const ADMIN_MAX_BOTS: u64 = 999_999;
const ADMIN_LEASE_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    pub state_dir: PathBuf,
    pub template_dir: PathBuf,
    pub admin_login: String,
    pub admin_key: String,
}

/// Everything a request handler needs, shared behind one `Arc`.
pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<RecordStore>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub linker: Arc<dyn AccountLinker>,
    pub reconciler: RosterReconciler,
    pub provisioner: TemplateProvisioner,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        supervisor_config: SupervisorConfig,
        linker: Arc<dyn AccountLinker>,
    ) -> Self {
        let store = Arc::new(RecordStore::new(config.state_dir.join("database")));
        let supervisor = Arc::new(ProcessSupervisor::new(supervisor_config));
        let reconciler = RosterReconciler::new(Arc::clone(&store), Arc::clone(&linker));
        let provisioner = TemplateProvisioner::new(config.template_dir.clone());
        Self {
            config,
            store,
            supervisor,
            linker,
            reconciler,
            provisioner,
        }
    }

    /// Root directory holding every tenant's bot instances.
    pub fn storage_root(&self) -> PathBuf {
        self.config.state_dir.join("bots_storage").join("users")
    }

    pub fn tenant_storage_dir(&self, tenant: &TenantRecord) -> PathBuf {
        self.storage_root()
            .join(format!("user_{}_{}", tenant.id, tenant.login))
    }

    pub fn bot_instance_dir(&self, owner: &TenantRecord, account_uid: &str) -> PathBuf {
        self.tenant_storage_dir(owner).join("bots").join(account_uid)
    }

    /// Creates the reserved administrator tenant when no tenant with the
    /// configured admin login exists. Idempotent across restarts.
    pub fn bootstrap_admin(&self) -> Result<TenantRecord> {
        let admin_login = self.config.admin_login.clone();
        let admin_digest = password_digest(&self.config.admin_key);
        let admin = self.store.update_tenants(|tenants| {
            if let Some(existing) = tenants
                .iter()
                .find(|tenant| tenant.login == admin_login && tenant.is_admin)
            {
                return existing.clone();
            }
            let now = now_utc();
            let record = TenantRecord {
                id: next_record_id(tenants.iter().map(|tenant| tenant.id)),
                login: admin_login.clone(),
                password_digest: admin_digest.clone(),
                max_bots: ADMIN_MAX_BOTS,
                created_at: now,
                expires_at: lease_expiry(now, ADMIN_LEASE_DAYS),
                is_admin: true,
                contact: None,
            };
            info!(login = %record.login, id = record.id, "bootstrapped administrator tenant");
            tenants.push(record.clone());
            record
        })?;

        let admin_dir = self.tenant_storage_dir(&admin).join("bots");
        std::fs::create_dir_all(&admin_dir)
            .with_context(|| format!("failed to create {}", admin_dir.display()))?;
        Ok(admin)
    }
}
