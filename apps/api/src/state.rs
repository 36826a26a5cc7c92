use std::sync::Arc;

use ledger_core::config::Settings;
use ledger_jobs::DocumentRepository;
use ledger_kv::KvClient;
use ledger_storage::ObjectStoreClient;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub kv: KvClient,
    pub settings: Settings,
    pub repo: Arc<dyn DocumentRepository>,
    pub storage: Arc<ObjectStoreClient>,
    pub audit: Arc<ledger_audit::AuditBatcher>,
    pub prometheus_handle: PrometheusHandle,
}
