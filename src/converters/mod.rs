//! Reference converters for common managed services.
//!
//! Each converter maps one provider service onto a self-hosted image. They are
//! intentionally small: the pipeline only relies on the [`Converter`] contract.

mod cache;
mod compute;
mod database;
mod edge;
mod managed;
mod queue;
mod storage;

use std::sync::Arc;

pub use cache::CacheConverter;
pub use compute::ContainerServiceConverter;
pub use database::RelationalDatabaseConverter;
pub use edge::LoadBalancerConverter;
pub use managed::ManagedOnlyConverter;
pub use queue::QueueConverter;
pub use storage::ObjectStorageConverter;

use crate::{converter::Converter, model::ResourceKind};

/// Every converter shipped with the crate, one per kind.
pub fn builtin() -> Vec<Arc<dyn Converter>> {
    let kind = |provider: &str, service: &str| ResourceKind::new(provider, service);
    vec![
        Arc::new(ObjectStorageConverter::new(kind("aws", "s3_bucket"))),
        Arc::new(ObjectStorageConverter::new(kind("gcp", "storage_bucket"))),
        Arc::new(ObjectStorageConverter::new(kind("azure", "storage_account"))),
        Arc::new(RelationalDatabaseConverter::new(kind("aws", "db_instance"))),
        Arc::new(RelationalDatabaseConverter::new(kind("aws", "rds_cluster"))),
        Arc::new(RelationalDatabaseConverter::new(kind("gcp", "sql_database_instance"))),
        Arc::new(RelationalDatabaseConverter::new(kind("azure", "postgresql_server"))),
        Arc::new(CacheConverter::new(kind("aws", "elasticache_cluster"))),
        Arc::new(CacheConverter::new(kind("gcp", "redis_instance"))),
        Arc::new(QueueConverter::new(kind("aws", "sqs_queue"))),
        Arc::new(QueueConverter::new(kind("gcp", "pubsub_topic"))),
        Arc::new(ContainerServiceConverter::new(kind("aws", "ecs_service"))),
        Arc::new(ContainerServiceConverter::new(kind("gcp", "cloud_run_service"))),
        Arc::new(ContainerServiceConverter::new(kind("azure", "container_app"))),
        Arc::new(LoadBalancerConverter::new(kind("aws", "lb"))),
        Arc::new(LoadBalancerConverter::new(kind("gcp", "compute_url_map"))),
        Arc::new(ManagedOnlyConverter::new(kind("aws", "eks_cluster"))),
        Arc::new(ManagedOnlyConverter::new(kind("aws", "instance"))),
        Arc::new(ManagedOnlyConverter::new(kind("gcp", "container_cluster"))),
        Arc::new(ManagedOnlyConverter::new(kind("gcp", "compute_instance"))),
        Arc::new(ManagedOnlyConverter::new(kind("azure", "kubernetes_cluster"))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn builtin_kinds_are_unique() {
        let all = builtin();
        let kinds: BTreeSet<_> = all.iter().map(|c| c.resource_kind()).collect();
        assert_eq!(kinds.len(), all.len());
    }
}
