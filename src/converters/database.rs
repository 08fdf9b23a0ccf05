use crate::{
    converter::{Converter, RunContext, ensure_kind, require_config},
    error::{MigrateError, Result},
    model::{Resource, ResourceKind},
    result::{
        ConversionResult, HealthCheck, PortMapping, ResourceLimits, ServiceDefinition,
        VolumeDefinition, VolumeMount,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Postgres,
    MySql,
    MariaDb,
}

impl Engine {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.to_ascii_lowercase();
        if raw.contains("postgres") {
            Some(Engine::Postgres)
        } else if raw.contains("mariadb") {
            Some(Engine::MariaDb)
        } else if raw.contains("mysql") {
            Some(Engine::MySql)
        } else {
            None
        }
    }

    fn image(self, version: Option<&str>) -> String {
        let major = version
            .and_then(|v| v.split('.').next())
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()));
        match self {
            Engine::Postgres => format!("postgres:{}-alpine", major.unwrap_or("16")),
            Engine::MySql => format!("mysql:{}", major.map(|m| format!("{m}.0")).unwrap_or_else(|| "8.0".to_string())),
            Engine::MariaDb => format!("mariadb:{}", major.unwrap_or("11")),
        }
    }

    fn port(self) -> u16 {
        match self {
            Engine::Postgres => 5432,
            Engine::MySql | Engine::MariaDb => 3306,
        }
    }

    fn data_dir(self) -> &'static str {
        match self {
            Engine::Postgres => "/var/lib/postgresql/data",
            Engine::MySql | Engine::MariaDb => "/var/lib/mysql",
        }
    }
}

/// Managed relational database -> PostgreSQL / MySQL / MariaDB container.
#[derive(Debug, Clone)]
pub struct RelationalDatabaseConverter {
    kind: ResourceKind,
}

impl RelationalDatabaseConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    fn engine(&self, resource: &Resource) -> Result<Engine> {
        let raw = resource.config_str("engine").unwrap_or_default();
        Engine::parse(raw).ok_or_else(|| {
            MigrateError::validation(
                resource.id.clone(),
                format!("unsupported database engine '{raw}'"),
            )
        })
    }
}

impl Converter for RelationalDatabaseConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)?;
        require_config(resource, "engine")?;
        self.engine(resource).map(|_| ())
    }

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        ctx.check()?;
        let engine = self.engine(resource)?;
        let name = ctx.service_name(resource);
        let volume = format!("{name}-data");
        let database = resource
            .config_str("db_name")
            .unwrap_or("app")
            .to_string();
        let image = ctx.image_for(&self.kind, &engine.image(resource.config_str("engine_version")));
        let secret = format!("{}_PASSWORD", name.to_ascii_uppercase().replace('-', "_"));

        let mut service = ServiceDefinition::new(&name, image)
            .port(PortMapping::tcp(engine.port()))
            .volume(VolumeMount::named(&volume, engine.data_dir()));
        match engine {
            Engine::Postgres => {
                service = service
                    .env("POSTGRES_DB", &database)
                    .env("POSTGRES_USER", resource.config_str("username").unwrap_or("app"))
                    .env("POSTGRES_PASSWORD", format!("${{{secret}:?set {secret}}}"));
                service.healthcheck = Some(HealthCheck::cmd(["pg_isready", "-U", "postgres"]));
            }
            Engine::MySql | Engine::MariaDb => {
                service = service
                    .env("MYSQL_DATABASE", &database)
                    .env("MYSQL_USER", resource.config_str("username").unwrap_or("app"))
                    .env("MYSQL_PASSWORD", format!("${{{secret}:?set {secret}}}"))
                    .env("MYSQL_ROOT_PASSWORD", format!("${{{secret}:?set {secret}}}"));
                service.healthcheck =
                    Some(HealthCheck::cmd(["mysqladmin", "ping", "-h", "localhost"]));
            }
        }
        service.networks.push(ctx.network_name.clone());
        if let Some(storage) = resource.config_u64("allocated_storage") {
            service
                .labels
                .insert("homeport.storage_gb".to_string(), storage.to_string());
        }
        service.limits = limits_for(resource.config_str("instance_class"));

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        result.add_volume(VolumeDefinition::local(volume));

        if resource.config_bool("multi_az").unwrap_or(false) {
            result.warn(format!(
                "database '{name}' was multi-AZ; the container runs a single instance"
            ));
        }
        if resource.config.contains_key("read_replicas") {
            result.warn(format!("database '{name}' read replicas are not converted"));
        }
        let dump = match engine {
            Engine::Postgres => format!(
                "#!/bin/sh\nset -eu\npg_dump \"${{SOURCE_URL:?}}\" | docker compose exec -T {name} psql -U \"${{POSTGRES_USER:-app}}\" {database}\n"
            ),
            Engine::MySql | Engine::MariaDb => format!(
                "#!/bin/sh\nset -eu\nmysqldump --single-transaction \"$@\" {database} | docker compose exec -T {name} mysql {database}\n"
            ),
        };
        result.add_script(format!("scripts/{name}-restore.sh"), dump);
        result.manual_step(format!("Set {secret} in .env before the first start"));
        result.manual_step(format!(
            "Restore data into '{name}' with scripts/{name}-restore.sh"
        ));
        Ok(result)
    }
}

fn limits_for(instance_class: Option<&str>) -> ResourceLimits {
    let Some(class) = instance_class else {
        return ResourceLimits::default();
    };
    let (cpus, memory) = match class.rsplit('.').next().unwrap_or_default() {
        "micro" => ("1", "1g"),
        "small" => ("1", "2g"),
        "medium" => ("2", "4g"),
        "large" => ("2", "8g"),
        "xlarge" => ("4", "16g"),
        _ => return ResourceLimits::default(),
    };
    ResourceLimits {
        cpus: Some(cpus.to_string()),
        memory: Some(memory.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rds(engine: &str) -> Resource {
        Resource::new("db-1", "orders-db", ResourceKind::new("aws", "db_instance"))
            .with_config("engine", json!(engine))
            .with_config("engine_version", json!("15.4"))
            .with_config("instance_class", json!("db.t3.medium"))
    }

    #[test]
    fn postgres_instance_maps_version_and_limits() {
        let converter = RelationalDatabaseConverter::new(ResourceKind::new("aws", "db_instance"));
        let resource = rds("postgres");
        converter.validate(&resource).unwrap();
        let result = converter
            .convert(&RunContext::default(), &resource)
            .unwrap();
        assert_eq!(result.service.image, "postgres:15-alpine");
        assert_eq!(result.service.limits.memory.as_deref(), Some("4g"));
        assert_eq!(
            result.service.environment.get("POSTGRES_PASSWORD").map(String::as_str),
            Some("${ORDERS_DB_PASSWORD:?set ORDERS_DB_PASSWORD}")
        );
        assert_eq!(result.manual_steps.len(), 2);
    }

    #[test]
    fn unknown_engine_fails_validation() {
        let converter = RelationalDatabaseConverter::new(ResourceKind::new("aws", "db_instance"));
        let err = converter.validate(&rds("oracle-ee")).unwrap_err();
        assert!(err.to_string().contains("unsupported database engine"));
    }

    #[test]
    fn missing_engine_fails_validation() {
        let converter = RelationalDatabaseConverter::new(ResourceKind::new("aws", "db_instance"));
        let resource = Resource::new("db-1", "db", ResourceKind::new("aws", "db_instance"));
        assert!(converter.validate(&resource).is_err());
    }
}
