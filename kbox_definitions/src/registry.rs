//! The static dependency registry.
//!
//! A lookup-by-lowercase-type table of the managed services kbox knows how
//! to synthesise. Kept as plain `const`/`fn` data rather than a
//! `lazy_static` map, since the set never changes at runtime and a `match`
//! on a handful of variants compiles to the same thing a `HashMap` lookup
//! would, without the initialization cost.

use std::collections::BTreeMap;

/// The substitution token for a dependency's generated password. A
/// template value containing this token is routed to `secretRefs`/
/// `secretData` in [`render_env_vars_with_secret_refs`] and never to
/// `plainEnv` — this is what makes "no password in pod env" true by
/// construction.
pub const RENDERED_ENV_PASSWORD_PLACEHOLDER: &str = "{{.Password}}";
const SERVICE_PLACEHOLDER: &str = "{{.Service}}";

/// Immutable registry entry.
#[derive(Clone, Debug)]
pub struct DependencyTemplate {
    pub kind: &'static str,
    pub image: &'static str,
    pub default_version: &'static str,
    pub port: u16,
    pub default_storage: &'static str,
    /// Env-var names the dependency pod itself reads for credentials.
    /// Empty means the dependency has no password (no Secret is emitted).
    pub secret_keys: &'static [&'static str],
    /// `(env var name, template value)` pairs injected into the
    /// *consuming workload*. Values may reference `{{.Service}}` and
    /// `{{.Password}}`.
    pub env_templates: &'static [(&'static str, &'static str)],
    pub health_check_command: &'static [&'static str],
    pub data_path: &'static str,
    pub runtime_uid: i64,
    pub read_only_root_fs: bool,
}

const POSTGRES: DependencyTemplate = DependencyTemplate {
    kind: "postgres",
    image: "postgres",
    default_version: "15-alpine",
    port: 5432,
    default_storage: "10Gi",
    secret_keys: &["POSTGRES_PASSWORD"],
    env_templates: &[
        ("PGHOST", "{{.Service}}"),
        ("PGPORT", "5432"),
        ("PGUSER", "postgres"),
        ("PGPASSWORD", "{{.Password}}"),
        ("DATABASE_URL", "postgres://postgres:{{.Password}}@{{.Service}}:5432/postgres"),
    ],
    health_check_command: &["pg_isready", "-U", "postgres"],
    data_path: "/var/lib/postgresql/data",
    runtime_uid: 999,
    read_only_root_fs: false,
};

const REDIS: DependencyTemplate = DependencyTemplate {
    kind: "redis",
    image: "redis",
    default_version: "7-alpine",
    port: 6379,
    default_storage: "1Gi",
    secret_keys: &[],
    env_templates: &[("REDIS_HOST", "{{.Service}}"), ("REDIS_PORT", "6379"), ("REDIS_URL", "redis://{{.Service}}:6379")],
    health_check_command: &["redis-cli", "ping"],
    data_path: "/data",
    runtime_uid: 999,
    read_only_root_fs: false,
};

const MONGODB: DependencyTemplate = DependencyTemplate {
    kind: "mongodb",
    image: "mongo",
    default_version: "6",
    port: 27017,
    default_storage: "10Gi",
    secret_keys: &["MONGO_INITDB_ROOT_PASSWORD"],
    env_templates: &[
        ("MONGO_HOST", "{{.Service}}"),
        ("MONGO_PORT", "27017"),
        (
            "MONGODB_URI",
            "mongodb://root:{{.Password}}@{{.Service}}:27017/?authSource=admin",
        ),
    ],
    health_check_command: &["mongosh", "--eval", "db.adminCommand('ping')"],
    data_path: "/data/db",
    runtime_uid: 999,
    read_only_root_fs: false,
};

const MYSQL: DependencyTemplate = DependencyTemplate {
    kind: "mysql",
    image: "mysql",
    default_version: "8",
    port: 3306,
    default_storage: "10Gi",
    secret_keys: &["MYSQL_ROOT_PASSWORD"],
    env_templates: &[
        ("MYSQL_HOST", "{{.Service}}"),
        ("MYSQL_PORT", "3306"),
        ("DATABASE_URL", "mysql://root:{{.Password}}@{{.Service}}:3306/mysql"),
    ],
    health_check_command: &["mysqladmin", "ping", "-h", "127.0.0.1"],
    data_path: "/var/lib/mysql",
    runtime_uid: 999,
    read_only_root_fs: false,
};

const REGISTRY: &[DependencyTemplate] = &[POSTGRES, REDIS, MONGODB, MYSQL];

/// Looks up a template by lowercased type string.
pub fn lookup(kind: &str) -> Option<&'static DependencyTemplate> {
    let kind = kind.to_lowercase();
    REGISTRY.iter().find(|t| t.kind == kind)
}

pub fn supported_types() -> Vec<String> {
    REGISTRY.iter().map(|t| t.kind.to_string()).collect()
}

/// The three disjoint maps returned by splitting a dependency's rendered
/// env templates by whether they carry a credential. Keys are env-var names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderedDependencyEnv {
    pub plain_env: BTreeMap<String, String>,
    pub secret_refs: BTreeMap<String, (String, String)>,
    pub secret_data: BTreeMap<String, String>,
}

/// `RenderEnvVarsWithSecretRefs`. `secret_name` is the name of the
/// Secret object the dependency renderer emits for this dependency
/// (`<app>-<type>`).
pub fn render_env_vars_with_secret_refs(
    template: &DependencyTemplate,
    service_name: &str,
    secret_name: &str,
    password: &str,
) -> RenderedDependencyEnv {
    let mut out = RenderedDependencyEnv::default();
    for (key, value) in template.env_templates {
        let has_password = value.contains(RENDERED_ENV_PASSWORD_PLACEHOLDER);
        let rendered = value
            .replace(SERVICE_PLACEHOLDER, service_name)
            .replace(RENDERED_ENV_PASSWORD_PLACEHOLDER, password);
        if has_password {
            out.secret_refs.insert((*key).to_string(), (secret_name.to_string(), (*key).to_string()));
            out.secret_data.insert((*key).to_string(), rendered);
        } else {
            out.plain_env.insert((*key).to_string(), rendered);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("Postgres").is_some());
        assert!(lookup("POSTGRES").is_some());
        assert!(lookup("oracle").is_none());
    }

    #[test]
    fn postgres_split_has_no_plaintext_password() {
        let t = lookup("postgres").unwrap();
        let rendered = render_env_vars_with_secret_refs(t, "myapp-postgres", "myapp-postgres", "s3cr3t");
        for v in rendered.plain_env.values() {
            assert!(!v.contains("s3cr3t"), "password leaked into plain env: {}", v);
        }
        assert!(rendered.secret_refs.contains_key("DATABASE_URL"));
        assert!(rendered.secret_refs.contains_key("PGPASSWORD"));
        assert_eq!(rendered.secret_refs["DATABASE_URL"].0, "myapp-postgres");
        assert!(rendered.secret_data["DATABASE_URL"].contains("s3cr3t"));
        assert_eq!(rendered.plain_env["PGHOST"], "myapp-postgres");
        assert_eq!(rendered.plain_env["PGPORT"], "5432");
    }

    #[test]
    fn redis_has_no_secret_keys() {
        let t = lookup("redis").unwrap();
        assert!(t.secret_keys.is_empty());
        let rendered = render_env_vars_with_secret_refs(t, "myapp-redis", "myapp-redis", "");
        assert!(rendered.secret_refs.is_empty());
        assert!(rendered.secret_data.is_empty());
        assert_eq!(rendered.plain_env["REDIS_URL"], "redis://myapp-redis:6379");
    }

    #[test]
    fn all_four_kinds_present() {
        let types = supported_types();
        for k in ["postgres", "redis", "mongodb", "mysql"] {
            assert!(types.contains(&k.to_string()), "missing {}", k);
        }
    }
}
