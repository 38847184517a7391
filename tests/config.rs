// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env references, overrides and the container config derived from it.

use hotswap::config::*;
use hotswap::deploy::{LABEL_MANAGED, LABEL_SERVICE, ReleaseRequest};
use hotswap::error::Error;
use hotswap::runtime::RestartPolicyConfig;
use hotswap::types::{InstanceName, ReleaseVersion, Role};
use std::time::Duration;

const MINIMAL: &str = r#"
service: myapp
image: nginx:1.27
ports:
  container: 80
  staging: 8081
  production: 8080
healthcheck:
  cmd: "wget -qO- http://localhost/ || exit 1"
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.service.as_str(), "myapp");
        assert_eq!(config.image.name(), "nginx");
        assert_eq!(config.ports.production, 8080);
        assert_eq!(config.monitor.max_attempts, 30);
        assert_eq!(config.pull.attempts, 3);
        assert_eq!(config.stop.timeout, Duration::from_secs(30));
        assert_eq!(config.retention.keep, 2);
        assert_eq!(config.restart, RestartPolicy::UnlessStopped);
        assert!(config.security.read_only);
        assert_eq!(config.security.cap_drop, vec!["ALL".to_string()]);
        assert!(config.registry.is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: billing
image: ghcr.io/org/billing:v1.2.3
ports:
  container: 3000
  staging: 13000
  production: 3000
  host_ip: 127.0.0.1
env:
  RUST_LOG: info
  REGION: { env: HOTSWAP_TEST_UNSET_REGION, default: eu-west-1 }
labels:
  team: payments
command: ["billing", "serve"]
healthcheck:
  cmd: "curl -fsS http://localhost:3000/health"
  staging:
    interval: 1s
    retries: 2
  production:
    interval: 20s
monitor:
  poll_interval: 500ms
  max_attempts: 40
  verify_attempts: 80
pull:
  attempts: 5
  delay: 2s
resources:
  memory: 512m
  cpus: "1.5"
security:
  read_only: false
  cap_add: [NET_BIND_SERVICE]
restart: on-failure:3
stop:
  timeout: 45s
  signal: SIGQUIT
retention:
  keep: 4
  image_max_age: 72h
registry:
  server: ghcr.io
  username_secret: ghcr-user
  password_secret: ghcr-token
notify:
  webhook: http://hooks.internal:9000/releases
  timeout: 3s
log_tail: 20
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.image.registry(), Some("ghcr.io"));
        assert_eq!(config.ports.host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.healthcheck.staging.interval, Duration::from_secs(1));
        assert_eq!(config.healthcheck.staging.retries, 2);
        assert_eq!(config.healthcheck.production.interval, Duration::from_secs(20));
        assert_eq!(config.monitor.poll_interval, Duration::from_millis(500));
        assert_eq!(config.monitor.verify_attempts, 80);
        assert_eq!(config.pull.delay, Duration::from_secs(2));
        assert_eq!(
            config.restart,
            RestartPolicy::OnFailure {
                max_retries: Some(3)
            }
        );
        assert_eq!(config.stop.signal.as_deref(), Some("SIGQUIT"));
        assert_eq!(config.retention.image_max_age, Duration::from_secs(72 * 3600));
        assert_eq!(config.registry.unwrap().username_secret, "ghcr-user");
        assert_eq!(config.notify.unwrap().timeout, Duration::from_secs(3));
        assert_eq!(config.log_tail, 20);
    }

    #[test]
    fn missing_healthcheck_is_rejected() {
        let yaml = r#"
service: myapp
image: nginx
ports:
  container: 80
  staging: 8081
  production: 8080
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn discover_prefers_hotswap_yml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hotswap.yml"), MINIMAL).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "myapp");

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(empty.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }
}

mod validation {
    use super::*;

    fn invalid(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(msg)) => msg,
            other => panic!("expected invalid config, got {:?}", other.map(|c| c.service)),
        }
    }

    #[test]
    fn ports_must_differ() {
        let yaml = MINIMAL.replace("staging: 8081", "staging: 8080");
        assert!(invalid(&yaml).contains("must differ"));
    }

    #[test]
    fn empty_healthcheck_command_is_rejected() {
        let yaml = MINIMAL.replace(r#"cmd: "wget -qO- http://localhost/ || exit 1""#, r#"cmd: " ""#);
        assert!(invalid(&yaml).contains("healthcheck.cmd"));
    }

    #[test]
    fn monitor_that_gives_up_before_the_production_healthcheck_is_rejected() {
        let yaml = MINIMAL.replace(
            r#"cmd: "wget -qO- http://localhost/ || exit 1""#,
            "cmd: \"wget -qO- http://localhost/ || exit 1\"\n  production:\n    interval: 90s",
        );
        let msg = invalid(&yaml);
        assert!(msg.contains("verify_attempts"), "{msg}");
        assert!(msg.contains("production healthcheck"), "{msg}");
    }

    #[test]
    fn bad_memory_limit_is_rejected() {
        let yaml = format!("{}resources:\n  memory: lots\n", MINIMAL);
        assert!(invalid(&yaml).contains("memory"));
    }

    #[test]
    fn https_webhooks_are_rejected() {
        let yaml = format!("{}notify:\n  webhook: https://example.com/hook\n", MINIMAL);
        assert!(invalid(&yaml).contains("webhook"));
    }

    #[test]
    fn credentials_cannot_be_inlined() {
        // Registry credentials are secret names, never values.
        let yaml = format!(
            "{}registry:\n  username: bob\n  password: hunter2\n",
            MINIMAL
        );
        assert!(Config::from_yaml(&yaml).is_err());
    }
}

mod overrides {
    use super::*;

    #[test]
    fn flags_replace_file_values() {
        let config = Config::from_yaml(MINIMAL)
            .unwrap()
            .with_overrides(&Overrides {
                production_port: Some(9090),
                memory: Some("1g".to_string()),
                health_retries: Some(9),
                stop_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.ports.production, 9090);
        assert_eq!(config.resources.memory.as_deref(), Some("1g"));
        assert_eq!(config.healthcheck.staging.retries, 9);
        assert_eq!(config.stop_timeout(), Duration::from_secs(5));
        assert_eq!(config.ports.staging, 8081);
    }

    #[test]
    fn overrides_that_break_invariants_fail() {
        let result = Config::from_yaml(MINIMAL).unwrap().with_overrides(&Overrides {
            staging_port: Some(8080),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}

mod request {
    use super::*;

    fn name(role: Role) -> InstanceName {
        let config = Config::from_yaml(MINIMAL).unwrap();
        InstanceName::new(
            config.service,
            "20260301120000000".parse::<ReleaseVersion>().unwrap(),
            role,
        )
    }

    #[test]
    fn staging_and_production_differ_only_where_roles_do() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        let request = ReleaseRequest::from_config(&config).unwrap();

        let staging = request.container_config(&name(Role::Staging));
        let production = request.container_config(&name(Role::Production));

        assert_eq!(staging.name, "myapp-20260301120000000-staging");
        assert_eq!(production.name, "myapp-20260301120000000");
        assert_eq!(staging.ports[0].host_port, 8081);
        assert_eq!(production.ports[0].host_port, 8080);
        assert_eq!(staging.ports[0].container_port, 80);
        assert_eq!(staging.restart_policy, RestartPolicyConfig::No);
        assert_eq!(production.restart_policy, RestartPolicyConfig::UnlessStopped);
        assert_eq!(staging.image, production.image);
        assert_eq!(staging.env, production.env);
        assert_eq!(staging.security, production.security);

        let staging_check = staging.healthcheck.unwrap();
        let production_check = production.healthcheck.unwrap();
        assert_eq!(staging_check.test, production_check.test);
        assert!(staging_check.interval < production_check.interval);

        assert_eq!(production.labels.get(LABEL_SERVICE).unwrap(), "myapp");
        assert_eq!(production.labels.get(LABEL_MANAGED).unwrap(), "true");
    }

    #[test]
    fn env_references_resolve_from_the_process() {
        let yaml = format!(
            "{}env:\n  DATABASE_URL: {{ env: HOTSWAP_TEST_DATABASE_URL }}\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();

        temp_env::with_var(
            "HOTSWAP_TEST_DATABASE_URL",
            Some("postgres://app@db/app"),
            || {
                let request = ReleaseRequest::from_config(&config).unwrap();
                assert_eq!(
                    request.env().get("DATABASE_URL").map(String::as_str),
                    Some("postgres://app@db/app")
                );
                // Debug output never carries env values.
                assert!(!format!("{:?}", request).contains("postgres://"));
            },
        );

        temp_env::with_var_unset("HOTSWAP_TEST_DATABASE_URL", || {
            assert!(matches!(
                ReleaseRequest::from_config(&config),
                Err(Error::MissingEnvVar(_))
            ));
        });
    }
}
