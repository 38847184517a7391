// ABOUTME: Integration tests for validated identifiers.
// ABOUTME: Image references, service names, release versions and instance names.

use hotswap::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn bare_name_defaults_to_latest() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn registry_with_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/team/app").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.name(), "team/app");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn org_path_without_registry() {
        let img = ImageRef::parse("library/redis:7").unwrap();
        assert!(img.registry().is_none());
        assert_eq!(img.name(), "library/redis");
        assert_eq!(img.tag(), Some("7"));
    }

    #[test]
    fn digest_pins_without_tag() {
        let img = ImageRef::parse("nginx@sha256:abc123").unwrap();
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert!(img.tag().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("has space").is_err());
        assert!(ImageRef::parse("/leading").is_err());
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn accepts_lowercase_dns_labels() {
        assert!(ServiceName::new("web").is_ok());
        assert!(ServiceName::new("billing-api-2").is_ok());
    }

    #[test]
    fn rejects_names_unsafe_for_containers() {
        assert_eq!(ServiceName::new(""), Err(ServiceNameError::Empty));
        assert_eq!(ServiceName::new("Web"), Err(ServiceNameError::NotLowercase));
        assert_eq!(ServiceName::new("-web"), Err(ServiceNameError::EdgeHyphen));
        assert!(matches!(
            ServiceName::new("web_api"),
            Err(ServiceNameError::InvalidChar('_'))
        ));
    }
}

mod version_tests {
    use super::*;

    #[test]
    fn versions_sort_chronologically_as_text() {
        let older: ReleaseVersion = "20260301120000000".parse().unwrap();
        let newer: ReleaseVersion = "20260301120000001".parse().unwrap();
        assert!(older < newer);
        assert!(older.to_string() < newer.to_string());
    }

    #[test]
    fn next_is_strictly_after_a_future_version() {
        let future: ReleaseVersion = "29991231235959998".parse().unwrap();
        let next = ReleaseVersion::next(Some(&future));
        assert_eq!(next.to_string(), "29991231235959999");
    }

    #[test]
    fn malformed_versions_are_rejected() {
        assert!("2026".parse::<ReleaseVersion>().is_err());
        assert!("2026030112000000x".parse::<ReleaseVersion>().is_err());
    }
}

mod instance_name_tests {
    use super::*;

    fn service() -> ServiceName {
        ServiceName::new("web").unwrap()
    }

    #[test]
    fn names_round_trip_through_the_runtime() {
        for name in [
            "web-20260301120000000",
            "web-20260301120000000-staging",
            "web-20260301120000000-retiring",
        ] {
            let parsed = InstanceName::parse(&service(), name).unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn role_is_encoded_in_the_suffix() {
        let staging = InstanceName::parse(&service(), "web-20260301120000000-staging").unwrap();
        assert_eq!(staging.role(), Role::Staging);
        assert_eq!(
            staging.with_role(Role::Production).to_string(),
            "web-20260301120000000"
        );
    }

    #[test]
    fn other_services_and_foreign_names_are_not_ours() {
        assert!(InstanceName::parse(&service(), "webapp-20260301120000000").is_err());
        assert!(InstanceName::parse(&service(), "web-latest").is_err());
        assert!(InstanceName::parse(&service(), "web-20260301120000000-canary").is_err());
    }
}

mod naming_properties {
    use super::*;
    use chrono::DateTime;
    use proptest::prelude::*;

    fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Staging),
            Just(Role::Production),
            Just(Role::Retiring)
        ]
    }

    proptest! {
        #[test]
        fn instance_names_parse_back(
            service in "[a-z][a-z0-9-]{0,20}[a-z0-9]",
            millis in 946_684_800_000i64..32_503_680_000_000i64,
            role in arb_role(),
        ) {
            let service = ServiceName::new(&service).unwrap();
            let version = ReleaseVersion::at(DateTime::from_timestamp_millis(millis).unwrap());
            let name = InstanceName::new(service.clone(), version, role);

            let parsed = InstanceName::parse(&service, &name.to_string()).unwrap();
            prop_assert_eq!(parsed, name);
        }

        #[test]
        fn version_text_order_matches_time_order(
            a in 946_684_800_000i64..32_503_680_000_000i64,
            b in 946_684_800_000i64..32_503_680_000_000i64,
        ) {
            let va = ReleaseVersion::at(DateTime::from_timestamp_millis(a).unwrap());
            let vb = ReleaseVersion::at(DateTime::from_timestamp_millis(b).unwrap());
            prop_assert_eq!(va.cmp(&vb), va.to_string().cmp(&vb.to_string()));
        }
    }
}
