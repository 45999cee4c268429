    use super::*;
    use crate::loader::ConfigLoader;

    #[test]
    fn test_default_config_is_valid() {
        let result = ConfigValidator::validate(&Config::default());
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_sizes_are_errors() {
        let content = r#"
            [scheduler]
            fetch_max_size = 0

            [workers]
            pool_size = 0
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        let result = ConfigValidator::validate(&config);
        assert!(!result.is_valid());
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"scheduler.fetch_max_size"));
        assert!(paths.contains(&"workers.pool_size"));
    }

    #[test]
    fn test_unknown_backend() {
        let config = ConfigLoader::load_str("[store]\nbackend = \"redis\"").unwrap();
        let result = ConfigValidator::validate(&config);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "store.backend");
    }

    #[test]
    fn test_jitter_warning() {
        let content = r#"
            [scheduler]
            idle_wait_ms = 100
            idle_wait_random_ms = 200
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "scheduler.idle_wait_random_ms"));
    }

    #[test]
    fn test_duplicate_keys() {
        let content = r#"
            [[jobs]]
            key = "a"
            handler = "noop"
            [[jobs.triggers]]
            key = "t"
            kind = "rate"
            fixed_offset_ms = 1000

            [[jobs]]
            key = "a"
            handler = "noop"
            [[jobs.triggers]]
            key = "t"
            kind = "rate"
            fixed_offset_ms = 1000
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        let result = ConfigValidator::validate(&config);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.message.contains("Duplicate job key")));
        assert!(result.errors.iter().any(|e| e.message.contains("Duplicate trigger key")));
    }

    #[test]
    fn test_trigger_required_fields() {
        let content = r#"
            [[jobs]]
            key = "a"
            handler = "noop"

            [[jobs.triggers]]
            key = "once"
            kind = "fixed"

            [[jobs.triggers]]
            key = "every"
            kind = "delay"

            [[jobs.triggers]]
            key = "nightly"
            kind = "cron"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        let result = ConfigValidator::validate(&config);
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "jobs[0].triggers[0].start_time",
                "jobs[0].triggers[1].fixed_offset_ms",
                "jobs[0].triggers[2].expression",
            ]
        );
    }

    #[test]
    fn test_job_without_triggers_warns() {
        let config = ConfigLoader::load_str("[[jobs]]\nkey = \"manual\"\nhandler = \"noop\"").unwrap();
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_into_result() {
        let config = ConfigLoader::load_str("[workers]\npool_size = 0").unwrap();
        let err = ConfigValidator::validate(&config).into_result().unwrap_err();
        assert!(err.to_string().contains("workers.pool_size"));
    }
