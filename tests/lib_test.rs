//! Library integration tests.

use mcpcheck::McpCheckError;

#[test]
fn error_types_are_public() {
    let err = McpCheckError::StoreUnreachable {
        message: "connection refused".into(),
    };
    assert!(err.to_string().contains("connection refused"));

    let err = McpCheckError::store("insert", "HTTP 409");
    assert!(err.to_string().contains("insert"));
}

#[test]
fn result_type_alias_is_public() {
    fn test_fn() -> mcpcheck::Result<()> {
        Ok(())
    }
    assert!(test_fn().is_ok());
}

#[test]
fn cli_types_are_public() {
    use clap::Parser;
    use mcpcheck::cli::{Cli, Commands};

    let cli = Cli::parse_from(["mcpcheck", "check-store", "--json", "--store", "memory"]);
    match cli.command {
        Commands::CheckStore(args) => {
            assert!(args.json);
            assert_eq!(args.store.as_deref(), Some("memory"));
        }
        other => panic!("expected check-store, got {:?}", other),
    }
}

#[test]
fn catalog_to_queue_through_public_api() {
    use mcpcheck::catalog::parse_catalog;
    use mcpcheck::config::HarnessConfig;
    use mcpcheck::detection::Prerequisites;
    use mcpcheck::runner::build_queue;

    let subjects = parse_catalog(
        r#"[{"id": "fs", "install_methods": [{"command": "npx -y server-fs"}]}]"#,
        true,
    )
    .unwrap();
    let plan = build_queue(
        &subjects,
        &HarnessConfig::default(),
        &Prerequisites::all_available(),
        &[],
    );
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].subject_id, "fs");
}
