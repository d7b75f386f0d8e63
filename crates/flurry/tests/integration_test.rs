//! Integration tests for flurry

use flurry::builder::{
    BuildContext, IdentityBuilder, IdentityRequest, StorageBuilder, StreamBuilder, StreamRequest,
    StreamState, TransformBuilder, TransformRequest, kinds,
};
use flurry::config::{AlarmConfig, Comparator, Config, PipelineConfig};
use flurry::error::{ConfigError, GraphError, PipelineError};
use flurry::policy::{PolicyGrant, ServicePrincipal, Statement, managed};
use flurry::{
    MemoryProvider, PipelineBuilder, PipelineRegistry, check_report, deploy, resolve_outputs,
};
use flurry_core::config::{ConfigPath, GlobalConfig};
use flurry_core::topology::{Attachment, NodeStatus, ProvisioningApi, ResourceRef};

fn acme() -> PipelineConfig {
    PipelineConfig::new("acme", "clicks")
}

mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_bucket_created_before_primary() {
        let mut ctx = BuildContext::new();
        let storage = StorageBuilder::build(&mut ctx, "acme").unwrap();
        assert_eq!(storage.primary_name(), "acme");
        assert_eq!(storage.logging_target_name(), "acme-logging");

        let provider = MemoryProvider::default();
        let report = deploy(&provider, ctx.graph(), &GlobalConfig::default())
            .await
            .unwrap();
        assert!(report.is_complete());

        let creates = provider.creates().await;
        let logging = creates
            .iter()
            .position(|r| r.resource == *storage.logging_target())
            .unwrap();
        let primary = creates
            .iter()
            .position(|r| r.resource == *storage.primary())
            .unwrap();
        assert!(logging < primary);

        // The primary's create call names the logging bucket as a dependency,
        // and its logging target is the logging bucket's identifier.
        let primary_request = &creates[primary];
        assert_eq!(primary_request.depends_on.len(), 1);
        assert_eq!(primary_request.depends_on[0].resource, *storage.logging_target());

        let logging_id = &report.resolved(storage.logging_target()).unwrap().id;
        assert_eq!(
            primary_request.properties["logging"]["target_bucket"],
            logging_id.as_str()
        );
    }

    #[tokio::test]
    async fn test_bucket_acl_is_private() {
        let mut ctx = BuildContext::new();
        let storage = StorageBuilder::build(&mut ctx, "acme").unwrap();

        let provider = MemoryProvider::default();
        deploy(&provider, ctx.graph(), &GlobalConfig::default())
            .await
            .unwrap();

        let acl = provider.create_request(storage.acl_binding()).await.unwrap();
        assert_eq!(acl.properties["acl"], "private");
    }
}

mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_attached_twice_equals_once() {
        let grant = PolicyGrant::managed(managed::FIREHOSE_FULL_ACCESS);

        let mut once = BuildContext::new();
        let single = IdentityBuilder::build(
            &mut once,
            IdentityRequest::new("worker", ServicePrincipal::Lambda).grant(grant.clone()),
        )
        .unwrap();

        let mut twice = BuildContext::new();
        let double = IdentityBuilder::build(
            &mut twice,
            IdentityRequest::new("worker", ServicePrincipal::Lambda)
                .grant(grant.clone())
                .grant(grant.clone()),
        )
        .unwrap();
        assert_eq!(single.grants(), double.grants());

        // Re-attaching at the provider is also a no-op.
        let provider = MemoryProvider::default();
        let report = deploy(&provider, twice.graph(), &GlobalConfig::default())
            .await
            .unwrap();
        let handle = report.handle(double.role()).unwrap().clone();
        provider.attach(&handle, &grant.to_attachment()).await.unwrap();

        let attached = provider.attachments(double.role()).await;
        assert_eq!(attached.len(), double.grants().len());
    }

    #[test]
    fn test_grant_order_does_not_matter() {
        let a = PolicyGrant::managed(managed::LAMBDA_FULL_ACCESS);
        let b = PolicyGrant::inline("reads", vec![Statement::allow(["s3:GetObject"], ["*"])]);

        let mut ctx = BuildContext::new();
        let forward = IdentityBuilder::build(
            &mut ctx,
            IdentityRequest::new("forward", ServicePrincipal::Lambda)
                .grants([a.clone(), b.clone()]),
        )
        .unwrap();
        let backward = IdentityBuilder::build(
            &mut ctx,
            IdentityRequest::new("backward", ServicePrincipal::Lambda).grants([b, a]),
        )
        .unwrap();

        assert_eq!(forward.grants(), backward.grants());
    }

    #[tokio::test]
    async fn test_compute_identity_always_logs() {
        let mut ctx = BuildContext::new();
        let spec = IdentityBuilder::build(
            &mut ctx,
            IdentityRequest::new("processor-role", ServicePrincipal::Lambda),
        )
        .unwrap();
        assert!(spec.grants().permits_execution_logging());

        let provider = MemoryProvider::default();
        deploy(&provider, ctx.graph(), &GlobalConfig::default())
            .await
            .unwrap();
        assert_eq!(
            provider.attachments(spec.role()).await,
            vec![Attachment::Managed {
                policy_arn: managed::LAMBDA_BASIC_EXECUTION.to_string()
            }]
        );
    }
}

mod stream_tests {
    use super::*;

    #[test]
    fn test_unrealized_transform_fails_without_partial_build() {
        // A transform declared in a different build has never been realized here.
        let mut elsewhere = BuildContext::new();
        let role = IdentityBuilder::build(
            &mut elsewhere,
            IdentityRequest::new("role", ServicePrincipal::Lambda),
        )
        .unwrap();
        let transform =
            TransformBuilder::build(&mut elsewhere, &role, TransformRequest::new("processor", "."))
                .unwrap();

        let mut ctx = BuildContext::new();
        let storage = StorageBuilder::build(&mut ctx, "acme").unwrap();
        let delivery = IdentityBuilder::build(
            &mut ctx,
            IdentityRequest::new("delivery", ServicePrincipal::Firehose),
        )
        .unwrap();
        let before = ctx.graph().len();

        let err = StreamBuilder::build(
            &mut ctx,
            &storage,
            &delivery,
            &[transform],
            StreamRequest {
                name: "clicks".to_string(),
                log_group_name: "/aws/kinesisfirehose/clicks".to_string(),
                log_stream_name: "S3Delivery".to_string(),
                alarm_name: "clicks-freshness".to_string(),
                alarm: AlarmConfig::default(),
                source: None,
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Dependency {
                source: GraphError::UnrealizedDependency { ref missing, .. }
            } if missing.kind() == kinds::FUNCTION
        ));
        assert_eq!(ctx.graph().len(), before);
        assert!(!ctx.is_realized(&ResourceRef::new(
            kinds::LOG_GROUP,
            "/aws/kinesisfirehose/clicks"
        )));
    }

    #[test]
    fn test_alarm_watches_freshness_and_stream_is_complete() {
        let mut config = acme();
        config.alarm = AlarmConfig {
            threshold: 60.0,
            evaluation_periods: 2,
            period_seconds: 120,
            ..Default::default()
        };
        let (graph, result) = PipelineBuilder::new(&config).build().unwrap();

        let alarm = result.stream.alarm();
        assert_eq!(alarm.comparator, Comparator::GreaterThanOrEqualToThreshold);
        assert_eq!(alarm.metric_name, "DeliveryToS3.DataFreshness");
        assert_eq!(alarm.threshold, 60.0);
        assert_eq!(alarm.evaluation_periods, 2);
        assert_eq!(alarm.period_seconds, 120);
        assert_eq!(result.stream.state(), StreamState::Complete);

        // The alarm comes after the stream and after the processing chain.
        let plan = graph.plan().unwrap();
        let stream = plan.position(result.stream.stream()).unwrap();
        let function = plan.position(result.transform.function()).unwrap();
        let alarm_position = plan.position(&alarm.alarm).unwrap();
        assert!(function < stream && stream < alarm_position);
        assert_eq!(
            plan.steps[alarm_position].properties["comparison_operator"],
            "GreaterThanOrEqualToThreshold"
        );
    }
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_deploy_wires_identifiers_end_to_end() {
        let config = acme();
        let (graph, result) = PipelineBuilder::new(&config).build().unwrap();

        let provider = MemoryProvider::default();
        let report = deploy(&provider, &graph, &GlobalConfig::default())
            .await
            .unwrap();
        check_report(&report).unwrap();

        let function = provider
            .create_request(result.transform.function())
            .await
            .unwrap();
        assert_eq!(
            function.properties["role"],
            "arn:aws:iam::123456789012:role/clicks-transform-role"
        );

        let stream = provider.create_request(result.stream.stream()).await.unwrap();
        let s3 = &stream.properties["extended_s3_configuration"];
        assert_eq!(s3["bucket_arn"], "arn:aws:s3:::acme");
        assert_eq!(s3["role_arn"], "arn:aws:iam::123456789012:role/clicks-delivery-role");
        assert_eq!(
            s3["processing_configuration"]["processors"][0]["parameters"][0]["parameter_value"],
            "arn:aws:lambda:us-east-1:123456789012:function:clicks-processor:$LATEST"
        );
        assert_eq!(s3["cloudwatch_logging_options"]["log_stream_name"], "S3Delivery");

        let outputs = resolve_outputs(&result.outputs, &report).unwrap();
        assert_eq!(outputs.bucket_name, "acme");
        assert_eq!(
            outputs.stream_arn,
            "arn:aws:firehose:us-east-1:123456789012:deliverystream/clicks"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_dependents_and_surfaces_verbatim() {
        let config = acme();
        let (graph, result) = PipelineBuilder::new(&config).build().unwrap();

        let provider = MemoryProvider::default().fail_on("clicks-transform-role", true);
        let report = deploy(&provider, &graph, &GlobalConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            report.status(result.transform.function()),
            Some(NodeStatus::Aborted { .. })
        ));
        assert!(matches!(
            report.status(result.stream.stream()),
            Some(NodeStatus::Aborted { .. })
        ));
        assert!(matches!(
            report.status(&result.stream.alarm().alarm),
            Some(NodeStatus::Aborted { .. })
        ));
        // Independent branches were still created.
        assert!(report.resolved(result.storage.primary()).is_some());
        assert!(report.resolved(result.delivery_identity.role()).is_some());
        assert!(resolve_outputs(&result.outputs, &report).is_none());

        let err = check_report(&report).unwrap_err();
        assert!(err.is_retryable());
        match err {
            PipelineError::Provider { source, aborted } => {
                assert_eq!(source.name, "clicks-transform-role");
                assert_eq!(source.message, "injected fault");
                assert_eq!(aborted.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_grant_fails_role_and_aborts_dependents() {
        let config = acme();
        let (graph, result) = PipelineBuilder::new(&config).build().unwrap();

        let provider = MemoryProvider::default().fail_on_attach("clicks-transform-role", false);
        let report = deploy(&provider, &graph, &GlobalConfig::default())
            .await
            .unwrap();

        let role = result.transform_identity.role();
        assert!(matches!(report.status(role), Some(NodeStatus::Failed(_))));
        assert_eq!(
            report.status(result.transform.function()),
            Some(&NodeStatus::Aborted {
                cause: role.clone()
            })
        );
        // The role was created before the grant was rejected and stays in place.
        assert!(provider.create_request(role).await.is_some());
        assert!(provider.create_request(result.transform.function()).await.is_none());

        let err = check_report(&report).unwrap_err();
        assert!(!err.is_retryable());
        match err {
            PipelineError::Provider { source, aborted } => {
                assert_eq!(source.name, "clicks-transform-role");
                assert_eq!(source.message, "injected attach fault");
                assert!(aborted.contains(result.stream.stream()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rebuilding_same_config_is_a_name_collision() {
        let config = acme();
        let mut ctx = BuildContext::new();
        PipelineBuilder::new(&config).build_into(&mut ctx).unwrap();
        let before = ctx.graph().len();

        let err = PipelineBuilder::new(&config)
            .build_into(&mut ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration {
                source: ConfigError::NameCollision { .. }
            }
        ));
        assert_eq!(ctx.graph().len(), before);
    }

    #[test]
    fn test_concurrent_build_of_same_pipeline_rejected() {
        let config = acme();
        let registry = PipelineRegistry::new();
        let _first = registry.acquire(config.name()).unwrap();

        let err = registry.acquire(config.name()).unwrap_err();
        assert!(matches!(err, ConfigError::PipelineInUse { .. }));

        // A different pipeline builds independently.
        let other = PipelineConfig::new("globex", "orders");
        let _second = registry.acquire(other.name()).unwrap();
        assert!(PipelineBuilder::new(&other).build().is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_limit_still_creates_everything() {
        let config = acme();
        let (graph, _) = PipelineBuilder::new(&config).build().unwrap();

        let provider = MemoryProvider::default();
        let global = GlobalConfig {
            total_concurrency: Some(1),
        };
        let report = deploy(&provider, &graph, &global).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(provider.creates().await.len(), graph.len());
    }
}

mod config_tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pipelines_merged_across_files_build_together() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pipelines");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join("clicks.yaml"),
            "pipelines:\n  clicks:\n    bucket_name: acme\n",
        )
        .unwrap();
        fs::write(
            dir.join("orders.yml"),
            "pipelines:\n  orders:\n    bucket_name: globex\n    alarm:\n      threshold: 300\n",
        )
        .unwrap();
        let global = temp.path().join("global.yaml");
        fs::write(&global, "global:\n  total_concurrency: 2\n").unwrap();

        let config =
            Config::from_paths(&[ConfigPath::file(&global), ConfigPath::dir(&dir)]).unwrap();
        assert_eq!(config.pipeline_count(), 2);
        assert_eq!(config.global.total_concurrency, Some(2));

        let mut ctx = BuildContext::new();
        for (_, pipeline) in config.pipelines() {
            PipelineBuilder::new(pipeline).build_into(&mut ctx).unwrap();
        }
        assert!(ctx.is_realized(&ResourceRef::new(kinds::DELIVERY_STREAM, "orders")));
        assert!(ctx.is_realized(&ResourceRef::new(kinds::BUCKET, "globex-logging")));
    }

    #[test]
    fn test_conflicting_files_rejected() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.yaml");
        let b = temp.path().join("b.yaml");
        fs::write(&a, "pipelines:\n  clicks:\n    bucket_name: acme\n").unwrap();
        fs::write(&b, "pipelines:\n  orders:\n    bucket_name: acme\n").unwrap();

        let err = Config::from_paths(&[ConfigPath::file(&a), ConfigPath::file(&b)]).unwrap_err();
        assert!(matches!(err, ConfigError::ResourceConflict { .. }));
    }
}
