//! Provider operations against the scripted engine

use serde_json::json;

use tfbroker::app::options::FeatureFlags;
use tfbroker::errors::BrokerError;
use tfbroker::models::context::RequestContext;
use tfbroker::models::definition::{ActionSettings, BrokerVariable, ImportVariable, ServicePlan};
use tfbroker::models::deployment::{OperationState, OperationType};
use tfbroker::workspace::{ParameterMapping, Workspace};

use crate::support::{binaries, definition, state, vars, Harness};

#[tokio::test]
async fn test_provision_then_poll() {
    let harness = Harness::new();
    let ctx = RequestContext::new();

    let details = harness
        .provider
        .provision(&ctx, &vars(json!({"tf_id": "tf:i1:", "name": "db", "unused": 1})))
        .await
        .unwrap();
    assert_eq!(details.operation_guid, "tf:i1:");
    assert_eq!(details.operation_type, OperationType::Provision);

    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();
    let status = harness.provider.poll_instance(&ctx, "i1").await.unwrap();
    assert!(status.finished);
    assert!(status.error.is_none());
    assert_eq!(status.message, "provision succeeded: ready");

    // No state yet, so no provider renames before the first apply
    assert_eq!(harness.engine.trace(), vec!["1.6.0 init", "1.6.0 apply"]);

    let deployment = harness.provider.manager().get_terraform_deployment("tf:i1:").await.unwrap();
    assert!(deployment.workspace.has_state());
    let config = &deployment.workspace.instances[0].configuration;
    assert_eq!(config.get("name"), Some(&json!("db")));
    assert!(!config.contains_key("unused"));
}

#[tokio::test]
async fn test_provision_outputs() {
    let mut definition = definition();
    definition.provision_settings.template =
        "variable username { type = string }\noutput username { value = var.username }".to_string();
    definition.provision_settings.user_inputs[0].field_name = "username".to_string();
    let harness = Harness::with(definition, binaries("1.6.0", &[]), FeatureFlags::default());
    harness.engine.set_outputs(json!({"username": "alice"}));
    let ctx = RequestContext::new();

    harness
        .provider
        .provision(&ctx, &vars(json!({"tf_id": "tf:inst-1:", "username": "alice"})))
        .await
        .unwrap();
    harness.provider.wait(&ctx, "tf:inst-1:").await.unwrap();

    let applies = harness
        .engine
        .calls()
        .iter()
        .filter(|call| call.subcommand() == "apply")
        .count();
    assert_eq!(applies, 1);

    let status = harness.provider.poll_instance(&ctx, "inst-1").await.unwrap();
    assert_eq!(status.message, "provision succeeded");

    let outputs = harness.provider.get_terraform_outputs(&ctx, "inst-1").await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.get("username"), Some(&json!("alice")));
}

#[tokio::test]
async fn test_provision_requires_tf_id() {
    let harness = Harness::new();

    let err = harness
        .provider
        .provision(&RequestContext::new(), &vars(json!({"name": "db"})))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::MissingKey(_)));
    assert!(err.to_string().contains("tf_id"));

    let stored = harness.provider.manager().list_terraform_deployments().await.unwrap();
    assert!(stored.is_empty());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_failed_apply_is_reported_by_poll() {
    let harness = Harness::new();
    harness.engine.fail_on("apply");
    let ctx = RequestContext::new();

    harness
        .provider
        .provision(&ctx, &vars(json!({"tf_id": "tf:i1:", "name": "db"})))
        .await
        .unwrap();

    let err = harness.provider.wait(&ctx, "tf:i1:").await.unwrap_err();
    assert_eq!(err.to_string(), "Error: boom exit status 1");

    let status = harness.provider.poll_instance(&ctx, "i1").await.unwrap();
    assert!(status.finished);
    assert_eq!(status.message, "Error: boom exit status 1");
    assert_eq!(
        status.error.map(|e| e.to_string()).as_deref(),
        Some("Error: boom exit status 1")
    );
}

#[tokio::test]
async fn test_bind_returns_outputs() {
    let harness = Harness::new();
    harness.engine.set_outputs(json!({"username": "admin"}));
    let ctx = RequestContext::new();

    let outputs = harness
        .provider
        .bind(&ctx, &vars(json!({"tf_id": "tf:i1:b1", "username": "admin"})))
        .await
        .unwrap();
    assert_eq!(outputs.get("username"), Some(&json!("admin")));

    let binding = harness.provider.manager().get_terraform_deployment("tf:i1:b1").await.unwrap();
    assert_eq!(binding.last_operation_type, OperationType::Bind);
    assert_eq!(binding.last_operation_state, OperationState::Succeeded);
}

#[tokio::test]
async fn test_bind_failure_wraps_job_error() {
    let harness = Harness::new();
    harness.engine.fail_on("apply");

    let err = harness
        .provider
        .bind(&RequestContext::new(), &vars(json!({"tf_id": "tf:i1:b1", "username": "admin"})))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::UpstreamApplyFailed(_)));
    assert_eq!(err.to_string(), "error from job runner: Error: boom exit status 1");
}

#[tokio::test]
async fn test_unbind_then_delete_binding_data() {
    let mut binaries = binaries("1.6.0", &[]);
    binaries
        .provider_replacements
        .insert("registry.terraform.io/hashicorp/random".into(), "registry.opentofu.org/hashicorp/random".into());
    let harness = Harness::with(definition(), binaries, FeatureFlags::default());
    let ctx = RequestContext::new();
    let binding_vars = vars(json!({"tf_id": "tf:i1:b1", "username": "admin"}));

    harness.provider.bind(&ctx, &binding_vars).await.unwrap();
    harness.engine.clear();

    harness.provider.unbind(&ctx, "i1", "b1", &binding_vars).await.unwrap();
    assert_eq!(
        harness.engine.trace(),
        vec!["1.6.0 state", "1.6.0 init", "1.6.0 destroy"]
    );
    let calls = harness.engine.calls();
    let rename = &calls[0].args;
    assert_eq!(rename[1], "replace-provider");
    assert_eq!(rename[3], "registry.terraform.io/hashicorp/random");

    let binding = harness.provider.manager().get_terraform_deployment("tf:i1:b1").await.unwrap();
    assert_eq!(binding.last_operation_type, OperationType::Unbind);
    assert_eq!(binding.last_operation_message, "unbind succeeded");

    harness.provider.delete_binding_data(&ctx, "i1", "b1").await.unwrap();
    let err = harness
        .provider
        .manager()
        .get_terraform_deployment("tf:i1:b1")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::MissingDeployment(_)));
}

#[tokio::test]
async fn test_deprovision_does_not_wait() {
    let harness = Harness::new();
    let ctx = RequestContext::new();
    let instance_vars = vars(json!({"tf_id": "tf:i1:", "name": "db"}));

    harness.provider.provision(&ctx, &instance_vars).await.unwrap();
    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();

    let id = harness.provider.deprovision(&ctx, "i1", &instance_vars).await.unwrap();
    assert_eq!(id, "tf:i1:");
    harness.provider.wait(&ctx, &id).await.unwrap();

    let deployment = harness.provider.manager().get_terraform_deployment(&id).await.unwrap();
    assert_eq!(deployment.last_operation_type, OperationType::Deprovision);
    assert_eq!(deployment.last_operation_state, OperationState::Succeeded);
    assert!(deployment.workspace.outputs("instance").unwrap().is_empty());
}

#[tokio::test]
async fn test_destroy_rejected_during_provision() {
    let harness = Harness::new();
    let manager = harness.provider.manager();

    let mut deployment = manager
        .create_and_save_deployment("tf:i1:", Workspace::default())
        .await
        .unwrap();
    manager
        .mark_operation_started(&mut deployment, OperationType::Provision)
        .await
        .unwrap();

    let err = harness
        .provider
        .check_operation_constraints("tf:i1:", OperationType::Deprovision)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::DestroyDuringProvision));

    harness
        .provider
        .check_operation_constraints("tf:i1:", OperationType::Update)
        .await
        .unwrap();
    harness
        .provider
        .check_operation_constraints("tf:unknown:", OperationType::Deprovision)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_reapplies_with_new_vars() {
    let harness = Harness::new();
    let ctx = RequestContext::new();

    harness
        .provider
        .provision(&ctx, &vars(json!({"tf_id": "tf:i1:", "name": "db"})))
        .await
        .unwrap();
    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();

    let details = harness
        .provider
        .update(&ctx, &vars(json!({"tf_id": "tf:i1:", "name": "db-2"})))
        .await
        .unwrap();
    assert_eq!(details.operation_type, OperationType::Update);
    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();

    let deployment = harness.provider.manager().get_terraform_deployment("tf:i1:").await.unwrap();
    assert_eq!(deployment.last_operation_message, "update succeeded: ready");
    assert_eq!(
        deployment.workspace.instances[0].configuration.get("name"),
        Some(&json!("db-2"))
    );
}

#[tokio::test]
async fn test_update_rejects_subsume() {
    let harness = Harness::new();

    let err = harness
        .provider
        .update(&RequestContext::new(), &vars(json!({"tf_id": "tf:i1:", "subsume": true})))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::CannotUpdateSubsumePlan));
}

const SHOWN_DATABASE: &str = r#"# google_sql_database_instance.instance:
resource "google_sql_database_instance" "instance" {
    name      = "db-1"
    tier      = "db-f1-micro"
    self_link = "https://example.com/db-1"
}
"#;

fn import_definition() -> tfbroker::models::definition::ServiceDefinition {
    let mut definition = definition();
    definition.provision_settings = ActionSettings {
        plan_inputs: vec![BrokerVariable {
            field_name: "subsume".to_string(),
            ..Default::default()
        }],
        templates: [(
            "variables".to_string(),
            "variable \"tier\" { type = string }\n".to_string(),
        )]
        .into_iter()
        .collect(),
        import_variables: vec![ImportVariable {
            field_name: "instance_name".to_string(),
            tf_resource: "google_sql_database_instance.instance".to_string(),
            ..Default::default()
        }],
        import_parameter_mappings: vec![ParameterMapping::new("tier", "var.tier")],
        import_parameters_to_delete: vec!["google_sql_database_instance.instance.self_link".to_string()],
        ..Default::default()
    };
    definition
}

#[tokio::test]
async fn test_subsume_provision() {
    let harness = Harness::with(import_definition(), binaries("1.6.0", &[]), FeatureFlags::default());
    *harness.engine.show_output.lock().unwrap() = SHOWN_DATABASE.to_string();
    *harness.engine.plan_output.lock().unwrap() =
        "Plan: 0 to add, 1 to change, 0 to destroy.".to_string();
    let ctx = RequestContext::new();

    harness
        .provider
        .provision(
            &ctx,
            &vars(json!({"tf_id": "tf:i1:", "subsume": true, "instance_name": "db-1"})),
        )
        .await
        .unwrap();
    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();

    let subcommands: Vec<String> = harness
        .engine
        .calls()
        .iter()
        .map(|call| call.subcommand().to_string())
        .collect();
    assert_eq!(
        subcommands,
        vec!["init", "import", "init", "show", "init", "plan", "init", "apply"]
    );
    let calls = harness.engine.calls();
    let import = &calls[1].args;
    assert_eq!(import[1..], ["google_sql_database_instance.instance", "db-1"]);

    let deployment = harness.provider.manager().get_terraform_deployment("tf:i1:").await.unwrap();
    let main = &deployment.workspace.modules[0].definitions["main"];
    assert!(main.contains("tier = var.tier"));
    assert!(!main.contains("self_link"));
    assert_eq!(
        deployment.workspace.instances[0].configuration.get("tier"),
        Some(&json!("db-f1-micro"))
    );
}

#[tokio::test]
async fn test_subsume_rejects_destroying_plan() {
    let harness = Harness::with(import_definition(), binaries("1.6.0", &[]), FeatureFlags::default());
    *harness.engine.show_output.lock().unwrap() = SHOWN_DATABASE.to_string();
    *harness.engine.plan_output.lock().unwrap() =
        "Plan: 1 to add, 0 to change, 1 to destroy.".to_string();
    let ctx = RequestContext::new();

    harness
        .provider
        .provision(
            &ctx,
            &vars(json!({"tf_id": "tf:i1:", "subsume": true, "instance_name": "db-1"})),
        )
        .await
        .unwrap();
    let err = harness.provider.wait(&ctx, "tf:i1:").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "tofu plan shows that resources would be destroyed - cancelling subsume"
    );
    assert!(!harness.engine.trace().contains(&"1.6.0 apply".to_string()));
}

#[tokio::test]
async fn test_subsume_requires_import_values() {
    let harness = Harness::with(import_definition(), binaries("1.6.0", &[]), FeatureFlags::default());

    let err = harness
        .provider
        .provision(&RequestContext::new(), &vars(json!({"tf_id": "tf:i1:", "subsume": true})))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::MissingImportParameter(_)));
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_imported_properties() {
    let mut definition = definition();
    definition.plans = vec![ServicePlan {
        id: "plan-subsume".to_string(),
        properties: json!({"subsume": true}).as_object().cloned().unwrap(),
        ..Default::default()
    }];
    let harness = Harness::with(definition, binaries("1.6.0", &[]), FeatureFlags::default());
    *harness.engine.show_output.lock().unwrap() = SHOWN_DATABASE.to_string();

    let mut workspace = Workspace::new(
        &serde_json::Map::new(),
        crate::support::PROVISION_TEMPLATE,
        &Default::default(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
    .unwrap();
    workspace.state = Some(state("1.6.0", serde_json::Map::new()));
    harness
        .provider
        .manager()
        .create_and_save_deployment("tf:i1:", workspace)
        .await
        .unwrap();

    let inputs = vec![BrokerVariable {
        field_name: "tier".to_string(),
        tf_attribute: "google_sql_database_instance.instance.tier".to_string(),
        tf_attribute_skip: "skip_tier".to_string(),
        ..Default::default()
    }];
    let ctx = RequestContext::new();

    let details = json!({});
    let values = harness
        .provider
        .get_imported_properties(&ctx, "plan-plain", "i1", &inputs, details.as_object().unwrap())
        .await
        .unwrap();
    assert_eq!(values.get("tier").map(String::as_str), Some("db-f1-micro"));

    // Skipped variables and subsume plans never run the engine
    harness.engine.clear();
    let skip = json!({"skip_tier": true});
    let values = harness
        .provider
        .get_imported_properties(&ctx, "plan-plain", "i1", &inputs, skip.as_object().unwrap())
        .await
        .unwrap();
    assert!(values.is_empty());
    let values = harness
        .provider
        .get_imported_properties(&ctx, "plan-subsume", "i1", &inputs, details.as_object().unwrap())
        .await
        .unwrap();
    assert!(values.is_empty());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_wait_returns_ok() {
    let harness = Harness::new();
    let manager = harness.provider.manager();
    let mut deployment = manager
        .create_and_save_deployment("tf:i1:", Workspace::default())
        .await
        .unwrap();
    manager
        .mark_operation_started(&mut deployment, OperationType::Provision)
        .await
        .unwrap();

    let ctx = RequestContext::new();
    ctx.cancel();
    harness.provider.wait(&ctx, "tf:i1:").await.unwrap();
}

#[test]
fn test_definition_validation() {
    definition().validate().unwrap();

    let mut undeclared = definition();
    undeclared.bind_settings.user_inputs.clear();
    let err = undeclared.validate().unwrap_err();
    assert_eq!(err.to_string(), "Configuration error: fields used but not declared: username");

    let mut broken = definition();
    broken.provision_settings.template = "variable \"name\" {".to_string();
    assert!(matches!(broken.validate(), Err(BrokerError::InvalidModule(_))));
}
