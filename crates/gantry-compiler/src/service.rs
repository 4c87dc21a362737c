use crate::synthesize::StackContext;
use crate::template::{apply_overlay, get_att, tag_list, Export, Output, Resource, Template};
use crate::CompileError;
use gantry_registry::ImageLocator;
use gantry_schema::{identifier, DeploymentMode, GlobalDefaults, KeyValue, ResolvedService};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Logical id of the deployment-wide image-pull role, emitted once and used
/// as the default access role for every service without its own.
pub const ECR_ACCESS_ROLE_ID: &str = "AppRunnerECRAccessRole";

const SERVICE_SUFFIX: &str = "AppRunnerService";
const INSTANCE_ROLE_SUFFIX: &str = "AppRunnerInstanceRole";
const SCHEDULE_RULE_SUFFIX: &str = "AppRunnerScheduleRule";
const URL_OUTPUT_SUFFIX: &str = "AppRunnerServiceUrl";
const IAM_POLICY_VERSION: &str = "2012-10-17";

/// Compile one resolved service into its resource definitions and output
/// bindings: the App Runner service, its instance role, the schedule rule
/// for scheduled services, and the exported service URL.
pub fn compile_service(
    service: &ResolvedService,
    locator: &ImageLocator,
    ctx: &StackContext,
) -> Result<Template, CompileError> {
    if locator.is_empty() {
        return Err(CompileError::EmptyImageLocator(service.name.clone()));
    }
    debug!("compiling service '{}' as '{}'", service.name, service.identifier);

    let service_id = format!("{}{SERVICE_SUFFIX}", service.identifier);
    let role_id = instance_role_id(&service.identifier, ctx);
    let mut template = Template::new();

    let access_role_arn = match &service.access_role_arn {
        Some(arn) => Value::String(arn.clone()),
        None => get_att(ECR_ACCESS_ROLE_ID, "Arn"),
    };
    let mut source_configuration = json!({
        "AuthenticationConfiguration": { "AccessRoleArn": access_role_arn },
        "AutoDeploymentsEnabled": service.auto_deploy,
        "ImageRepository": {
            "ImageIdentifier": locator.as_str(),
            "ImageRepositoryType": "ECR",
        },
    });
    if let Some(image_configuration) = image_configuration(service) {
        source_configuration["ImageRepository"]["ImageConfiguration"] = image_configuration;
    }

    let instance_role_arn = match &service.instance_role_arn {
        Some(arn) => Value::String(arn.clone()),
        None => get_att(&role_id, "Arn"),
    };
    let mut properties = json!({
        "ServiceName": service.name,
        "SourceConfiguration": source_configuration,
        "InstanceConfiguration": {
            "Cpu": service.sizing.cpu,
            "Memory": service.sizing.memory,
            "InstanceRoleArn": instance_role_arn,
        },
        "HealthCheckConfiguration": health_check_configuration(service),
        "Tags": tag_list(&service.tags),
    });
    apply_overlay(&mut properties, &service.overlays.service);

    let depends_on = service
        .depends_on
        .iter()
        .map(|dep| format!("{}{SERVICE_SUFFIX}", identifier(dep)))
        .collect();
    template.insert_resource(
        service_id.clone(),
        Resource {
            kind: "AWS::AppRunner::Service".to_owned(),
            depends_on,
            properties,
        },
    )?;

    template.insert_resource(role_id.clone(), instance_role(service, ctx))?;

    if let DeploymentMode::Scheduled { expression } = &service.mode {
        template.insert_resource(
            format!("{}{SCHEDULE_RULE_SUFFIX}", service.identifier),
            schedule_rule(service, expression, &service_id, &role_id),
        )?;
    }

    template.insert_output(
        format!("{}{URL_OUTPUT_SUFFIX}", service.identifier),
        Output {
            value: get_att(&service_id, "ServiceUrl"),
            export: Some(Export {
                name: format!(
                    "{}-{}{URL_OUTPUT_SUFFIX}",
                    ctx.stack_identifier(),
                    service.name
                ),
            }),
        },
    )?;

    Ok(template)
}

/// Compile the shared image-pull role, emitted exactly once per deployment.
pub fn compile_access_role(defaults: &GlobalDefaults) -> Result<Template, CompileError> {
    let mut properties = json!({
        "AssumeRolePolicyDocument": {
            "Version": IAM_POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "build.apprunner.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }],
        },
        "Policies": [{
            "PolicyName": "AWSAppRunnerServicePolicyForECRAccess",
            "PolicyDocument": {
                "Version": IAM_POLICY_VERSION,
                "Statement": [{
                    "Effect": "Allow",
                    "Action": [
                        "ecr:GetDownloadUrlForLayer",
                        "ecr:BatchGetImage",
                        "ecr:DescribeImages",
                        "ecr:GetAuthorizationToken",
                        "ecr:BatchCheckLayerAvailability",
                    ],
                    "Resource": "*",
                }],
            },
        }],
        "Tags": tag_list(&defaults.tags),
    });
    apply_overlay(&mut properties, &defaults.overlays.access_role);

    let mut template = Template::new();
    template.insert_resource(
        ECR_ACCESS_ROLE_ID,
        Resource {
            kind: "AWS::IAM::Role".to_owned(),
            depends_on: Vec::new(),
            properties,
        },
    )?;
    Ok(template)
}

fn instance_role_id(service_identifier: &str, ctx: &StackContext) -> String {
    match ctx.stage() {
        Some(stage) => format!(
            "{service_identifier}{INSTANCE_ROLE_SUFFIX}{}",
            identifier(stage)
        ),
        None => format!("{service_identifier}{INSTANCE_ROLE_SUFFIX}"),
    }
}

fn instance_role(service: &ResolvedService, ctx: &StackContext) -> Resource {
    let role_name = match ctx.stage() {
        Some(stage) => format!("{}Apprunner-instance-role-{stage}", service.name),
        None => format!("{}Apprunner-instance-role", service.name),
    };
    let mut properties = json!({
        "RoleName": role_name,
        "AssumeRolePolicyDocument": {
            "Version": IAM_POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": ["tasks.apprunner.amazonaws.com"] },
                "Action": ["sts:AssumeRole"],
            }],
        },
        "Tags": tag_list(&service.tags),
    });
    // No Policies key at all when there is nothing to grant; an empty
    // statement list must not become an empty policy object.
    if !service.iam_role_statements.is_empty() {
        properties["Policies"] = json!([{
            "PolicyName": "ApprunnerTaskPolicy",
            "PolicyDocument": {
                "Version": IAM_POLICY_VERSION,
                "Statement": service.iam_role_statements,
            },
        }]);
    }
    if !service.iam_managed_policies.is_empty() {
        properties["ManagedPolicyArns"] = json!(service.iam_managed_policies);
    }
    apply_overlay(&mut properties, &service.overlays.instance_role);

    Resource {
        kind: "AWS::IAM::Role".to_owned(),
        depends_on: Vec::new(),
        properties,
    }
}

fn schedule_rule(
    service: &ResolvedService,
    expression: &str,
    service_id: &str,
    role_id: &str,
) -> Resource {
    Resource {
        kind: "AWS::Events::Rule".to_owned(),
        depends_on: Vec::new(),
        properties: json!({
            "ScheduleExpression": expression,
            "State": "ENABLED",
            "Targets": [{
                "Id": service.identifier,
                "Arn": get_att(service_id, "ServiceArn"),
                "RoleArn": get_att(role_id, "Arn"),
            }],
        }),
    }
}

/// The runtime image configuration exists only when at least one of port,
/// runtime variables, runtime secrets, or start command is set; each
/// sub-field is itself conditional on its own value.
fn image_configuration(service: &ResolvedService) -> Option<Value> {
    let configured = service.port.is_some()
        || !service.runtime_variables.is_empty()
        || !service.runtime_secrets.is_empty()
        || service.command.is_some();
    if !configured {
        return None;
    }

    let mut block = Map::new();
    if let Some(port) = service.port {
        block.insert("Port".to_owned(), json!(port.to_string()));
    }
    if !service.runtime_variables.is_empty() {
        block.insert(
            "RuntimeEnvironmentVariables".to_owned(),
            name_value_list(&service.runtime_variables),
        );
    }
    if !service.runtime_secrets.is_empty() {
        block.insert(
            "RuntimeEnvironmentSecrets".to_owned(),
            name_value_list(&service.runtime_secrets),
        );
    }
    if let Some(command) = &service.command {
        block.insert("StartCommand".to_owned(), json!(command));
    }
    Some(Value::Object(block))
}

fn name_value_list(pairs: &[KeyValue]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|pair| json!({ "Name": pair.name, "Value": pair.value }))
            .collect(),
    )
}

fn health_check_configuration(service: &ResolvedService) -> Value {
    let policy = &service.health_check;
    let mut block = Map::new();
    block.insert(
        "HealthyThreshold".to_owned(),
        json!(policy.healthy_threshold),
    );
    block.insert("Interval".to_owned(), json!(policy.interval));
    if let Some(path) = &policy.path {
        block.insert("Path".to_owned(), json!(path));
    }
    block.insert("Protocol".to_owned(), json!(policy.protocol));
    block.insert("Timeout".to_owned(), json!(policy.timeout));
    block.insert(
        "UnhealthyThreshold".to_owned(),
        json!(policy.unhealthy_threshold),
    );
    Value::Object(block)
}
