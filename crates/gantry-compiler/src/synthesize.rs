use crate::service::{compile_access_role, compile_service};
use crate::template::Template;
use crate::CompileError;
use gantry_registry::{ImageLocator, ImageResolver};
use gantry_schema::{identifier, DeploymentConfig};
use tracing::{debug, info};

/// Deployment-wide naming context for one synthesis pass: the enclosing
/// stack's name (sanitized into export names) and an optional stage
/// discriminator that qualifies per-stage resource names.
#[derive(Debug, Clone)]
pub struct StackContext {
    stack_name: String,
    stage: Option<String>,
}

impl StackContext {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            stage: None,
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn stack_identifier(&self) -> String {
        identifier(&self.stack_name)
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }
}

/// Run the whole compile pass: normalize the document, resolve every
/// service's image, compile each service, fold in the shared image-pull
/// role, and validate the accumulated graph.
///
/// Images resolve strictly one service at a time: a resolver may keep
/// per-call registration state that has to be torn down before the next
/// call starts. The first failed resolution aborts the pass; no partial
/// graph is ever returned.
pub async fn synthesize(
    config: &DeploymentConfig,
    ctx: &StackContext,
    resolver: &dyn ImageResolver,
) -> Result<Template, CompileError> {
    let deployment = config.normalize()?;
    info!("normalized {} service(s)", deployment.services.len());

    let mut locators: Vec<ImageLocator> = Vec::with_capacity(deployment.services.len());
    for service in &deployment.services {
        debug!("resolving image '{}' for service '{}'", service.image, service.name);
        let locator = resolver
            .resolve(&service.name, &service.image)
            .await
            .map_err(|source| CompileError::Resolution {
                service: service.name.clone(),
                source,
            })?;
        locators.push(locator);
    }

    let mut template = Template::new();
    for (service, locator) in deployment.services.iter().zip(&locators) {
        template.merge(compile_service(service, locator, ctx)?)?;
    }
    template.merge(compile_access_role(&deployment.defaults)?)?;
    template.validate_references()?;

    info!(
        "compiled {} resource(s) and {} output(s)",
        template.resources.len(),
        template.outputs.len()
    );
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ECR_ACCESS_ROLE_ID;
    use gantry_registry::MockResolver;
    use gantry_schema::parse_config_str;

    fn config(input: &str) -> DeploymentConfig {
        parse_config_str(input).expect("should parse")
    }

    fn ctx() -> StackContext {
        StackContext::new("my-stack")
    }

    #[tokio::test]
    async fn minimal_deployment_compiles_four_graph_entries() {
        let config = config("[services.web]\nimage = \"repo/web:tag\"\n");
        let template = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();

        // one service, one instance role, one shared access role, one URL output
        assert_eq!(template.resources.len(), 3);
        assert_eq!(template.outputs.len(), 1);
        assert!(template.resources.contains_key("WebAppRunnerService"));
        assert!(template.resources.contains_key("WebAppRunnerInstanceRole"));
        assert!(template.resources.contains_key(ECR_ACCESS_ROLE_ID));
        assert!(template.outputs.contains_key("WebAppRunnerServiceUrl"));
    }

    #[tokio::test]
    async fn shared_access_role_is_emitted_once_for_many_services() {
        let config = config(
            "[services.a]\nimage = \"repo/a:tag\"\n\n[services.b]\nimage = \"repo/b:tag\"\n",
        );
        let template = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();
        let shared = template
            .resources
            .keys()
            .filter(|id| *id == ECR_ACCESS_ROLE_ID)
            .count();
        assert_eq!(shared, 1);
        assert_eq!(template.resources.len(), 5);
        assert_eq!(template.outputs.len(), 2);
    }

    #[tokio::test]
    async fn images_resolve_sequentially_in_service_order() {
        let config = config(
            "[services.a]\nimage = \"repo/a:tag\"\n\n[services.b]\nimage = \"repo/b:tag\"\n",
        );
        let resolver = MockResolver::new();
        synthesize(&config, &ctx(), &resolver).await.unwrap();
        assert_eq!(resolver.resolved_services(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn resolution_failure_aborts_the_whole_pass() {
        let config = config(
            "[services.a]\nimage = \"repo/a:tag\"\n\n[services.b]\nimage = \"repo/b:tag\"\n",
        );
        let resolver = MockResolver::new().with_transport_failure("b", "connection reset");
        let err = synthesize(&config, &ctx(), &resolver).await.unwrap_err();
        match err {
            CompileError::Resolution { service, source } => {
                assert_eq!(service, "b");
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn identifier_collision_fails_before_any_resolution() {
        let config = config(
            "[services.api]\nimage = \"repo/api:tag\"\n\n[services.\"api!\"]\nimage = \"repo/api:tag\"\n",
        );
        let resolver = MockResolver::new();
        let err = synthesize(&config, &ctx(), &resolver).await.unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
        assert!(resolver.resolved_services().is_empty());
    }

    #[tokio::test]
    async fn dependency_on_undeclared_service_is_a_dangling_reference() {
        let config = config(
            "[services.web]\nimage = \"repo/web:tag\"\ndepends_on = [\"ghost\"]\n",
        );
        let err = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, CompileError::DanglingReference { to, .. } if to == "GhostAppRunnerService")
        );
    }

    #[tokio::test]
    async fn dependency_between_declared_services_validates() {
        let config = config(
            "[services.web]\nimage = \"repo/web:tag\"\ndepends_on = [\"worker\"]\n\n\
             [services.worker]\nimage = \"repo/worker:tag\"\n",
        );
        let template = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();
        assert_eq!(
            template.resources["WebAppRunnerService"].depends_on,
            vec!["WorkerAppRunnerService"]
        );
    }

    #[tokio::test]
    async fn scheduled_service_graph_validates_and_carries_rule() {
        let config = config(
            "[services.nightly]\nimage = \"repo/job:tag\"\nschedule = \"rate(1 day)\"\n",
        );
        let template = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();
        assert!(template
            .resources
            .contains_key("NightlyAppRunnerScheduleRule"));
    }

    #[tokio::test]
    async fn synthesis_is_deterministic() {
        let input = "\
[tags]
env = \"prod\"

[services.web]
image = \"repo/web:tag\"
port = 8080

[services.worker]
image = \"repo/worker:tag\"
schedule = \"rate(5 minutes)\"
";
        let config = config(input);
        let first = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();
        let second = synthesize(&config, &ctx(), &MockResolver::new())
            .await
            .unwrap();
        assert_eq!(
            first.to_canonical_json().unwrap(),
            second.to_canonical_json().unwrap()
        );
    }

    #[tokio::test]
    async fn staged_deployment_qualifies_role_names() {
        let config = config("[services.web]\nimage = \"repo/web:tag\"\n");
        let staged = StackContext::new("my-stack").with_stage("staging");
        let template = synthesize(&config, &staged, &MockResolver::new())
            .await
            .unwrap();
        assert!(template
            .resources
            .contains_key("WebAppRunnerInstanceRoleStaging"));
        assert!(!template.resources.contains_key("WebAppRunnerInstanceRole"));
    }
}
