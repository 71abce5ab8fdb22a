//! Parameter value resolution.

use std::sync::Arc;
use tracing::debug;

use crate::config::{
    ListItem, ParameterValue, ResolverSpec, RESOLVER_LITERAL, RESOLVER_STACK_OUTPUT,
};
use crate::error::{ConfigError, ResolveError, Result};
use crate::provider::ProvisioningClient;

/// Separator used when joining list parameters.
const LIST_SEPARATOR: &str = ",";

/// Turns declarative parameter values into the strings sent to the service.
///
/// Only `stack-output` resolvers perform I/O. Failures are returned to the
/// caller as-is; nothing is retried here.
#[derive(Clone)]
pub struct ParameterResolver {
    client: Arc<dyn ProvisioningClient>,
}

impl std::fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterResolver").finish_non_exhaustive()
    }
}

impl ParameterResolver {
    /// Creates a resolver that reads stack outputs through `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ProvisioningClient>) -> Self {
        Self { client }
    }

    /// Resolves the value of parameter `name` for a stack deployed to `region`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty literal or a malformed
    /// resolver, and a resolution error when a referenced output is missing.
    pub async fn resolve(&self, name: &str, value: &ParameterValue, region: &str) -> Result<String> {
        match value {
            ParameterValue::Literal(literal) => {
                if literal.is_empty() {
                    return Err(ConfigError::MissingParameterValue {
                        stack: None,
                        parameter: name.to_string(),
                    }
                    .into());
                }
                Ok(literal.clone())
            }
            ParameterValue::Resolver(spec) => self.resolve_spec(name, spec, region).await,
            ParameterValue::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    let value = match item {
                        ListItem::Literal(literal) => literal.clone(),
                        ListItem::Resolver(spec) => self.resolve_spec(name, spec, region).await?,
                    };
                    if !value.is_empty() {
                        resolved.push(value);
                    }
                }
                Ok(resolved.join(LIST_SEPARATOR))
            }
        }
    }

    async fn resolve_spec(&self, name: &str, spec: &ResolverSpec, region: &str) -> Result<String> {
        match spec.kind.as_str() {
            RESOLVER_LITERAL => Ok(required_field(spec, "value")?.to_string()),
            RESOLVER_STACK_OUTPUT => {
                let stack = required_field(spec, "stack_name")?;
                let key = required_field(spec, "output_key")?;
                self.stack_output(stack, key, region)
                    .await
                    .map_err(|e| ResolveError::parameter(name, e).into())
            }
            other => Err(ResolveError::UnsupportedResolver {
                kind: other.to_string(),
            }
            .into()),
        }
    }

    /// Reads one output of a deployed stack.
    async fn stack_output(&self, stack: &str, key: &str, region: &str) -> Result<String> {
        debug!("Fetching output {key} of stack {stack} in {region}");

        let description = self
            .client
            .describe_stack(region, stack)
            .await?
            .ok_or_else(|| ResolveError::StackNotFound {
                stack: stack.to_string(),
            })?;

        description.outputs.get(key).cloned().ok_or_else(|| {
            ResolveError::MissingOutput {
                stack: stack.to_string(),
                key: key.to_string(),
            }
            .into()
        })
    }
}

fn required_field<'a>(spec: &'a ResolverSpec, field: &str) -> Result<&'a str> {
    spec.field(field).ok_or_else(|| {
        ResolveError::MissingResolverField {
            kind: spec.kind.clone(),
            field: field.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackctlError;
    use crate::provider::fake::{FakeProvisioningClient, deployed};

    fn resolver() -> ParameterResolver {
        let client = FakeProvisioningClient::new()
            .with_stack(deployed("security", &[("WebSGId", "sg-dynamic")]), "{}")
            .with_stack(deployed("empty", &[("Nothing", "")]), "{}");
        ParameterResolver::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_literal() {
        let value = resolver()
            .resolve("CidrBlock", &ParameterValue::literal("10.0.0.0/16"), "us-east-1")
            .await
            .unwrap();
        assert_eq!(value, "10.0.0.0/16");
    }

    #[tokio::test]
    async fn test_empty_literal_is_config_error() {
        let err = resolver()
            .resolve("CidrBlock", &ParameterValue::literal(""), "us-east-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackctlError::Config(ConfigError::MissingParameterValue { ref parameter, .. }) if parameter == "CidrBlock"
        ));
    }

    #[tokio::test]
    async fn test_list_preserves_order() {
        let value = ParameterValue::List(vec![
            ListItem::Literal(String::from("sg-1")),
            ListItem::Resolver(ResolverSpec::stack_output("security", "WebSGId")),
            ListItem::Literal(String::from("sg-2")),
        ]);
        let resolved = resolver()
            .resolve("SecurityGroups", &value, "us-east-1")
            .await
            .unwrap();
        assert_eq!(resolved, "sg-1,sg-dynamic,sg-2");
    }

    #[tokio::test]
    async fn test_list_drops_empty_items() {
        let value = ParameterValue::List(vec![
            ListItem::Literal(String::from("a")),
            ListItem::Resolver(ResolverSpec::stack_output("empty", "Nothing")),
            ListItem::Literal(String::new()),
            ListItem::Literal(String::from("b")),
        ]);
        let resolved = resolver().resolve("Items", &value, "us-east-1").await.unwrap();
        assert_eq!(resolved, "a,b");
    }

    #[tokio::test]
    async fn test_literal_resolver() {
        let spec = ResolverSpec::new(RESOLVER_LITERAL, [("value", "3")]);
        let resolved = resolver()
            .resolve("Version", &ParameterValue::Resolver(spec), "us-east-1")
            .await
            .unwrap();
        assert_eq!(resolved, "3");
    }

    #[tokio::test]
    async fn test_missing_output_names_stack_and_key() {
        let spec = ResolverSpec::stack_output("security", "DbSGId");
        let err = resolver()
            .resolve("DbSecurityGroup", &ParameterValue::Resolver(spec), "us-east-1")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("DbSecurityGroup"));
        assert!(message.contains("'security'"));
        assert!(message.contains("'DbSGId'"));
        match err {
            StackctlError::Resolve(ResolveError::Parameter { source, .. }) => assert!(matches!(
                *source,
                StackctlError::Resolve(ResolveError::MissingOutput { .. })
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_target_stack() {
        let spec = ResolverSpec::stack_output("ghost", "Id");
        let err = resolver()
            .resolve("Id", &ParameterValue::Resolver(spec), "us-east-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Stack 'ghost' does not exist"));
    }

    #[tokio::test]
    async fn test_missing_field_and_unknown_kind() {
        let missing = ResolverSpec::new(RESOLVER_STACK_OUTPUT, [("stack_name", "vpc")]);
        let err = resolver()
            .resolve("VpcId", &ParameterValue::Resolver(missing), "us-east-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackctlError::Resolve(ResolveError::MissingResolverField { ref field, .. }) if field == "output_key"
        ));

        let unknown = ResolverSpec::new("ssm-parameter", [("name", "/x")]);
        let err = resolver()
            .resolve("X", &ParameterValue::Resolver(unknown), "us-east-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackctlError::Resolve(ResolveError::UnsupportedResolver { .. })
        ));
    }
}
