//! Stack resolution.
//!
//! Turns the raw configuration of a stack into everything needed to deploy
//! it: template body, flat parameter strings and layered tags.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ConfigProvider;
use crate::error::{ConfigError, Result, StackctlError};
use crate::provider::{redact, StackInput};
use crate::template::TemplateReader;

use super::graph::DependencyGraph;
use super::parameter::ParameterResolver;

/// A stack ready to be sent to the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStack {
    /// Stack name, also used as the remote stack name.
    pub name: String,
    /// Context the stack was resolved for.
    pub context: String,
    /// Target region.
    pub region: String,
    /// Template location.
    pub template_uri: String,
    /// Template body.
    #[serde(skip)]
    pub template_body: String,
    /// Final parameter values.
    pub parameters: BTreeMap<String, String>,
    /// Final tags.
    pub tags: BTreeMap<String, String>,
    /// Capabilities to acknowledge.
    pub capabilities: Vec<String>,
    /// Declared dependencies.
    pub depends_on: Vec<String>,
}

impl ResolvedStack {
    /// Builds the create or update request for this stack.
    #[must_use]
    pub fn stack_input(&self) -> StackInput {
        StackInput {
            name: self.name.clone(),
            template_body: self.template_body.clone(),
            parameters: self.parameters.clone(),
            tags: self.tags.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

/// Several resolved stacks and the order to deploy them in.
#[derive(Debug, Clone, Default)]
pub struct ResolvedStacks {
    /// Resolved stacks by name.
    pub stacks: BTreeMap<String, ResolvedStack>,
    /// Deployment order.
    pub order: Vec<String>,
}

impl ResolvedStacks {
    /// Iterates the stacks in deployment order.
    pub fn in_order(&self) -> impl Iterator<Item = &ResolvedStack> {
        self.order.iter().filter_map(|name| self.stacks.get(name))
    }
}

/// Resolves stacks of a context from configuration, templates and remote outputs.
#[derive(Clone)]
pub struct StackResolver {
    config: Arc<dyn ConfigProvider>,
    reader: Arc<dyn TemplateReader>,
    parameters: ParameterResolver,
}

impl std::fmt::Debug for StackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackResolver")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl StackResolver {
    /// Creates a resolver from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        reader: Arc<dyn TemplateReader>,
        parameters: ParameterResolver,
    ) -> Self {
        Self {
            config,
            reader,
            parameters,
        }
    }

    /// Returns the configuration provider.
    #[must_use]
    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    /// Resolves a single stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or stack is undefined, the template
    /// cannot be read, or a parameter fails to resolve.
    pub async fn resolve_stack(&self, context: &str, name: &str) -> Result<ResolvedStack> {
        info!("Resolving stack {name} for context {context}");

        let ctx = self.config.load_context(context)?;
        let stack = self.config.get_stack(context, name)?;
        let template_body = self.reader.resolve(&stack.template)?;

        let mut parameters = BTreeMap::new();
        for (key, value) in &stack.parameters {
            let resolved = self
                .parameters
                .resolve(key, value, &ctx.region)
                .await
                .map_err(|e| name_stack(e, name))?;
            debug!("  {key} = {}", redact(key, &resolved));
            parameters.insert(key.clone(), resolved);
        }

        let mut tags = ctx.global_tags.clone();
        tags.extend(ctx.tags.clone());
        tags.extend(stack.tags.clone());

        Ok(ResolvedStack {
            name: name.to_string(),
            context: context.to_string(),
            region: ctx.region,
            template_uri: stack.template,
            template_body,
            parameters,
            tags,
            capabilities: stack.capabilities,
            depends_on: stack.depends_on,
        })
    }

    /// Resolves several stacks and orders them by dependency.
    ///
    /// Dependencies on stacks outside `names` do not affect the order.
    ///
    /// # Errors
    ///
    /// Returns the first resolution error, or a circular dependency error.
    pub async fn resolve_stacks(&self, context: &str, names: &[String]) -> Result<ResolvedStacks> {
        let mut stacks = BTreeMap::new();
        let mut graph = DependencyGraph::new();

        for name in names {
            let resolved = self.resolve_stack(context, name).await?;
            graph.add_stack(name.clone(), resolved.depends_on.iter().cloned());
            stacks.insert(name.clone(), resolved);
        }

        let order = graph.deployment_order()?;
        Ok(ResolvedStacks { stacks, order })
    }

    /// Orders stacks by dependency without resolving templates or parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a stack is undefined or the dependencies form a cycle.
    pub fn dependency_order(&self, context: &str, names: &[String]) -> Result<Vec<String>> {
        Ok(self.graph(context, names)?.deployment_order()?)
    }

    /// Returns the reverse of [`Self::dependency_order`].
    ///
    /// # Errors
    ///
    /// Returns an error if a stack is undefined or the dependencies form a cycle.
    pub fn deletion_order(&self, context: &str, names: &[String]) -> Result<Vec<String>> {
        Ok(self.graph(context, names)?.deletion_order()?)
    }

    fn graph(&self, context: &str, names: &[String]) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for name in names {
            let stack = self.config.get_stack(context, name)?;
            graph.add_stack(name.clone(), stack.depends_on);
        }
        Ok(graph)
    }
}

/// Names the stack on a missing-value error raised without one.
fn name_stack(err: StackctlError, stack: &str) -> StackctlError {
    match err {
        StackctlError::Config(ConfigError::MissingParameterValue {
            stack: None,
            parameter,
        }) => ConfigError::MissingParameterValue {
            stack: Some(stack.to_string()),
            parameter,
        }
        .into(),
        other => other,
    }
}
