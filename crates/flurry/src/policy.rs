//! Typed permission grants and their rendering into policy documents.
//!
//! Grants stay structured until they reach the provider: [`PolicyGrant::to_attachment`]
//! is the only place a document is turned into text.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use flurry_core::topology::Attachment;

/// Version string every rendered document carries.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Provider-managed policies referenced by pipelines.
pub mod managed {
    /// Lets a function create log groups/streams and put log events.
    pub const LAMBDA_BASIC_EXECUTION: &str =
        "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
    pub const LAMBDA_FULL_ACCESS: &str = "arn:aws:iam::aws:policy/AWSLambda_FullAccess";
    pub const FIREHOSE_FULL_ACCESS: &str =
        "arn:aws:iam::aws:policy/AmazonKinesisFirehoseFullAccess";
    pub const CLOUDWATCH_LOGS_FULL_ACCESS: &str =
        "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess";

    /// Managed policies known to grant execution logging.
    pub(crate) const LOGGING_CAPABLE: &[&str] =
        &[LAMBDA_BASIC_EXECUTION, CLOUDWATCH_LOGS_FULL_ACCESS];
}

/// Actions a compute identity needs to emit diagnostics.
pub const EXECUTION_LOGGING_ACTIONS: [&str; 3] =
    ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"];

/// The service allowed to assume an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServicePrincipal {
    Lambda,
    Firehose,
    /// Any other service, e.g. `states.amazonaws.com`.
    Custom(String),
}

impl ServicePrincipal {
    pub fn service(&self) -> &str {
        match self {
            ServicePrincipal::Lambda => "lambda.amazonaws.com",
            ServicePrincipal::Firehose => "firehose.amazonaws.com",
            ServicePrincipal::Custom(service) => service,
        }
    }

    /// Whether identities assumed by this principal execute code.
    pub fn runs_compute(&self) -> bool {
        matches!(self, ServicePrincipal::Lambda)
    }

    /// The trust policy binding an identity to this principal.
    pub fn trust_policy(&self) -> String {
        json!({
            "Version": POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.service() },
                "Action": "sts:AssumeRole",
            }],
        })
        .to_string()
    }
}

impl fmt::Display for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// One statement of an inline policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    /// Operator -> condition key -> accepted values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Statement {
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn deny<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions, resources)
        }
    }

    pub fn with_condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.conditions
            .entry(operator.into())
            .or_default()
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether any action pattern of this statement matches `action`.
    pub fn covers(&self, action: &str) -> bool {
        self.actions
            .iter()
            .any(|pattern| action_matches(pattern, action))
    }

    fn to_value(&self) -> Value {
        let mut statement = json!({
            "Effect": self.effect,
            "Action": self.actions,
            "Resource": self.resources,
        });
        if !self.conditions.is_empty()
            && let Some(object) = statement.as_object_mut()
        {
            object.insert("Condition".to_string(), json!(self.conditions));
        }
        statement
    }
}

/// Action patterns are case-insensitive and may contain `*` wildcards.
fn action_matches(pattern: &str, action: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let action = action.to_ascii_lowercase();

    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return false;
    };
    let Some(mut rest) = action.strip_prefix(first) else {
        return false;
    };
    if !pattern.contains('*') {
        return rest.is_empty();
    }

    let tail: Vec<&str> = parts.collect();
    for (index, part) in tail.iter().enumerate() {
        if index == tail.len() - 1 {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(position) => rest = &rest[position + part.len()..],
            None => return false,
        }
    }
    true
}

/// A permission attached to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyGrant {
    /// Reference to a provider-managed policy.
    Managed { arn: String },
    /// A policy embedded on the identity.
    Inline {
        name: String,
        statements: Vec<Statement>,
    },
}

impl PolicyGrant {
    pub fn managed(arn: impl Into<String>) -> Self {
        PolicyGrant::Managed { arn: arn.into() }
    }

    pub fn inline(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        PolicyGrant::Inline {
            name: name.into(),
            statements,
        }
    }

    /// Whether this grant lets its holder create log groups and streams and
    /// put log events.
    pub fn permits_execution_logging(&self) -> bool {
        match self {
            PolicyGrant::Managed { arn } => managed::LOGGING_CAPABLE.contains(&arn.as_str()),
            PolicyGrant::Inline { statements, .. } => {
                EXECUTION_LOGGING_ACTIONS.iter().all(|action| {
                    let allowed = statements
                        .iter()
                        .any(|s| s.effect == Effect::Allow && s.covers(action));
                    let denied = statements
                        .iter()
                        .any(|s| s.effect == Effect::Deny && s.covers(action));
                    allowed && !denied
                })
            }
        }
    }

    /// Render into the provider's attachment format.
    pub fn to_attachment(&self) -> Attachment {
        match self {
            PolicyGrant::Managed { arn } => Attachment::Managed {
                policy_arn: arn.clone(),
            },
            PolicyGrant::Inline { name, statements } => Attachment::Inline {
                name: name.clone(),
                document: render_document(statements),
            },
        }
    }
}

fn render_document(statements: &[Statement]) -> String {
    let statements: Vec<Value> = statements.iter().map(Statement::to_value).collect();
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements,
    })
    .to_string()
}

/// An order-independent set of grants. Adding a grant twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSet {
    grants: IndexSet<PolicyGrant>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the grant was already present.
    pub fn attach(&mut self, grant: PolicyGrant) -> bool {
        self.grants.insert(grant)
    }

    pub fn contains(&self, grant: &PolicyGrant) -> bool {
        self.grants.contains(grant)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyGrant> {
        self.grants.iter()
    }

    pub fn permits_execution_logging(&self) -> bool {
        self.grants.iter().any(PolicyGrant::permits_execution_logging)
    }
}

impl FromIterator<PolicyGrant> for GrantSet {
    fn from_iter<I: IntoIterator<Item = PolicyGrant>>(iter: I) -> Self {
        Self {
            grants: iter.into_iter().collect(),
        }
    }
}
