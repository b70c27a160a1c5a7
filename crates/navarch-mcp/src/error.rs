use thiserror::Error;

/// Errors surfaced at the tool boundary
///
/// Every variant maps to a string tag in the normalized error envelope; the
/// envelope is always marshalled as a structured value, never assembled by
/// string substitution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Argument coercion failed; the handler was not invoked
    #[error("{0}")]
    BadArgument(String),

    /// The self-subject access review denied the operation
    #[error("forbidden: cannot {verb} {group}/{resource} in namespace {namespace}: {reason}")]
    Forbidden {
        verb: String,
        group: String,
        resource: String,
        namespace: String,
        reason: String,
    },

    /// A required CRD is absent at call time
    #[error("{message}")]
    FeatureNotInstalled { feature: String, message: String },

    /// The API server rejected the request
    #[error("kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    /// Handler-level error (bad target, subprocess failure, lookup error)
    #[error("{0}")]
    Tool(String),

    /// Recovered panic or invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Convenience constructor for the CRD gate
    pub fn feature_not_installed(feature: &str) -> Self {
        Self::FeatureNotInstalled {
            feature: feature.to_string(),
            message: format!("{feature} CRD not available"),
        }
    }

    /// The string tag carried in the error envelope
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadArgument(_) => "BadArgument",
            Self::Forbidden { .. } => "Forbidden",
            Self::FeatureNotInstalled { .. } => "FeatureNotInstalled",
            Self::Kubernetes(_) => "KubernetesError",
            Self::Tool(_) => "ToolError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Structured details included in the envelope, when the kind has any
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Forbidden {
                verb,
                group,
                resource,
                namespace,
                reason,
            } => Some(serde_json::json!({
                "verb": verb,
                "group": group,
                "resource": resource,
                "namespace": namespace,
                "reason": reason,
            })),
            Self::FeatureNotInstalled { feature, .. } => Some(serde_json::json!({ "feature": feature })),
            _ => None,
        }
    }

    /// The normalized error envelope for this error
    pub fn envelope(&self, tool: &str, cluster: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
            "cluster": cluster,
            "tool": tool,
        });
        if let Some(details) = self.details()
            && let Some(map) = body.as_object_mut()
        {
            map.insert("details".to_string(), details);
        }
        serde_json::json!({ "error": body })
    }
}

impl From<navarch_client::ClientError> for ToolError {
    fn from(e: navarch_client::ClientError) -> Self {
        Self::Tool(e.to_string())
    }
}

impl From<navarch_auth::AuthError> for ToolError {
    fn from(e: navarch_auth::AuthError) -> Self {
        Self::Tool(e.to_string())
    }
}

impl From<navarch_discovery::DiscoveryError> for ToolError {
    fn from(e: navarch_discovery::DiscoveryError) -> Self {
        Self::Tool(e.to_string())
    }
}
