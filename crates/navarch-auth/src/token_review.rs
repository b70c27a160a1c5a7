use std::collections::BTreeMap;

use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use kube::Api;
use kube::api::PostParams;

use crate::AuthError;

/// Identity of an authenticated bearer
#[derive(Debug, Clone, Default)]
pub struct ReviewedUser {
    pub username: String,
    pub uid: String,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Validates bearer tokens against the cluster's token-review endpoint
pub struct TokenReviewer {
    client: kube::Client,
}

impl TokenReviewer {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Review a bearer token and return the identity it represents
    ///
    /// A review that comes back with `authenticated: false` is an error
    /// carrying the server's rejection message.
    pub async fn review(&self, token: &str) -> Result<ReviewedUser, AuthError> {
        let review = TokenReview {
            spec: TokenReviewSpec {
                token: Some(token.to_string()),
                audiences: None,
            },
            ..TokenReview::default()
        };

        let api: Api<TokenReview> = Api::all(self.client.clone());
        let created = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(AuthError::TokenReview)?;

        let status = created.status.unwrap_or_default();
        if !status.authenticated.unwrap_or(false) {
            return Err(AuthError::NotAuthenticated(
                status.error.unwrap_or_else(|| "token rejected".to_string()),
            ));
        }

        let user = status.user.unwrap_or_default();
        Ok(ReviewedUser {
            username: user.username.unwrap_or_default(),
            uid: user.uid.unwrap_or_default(),
            groups: user.groups.unwrap_or_default(),
            extra: user.extra.unwrap_or_default(),
        })
    }
}
