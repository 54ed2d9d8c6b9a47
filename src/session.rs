use crate::domain::IdentityProvider;
use crate::models::Identity;
use std::sync::Arc;
use tracing;

/// Stateless accessor for the authenticated identity.
///
/// `current_user` never fails: any provider error is logged and treated as
/// "not signed in". Write paths use it as their precondition check.
#[derive(Clone)]
pub struct SessionAccessor {
    provider: Arc<dyn IdentityProvider>,
}

impl SessionAccessor {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub async fn current_user(&self) -> Option<Identity> {
        match self.provider.current_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Identity lookup failed, treating as signed out");
                None
            }
        }
    }

    /// The provider's OAuth redirect URL for starting a sign-in.
    pub fn sign_in_url(&self, redirect_to: &str) -> String {
        self.provider.authorize_url(redirect_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingProvider;

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn current_user(&self) -> Result<Option<Identity>, anyhow::Error> {
            Err(anyhow::anyhow!("token refresh failed"))
        }

        fn authorize_url(&self, redirect_to: &str) -> String {
            format!("https://id.example/authorize?redirect_to={redirect_to}")
        }
    }

    #[tokio::test]
    async fn provider_errors_read_as_signed_out() {
        let session = SessionAccessor::new(Arc::new(FailingProvider));
        assert_eq!(session.current_user().await, None);
    }
}
